// Timestamp-prefixing writer shared between concurrent producers

use chrono::{Local, Utc};
use std::io;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{Mutex, MutexGuard};

/// strftime pattern of the prefix, e.g. `Jan  2 15:04:05.000000`
pub const STAMP_FORMAT: &str = "%b %e %H:%M:%S%.6f";

/// TimestampWriter prefixes every write with the current time
///
/// The prefix and payload are written under this instance's lock, so
/// concurrent writers never split a timestamp from its payload. Separate
/// instances do not contend with each other.
pub struct TimestampWriter<W> {
    inner: Mutex<W>,
    utc: bool,
    disabled: bool,
}

impl<W: AsyncWrite + Unpin> TimestampWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner: Mutex::new(inner),
            utc: false,
            disabled: false,
        }
    }

    /// Stamp in UTC instead of local time
    pub fn utc(mut self, utc: bool) -> Self {
        self.utc = utc;
        self
    }

    /// Pass writes through without a prefix
    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    /// Write `data` behind a timestamp and flush
    ///
    /// Returns the payload length; the prefix is not counted.
    pub async fn write(&self, data: &[u8]) -> io::Result<usize> {
        let mut inner = self.inner.lock().await;

        if !self.disabled {
            inner.write_all(self.prefix().as_bytes()).await?;
        }
        inner.write_all(data).await?;
        inner.flush().await?;

        Ok(data.len())
    }

    /// Exclusive access to the wrapped writer
    pub async fn lock(&self) -> MutexGuard<'_, W> {
        self.inner.lock().await
    }

    pub fn into_inner(self) -> W {
        self.inner.into_inner()
    }

    fn prefix(&self) -> String {
        let stamp = if self.utc {
            Utc::now().format(STAMP_FORMAT).to_string()
        } else {
            Local::now().format(STAMP_FORMAT).to_string()
        };
        format!("{} ", stamp)
    }
}
