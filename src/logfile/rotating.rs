use super::naming::{absolute_clean, physical_name};
use crate::compress::Compressor;
use crate::error::{Result, RotalogError};
use chrono::{DateTime, Local};
use std::fs::File as StdFile;
use std::future::Future;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};
use std::time::Duration;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWrite;
use tokio::task::JoinHandle;

/// Permissions of newly created physical log files
const LOG_FILE_MODE: u32 = 0o600;

/// RotatingLogFile writes an append-only stream under a stable symlink,
/// rotating to a freshly timestamped physical file on demand
///
/// The logical path is always a symlink (relative target) to the physical
/// file currently receiving writes, named `<base>-<YYYYMMDDHHMMSS>.log` in
/// the same directory.
pub struct RotatingLogFile {
    /// Logical path (symlink) callers read from
    path: PathBuf,
    /// Directory holding the symlink and every physical file
    dir: PathBuf,
    /// Base name of the active physical file, empty until opened
    filename: String,
    /// Handle of the active physical file; appends run on the blocking pool
    file: Option<Arc<StdFile>>,
    /// Append started by `poll_write` that has not completed yet
    inflight: Option<JoinHandle<io::Result<usize>>>,
    /// Bytes written to the active physical file
    size: u64,
    /// Compress the retired file on rotation
    compress: bool,
    /// Size threshold for rotation, 0 disables it
    max_bytes: u64,
    /// Age threshold; stored but not evaluated by `needs_rotation`
    max_age: Option<Duration>,
    compressor: Compressor,
}

impl RotatingLogFile {
    /// Create a RotatingLogFile for `path` without opening anything
    ///
    /// # Arguments
    /// * `path` - Logical path of the log; its parent directory must exist
    /// * `max_bytes` - Rotation threshold in bytes, 0 to disable
    /// * `max_seconds` - Age threshold in seconds, 0 for none
    ///
    /// # Returns
    /// * `Ok(RotatingLogFile)` - Validated, not yet opened
    /// * `Err(RotalogError::InvalidPath)` - Empty path or no file name
    /// * `Err(RotalogError::DirectoryNotFound)` - Parent directory is missing
    pub async fn new<P: AsRef<Path>>(path: P, max_bytes: u64, max_seconds: u64) -> Result<Self> {
        let path = absolute_clean(path.as_ref())?;
        if path.file_name().is_none() {
            return Err(RotalogError::InvalidPath(format!(
                "{} does not name a file",
                path.display()
            )));
        }
        let dir = path
            .parent()
            .ok_or_else(|| {
                RotalogError::InvalidPath(format!("{} has no parent directory", path.display()))
            })?
            .to_path_buf();

        // The directory must exist; it is never created here
        match tokio::fs::metadata(&dir).await {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                return Err(RotalogError::InvalidPath(format!(
                    "{} is not a directory",
                    dir.display()
                )))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(RotalogError::DirectoryNotFound(dir))
            }
            Err(e) => return Err(RotalogError::Io(e)),
        }

        Ok(Self {
            path,
            dir,
            filename: String::new(),
            file: None,
            inflight: None,
            size: 0,
            compress: false,
            max_bytes,
            max_age: (max_seconds > 0).then(|| Duration::from_secs(max_seconds)),
            compressor: Compressor::default(),
        })
    }

    /// Use `compressor` for rotated files instead of a private default pool
    pub fn with_compressor(mut self, compressor: Compressor) -> Self {
        self.compressor = compressor;
        self
    }

    /// Open a new timestamped physical file and point the symlink at it
    ///
    /// Calling this on an open instance rotates without compressing: the
    /// previous handle is released only after the symlink has been moved.
    pub async fn open(&mut self) -> Result<()> {
        self.open_at(Local::now()).await
    }

    pub(crate) async fn open_at(&mut self, now: DateTime<Local>) -> Result<()> {
        // Make the size on disk current in case the new name is the same file
        if let Err(e) = self.settle_inflight().await {
            tracing::warn!("pending write to {} failed: {}", self.filename, e);
        }

        let filename = physical_name(&self.path, &now)?;
        let current_path = self.dir.join(&filename);

        let (existed, size) = match tokio::fs::metadata(&current_path).await {
            Ok(meta) => {
                tracing::debug!(
                    "{} exists already, size {}",
                    current_path.display(),
                    meta.len()
                );
                (true, meta.len())
            }
            Err(_) => {
                tracing::debug!("{} does not yet exist", current_path.display());
                (false, 0)
            }
        };

        tracing::debug!("opening {}", current_path.display());
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .mode(LOG_FILE_MODE)
            .open(&current_path)
            .await
            .map_err(|e| {
                tracing::error!("open: {}", e);
                RotalogError::OpenFailed(format!("{}: {}", current_path.display(), e))
            })?
            .into_std()
            .await;

        if let Err(e) = self.retarget_symlink(&filename).await {
            drop(file);
            if !existed {
                if let Err(e) = tokio::fs::remove_file(&current_path).await {
                    tracing::warn!("failed to remove {}: {}", current_path.display(), e);
                }
            }
            if self.file.is_some() {
                let previous = self.filename.clone();
                if let Err(e) = self.retarget_symlink(&previous).await {
                    tracing::warn!("failed to restore symlink to {}: {}", previous, e);
                }
            }
            return Err(e);
        }

        if self.file.replace(Arc::new(file)).is_some() {
            tracing::debug!("released {}", self.filename);
        }
        self.filename = filename;
        self.size = size;

        Ok(())
    }

    /// Replace whatever is at the logical path with a symlink to `filename`
    async fn retarget_symlink(&self, filename: &str) -> Result<()> {
        tracing::debug!("deleting {}", self.path.display());
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(RotalogError::SymlinkFailed(format!(
                    "cannot remove {}: {}",
                    self.path.display(),
                    e
                )))
            }
        }

        tracing::debug!("symlink from {} to {}", self.path.display(), filename);
        tokio::fs::symlink(filename, &self.path).await.map_err(|e| {
            tracing::error!("symlink: {}", e);
            RotalogError::SymlinkFailed(format!(
                "{} -> {}: {}",
                self.path.display(),
                filename,
                e
            ))
        })
    }

    /// Append `data` to the active physical file
    ///
    /// Only bytes the OS has accepted are counted towards the file size, so a
    /// failure part way through still leaves `size()` matching the disk.
    ///
    /// # Returns
    /// * `Ok(usize)` - All of `data` was written
    /// * `Err(RotalogError::WriteFailed)` - Carries the bytes written before the error
    /// * `Err(RotalogError::NotOpen)` - No physical file is open
    pub async fn write(&mut self, data: &[u8]) -> Result<usize> {
        tracing::trace!("write: buffer is {} bytes", data.len());
        if let Err(e) = self.settle_inflight().await {
            tracing::warn!("pending write to {} failed: {}", self.filename, e);
        }
        let file = self
            .file
            .clone()
            .ok_or_else(|| RotalogError::NotOpen(self.path.display().to_string()))?;

        let chunk = data.to_vec();
        let (written, error) = tokio::task::spawn_blocking(move || append_blocking(&file, &chunk))
            .await
            .map_err(|e| RotalogError::WriteFailed {
                written: 0,
                source: io::Error::new(io::ErrorKind::Other, e),
            })?;
        self.size += written as u64;

        match error {
            None => Ok(written),
            Some(e) => {
                tracing::error!("write error on {}: {}", self.filename, e);
                Err(RotalogError::WriteFailed { written, source: e })
            }
        }
    }

    /// Wait for an append left behind by `poll_write` and count its bytes
    async fn settle_inflight(&mut self) -> io::Result<()> {
        if let Some(handle) = self.inflight.take() {
            let n = handle
                .await
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))??;
            self.size += n as u64;
        }
        Ok(())
    }

    /// Whether the size threshold has been reached
    pub fn needs_rotation(&self) -> bool {
        if self.max_bytes != 0 && self.size >= self.max_bytes {
            tracing::trace!("file {} needs rotation by size", self.path.display());
            return true;
        }
        false
    }

    /// Switch to a new physical file, compressing the old one if enabled
    ///
    /// Compression is queued on the compressor and not awaited. On error the
    /// previous physical file stays active.
    pub async fn rotate(&mut self) -> Result<()> {
        self.rotate_at(Local::now()).await
    }

    pub(crate) async fn rotate_at(&mut self, now: DateTime<Local>) -> Result<()> {
        // A closed file still gets compressed; only a never-opened one is skipped
        let had_file = !self.filename.is_empty();
        let old_path = self.current_path();
        tracing::debug!("oldfile is {}", old_path.display());

        self.open_at(now).await?;

        if self.compress && had_file {
            if old_path == self.current_path() {
                tracing::warn!(
                    "rotated within the same second, not compressing active file {}",
                    old_path.display()
                );
            } else {
                self.compressor.submit(old_path);
            }
        }

        Ok(())
    }

    /// Finish any pending append and release the active physical file
    ///
    /// Closing an already closed file does nothing.
    pub async fn close(&mut self) -> Result<()> {
        let pending = self.settle_inflight().await;
        if self.file.take().is_some() {
            tracing::debug!("closing {}", self.current_path().display());
        }
        pending?;
        Ok(())
    }

    /// Flag the file for compression on rotation, or not
    pub fn set_compression(&mut self, enabled: bool) {
        self.compress = enabled;
    }

    pub fn compression_enabled(&self) -> bool {
        self.compress
    }

    /// Get the logical path (the symlink)
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the full path of the active physical file
    pub fn current_path(&self) -> PathBuf {
        self.dir.join(&self.filename)
    }

    /// Base name of the active physical file
    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn directory(&self) -> &Path {
        &self.dir
    }

    /// Bytes written to the active physical file
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Age threshold, if one was given; rotation does not consult it yet
    pub fn max_age(&self) -> Option<Duration> {
        self.max_age
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    pub fn compressor(&self) -> &Compressor {
        &self.compressor
    }
}

/// Append `data` one write call at a time, returning the bytes the OS
/// accepted and the error that stopped the loop, if any
fn append_blocking(file: &StdFile, data: &[u8]) -> (usize, Option<io::Error>) {
    let mut out = file;
    let mut written = 0;
    while written < data.len() {
        match out.write(&data[written..]) {
            Ok(0) => return (written, Some(io::Error::from(io::ErrorKind::WriteZero))),
            Ok(n) => written += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return (written, Some(e)),
        }
    }
    (written, None)
}

// Each poll_write runs a single write call to completion on the blocking
// pool, so `size` only grows by bytes that reached the file.
impl AsyncWrite for RotatingLogFile {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let mut handle = match this.inflight.take() {
            Some(handle) => handle,
            None => {
                let Some(file) = this.file.clone() else {
                    return Poll::Ready(Err(io::Error::new(
                        io::ErrorKind::NotConnected,
                        "log file is not open",
                    )));
                };
                let chunk = buf.to_vec();
                tokio::task::spawn_blocking(move || (&*file).write(&chunk))
            }
        };

        match Pin::new(&mut handle).poll(cx) {
            Poll::Pending => {
                this.inflight = Some(handle);
                Poll::Pending
            }
            Poll::Ready(Ok(Ok(n))) => {
                this.size += n as u64;
                Poll::Ready(Ok(n))
            }
            Poll::Ready(Ok(Err(e))) => Poll::Ready(Err(e)),
            Poll::Ready(Err(e)) => Poll::Ready(Err(io::Error::new(io::ErrorKind::Other, e))),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if let Some(handle) = this.inflight.as_mut() {
            let result = ready!(Pin::new(handle).poll(cx));
            this.inflight = None;
            match result {
                Ok(Ok(n)) => this.size += n as u64,
                Ok(Err(e)) => return Poll::Ready(Err(e)),
                Err(e) => return Poll::Ready(Err(io::Error::new(io::ErrorKind::Other, e))),
            }
        }
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.poll_flush(cx)
    }
}

impl std::fmt::Debug for RotatingLogFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RotatingLogFile")
            .field("path", &self.path)
            .field("filename", &self.filename)
            .field("size", &self.size)
            .field("max_bytes", &self.max_bytes)
            .field("compress", &self.compress)
            .field("open", &self.file.is_some())
            .finish()
    }
}
