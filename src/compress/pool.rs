use super::gzip::{archive_path, compress_file};
use crate::error::RotalogError;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, watch, Semaphore};

/// Default number of compression jobs allowed to run at once
pub const DEFAULT_COMPRESSION_WORKERS: usize = 2;

/// Result of one background compression job
#[derive(Debug)]
pub enum CompressionOutcome {
    /// The file was archived and the original removed
    Compressed {
        source: PathBuf,
        archive: PathBuf,
        bytes: u64,
    },
    /// The job failed; the original file is still on disk
    Failed {
        source: PathBuf,
        error: RotalogError,
    },
}

impl CompressionOutcome {
    /// Path of the file the job was submitted for
    pub fn source(&self) -> &PathBuf {
        match self {
            CompressionOutcome::Compressed { source, .. } => source,
            CompressionOutcome::Failed { source, .. } => source,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, CompressionOutcome::Compressed { .. })
    }
}

/// Bounded background pool for compressing rotated files
///
/// Cloning is cheap; clones share the same permits, pending counter and
/// report channel. Submitted jobs queue behind `max_concurrent` permits and
/// run on tokio's blocking pool.
#[derive(Clone)]
pub struct Compressor {
    permits: Arc<Semaphore>,
    max_concurrent: usize,
    pending: Arc<watch::Sender<usize>>,
    reports: Option<mpsc::UnboundedSender<CompressionOutcome>>,
}

impl Compressor {
    /// Create a pool allowing `max_concurrent` jobs at once (at least one)
    pub fn new(max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        let (pending, _) = watch::channel(0usize);

        Self {
            permits: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            pending: Arc::new(pending),
            reports: None,
        }
    }

    /// Send every job outcome to `reports`
    pub fn with_reports(mut self, reports: mpsc::UnboundedSender<CompressionOutcome>) -> Self {
        self.reports = Some(reports);
        self
    }

    /// Maximum number of jobs running at once
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Number of jobs submitted but not yet finished
    pub fn pending(&self) -> usize {
        *self.pending.borrow()
    }

    /// Queue `path` for compression without waiting for it
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit(&self, path: PathBuf) {
        self.pending.send_modify(|n| *n += 1);
        tracing::debug!("queued {} for compression", path.display());

        let pool = self.clone();
        tokio::spawn(async move {
            let outcome = pool.run(path).await;
            pool.report(outcome);
            pool.pending.send_modify(|n| *n -= 1);
        });
    }

    /// Wait until every submitted job has finished
    pub async fn wait_idle(&self) {
        let mut rx = self.pending.subscribe();
        // The sender lives in self, so the channel cannot close here
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    async fn run(&self, source: PathBuf) -> CompressionOutcome {
        let _permit = match self.permits.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(e) => {
                return CompressionOutcome::Failed {
                    source,
                    error: RotalogError::CompressionFailed(format!("pool closed: {}", e)),
                }
            }
        };

        let started = Instant::now();
        let job_path = source.clone();
        let result = tokio::task::spawn_blocking(move || compress_file(&job_path)).await;

        match result {
            Ok(Ok(bytes)) => {
                tracing::debug!(
                    path = %source.display(),
                    duration_ms = started.elapsed().as_millis(),
                    "compression finished"
                );
                CompressionOutcome::Compressed {
                    archive: archive_path(&source),
                    source,
                    bytes,
                }
            }
            Ok(Err(error)) => CompressionOutcome::Failed { source, error },
            Err(e) => CompressionOutcome::Failed {
                source,
                error: RotalogError::CompressionFailed(format!("compression task failed: {}", e)),
            },
        }
    }

    fn report(&self, outcome: CompressionOutcome) {
        match &outcome {
            CompressionOutcome::Compressed { source, bytes, .. } => {
                tracing::info!("compressed {} ({} bytes)", source.display(), bytes);
            }
            CompressionOutcome::Failed { source, error } => {
                tracing::error!("failed to compress {}: {}", source.display(), error);
            }
        }

        if let Some(reports) = &self.reports {
            let _ = reports.send(outcome);
        }
    }
}

impl Default for Compressor {
    fn default() -> Self {
        Self::new(DEFAULT_COMPRESSION_WORKERS)
    }
}

impl std::fmt::Debug for Compressor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Compressor")
            .field("max_concurrent", &self.max_concurrent)
            .field("pending", &self.pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_new_clamps_workers() {
        assert_eq!(Compressor::new(0).max_concurrent(), 1);
        assert_eq!(Compressor::new(4).max_concurrent(), 4);
        assert_eq!(
            Compressor::default().max_concurrent(),
            DEFAULT_COMPRESSION_WORKERS
        );
    }

    #[tokio::test]
    async fn test_submit_reports_success() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("app-20240102030405.log");
        std::fs::write(&path, b"some log data\n").unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let compressor = Compressor::new(1).with_reports(tx);
        compressor.submit(path.clone());

        let outcome = rx.recv().await.unwrap();
        match outcome {
            CompressionOutcome::Compressed { source, archive, bytes } => {
                assert_eq!(source, path);
                assert_eq!(archive, archive_path(&path));
                assert_eq!(bytes, 14);
            }
            CompressionOutcome::Failed { error, .. } => panic!("unexpected failure: {}", error),
        }

        compressor.wait_idle().await;
        assert_eq!(compressor.pending(), 0);
        assert!(!path.exists());
        assert!(archive_path(&path).exists());
    }

    #[tokio::test]
    async fn test_submit_reports_failure() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("missing.log");

        let (tx, mut rx) = mpsc::unbounded_channel();
        let compressor = Compressor::new(1).with_reports(tx);
        compressor.submit(path.clone());

        let outcome = rx.recv().await.unwrap();
        assert!(!outcome.is_success());
        assert_eq!(outcome.source(), &path);
    }

    #[tokio::test]
    async fn test_wait_idle_drains_queue() {
        let temp_dir = TempDir::new().unwrap();
        let compressor = Compressor::new(1);

        let paths: Vec<_> = (0..5)
            .map(|i| {
                let path = temp_dir.path().join(format!("app-{}.log", i));
                std::fs::write(&path, format!("entry {}\n", i).repeat(100)).unwrap();
                path
            })
            .collect();

        for path in &paths {
            compressor.submit(path.clone());
        }

        compressor.wait_idle().await;
        assert_eq!(compressor.pending(), 0);
        for path in &paths {
            assert!(!path.exists());
            assert!(archive_path(path).exists());
        }
    }

    #[tokio::test]
    async fn test_wait_idle_without_jobs() {
        let compressor = Compressor::default();
        compressor.wait_idle().await;
        assert_eq!(compressor.pending(), 0);
    }
}
