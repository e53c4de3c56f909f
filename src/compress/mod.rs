// Compress module - gzip of rotated files and the background pool

mod gzip;
mod pool;

pub use gzip::{archive_path, compress_file, ARCHIVE_COMMENT};
pub use pool::{CompressionOutcome, Compressor, DEFAULT_COMPRESSION_WORKERS};
