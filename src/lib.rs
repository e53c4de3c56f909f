// Library exports for rotalog

pub mod cli;
pub mod compress;
pub mod config;
pub mod error;
pub mod human;
pub mod logfile;
pub mod timewriter;

pub use compress::{compress_file, CompressionOutcome, Compressor};
pub use error::{Result, RotalogError};
pub use logfile::RotatingLogFile;
pub use timewriter::TimestampWriter;
