// CLI module - Pipe stdin into a rotating log

use crate::compress::{CompressionOutcome, Compressor};
use crate::config::LogFileConfig;
use crate::error::{Result, RotalogError};
use crate::human::{bytes_to_human, duration_to_human};
use crate::logfile::RotatingLogFile;
use crate::timewriter::TimestampWriter;
use clap::Parser;
use std::path::PathBuf;
use std::time::Instant;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

/// rotalog - Write stdin to a log file that rotates behind a stable symlink
#[derive(Parser, Debug)]
#[command(name = "rotalog")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Logical path of the log (becomes a symlink to the active file)
    path: Option<PathBuf>,

    /// Load settings from a TOML or JSON file; flags override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Rotate once the active file reaches this many bytes (0 disables)
    #[arg(short = 's', long)]
    max_bytes: Option<u64>,

    /// Maximum age of a file in seconds (recorded, not yet enforced)
    #[arg(long)]
    max_age: Option<u64>,

    /// Gzip rotated files in the background
    #[arg(short = 'z', long)]
    compress: bool,

    /// Prefix every line with a timestamp
    #[arg(short, long)]
    timestamps: bool,

    /// Use UTC for line timestamps
    #[arg(long)]
    utc: bool,

    /// Number of compression jobs allowed to run at once
    #[arg(long)]
    workers: Option<usize>,

    /// Increase diagnostic output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Counters reported when the pump stops
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PumpStats {
    pub bytes: u64,
    pub lines: u64,
    pub rotations: u64,
    pub write_errors: u64,
}

impl Cli {
    /// Parse arguments and run until stdin closes or Ctrl-C
    pub async fn run(self) -> Result<()> {
        let config = self.resolve_config()?;
        execute(config).await
    }

    /// Merge the config file (if any) with command-line overrides
    pub fn resolve_config(&self) -> Result<LogFileConfig> {
        let mut config = match &self.config {
            Some(file) => LogFileConfig::from_file(file)?,
            None => {
                let path = self.path.clone().ok_or_else(|| {
                    RotalogError::MissingConfigField(
                        "path (pass a PATH argument or --config)".to_string(),
                    )
                })?;
                LogFileConfig::new(path)
            }
        };

        if let Some(path) = &self.path {
            config.path = path.clone();
        }
        if let Some(max_bytes) = self.max_bytes {
            config.max_bytes = max_bytes;
        }
        if let Some(max_age) = self.max_age {
            config.max_age_secs = max_age;
        }
        if let Some(workers) = self.workers {
            config.compression_workers = workers;
        }
        config.compress |= self.compress;
        config.timestamps |= self.timestamps;
        config.utc |= self.utc;

        config.validate()?;
        Ok(config)
    }
}

/// Open the log described by `config` and pump stdin into it
pub async fn execute(config: LogFileConfig) -> Result<()> {
    let started = Instant::now();

    let (report_tx, report_rx) = mpsc::unbounded_channel();
    let compressor = Compressor::new(config.compression_workers).with_reports(report_tx);
    let reporter = tokio::spawn(collect_reports(report_rx));

    let mut logfile = RotatingLogFile::new(&config.path, config.max_bytes, config.max_age_secs)
        .await?
        .with_compressor(compressor.clone());
    logfile.set_compression(config.compress);
    logfile.open().await?;
    tracing::info!(
        "writing to {} (active file {})",
        logfile.path().display(),
        logfile.filename()
    );

    let writer = TimestampWriter::new(logfile)
        .utc(config.utc)
        .disabled(!config.timestamps);

    let stdin = BufReader::new(tokio::io::stdin());
    let mut stats = PumpStats::default();
    let result = tokio::select! {
        result = pump(stdin, &writer, &mut stats) => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted, closing log");
            Ok(())
        }
    };

    let mut logfile = writer.into_inner();
    logfile.close().await?;
    drop(logfile);

    compressor.wait_idle().await;
    drop(compressor);
    let compressed = reporter.await.unwrap_or(0);

    result?;
    tracing::info!(
        "wrote {} in {} lines over {}, {} rotations, {} files compressed, {} write errors",
        bytes_to_human(stats.bytes),
        stats.lines,
        duration_to_human(started.elapsed()),
        stats.rotations,
        compressed,
        stats.write_errors
    );

    Ok(())
}

/// Copy `\n`-delimited chunks from `reader` into `writer`, rotating as needed
///
/// Write errors are logged and counted; rotation errors stop the pump.
pub async fn pump<R>(
    mut reader: R,
    writer: &TimestampWriter<RotatingLogFile>,
    stats: &mut PumpStats,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();

    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line).await? == 0 {
            break;
        }

        match writer.write(&line).await {
            Ok(n) => {
                stats.bytes += n as u64;
                stats.lines += 1;
            }
            Err(e) => {
                tracing::error!("write error: {}", e);
                stats.write_errors += 1;
            }
        }

        let mut logfile = writer.lock().await;
        if logfile.needs_rotation() {
            logfile.rotate().await?;
            stats.rotations += 1;
            tracing::info!("rotated to {}", logfile.filename());
        }
    }

    Ok(())
}

/// Drain compression outcomes until every sender is gone
async fn collect_reports(mut reports: mpsc::UnboundedReceiver<CompressionOutcome>) -> u64 {
    let mut compressed = 0;
    while let Some(outcome) = reports.recv().await {
        if outcome.is_success() {
            compressed += 1;
        }
    }
    compressed
}
