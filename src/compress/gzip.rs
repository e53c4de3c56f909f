use crate::error::{Result, RotalogError};
use flate2::{Compression, GzBuilder};
use std::ffi::OsString;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Comment stored in the gzip header of every rotated file
pub const ARCHIVE_COMMENT: &str = "rotated logfile";

/// Path of the archive produced for `path`: the same name with `.gz` appended
pub fn archive_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".gz");
    PathBuf::from(name)
}

/// Gzip `path` into `<path>.gz` and remove the original
///
/// The original is only removed once the archive trailer has been written.
/// On any error the original is left in place.
///
/// # Returns
/// * `Ok(u64)` - Number of uncompressed bytes copied into the archive
/// * `Err(RotalogError::CompressionFailed)` - Open, copy or flush failed
pub fn compress_file(path: &Path) -> Result<u64> {
    let archive = archive_path(path);
    tracing::debug!("compressing {} into {}", path.display(), archive.display());

    let mut source = File::open(path).map_err(|e| {
        RotalogError::CompressionFailed(format!("failed to open {}: {}", path.display(), e))
    })?;

    let dest = File::create(&archive).map_err(|e| {
        RotalogError::CompressionFailed(format!("failed to create {}: {}", archive.display(), e))
    })?;

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mtime = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0);

    let mut encoder = GzBuilder::new()
        .filename(name.as_bytes())
        .comment(ARCHIVE_COMMENT)
        .mtime(mtime)
        .write(dest, Compression::default());

    let nbytes = io::copy(&mut source, &mut encoder).map_err(|e| {
        tracing::error!("gzip: {}", e);
        RotalogError::CompressionFailed(format!("failed to compress {}: {}", path.display(), e))
    })?;

    // The encoder must finish before the file is released or the trailer is lost
    let dest = encoder.finish().map_err(|e| {
        RotalogError::CompressionFailed(format!("failed to finish {}: {}", archive.display(), e))
    })?;
    dest.sync_all().map_err(|e| {
        RotalogError::CompressionFailed(format!("failed to sync {}: {}", archive.display(), e))
    })?;
    drop(dest);

    tracing::debug!("gzip of {} succeeded, nbytes: {}", path.display(), nbytes);
    tracing::debug!("unlinking {}", path.display());
    if let Err(e) = fs::remove_file(path) {
        tracing::warn!("failed to remove {} after compression: {}", path.display(), e);
    }

    Ok(nbytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;
    use tempfile::TempDir;

    #[test]
    fn test_archive_path_appends_suffix() {
        let path = Path::new("/var/log/app-20240102030405.log");
        assert_eq!(
            archive_path(path),
            PathBuf::from("/var/log/app-20240102030405.log.gz")
        );
    }

    #[test]
    fn test_compress_file_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("app-20240102030405.log");
        let content = b"line one\nline two\nline three\n".repeat(50);
        fs::write(&path, &content).unwrap();

        let nbytes = compress_file(&path).unwrap();
        assert_eq!(nbytes, content.len() as u64);
        assert!(!path.exists(), "original should be removed");

        let archive = archive_path(&path);
        let mut decoder = GzDecoder::new(File::open(&archive).unwrap());
        let mut decoded = Vec::new();
        decoder.read_to_end(&mut decoded).unwrap();
        assert_eq!(decoded, content);
    }

    #[test]
    fn test_compress_file_header() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("app-20240102030405.log");
        fs::write(&path, b"hello").unwrap();

        let before = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs() as u32;
        compress_file(&path).unwrap();

        let mut decoder = GzDecoder::new(File::open(archive_path(&path)).unwrap());
        let mut decoded = Vec::new();
        decoder.read_to_end(&mut decoded).unwrap();

        let header = decoder.header().unwrap();
        assert_eq!(header.filename(), Some(&b"app-20240102030405.log"[..]));
        assert_eq!(header.comment(), Some(ARCHIVE_COMMENT.as_bytes()));
        assert!(header.mtime() >= before);
    }

    #[test]
    fn test_compress_empty_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("empty.log");
        fs::write(&path, b"").unwrap();

        assert_eq!(compress_file(&path).unwrap(), 0);
        assert!(!path.exists());
        assert!(archive_path(&path).exists());
    }

    #[test]
    fn test_compress_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("missing.log");

        let result = compress_file(&path);
        assert!(matches!(result, Err(RotalogError::CompressionFailed(_))));
        assert!(!archive_path(&path).exists(), "no archive for a missing source");
    }
}
