//! # Append-Only JSON Array Log
//!
//! Persists channel history to a file that is a complete JSON array at every
//! point in time after its first write.
//!
//! ## File Layout
//!
//! ```text
//! first append  [{"a":1},{"a":2}]
//! next append   [{"a":1},{"a":2},{"a":3}]
//!                                ^ written at offset len-1, over the old `]`
//! ```
//!
//! Appends never read or re-serialize existing content: the trailing `]` is a
//! single byte that gets overwritten by `,` and the new elements, and a fresh
//! `]` is written at the new end.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{GatewayError, Result};

/// Timestamp format embedded in finalized file names (millisecond resolution).
const ARCHIVE_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S_%3f";

/// Incremental writer for one channel's JSON array log.
#[derive(Debug)]
pub struct LogAppender {
    /// Channel name used in file names
    name: String,
    /// In-progress ("spool") file
    path: PathBuf,
    /// Directory receiving finalized files
    archive_dir: PathBuf,
    /// Bytes currently in the spool file; 0 means not yet created
    len: u64,
}

impl LogAppender {
    /// Creates an appender for `name`, spooling to `<spool_dir>/temp_<name>_log.json`.
    ///
    /// A spool file left behind by a previous run is resumed: its length is
    /// taken from metadata and its last byte must be `]`.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the spool directory cannot be created, or `Validation`
    /// if a leftover spool file does not end in `]`.
    pub fn open(name: &str, spool_dir: impl AsRef<Path>, archive_dir: impl AsRef<Path>) -> Result<Self> {
        let spool_dir = spool_dir.as_ref();
        fs::create_dir_all(spool_dir)?;

        let path = spool_dir.join(format!("temp_{}_log.json", name));
        let len = match fs::metadata(&path) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => 0,
            Err(e) => return Err(e.into()),
        };

        if len > 0 {
            check_trailing_bracket(&path, len)?;
            info!("Resuming {} log at {} ({} bytes)", name, path.display(), len);
        }

        Ok(Self {
            name: name.to_string(),
            path,
            archive_dir: archive_dir.as_ref().to_path_buf(),
            len,
        })
    }

    /// Path of the in-progress file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current byte length of the in-progress file (0 = not yet created).
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Returns true if nothing has been written since the last finalize.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Appends `records` as elements of the file's JSON array.
    ///
    /// An empty batch leaves the file untouched. On error the length counter
    /// is unchanged, so the caller can retry the same batch.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the file cannot be opened, positioned or extended, and
    /// `Serialization` if a record fails to encode.
    pub fn append<T: Serialize>(&mut self, records: &[T]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let body = serde_json::to_vec(records)?;
        debug_assert!(body.first() == Some(&b'[') && body.last() == Some(&b']'));

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .open(&self.path)?;

        let new_len = if self.len == 0 {
            file.write_all(&body)?;
            body.len() as u64
        } else {
            file.seek(SeekFrom::Start(self.len - 1))?;
            file.write_all(b",")?;
            file.write_all(&body[1..])?;
            self.len + body.len() as u64 - 1
        };

        // Drop any tail left by an earlier partially failed write.
        file.set_len(new_len)?;
        file.sync_data()?;

        debug!(
            "Appended {} {} records ({} -> {} bytes)",
            records.len(),
            self.name,
            self.len,
            new_len
        );
        self.len = new_len;
        Ok(())
    }

    /// Renames the in-progress file into the archive directory and resets the
    /// appender so the next [`append`](Self::append) starts a new file.
    ///
    /// # Returns
    ///
    /// Path of the finalized file, `<archive_dir>/<name>_log_<timestamp>.json`.
    ///
    /// # Errors
    ///
    /// Returns `Io` when nothing has been written yet, when the destination
    /// already exists, or when the rename fails. The in-progress file stays in
    /// place and keeps accepting appends.
    pub fn finalize(&mut self) -> Result<PathBuf> {
        if self.len == 0 {
            return Err(GatewayError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no {} log has been written", self.name),
            )));
        }

        fs::create_dir_all(&self.archive_dir)?;
        let stamp = Local::now().format(ARCHIVE_TIMESTAMP_FORMAT);
        let dest = self.archive_dir.join(format!("{}_log_{}.json", self.name, stamp));

        if dest.exists() {
            return Err(GatewayError::Io(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} already exists", dest.display()),
            )));
        }

        fs::rename(&self.path, &dest)?;
        info!("Finalized {} log: {} ({} bytes)", self.name, dest.display(), self.len);
        self.len = 0;
        Ok(dest)
    }
}

/// Reads only the final byte of `path` to confirm the array is closed.
fn check_trailing_bracket(path: &Path, len: u64) -> Result<()> {
    use std::io::Read;

    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(len - 1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;

    if last[0] != b']' {
        return Err(GatewayError::Validation(format!(
            "{} does not end with ']' (found 0x{:02X})",
            path.display(),
            last[0]
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use tempfile::TempDir;

    fn appender(dir: &TempDir) -> LogAppender {
        LogAppender::open("servo", dir.path().join("spool"), dir.path().join("logs")).unwrap()
    }

    fn parse(path: &Path) -> Vec<Value> {
        let bytes = fs::read(path).unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn assert_single_trailing_bracket(path: &Path) {
        let bytes = fs::read(path).unwrap();
        assert_eq!(bytes.first(), Some(&b'['));
        assert_eq!(bytes.last(), Some(&b']'));
        assert_ne!(bytes[bytes.len() - 2], b']', "file must end in exactly one ']'");
    }

    fn batch(start: u32, count: u32) -> Vec<Value> {
        (start..start + count).map(|i| json!({ "seq": i })).collect()
    }

    #[test]
    fn test_new_appender_is_empty() {
        let dir = TempDir::new().unwrap();
        let log = appender(&dir);
        assert!(log.is_empty());
        assert!(!log.path().exists());
        assert!(log.path().ends_with("temp_servo_log.json"));
    }

    #[test]
    fn test_first_append_writes_whole_array() {
        let dir = TempDir::new().unwrap();
        let mut log = appender(&dir);

        log.append(&batch(0, 1)).unwrap();

        assert_eq!(fs::read_to_string(log.path()).unwrap(), r#"[{"seq":0}]"#);
        assert_eq!(log.len(), fs::metadata(log.path()).unwrap().len());
    }

    #[test]
    fn test_sequential_batches_concatenate() {
        for &size in &[1u32, 10] {
            let dir = TempDir::new().unwrap();
            let mut log = appender(&dir);

            let mut expected = Vec::new();
            for k in 0..5 {
                let b = batch(k * size, size);
                expected.extend(b.clone());
                log.append(&b).unwrap();
                assert_single_trailing_bracket(log.path());
                assert_eq!(log.len(), fs::metadata(log.path()).unwrap().len());
            }

            assert_eq!(parse(log.path()), expected, "batch size {}", size);
        }
    }

    #[test]
    fn test_empty_batch_is_noop() {
        let dir = TempDir::new().unwrap();
        let mut log = appender(&dir);

        // Before first write: nothing created
        log.append::<Value>(&[]).unwrap();
        assert!(!log.path().exists());
        assert!(log.is_empty());

        log.append(&batch(0, 3)).unwrap();
        let before = fs::read(log.path()).unwrap();

        log.append::<Value>(&[]).unwrap();
        assert_eq!(fs::read(log.path()).unwrap(), before);
        assert_eq!(log.len(), before.len() as u64);
    }

    #[test]
    fn test_finalize_without_data_fails() {
        let dir = TempDir::new().unwrap();
        let mut log = appender(&dir);

        match log.finalize() {
            Err(GatewayError::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::NotFound),
            other => panic!("Expected Io error, got: {:?}", other),
        }
    }

    #[test]
    fn test_finalize_then_append_starts_fresh_file() {
        let dir = TempDir::new().unwrap();
        let mut log = appender(&dir);

        log.append(&batch(0, 4)).unwrap();
        let archived = log.finalize().unwrap();

        assert!(log.is_empty());
        assert!(!log.path().exists());
        assert!(archived.starts_with(dir.path().join("logs")));
        let file_name = archived.file_name().unwrap().to_string_lossy().to_string();
        assert!(file_name.starts_with("servo_log_"));
        assert!(file_name.ends_with(".json"));

        log.append(&batch(100, 2)).unwrap();

        assert_eq!(parse(&archived), batch(0, 4));
        assert_eq!(parse(log.path()), batch(100, 2));
    }

    #[test]
    fn test_failed_finalize_keeps_spool_usable() {
        let dir = TempDir::new().unwrap();
        let mut log = appender(&dir);
        log.append(&batch(0, 2)).unwrap();

        // A regular file where the archive directory should be
        fs::write(dir.path().join("logs"), b"not a directory").unwrap();
        assert!(log.finalize().is_err());

        let len = log.len();
        assert!(len > 0);
        log.append(&batch(2, 2)).unwrap();
        assert_eq!(parse(log.path()), batch(0, 4));
    }

    #[test]
    fn test_open_resumes_existing_spool() {
        let dir = TempDir::new().unwrap();
        {
            let mut log = appender(&dir);
            log.append(&batch(0, 3)).unwrap();
        }

        let mut log = appender(&dir);
        assert!(!log.is_empty());
        log.append(&batch(3, 1)).unwrap();
        assert_eq!(parse(log.path()), batch(0, 4));
    }

    #[test]
    fn test_open_rejects_unterminated_spool() {
        let dir = TempDir::new().unwrap();
        let spool = dir.path().join("spool");
        fs::create_dir_all(&spool).unwrap();
        fs::write(spool.join("temp_servo_log.json"), br#"[{"seq":0},"#).unwrap();

        let result = LogAppender::open("servo", &spool, dir.path().join("logs"));
        assert!(matches!(result, Err(GatewayError::Validation(_))));
    }

    #[test]
    fn test_append_to_unwritable_location_fails_without_advancing() {
        let dir = TempDir::new().unwrap();
        let mut log = appender(&dir);

        // Make the spool path a directory so opening it for writing fails
        fs::create_dir_all(log.path()).unwrap();
        assert!(matches!(log.append(&batch(0, 1)), Err(GatewayError::Io(_))));
        assert!(log.is_empty());
    }
}
