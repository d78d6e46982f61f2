//! # Channel
//!
//! Bounded in-memory history for one measurement kind, backed by a
//! [`LogAppender`].
//!
//! ## Spill Policy
//!
//! Every [`Channel::record`] pushes the reading onto the buffer. While the
//! buffer holds more than `high_water_mark` readings, the oldest `spill_size`
//! are appended to the log and, only once that append succeeded, removed from
//! the buffer. A failed append leaves the buffer over-full; the next record
//! retries it.
//!
//! ## Locking
//!
//! The buffer and the log share one mutex, so a spill and its trim form a
//! single critical section. Readers always get a copy.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tracing::{debug, info, warn};

use super::log_appender::LogAppender;
use crate::error::{GatewayError, Result};

/// Default buffer size that triggers a spill
pub const DEFAULT_HIGH_WATER_MARK: usize = 20;

/// Default number of readings moved to the log per spill
pub const DEFAULT_SPILL_SIZE: usize = 10;

/// Buffer limits shared by all channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryLimits {
    pub high_water_mark: usize,
    pub spill_size: usize,
}

impl Default for HistoryLimits {
    fn default() -> Self {
        Self {
            high_water_mark: DEFAULT_HIGH_WATER_MARK,
            spill_size: DEFAULT_SPILL_SIZE,
        }
    }
}

impl HistoryLimits {
    /// Creates limits, rejecting a zero spill size or one larger than the
    /// high-water mark.
    pub fn new(high_water_mark: usize, spill_size: usize) -> Result<Self> {
        if spill_size == 0 || spill_size > high_water_mark {
            return Err(GatewayError::Validation(format!(
                "spill size must be between 1 and the high-water mark ({}), got {}",
                high_water_mark, spill_size
            )));
        }
        Ok(Self {
            high_water_mark,
            spill_size,
        })
    }
}

#[derive(Debug)]
struct ChannelState<R> {
    buffer: VecDeque<R>,
    log: LogAppender,
}

/// History buffer + log for one measurement kind.
#[derive(Debug)]
pub struct Channel<R> {
    name: String,
    limits: HistoryLimits,
    state: Mutex<ChannelState<R>>,
}

impl<R> Channel<R>
where
    R: Serialize + Clone,
{
    /// Creates a channel that spills into `log`.
    pub fn new(name: impl Into<String>, limits: HistoryLimits, log: LogAppender) -> Self {
        Self {
            name: name.into(),
            limits,
            state: Mutex::new(ChannelState {
                buffer: VecDeque::with_capacity(limits.high_water_mark + 1),
                log,
            }),
        }
    }

    /// Channel name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Buffer limits
    pub fn limits(&self) -> HistoryLimits {
        self.limits
    }

    /// Number of readings currently buffered.
    pub fn len(&self) -> usize {
        self.lock().buffer.len()
    }

    /// Returns true if no reading is buffered.
    pub fn is_empty(&self) -> bool {
        self.lock().buffer.is_empty()
    }

    /// Records a new reading, spilling to the log if over the high-water mark.
    ///
    /// The reading itself is always kept. An `Err` means a spill failed and
    /// the buffer is temporarily above the high-water mark.
    ///
    /// # Errors
    ///
    /// Returns the log's `Io`/`Serialization` error from a failed spill.
    pub fn record(&self, reading: R) -> Result<()> {
        let mut state = self.lock();
        state.buffer.push_back(reading);

        while state.buffer.len() > self.limits.high_water_mark {
            let count = self.limits.spill_size.min(state.buffer.len());
            let ChannelState { buffer, log } = &mut *state;

            let (head, tail) = buffer.as_slices();
            let spill: Vec<R> = if head.len() >= count {
                head[..count].to_vec()
            } else {
                head.iter().chain(tail.iter()).take(count).cloned().collect()
            };

            if let Err(e) = log.append(&spill) {
                warn!(
                    "{}: spill of {} readings failed, keeping {} buffered: {}",
                    self.name,
                    count,
                    buffer.len(),
                    e
                );
                return Err(e);
            }

            buffer.drain(..count);
            debug!("{}: spilled {} readings, {} buffered", self.name, count, buffer.len());
        }

        Ok(())
    }

    /// Most recent reading.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the channel has no data yet.
    pub fn latest(&self) -> Result<R> {
        self.lock()
            .buffer
            .back()
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(format!("No {} data available", self.name)))
    }

    /// Snapshot of the buffered readings, oldest first.
    pub fn history(&self) -> Vec<R> {
        self.lock().buffer.iter().cloned().collect()
    }

    /// Writes the whole buffer to the log, clears it and finalizes the log.
    ///
    /// # Returns
    ///
    /// Path of the finalized log file, ready for upload.
    ///
    /// # Errors
    ///
    /// - Append failure: buffer untouched, error returned.
    /// - Finalize failure: buffer already persisted and cleared; the
    ///   in-progress file keeps the data for the next flush.
    pub fn flush(&self) -> Result<PathBuf> {
        let mut state = self.lock();
        let ChannelState { buffer, log } = &mut *state;

        let pending: Vec<R> = buffer.iter().cloned().collect();
        log.append(&pending)?;
        buffer.clear();

        let path = log.finalize()?;
        info!("{}: flushed {} buffered readings to {}", self.name, pending.len(), path.display());
        Ok(path)
    }

    fn lock(&self) -> MutexGuard<'_, ChannelState<R>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Sample {
        seq: u32,
    }

    fn channel(dir: &TempDir, limits: HistoryLimits) -> Channel<Sample> {
        let log = LogAppender::open("test", dir.path().join("spool"), dir.path().join("logs")).unwrap();
        Channel::new("test", limits, log)
    }

    fn spool_contents(dir: &TempDir) -> Vec<Sample> {
        let path = dir.path().join("spool").join("temp_test_log.json");
        match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap(),
            Err(_) => Vec::new(),
        }
    }

    #[test]
    fn test_limits_validation() {
        assert!(HistoryLimits::new(20, 10).is_ok());
        assert!(HistoryLimits::new(20, 20).is_ok());
        assert!(HistoryLimits::new(20, 0).is_err());
        assert!(HistoryLimits::new(5, 6).is_err());
        assert_eq!(HistoryLimits::default(), HistoryLimits::new(20, 10).unwrap());
    }

    #[test]
    fn test_latest_on_empty_channel_is_not_found() {
        let dir = TempDir::new().unwrap();
        let ch = channel(&dir, HistoryLimits::default());
        match ch.latest() {
            Err(GatewayError::NotFound(msg)) => assert!(msg.contains("test")),
            other => panic!("Expected NotFound, got: {:?}", other),
        }
        assert!(ch.history().is_empty());
    }

    #[test]
    fn test_latest_returns_most_recent() {
        let dir = TempDir::new().unwrap();
        let ch = channel(&dir, HistoryLimits::default());
        ch.record(Sample { seq: 1 }).unwrap();
        ch.record(Sample { seq: 2 }).unwrap();
        assert_eq!(ch.latest().unwrap(), Sample { seq: 2 });
    }

    #[test]
    fn test_log_plus_buffer_equals_all_records() {
        for n in [0u32, 1, 20, 21, 35, 100] {
            let dir = TempDir::new().unwrap();
            let ch = channel(&dir, HistoryLimits::default());

            for seq in 0..n {
                ch.record(Sample { seq }).unwrap();
                assert!(ch.len() <= 20);
            }

            let mut all = spool_contents(&dir);
            all.extend(ch.history());
            let expected: Vec<Sample> = (0..n).map(|seq| Sample { seq }).collect();
            assert_eq!(all, expected, "n = {}", n);
        }
    }

    #[test]
    fn test_spill_happens_on_twenty_first_record() {
        let dir = TempDir::new().unwrap();
        let ch = channel(&dir, HistoryLimits::default());

        for seq in 0..20 {
            ch.record(Sample { seq }).unwrap();
        }
        assert_eq!(ch.len(), 20);
        assert!(spool_contents(&dir).is_empty());

        ch.record(Sample { seq: 20 }).unwrap();
        assert_eq!(ch.len(), 11);
        assert_eq!(spool_contents(&dir).len(), 10);
        assert_eq!(ch.history()[0], Sample { seq: 10 });
    }

    #[test]
    fn test_failed_spill_keeps_data_and_retries() {
        let dir = TempDir::new().unwrap();
        let ch = channel(&dir, HistoryLimits::new(4, 2).unwrap());
        let spool = dir.path().join("spool").join("temp_test_log.json");

        for seq in 0..4 {
            ch.record(Sample { seq }).unwrap();
        }

        // Block the spool path so the next spill fails
        fs::create_dir_all(&spool).unwrap();
        assert!(ch.record(Sample { seq: 4 }).is_err());
        assert!(ch.record(Sample { seq: 5 }).is_err());
        assert_eq!(ch.len(), 6);

        fs::remove_dir(&spool).unwrap();
        ch.record(Sample { seq: 6 }).unwrap();
        assert!(ch.len() <= 4);

        let mut all = spool_contents(&dir);
        all.extend(ch.history());
        let expected: Vec<Sample> = (0..7).map(|seq| Sample { seq }).collect();
        assert_eq!(all, expected);
    }

    #[test]
    fn test_flush_archives_everything_and_clears() {
        let dir = TempDir::new().unwrap();
        let ch = channel(&dir, HistoryLimits::default());
        for seq in 0..25 {
            ch.record(Sample { seq }).unwrap();
        }

        let path = ch.flush().unwrap();
        assert!(ch.is_empty());

        let archived: Vec<Sample> = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        let expected: Vec<Sample> = (0..25).map(|seq| Sample { seq }).collect();
        assert_eq!(archived, expected);

        // The next reading lands in a fresh spool file
        ch.record(Sample { seq: 99 }).unwrap();
        assert!(spool_contents(&dir).is_empty());
        assert_eq!(ch.history(), vec![Sample { seq: 99 }]);
    }

    #[test]
    fn test_flush_empty_channel_fails() {
        let dir = TempDir::new().unwrap();
        let ch = channel(&dir, HistoryLimits::default());
        assert!(matches!(ch.flush(), Err(GatewayError::Io(_))));
    }

    #[test]
    fn test_failed_flush_preserves_buffer() {
        let dir = TempDir::new().unwrap();
        let ch = channel(&dir, HistoryLimits::default());
        for seq in 0..5 {
            ch.record(Sample { seq }).unwrap();
        }

        fs::create_dir_all(dir.path().join("spool").join("temp_test_log.json")).unwrap();
        assert!(ch.flush().is_err());
        assert_eq!(ch.len(), 5);
    }

    #[test]
    fn test_history_is_a_snapshot() {
        let dir = TempDir::new().unwrap();
        let ch = channel(&dir, HistoryLimits::default());
        ch.record(Sample { seq: 0 }).unwrap();

        let snapshot = ch.history();
        ch.record(Sample { seq: 1 }).unwrap();

        assert_eq!(snapshot.len(), 1);
        assert_eq!(ch.len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_records_stay_bounded_and_well_formed() {
        let dir = TempDir::new().unwrap();
        let ch = Arc::new(channel(&dir, HistoryLimits::default()));

        let mut tasks = Vec::new();
        for worker in 0..8u32 {
            let ch = Arc::clone(&ch);
            tasks.push(tokio::spawn(async move {
                for i in 0..50u32 {
                    ch.record(Sample { seq: worker * 1000 + i }).unwrap();
                    assert!(ch.len() <= 20);
                    tokio::task::yield_now().await;
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert!(ch.len() <= 20);
        let mut all = spool_contents(&dir);
        all.extend(ch.history());
        assert_eq!(all.len(), 400);

        // Per-worker order is preserved and nothing is duplicated
        for worker in 0..8u32 {
            let seqs: Vec<u32> = all
                .iter()
                .filter(|s| s.seq / 1000 == worker)
                .map(|s| s.seq % 1000)
                .collect();
            assert_eq!(seqs, (0..50).collect::<Vec<_>>());
        }
    }
}
