//! # Polling Scheduler
//!
//! Runs one independent periodic task per channel, plus any other periodic
//! job (the port health check), until cancelled.
//!
//! Each task owns its own `tokio::time::Interval`; there is no global tick.
//! A slow or failing fetch only delays its own channel.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::channel::Channel;
use crate::bridge::fetcher::Fetcher;
use crate::error::{GatewayError, Result};

/// Owns the spawned polling tasks and their shared cancellation token.
#[derive(Debug)]
pub struct Scheduler {
    cancel: CancellationToken,
    tasks: Vec<(String, JoinHandle<()>)>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(CancellationToken::new())
    }
}

impl Scheduler {
    /// Creates a scheduler whose tasks stop when `cancel` is cancelled.
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            tasks: Vec::new(),
        }
    }

    /// Token observed by every task spawned here.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Number of running tasks.
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Spawns a poller feeding `channel` from `fetcher` at `frequency_hz`.
    ///
    /// Each fetch is bounded by `fetch_timeout`. Fetch and record failures
    /// are logged; the loop keeps ticking.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if `frequency_hz` is not a positive finite number.
    pub fn spawn_poller<R, F>(
        &mut self,
        channel: Arc<Channel<R>>,
        fetcher: F,
        frequency_hz: f64,
        fetch_timeout: Duration,
    ) -> Result<()>
    where
        R: Serialize + Clone + Send + 'static,
        F: Fetcher<Reading = R> + 'static,
    {
        let period = period_from_hz(frequency_hz)?;
        let name = channel.name().to_string();
        let fetcher = Arc::new(fetcher);

        info!("Polling {} at {} Hz", name, frequency_hz);
        self.spawn_periodic(name, period, move || {
            let channel = Arc::clone(&channel);
            let fetcher = Arc::clone(&fetcher);
            async move {
                poll_once(&channel, fetcher.as_ref(), fetch_timeout).await;
            }
        });
        Ok(())
    }

    /// Spawns a task running `job` every `period` until cancellation.
    ///
    /// The first run happens immediately. Cancellation is only observed
    /// between runs, so a job is never interrupted halfway.
    pub fn spawn_periodic<J, Fut>(&mut self, name: impl Into<String>, period: Duration, mut job: J)
    where
        J: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        let cancel = self.cancel.clone();
        let task_name = name.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => job().await,
                }
            }
            debug!("{} loop stopped", task_name);
        });

        self.tasks.push((name, handle));
    }

    /// Cancels every task and waits for each to finish its current run.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for (name, handle) in self.tasks {
            if let Err(e) = handle.await {
                warn!("{} task ended abnormally: {}", name, e);
            }
        }
        info!("Scheduler stopped");
    }
}

/// Runs one fetch → record cycle for `channel`.
///
/// The record runs on the blocking pool since a spill writes and syncs the
/// log file while holding the channel lock.
///
/// # Returns
///
/// `true` if a reading was recorded.
pub async fn poll_once<R, F>(channel: &Arc<Channel<R>>, fetcher: &F, fetch_timeout: Duration) -> bool
where
    R: Serialize + Clone + Send + 'static,
    F: Fetcher<Reading = R> + ?Sized,
{
    let reading = match timeout(fetch_timeout, fetcher.fetch_one()).await {
        Ok(Ok(reading)) => reading,
        Ok(Err(e)) => {
            warn!("{}: fetch failed: {}", channel.name(), e);
            return false;
        }
        Err(_) => {
            warn!("{}: fetch timed out after {:?}", channel.name(), fetch_timeout);
            return false;
        }
    };

    let target = Arc::clone(channel);
    match tokio::task::spawn_blocking(move || target.record(reading)).await {
        Ok(Ok(())) => true,
        // The reading is buffered even when the spill fails
        Ok(Err(e)) => {
            warn!("{}: {}", channel.name(), e);
            true
        }
        Err(e) => {
            warn!("{}: record task failed: {}", channel.name(), e);
            false
        }
    }
}

/// Converts a polling frequency into a tick period.
pub fn period_from_hz(frequency_hz: f64) -> Result<Duration> {
    if !frequency_hz.is_finite() || frequency_hz <= 0.0 {
        return Err(GatewayError::Validation(format!(
            "polling frequency must be positive, got {}",
            frequency_hz
        )));
    }
    Ok(Duration::from_secs_f64(1.0 / frequency_hz))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::channel::HistoryLimits;
    use crate::telemetry::log_appender::LogAppender;
    use async_trait::async_trait;
    use serde::Deserialize;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Tick {
        n: usize,
    }

    /// Fetcher that fails on every `fail_every`-th call
    struct ScriptedFetcher {
        calls: Arc<AtomicUsize>,
        fail_every: usize,
    }

    #[async_trait]
    impl Fetcher for ScriptedFetcher {
        type Reading = Tick;

        async fn fetch_one(&self) -> Result<Tick> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_every > 0 && n % self.fail_every == self.fail_every - 1 {
                return Err(GatewayError::Transport("bridge unreachable".into()));
            }
            Ok(Tick { n })
        }
    }

    /// Fetcher that never answers
    struct StalledFetcher;

    #[async_trait]
    impl Fetcher for StalledFetcher {
        type Reading = Tick;

        async fn fetch_one(&self) -> Result<Tick> {
            std::future::pending::<()>().await;
            unreachable!()
        }
    }

    fn channel(dir: &TempDir, name: &str) -> Arc<Channel<Tick>> {
        let log = LogAppender::open(name, dir.path(), dir.path().join("logs")).unwrap();
        Arc::new(Channel::new(name, HistoryLimits::default(), log))
    }

    #[test]
    fn test_period_from_hz() {
        assert_eq!(period_from_hz(2.0).unwrap(), Duration::from_millis(500));
        assert_eq!(period_from_hz(1.0).unwrap(), Duration::from_secs(1));
        assert!(period_from_hz(0.0).is_err());
        assert!(period_from_hz(-1.0).is_err());
        assert!(period_from_hz(f64::NAN).is_err());
    }

    #[tokio::test]
    async fn test_poll_once_records_reading() {
        let dir = TempDir::new().unwrap();
        let ch = channel(&dir, "alt");
        let fetcher = ScriptedFetcher {
            calls: Arc::new(AtomicUsize::new(0)),
            fail_every: 0,
        };

        assert!(poll_once(&ch, &fetcher, Duration::from_secs(1)).await);
        assert_eq!(ch.latest().unwrap(), Tick { n: 0 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_once_times_out() {
        let dir = TempDir::new().unwrap();
        let ch = channel(&dir, "alt");

        assert!(!poll_once(&ch, &StalledFetcher, Duration::from_millis(100)).await);
        assert!(ch.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_do_not_stop_the_loop() {
        let dir = TempDir::new().unwrap();
        let ch = channel(&dir, "gps");
        let calls = Arc::new(AtomicUsize::new(0));

        let mut scheduler = Scheduler::default();
        scheduler
            .spawn_poller(
                Arc::clone(&ch),
                ScriptedFetcher {
                    calls: Arc::clone(&calls),
                    fail_every: 2,
                },
                10.0,
                Duration::from_millis(50),
            )
            .unwrap();

        // Ticks at 0, 100, ..., 950 ms
        tokio::time::sleep(Duration::from_millis(950)).await;
        scheduler.shutdown().await;

        let total = calls.load(Ordering::SeqCst);
        assert!(total >= 9, "expected about 10 polls, got {}", total);
        assert_eq!(ch.len(), total - total / 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_channels_run_at_independent_rates() {
        let dir = TempDir::new().unwrap();
        let fast = channel(&dir, "fast");
        let slow = channel(&dir, "slow");
        let stalled = channel(&dir, "stalled");

        let mut scheduler = Scheduler::default();
        let fast_calls = Arc::new(AtomicUsize::new(0));
        let slow_calls = Arc::new(AtomicUsize::new(0));
        scheduler
            .spawn_poller(
                Arc::clone(&fast),
                ScriptedFetcher { calls: Arc::clone(&fast_calls), fail_every: 0 },
                4.0,
                Duration::from_millis(100),
            )
            .unwrap();
        scheduler
            .spawn_poller(
                Arc::clone(&slow),
                ScriptedFetcher { calls: Arc::clone(&slow_calls), fail_every: 0 },
                1.0,
                Duration::from_millis(100),
            )
            .unwrap();
        scheduler
            .spawn_poller(Arc::clone(&stalled), StalledFetcher, 4.0, Duration::from_millis(100))
            .unwrap();
        assert_eq!(scheduler.task_count(), 3);

        tokio::time::sleep(Duration::from_millis(2100)).await;
        scheduler.shutdown().await;

        let fast_n = fast_calls.load(Ordering::SeqCst);
        let slow_n = slow_calls.load(Ordering::SeqCst);
        assert!(fast_n >= 8, "fast channel polled {} times", fast_n);
        assert!(slow_n >= 2 && slow_n <= 3, "slow channel polled {} times", slow_n);
        assert!(stalled.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_polling() {
        let dir = TempDir::new().unwrap();
        let ch = channel(&dir, "pitot");
        let calls = Arc::new(AtomicUsize::new(0));

        let mut scheduler = Scheduler::default();
        let token = scheduler.cancellation_token();
        scheduler
            .spawn_poller(
                Arc::clone(&ch),
                ScriptedFetcher { calls: Arc::clone(&calls), fail_every: 0 },
                10.0,
                Duration::from_millis(50),
            )
            .unwrap();

        tokio::time::sleep(Duration::from_millis(250)).await;
        scheduler.shutdown().await;
        assert!(token.is_cancelled());

        let after_shutdown = calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(calls.load(Ordering::SeqCst), after_shutdown);
    }

    /// Fetcher that takes `delay` to answer
    struct SlowFetcher {
        delay: Duration,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Fetcher for SlowFetcher {
        type Reading = Tick;

        async fn fetch_one(&self) -> Result<Tick> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(Tick { n })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_waits_for_in_flight_poll() {
        let dir = TempDir::new().unwrap();
        let ch = channel(&dir, "tachometer");
        let calls = Arc::new(AtomicUsize::new(0));

        let mut scheduler = Scheduler::default();
        scheduler
            .spawn_poller(
                Arc::clone(&ch),
                SlowFetcher {
                    delay: Duration::from_millis(300),
                    calls: Arc::clone(&calls),
                },
                1.0,
                Duration::from_secs(1),
            )
            .unwrap();

        // The first fetch started at 0 ms and is still running
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(ch.is_empty());

        scheduler.shutdown().await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(ch.history(), vec![Tick { n: 0 }]);
    }

    #[tokio::test]
    async fn test_invalid_frequency_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut scheduler = Scheduler::default();
        let result = scheduler.spawn_poller(
            channel(&dir, "servo"),
            StalledFetcher,
            0.0,
            Duration::from_millis(100),
        );
        assert!(matches!(result, Err(GatewayError::Validation(_))));
        assert_eq!(scheduler.task_count(), 0);
    }
}
