//! Scheduled trigger for processing cycles
//!
//! Runs `run_cycle` on a fixed interval or a cron schedule until shut down,
//! and sweeps expired records at most once per cleanup interval. Every cycle
//! outcome, scheduled or manual, lands in the shared `CycleMonitor`.

use crate::config::{SchedulerConfig, Trigger};
use crate::error::CycleError;
use crate::processor::MentionProcessor;
use chrono::{DateTime, Utc};
use echo_types::CycleResult;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

/// Most recent cycle outcome
#[derive(Debug, Clone, Default)]
pub struct CycleSnapshot {
    pub last_cycle_at: Option<DateTime<Utc>>,
    pub last_cycle: Option<CycleResult>,
    pub last_error: Option<String>,
}

/// Shared record of cycle outcomes for the status endpoint
pub struct CycleMonitor {
    started_at: Instant,
    state: RwLock<CycleSnapshot>,
}

impl Default for CycleMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl CycleMonitor {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            state: RwLock::new(CycleSnapshot::default()),
        }
    }

    pub fn record(&self, outcome: &Result<CycleResult, CycleError>) {
        let mut state = self.state.write();
        state.last_cycle_at = Some(Utc::now());
        match outcome {
            Ok(result) => {
                state.last_cycle = Some(*result);
                state.last_error = None;
            }
            Err(e) => state.last_error = Some(format!("{}: {}", e.code(), e)),
        }
    }

    pub fn snapshot(&self) -> CycleSnapshot {
        self.state.read().clone()
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

/// The scheduler service that runs processing cycles
pub struct Scheduler {
    processor: Arc<MentionProcessor>,
    monitor: Arc<CycleMonitor>,
    config: SchedulerConfig,
    last_cleanup: Mutex<Option<Instant>>,
}

impl Scheduler {
    pub fn new(
        processor: Arc<MentionProcessor>,
        monitor: Arc<CycleMonitor>,
        config: SchedulerConfig,
    ) -> Self {
        Scheduler {
            processor,
            monitor,
            config,
            last_cleanup: Mutex::new(None),
        }
    }

    /// Start the scheduler background task
    pub async fn start(self: Arc<Self>, mut shutdown_rx: oneshot::Receiver<()>) {
        log::info!(
            "Scheduler started ({}, run on startup: {})",
            self.config.trigger.describe(),
            self.config.run_on_startup
        );

        if self.config.run_on_startup {
            self.tick().await;
        }

        loop {
            let Some(wait) = self.next_delay() else {
                log::warn!("Scheduler: Schedule has no upcoming run, stopping");
                break;
            };

            tokio::select! {
                _ = &mut shutdown_rx => {
                    log::info!("Scheduler received shutdown signal");
                    break;
                }
                _ = tokio::time::sleep(wait) => {
                    self.tick().await;
                }
            }
        }

        log::info!("Scheduler stopped");
    }

    /// Time until the next scheduled cycle
    fn next_delay(&self) -> Option<Duration> {
        match &self.config.trigger {
            Trigger::Interval(every) => Some(*every),
            Trigger::Cron(schedule) => schedule
                .upcoming(Utc)
                .next()
                .map(|at| (at - Utc::now()).to_std().unwrap_or(Duration::ZERO)),
        }
    }

    /// Run one scheduled cycle and the periodic cleanup
    pub async fn tick(&self) {
        let outcome = self.processor.run_cycle().await;
        match &outcome {
            Ok(result) => log::info!(
                "Scheduled cycle finished: {} discovered, {} replied",
                result.discovered,
                result.replied
            ),
            // Nothing to reconcile; the next tick starts over
            Err(e) => log::error!("Scheduled cycle failed ({}): {}", e.code(), e),
        }
        self.monitor.record(&outcome);

        self.maybe_cleanup().await;
    }

    async fn maybe_cleanup(&self) {
        {
            let mut last = self.last_cleanup.lock();
            if let Some(at) = *last {
                if at.elapsed() < self.config.cleanup_interval {
                    return;
                }
            }
            *last = Some(Instant::now());
        }

        if let Err(e) = self.processor.tracker().cleanup().await {
            log::error!("Error cleaning up processed records: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EchoConfig;
    use crate::error::{ReplyError, SourceError, StoreError};
    use crate::kv::{KvStore, MemoryKvStore};
    use crate::source::{MentionSource, ReplySink};
    use crate::tracker::WatermarkTracker;
    use async_trait::async_trait;
    use echo_types::{Mention, ProcessedRecord};
    use std::str::FromStr;

    struct FixedSource(Vec<&'static str>);

    #[async_trait]
    impl MentionSource for FixedSource {
        async fn fetch(&self, after: Option<&str>) -> Result<Vec<Mention>, SourceError> {
            Ok(self
                .0
                .iter()
                .filter(|id| after.map(|a| **id > a).unwrap_or(true))
                .map(|id| Mention {
                    id: id.to_string(),
                    author_id: "1".to_string(),
                    created_at: Utc::now(),
                    text: String::new(),
                })
                .collect())
        }
    }

    struct OkSink;

    #[async_trait]
    impl ReplySink for OkSink {
        async fn reply(&self, mention_id: &str, _text: &str) -> Result<String, ReplyError> {
            Ok(format!("r{}", mention_id))
        }
    }

    fn scheduler(trigger: Trigger, ids: Vec<&'static str>) -> (Arc<Scheduler>, Arc<MemoryKvStore>) {
        let store = Arc::new(MemoryKvStore::new());
        let config = Arc::new(EchoConfig::new("gethen", "hi"));
        let tracker = Arc::new(WatermarkTracker::new(store.clone(), &config));
        let processor = Arc::new(MentionProcessor::new(
            tracker,
            Arc::new(FixedSource(ids)),
            Arc::new(OkSink),
            config,
        ));
        let scheduler = Scheduler::new(
            processor,
            Arc::new(CycleMonitor::new()),
            SchedulerConfig {
                trigger,
                run_on_startup: true,
                cleanup_interval: Duration::from_secs(3600),
            },
        );
        (Arc::new(scheduler), store)
    }

    async fn put_stale_record(store: &MemoryKvStore, id: &str) {
        let stale = Utc::now().timestamp_millis() - 30 * 24 * 3600 * 1000;
        let record = ProcessedRecord::replied(id, format!("r{}", id), stale);
        store
            .put(&format!("tweet:{}", id), &serde_json::to_string(&record).unwrap(), None)
            .await
            .unwrap();
    }

    #[test]
    fn test_monitor_records_success_and_failure() {
        let monitor = CycleMonitor::new();
        assert!(monitor.snapshot().last_cycle_at.is_none());

        let result = CycleResult {
            discovered: 2,
            replied: 1,
            skipped: 0,
        };
        monitor.record(&Ok(result));
        let snapshot = monitor.snapshot();
        assert_eq!(snapshot.last_cycle, Some(result));
        assert!(snapshot.last_error.is_none());

        monitor.record(&Err(CycleError::StoreUnavailable(StoreError::Unavailable(
            "down".to_string(),
        ))));
        let snapshot = monitor.snapshot();
        // The last good result is kept alongside the error
        assert_eq!(snapshot.last_cycle, Some(result));
        assert!(snapshot.last_error.unwrap().starts_with("STORE_UNAVAILABLE"));
    }

    #[test]
    fn test_next_delay() {
        let (interval, _) = scheduler(Trigger::Interval(Duration::from_secs(300)), vec![]);
        assert_eq!(interval.next_delay(), Some(Duration::from_secs(300)));

        let every_second = cron::Schedule::from_str("* * * * * *").unwrap();
        let (cron, _) = scheduler(Trigger::Cron(every_second), vec![]);
        assert!(cron.next_delay().unwrap() <= Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_tick_runs_cycle_and_cleans_up_once_per_interval() {
        let (scheduler, store) = scheduler(Trigger::Interval(Duration::from_secs(300)), vec!["100"]);
        put_stale_record(&store, "1").await;

        scheduler.tick().await;
        assert_eq!(
            scheduler.monitor.snapshot().last_cycle,
            Some(CycleResult {
                discovered: 1,
                replied: 1,
                skipped: 0
            })
        );
        assert!(store.get("tweet:1").await.unwrap().is_none());

        // Within the cleanup interval the sweep does not run again
        put_stale_record(&store, "2").await;
        scheduler.tick().await;
        assert!(store.get("tweet:2").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_start_runs_on_startup_and_stops_on_shutdown() {
        let (scheduler, _) = scheduler(Trigger::Interval(Duration::from_secs(3600)), vec!["100"]);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(scheduler.clone().start(shutdown_rx));

        let mut waited = 0;
        while scheduler.monitor.snapshot().last_cycle.is_none() && waited < 100 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            waited += 1;
        }
        assert!(scheduler.monitor.snapshot().last_cycle.is_some());

        shutdown_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("scheduler should stop")
            .unwrap();
    }
}
