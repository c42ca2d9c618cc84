//! Watermark tracker
//!
//! Single source of truth for "have we seen this mention" and "what is the
//! newest mention we have seen". Every processed mention leaves one
//! `ProcessedRecord` under `tweet:{id}`; the watermark is derived from those
//! keys on demand and never stored on its own, so it heals itself as records
//! expire.
//!
//! Claims (`claim:{id}`) are short-lived placeholders taken before a reply is
//! attempted, so that two overlapping cycles cannot both reply to the same
//! mention. They live in their own namespace and never touch the records.

use crate::config::EchoConfig;
use crate::error::StoreError;
use crate::kv::KvStore;
use crate::ordering::{uniform_length, IdOrdering};
use chrono::Utc;
use echo_types::{CleanupReport, ProcessedRecord};
use std::sync::Arc;
use std::time::Duration;

/// Key namespace for processed-mention records
pub const RECORD_PREFIX: &str = "tweet:";
/// Key namespace for in-flight reply claims
pub const CLAIM_PREFIX: &str = "claim:";

pub struct WatermarkTracker {
    store: Arc<dyn KvStore>,
    retention: Duration,
    claim_ttl: Duration,
    ordering: IdOrdering,
}

impl WatermarkTracker {
    pub fn new(store: Arc<dyn KvStore>, config: &EchoConfig) -> Self {
        Self {
            store,
            retention: config.retention,
            claim_ttl: config.claim_ttl,
            ordering: config.id_ordering,
        }
    }

    fn record_key(mention_id: &str) -> String {
        format!("{}{}", RECORD_PREFIX, mention_id)
    }

    fn claim_key(mention_id: &str) -> String {
        format!("{}{}", CLAIM_PREFIX, mention_id)
    }

    pub fn backend_name(&self) -> &'static str {
        self.store.backend_name()
    }

    /// Newest processed mention ID among retained records, or None if there are none.
    ///
    /// Linear in the number of retained records.
    pub async fn get_watermark(&self) -> Result<Option<String>, StoreError> {
        let keys = self.store.list(RECORD_PREFIX).await?;
        let ids: Vec<&str> = keys
            .iter()
            .filter_map(|key| key.strip_prefix(RECORD_PREFIX))
            .collect();

        if let Some(bad) = ids.iter().find(|id| !self.ordering.check(id)) {
            log::warn!(
                "Tracker: Retained mention ID '{}' is not a decimal ID; {} ordering may not be chronological",
                bad,
                self.ordering
            );
        }
        if self.ordering == IdOrdering::Lexicographic && !uniform_length(ids.iter().copied()) {
            log::warn!(
                "Tracker: Retained mention IDs differ in length; lexicographic watermark may lag (set ECHO_ID_ORDERING=numeric)"
            );
        }

        Ok(self.ordering.max(ids.iter().copied()).map(str::to_string))
    }

    pub async fn is_processed(&self, mention_id: &str) -> Result<bool, StoreError> {
        Ok(self.store.get(&Self::record_key(mention_id)).await?.is_some())
    }

    /// Write the outcome record for a mention, stamped with the current time.
    pub async fn record_outcome(
        &self,
        mention_id: &str,
        reply_sent: bool,
        reply_id: Option<String>,
    ) -> Result<ProcessedRecord, StoreError> {
        let now = Utc::now().timestamp_millis();
        let record = match (reply_sent, reply_id) {
            (true, Some(reply_id)) => ProcessedRecord::replied(mention_id, reply_id, now),
            (true, None) => ProcessedRecord {
                reply_sent: true,
                ..ProcessedRecord::abandoned(mention_id, now)
            },
            (false, _) => ProcessedRecord::abandoned(mention_id, now),
        };

        let key = Self::record_key(mention_id);
        let value = serde_json::to_string(&record).map_err(|source| StoreError::Corrupt {
            key: key.clone(),
            source,
        })?;
        self.store.put(&key, &value, Some(self.retention)).await?;

        Ok(record)
    }

    /// Take the exclusive claim on a mention. False if another cycle holds it.
    pub async fn reserve(&self, mention_id: &str) -> Result<bool, StoreError> {
        let claimed_at = Utc::now().timestamp_millis().to_string();
        self.store
            .put_if_absent(&Self::claim_key(mention_id), &claimed_at, Some(self.claim_ttl))
            .await
    }

    pub async fn release(&self, mention_id: &str) -> Result<(), StoreError> {
        self.store.delete(&Self::claim_key(mention_id)).await?;
        Ok(())
    }

    async fn load(&self, key: &str) -> Result<Option<ProcessedRecord>, StoreError> {
        match self.store.get(key).await? {
            Some(value) => serde_json::from_str(&value)
                .map(Some)
                .map_err(|source| StoreError::Corrupt {
                    key: key.to_string(),
                    source,
                }),
            None => Ok(None),
        }
    }

    /// All retained records, oldest mention first. Undecodable records are skipped.
    pub async fn records(&self) -> Result<Vec<ProcessedRecord>, StoreError> {
        let mut records = Vec::new();
        for key in self.store.list(RECORD_PREFIX).await? {
            match self.load(&key).await {
                Ok(Some(record)) => records.push(record),
                // Expired between list and get
                Ok(None) => {}
                Err(StoreError::Corrupt { key, source }) => {
                    log::warn!("Tracker: Ignoring undecodable record {}: {}", key, source);
                }
                Err(e) => return Err(e),
            }
        }
        self.ordering.sort(&mut records, |r| r.mention_id.as_str());
        Ok(records)
    }

    pub async fn retained_count(&self) -> Result<usize, StoreError> {
        Ok(self.store.list(RECORD_PREFIX).await?.len())
    }

    /// Delete records older than the retention window.
    ///
    /// Advisory: store TTLs already expire records. This covers stores that
    /// evict lazily and lets an operator evict immediately.
    pub async fn cleanup(&self) -> Result<CleanupReport, StoreError> {
        let now = Utc::now().timestamp_millis();
        let mut report = CleanupReport::default();

        for key in self.store.list(RECORD_PREFIX).await? {
            report.scanned += 1;
            let record = match self.load(&key).await {
                Ok(Some(record)) => record,
                Ok(None) => continue,
                Err(StoreError::Corrupt { key, source }) => {
                    log::warn!("Tracker: Leaving undecodable record {} in place: {}", key, source);
                    continue;
                }
                Err(e) => return Err(e),
            };

            if record.is_expired(now, self.retention) && self.store.delete(&key).await? {
                report.deleted += 1;
            }
        }

        if report.deleted > 0 {
            log::info!(
                "Tracker: Cleanup removed {} of {} records",
                report.deleted,
                report.scanned
            );
        }
        Ok(report)
    }
}
