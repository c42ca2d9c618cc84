//! Shared types for the Gethen Echo service and its RPC clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

// =====================================================
// Domain Types
// =====================================================

/// A mention of the monitored account, as accepted from the upstream search API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mention {
    pub id: String,
    pub author_id: String,
    pub created_at: DateTime<Utc>,
    pub text: String,
}

/// Durable record of a mention's processing outcome.
///
/// Written once per mention, after the reply attempt resolves. Never updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedRecord {
    pub mention_id: String,
    /// Milliseconds since the Unix epoch
    pub processed_at: i64,
    pub reply_sent: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_id: Option<String>,
}

impl ProcessedRecord {
    pub fn replied(mention_id: &str, reply_id: String, processed_at: i64) -> Self {
        Self {
            mention_id: mention_id.to_string(),
            processed_at,
            reply_sent: true,
            reply_id: Some(reply_id),
        }
    }

    pub fn abandoned(mention_id: &str, processed_at: i64) -> Self {
        Self {
            mention_id: mention_id.to_string(),
            processed_at,
            reply_sent: false,
            reply_id: None,
        }
    }

    /// True when the record is older than `retention` as of `now_ms`.
    pub fn is_expired(&self, now_ms: i64, retention: Duration) -> bool {
        now_ms.saturating_sub(self.processed_at) > retention.as_millis() as i64
    }
}

/// Aggregate counts for one processing cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleResult {
    /// Mentions seen for the first time and handled (replied or abandoned)
    pub discovered: usize,
    /// Mentions that received a reply
    pub replied: usize,
    /// Mentions left alone: already processed, or claimed by a concurrent cycle
    #[serde(default)]
    pub skipped: usize,
}

/// Outcome of an advisory cleanup sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    pub scanned: usize,
    pub deleted: usize,
}

// =====================================================
// RPC Response Types
// =====================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct RpcResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> RpcResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

// =====================================================
// Service Status
// =====================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub running: bool,
    pub uptime_secs: u64,
    pub target_username: String,
    /// Human-readable schedule, e.g. "every 300s" or a cron expression
    pub schedule: String,
    pub store_backend: String,
    pub watermark: Option<String>,
    pub retained_records: usize,
    pub last_cycle_at: Option<String>,
    pub last_cycle: Option<CycleResult>,
    pub last_error: Option<String>,
}
