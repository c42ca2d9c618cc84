//! Mention processor
//!
//! One call to `run_cycle` is one processing cycle:
//!
//! 1. derive the watermark from the tracker
//! 2. fetch mentions newer than it, oldest first
//! 3. for each mention in order: skip if already processed, otherwise take the
//!    claim, attempt exactly one reply and record the outcome
//!
//! Failed replies are recorded with `reply_sent = false` and never retried, so
//! a permanently unreplyable mention cannot cause a reply storm. Mentions are
//! handled sequentially so the watermark advances without gaps.

use crate::config::EchoConfig;
use crate::error::CycleError;
use crate::source::{MentionSource, ReplySink};
use crate::tracker::WatermarkTracker;
use echo_types::{CycleResult, Mention};
use std::sync::Arc;

pub struct MentionProcessor {
    tracker: Arc<WatermarkTracker>,
    source: Arc<dyn MentionSource>,
    sink: Arc<dyn ReplySink>,
    config: Arc<EchoConfig>,
}

/// What happened to a single mention within a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MentionOutcome {
    Replied,
    ReplyFailed,
    Skipped,
}

impl MentionProcessor {
    pub fn new(
        tracker: Arc<WatermarkTracker>,
        source: Arc<dyn MentionSource>,
        sink: Arc<dyn ReplySink>,
        config: Arc<EchoConfig>,
    ) -> Self {
        Self {
            tracker,
            source,
            sink,
            config,
        }
    }

    pub fn tracker(&self) -> &Arc<WatermarkTracker> {
        &self.tracker
    }

    /// Run one processing cycle.
    ///
    /// Fails only when the watermark or the mention list cannot be read, or the
    /// store is unreachable for the processed check. Nothing has been written
    /// for the failing mention in that case.
    pub async fn run_cycle(&self) -> Result<CycleResult, CycleError> {
        let watermark = self.tracker.get_watermark().await?;
        log::info!(
            "Processor: Starting cycle for @{} (watermark: {})",
            self.config.target_username,
            watermark.as_deref().unwrap_or("none")
        );

        let mentions = self.source.fetch(watermark.as_deref()).await?;
        if mentions.is_empty() {
            log::info!("Processor: No new mentions");
            return Ok(CycleResult::default());
        }
        log::info!("Processor: Fetched {} mention(s)", mentions.len());

        let mut result = CycleResult::default();
        for mention in &mentions {
            match self.process_mention(mention).await? {
                MentionOutcome::Replied => {
                    result.discovered += 1;
                    result.replied += 1;
                }
                MentionOutcome::ReplyFailed => result.discovered += 1,
                MentionOutcome::Skipped => result.skipped += 1,
            }
        }

        log::info!(
            "Processor: Cycle complete: {} discovered, {} replied, {} skipped",
            result.discovered,
            result.replied,
            result.skipped
        );
        Ok(result)
    }

    async fn process_mention(&self, mention: &Mention) -> Result<MentionOutcome, CycleError> {
        if self.tracker.is_processed(&mention.id).await? {
            log::debug!("Processor: Mention {} already processed, skipping", mention.id);
            return Ok(MentionOutcome::Skipped);
        }

        if self.config.reservation {
            match self.tracker.reserve(&mention.id).await {
                Ok(true) => {
                    // A concurrent cycle may have finished this mention between
                    // our processed check and the claim
                    let processed = self.tracker.is_processed(&mention.id).await;
                    if !matches!(processed, Ok(false)) {
                        if let Err(e) = self.tracker.release(&mention.id).await {
                            log::warn!("Processor: Could not release claim on {}: {}", mention.id, e);
                        }
                    }
                    if processed? {
                        log::info!(
                            "Processor: Mention {} was processed by a concurrent cycle, skipping",
                            mention.id
                        );
                        return Ok(MentionOutcome::Skipped);
                    }
                }
                Ok(false) => {
                    log::info!(
                        "Processor: Mention {} is claimed by a concurrent cycle, skipping",
                        mention.id
                    );
                    return Ok(MentionOutcome::Skipped);
                }
                Err(e) => {
                    // Nothing written; the next cycle sees it as unseen
                    log::warn!("Processor: Could not claim mention {}: {}", mention.id, e);
                    return Ok(MentionOutcome::Skipped);
                }
            }
        }

        let (outcome, reply_id) = match self
            .sink
            .reply(&mention.id, &self.config.reply_message)
            .await
        {
            Ok(reply_id) => {
                log::info!(
                    "Processor: Replied to mention {} from {} (reply {})",
                    mention.id,
                    mention.author_id,
                    reply_id
                );
                (MentionOutcome::Replied, Some(reply_id))
            }
            Err(e) => {
                log::warn!(
                    "Processor: Reply to mention {} failed, recording as abandoned: {}",
                    mention.id,
                    e
                );
                (MentionOutcome::ReplyFailed, None)
            }
        };

        match self
            .tracker
            .record_outcome(&mention.id, outcome == MentionOutcome::Replied, reply_id)
            .await
        {
            Ok(_) => {
                if self.config.reservation {
                    if let Err(e) = self.tracker.release(&mention.id).await {
                        log::warn!("Processor: Could not release claim on {}: {}", mention.id, e);
                    }
                }
            }
            // The claim stays until its TTL so concurrent cycles keep away meanwhile
            Err(e) => log::error!(
                "Processor: Failed to record outcome for mention {} (may be re-evaluated next cycle): {}",
                mention.id,
                e
            ),
        }

        Ok(outcome)
    }
}
