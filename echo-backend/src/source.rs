//! Collaborator seams for the processor: where mentions come from and where
//! replies go.

use crate::error::{ReplyError, SourceError};
use async_trait::async_trait;
use echo_types::Mention;

#[async_trait]
pub trait MentionSource: Send + Sync {
    /// Mentions strictly newer than `after` (or all recent ones when `after` is
    /// None), oldest first.
    async fn fetch(&self, after: Option<&str>) -> Result<Vec<Mention>, SourceError>;
}

#[async_trait]
pub trait ReplySink: Send + Sync {
    /// Post `text` as a reply to `mention_id`. Returns the new reply's ID.
    async fn reply(&self, mention_id: &str, text: &str) -> Result<String, ReplyError>;
}
