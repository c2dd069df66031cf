//! Content store query capability consumed by the progress sampler.
//!
//! The tracker never writes to the store. Implementations must tolerate
//! concurrent queries from other parts of the program.

use std::collections::HashMap;
use std::time::SystemTime;

use async_trait::async_trait;

use crate::descriptor::Digest;

/// In-flight transfer as reported by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferStatus {
    pub bytes_done: u64,
    pub bytes_total: u64,
    pub started_at: SystemTime,
}

/// Committed content metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentInfo {
    pub size: u64,
    pub committed_at: SystemTime,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("content store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait ContentStore: Send + Sync {
    /// All transfers the store currently considers active, keyed by digest.
    async fn active_statuses(&self) -> Result<HashMap<Digest, TransferStatus>, StoreError>;

    /// Committed content for `digest`, or `None` if the store does not hold it.
    async fn info(&self, digest: &Digest) -> Result<Option<ContentInfo>, StoreError>;
}
