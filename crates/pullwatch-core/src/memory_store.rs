//! In-process content store.
//!
//! Tracks active ingests and committed blobs the way a real store reports
//! them to the sampler: a digest is active from `begin` until `commit` or
//! `abort`, then either committed or gone. Used by the demo pull and tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use async_trait::async_trait;

use crate::descriptor::Digest;
use crate::store::{ContentInfo, ContentStore, StoreError, TransferStatus};

#[derive(Debug, Default)]
struct State {
    active: HashMap<Digest, TransferStatus>,
    committed: HashMap<Digest, ContentInfo>,
    /// Number of upcoming status queries that fail with `Unavailable`.
    failing_queries: usize,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    status_queries: AtomicUsize,
    info_queries: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start an ingest of `total` bytes.
    pub fn begin(&self, digest: &Digest, total: u64) {
        self.lock().active.insert(
            digest.clone(),
            TransferStatus {
                bytes_done: 0,
                bytes_total: total,
                started_at: SystemTime::now(),
            },
        );
    }

    /// Record `bytes` more written for an active ingest. Returns the new
    /// offset, or `None` if the digest is not active.
    pub fn advance(&self, digest: &Digest, bytes: u64) -> Option<u64> {
        let mut state = self.lock();
        let status = state.active.get_mut(digest)?;
        status.bytes_done = status.bytes_done.saturating_add(bytes).min(status.bytes_total);
        Some(status.bytes_done)
    }

    /// Retire the active ingest and record the blob as committed now.
    pub fn commit(&self, digest: &Digest) -> Option<ContentInfo> {
        let mut state = self.lock();
        let status = state.active.remove(digest)?;
        let info = ContentInfo {
            size: status.bytes_total,
            committed_at: SystemTime::now(),
        };
        state.committed.insert(digest.clone(), info.clone());
        Some(info)
    }

    /// Drop an active ingest without committing it.
    pub fn abort(&self, digest: &Digest) {
        self.lock().active.remove(digest);
    }

    /// Seed a blob that is already present, e.g. from an earlier pull.
    pub fn insert_committed(&self, digest: &Digest, size: u64, committed_at: SystemTime) {
        self.lock()
            .committed
            .insert(digest.clone(), ContentInfo { size, committed_at });
    }

    /// Make the next `n` status queries fail.
    pub fn fail_next_queries(&self, n: usize) {
        self.lock().failing_queries = n;
    }

    /// Number of `active_statuses` calls served so far (including failures).
    pub fn status_queries(&self) -> usize {
        self.status_queries.load(Ordering::Relaxed)
    }

    /// Number of `info` calls served so far.
    pub fn info_queries(&self) -> usize {
        self.info_queries.load(Ordering::Relaxed)
    }

    pub fn is_active(&self, digest: &Digest) -> bool {
        self.lock().active.contains_key(digest)
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn active_statuses(&self) -> Result<HashMap<Digest, TransferStatus>, StoreError> {
        self.status_queries.fetch_add(1, Ordering::Relaxed);
        let mut state = self.lock();
        if state.failing_queries > 0 {
            state.failing_queries -= 1;
            return Err(StoreError::Unavailable("injected failure".to_string()));
        }
        Ok(state.active.clone())
    }

    async fn info(&self, digest: &Digest) -> Result<Option<ContentInfo>, StoreError> {
        self.info_queries.fetch_add(1, Ordering::Relaxed);
        Ok(self.lock().committed.get(digest).cloned())
    }
}
