//! Per-tick sampling of the content store and row classification.
//!
//! The store only reports *active* transfers. A digest missing from that set
//! is either not started yet or already committed; the sampler tells the two
//! apart by remembering every digest it has ever seen active.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::time::Instant;

use crate::descriptor::Digest;
use crate::job_set::Job;
use crate::store::{ContentStore, TransferStatus};

/// Store-derived state of one digest for a single tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferState {
    Active(TransferStatus),
    Finished { size: u64 },
    /// Committed before this pull started.
    Existing { size: u64 },
}

/// Digest → state for one tick. Digests with no entry render as waiting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusSnapshot {
    states: HashMap<Digest, TransferState>,
}

impl StatusSnapshot {
    pub fn get(&self, key: &Digest) -> Option<&TransferState> {
        self.states.get(key)
    }

    fn insert(&mut self, key: Digest, state: TransferState) {
        self.states.insert(key, state);
    }
}

/// Displayed state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Waiting,
    Downloading { done: u64, total: u64 },
    Done { size: u64 },
    Exists { size: u64 },
}

impl JobState {
    pub fn token(&self) -> &'static str {
        match self {
            JobState::Waiting => "waiting",
            JobState::Downloading { .. } => "downloading",
            JobState::Done { .. } => "done",
            JobState::Exists { .. } => "exists",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Done { .. } | JobState::Exists { .. })
    }

    /// Bytes present locally for this job.
    pub fn bytes(&self) -> u64 {
        match *self {
            JobState::Waiting => 0,
            JobState::Downloading { done, .. } => done,
            JobState::Done { size } | JobState::Exists { size } => size,
        }
    }

    /// Fraction complete in [0.0, 1.0] for downloading rows.
    pub fn fraction(&self) -> Option<f64> {
        match *self {
            JobState::Downloading { total: 0, .. } => Some(0.0),
            JobState::Downloading { done, total } => Some((done as f64 / total as f64).min(1.0)),
            _ => None,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// One rendered line of the progress table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayRow {
    pub name: String,
    pub state: JobState,
    pub elapsed: Duration,
}

pub struct StatusSampler {
    store: Arc<dyn ContentStore>,
    pull_started: SystemTime,
    seen_active: HashSet<Digest>,
    last_total: HashMap<Digest, u64>,
    /// Resolved finished sizes; the store is asked at most once per digest.
    finished_sizes: HashMap<Digest, u64>,
    done_at: HashMap<Digest, Instant>,
    previous: StatusSnapshot,
    failed_queries: usize,
}

impl StatusSampler {
    pub fn new(store: Arc<dyn ContentStore>) -> Self {
        Self {
            store,
            pull_started: SystemTime::now(),
            seen_active: HashSet::new(),
            last_total: HashMap::new(),
            finished_sizes: HashMap::new(),
            done_at: HashMap::new(),
            previous: StatusSnapshot::default(),
            failed_queries: 0,
        }
    }

    /// Store queries that failed so far.
    pub fn failed_queries(&self) -> usize {
        self.failed_queries
    }

    pub fn has_seen_active(&self, key: &Digest) -> bool {
        self.seen_active.contains(key)
    }

    /// Query the store once and classify `jobs`. On a store error the
    /// previous snapshot is returned unchanged.
    pub async fn sample(&mut self, jobs: &[Arc<Job>]) -> StatusSnapshot {
        let active = match self.store.active_statuses().await {
            Ok(active) => active,
            Err(err) => {
                self.failed_queries += 1;
                tracing::warn!(error = %err, "content store status query failed; keeping previous progress");
                return self.previous.clone();
            }
        };

        let mut snapshot = StatusSnapshot::default();
        for job in jobs {
            if let Some(status) = active.get(&job.key) {
                self.observe_active(&job.key, status);
                snapshot.insert(job.key.clone(), TransferState::Active(status.clone()));
            } else if self.seen_active.contains(&job.key) {
                let size = self.finished_size(job).await;
                snapshot.insert(job.key.clone(), TransferState::Finished { size });
            }
        }
        self.previous = snapshot.clone();
        snapshot
    }

    /// Sample taken after the fetch has ended. Anything seen active is
    /// finished. A job never seen active counts as finished (or existing)
    /// only if the store holds committed content of the expected size;
    /// otherwise it stays waiting.
    pub async fn sample_final(&mut self, jobs: &[Arc<Job>]) -> StatusSnapshot {
        match self.store.active_statuses().await {
            Ok(active) => {
                for job in jobs {
                    if let Some(status) = active.get(&job.key) {
                        self.observe_active(&job.key, status);
                    }
                }
            }
            Err(err) => {
                self.failed_queries += 1;
                tracing::warn!(error = %err, "content store status query failed for final frame");
            }
        }

        let mut snapshot = StatusSnapshot::default();
        for job in jobs {
            if self.seen_active.contains(&job.key) {
                let size = self.finished_size(job).await;
                snapshot.insert(job.key.clone(), TransferState::Finished { size });
                continue;
            }
            match self.store.info(&job.key).await {
                Ok(Some(info)) if info.size == job.size => {
                    let state = if info.committed_at >= self.pull_started {
                        TransferState::Finished { size: info.size }
                    } else {
                        TransferState::Existing { size: info.size }
                    };
                    snapshot.insert(job.key.clone(), state);
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(key = %job.key, error = %err, "content info lookup failed");
                }
            }
        }
        self.previous = snapshot.clone();
        snapshot
    }

    /// Project `jobs` onto display rows using `snapshot`, in job order.
    pub fn rows(&mut self, jobs: &[Arc<Job>], snapshot: &StatusSnapshot) -> Vec<DisplayRow> {
        let now = Instant::now();
        jobs.iter()
            .map(|job| {
                let state = match snapshot.get(&job.key) {
                    Some(TransferState::Active(status)) => JobState::Downloading {
                        done: status.bytes_done,
                        total: status.bytes_total,
                    },
                    Some(TransferState::Finished { size }) => JobState::Done { size: *size },
                    Some(TransferState::Existing { size }) => JobState::Exists { size: *size },
                    None => JobState::Waiting,
                };
                let until = if state.is_terminal() {
                    *self.done_at.entry(job.key.clone()).or_insert(now)
                } else {
                    now
                };
                DisplayRow {
                    name: job.name.clone(),
                    state,
                    elapsed: until.saturating_duration_since(job.discovered_at),
                }
            })
            .collect()
    }

    fn observe_active(&mut self, key: &Digest, status: &TransferStatus) {
        self.seen_active.insert(key.clone());
        self.last_total.insert(key.clone(), status.bytes_total);
    }

    /// Committed size from the store, falling back to the last observed
    /// total (or the descriptor size) when the store has no record. Looked up
    /// once per digest.
    async fn finished_size(&mut self, job: &Job) -> u64 {
        if let Some(size) = self.finished_sizes.get(&job.key) {
            return *size;
        }
        let fallback = self.last_total.get(&job.key).copied().unwrap_or(job.size);
        let size = match self.store.info(&job.key).await {
            Ok(Some(info)) => info.size,
            Ok(None) => fallback,
            Err(err) => {
                tracing::warn!(key = %job.key, error = %err, "content info lookup failed");
                fallback
            }
        };
        self.finished_sizes.insert(job.key.clone(), size);
        size
    }
}
