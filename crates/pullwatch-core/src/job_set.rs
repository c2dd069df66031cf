//! Registry of fetch targets discovered during one pull.
//!
//! The fetch side calls [`JobSet::add_descriptor`] from its discovery
//! callback while the progress loop takes [`JobSet::snapshot`]s. The lock is
//! only held long enough to push or to clone `Arc<Job>` handles.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::time::Instant;

use crate::descriptor::{Descriptor, Digest};

/// One content item being fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub key: Digest,
    pub name: String,
    /// Expected size from the descriptor (0 if unknown).
    pub size: u64,
    pub discovered_at: Instant,
}

impl Job {
    pub fn new(key: impl Into<Digest>, name: impl Into<String>, size: u64) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            size,
            discovered_at: Instant::now(),
        }
    }

    pub fn from_descriptor(desc: &Descriptor) -> Self {
        Self::new(desc.digest.clone(), desc.ref_key(), desc.size)
    }
}

/// Point-in-time copy of the set, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct JobSetSnapshot {
    pub reference: String,
    pub resolved: bool,
    pub jobs: Vec<Arc<Job>>,
}

impl JobSetSnapshot {
    pub fn keys(&self) -> impl Iterator<Item = &Digest> {
        self.jobs.iter().map(|j| &j.key)
    }
}

#[derive(Debug, Default)]
struct Inner {
    reference: String,
    resolved: bool,
    closed: bool,
    seen: HashSet<Digest>,
    order: Vec<Arc<Job>>,
}

/// Shared, insertion-ordered set of jobs. Cloning yields another handle to
/// the same set.
#[derive(Debug, Clone, Default)]
pub struct JobSet {
    inner: Arc<Mutex<Inner>>,
}

impl JobSet {
    /// Create an empty set for a pull of `reference`.
    pub fn new(reference: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                reference: reference.into(),
                ..Inner::default()
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert `job` unless its key is already present or the set is closed.
    /// Returns true if the job was added.
    pub fn add(&self, job: Job) -> bool {
        let mut inner = self.lock();
        if inner.closed {
            tracing::debug!(key = %job.key, "ignoring job discovered after progress stopped");
            return false;
        }
        if !inner.seen.insert(job.key.clone()) {
            return false;
        }
        tracing::debug!(key = %job.key, name = %job.name, "tracking job");
        inner.order.push(Arc::new(job));
        true
    }

    /// Discovery callback: marks the reference resolved and tracks the
    /// descriptor unless it is a schema-1 manifest.
    pub fn add_descriptor(&self, desc: &Descriptor) -> bool {
        self.mark_resolved();
        if !desc.is_trackable() {
            return false;
        }
        self.add(Job::from_descriptor(desc))
    }

    pub fn mark_resolved(&self) {
        self.lock().resolved = true;
    }

    /// Stop accepting new jobs. Called when the final frame is being drawn.
    pub fn close(&self) {
        self.lock().closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn len(&self) -> usize {
        self.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> JobSetSnapshot {
        let inner = self.lock();
        JobSetSnapshot {
            reference: inner.reference.clone(),
            resolved: inner.resolved,
            jobs: inner.order.clone(),
        }
    }
}
