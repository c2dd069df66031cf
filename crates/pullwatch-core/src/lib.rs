//! Concurrent pull-progress tracker.
//!
//! Runs beside a multi-item image fetch: the fetch reports each content item
//! to a [`JobSet`], a [`ProgressController`] samples a [`ContentStore`] on a
//! fixed interval and redraws a progress table in place until it is stopped.

pub mod config;
pub mod logging;

pub mod controller;
pub mod descriptor;
pub mod job_set;
pub mod memory_store;
pub mod render;
pub mod sampler;
pub mod store;

pub use controller::{
    ControllerError, ControllerState, DoneSignal, ProgressController, ProgressSummary, StopHandle,
};
pub use descriptor::{Descriptor, Digest};
pub use job_set::{Job, JobSet, JobSetSnapshot};
pub use memory_store::MemoryStore;
pub use sampler::{DisplayRow, JobState, StatusSampler, StatusSnapshot, TransferState};
pub use store::{ContentInfo, ContentStore, StoreError, TransferStatus};
