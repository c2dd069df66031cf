//! Start/stop handshake around the sampling loop.
//!
//! A controller moves `Idle → Running → Stopping → Stopped` exactly once.
//! `start` spawns the loop; the fetch side calls [`StopHandle::stop`] when the
//! pull is over and then awaits [`DoneSignal::wait`], which resolves only
//! after the final frame has been written.

use std::io::Write;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::ProgressConfig;
use crate::job_set::{JobSet, JobSetSnapshot};
use crate::render::{FrameHeader, ProgressRenderer};
use crate::sampler::{DisplayRow, JobState, StatusSampler};
use crate::store::ContentStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

impl ControllerState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => ControllerState::Idle,
            1 => ControllerState::Running,
            2 => ControllerState::Stopping,
            _ => ControllerState::Stopped,
        }
    }
}

#[derive(Debug, Clone)]
struct StateCell(Arc<AtomicU8>);

impl StateCell {
    fn new() -> Self {
        Self(Arc::new(AtomicU8::new(ControllerState::Idle as u8)))
    }

    fn get(&self) -> ControllerState {
        ControllerState::from_u8(self.0.load(Ordering::Acquire))
    }

    fn set(&self, state: ControllerState) {
        self.0.store(state as u8, Ordering::Release);
    }

    fn transition(&self, from: ControllerState, to: ControllerState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("progress controller cannot be started again (state: {0:?})")]
    AlreadyStarted(ControllerState),
}

/// What the loop did, returned once it has stopped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressSummary {
    /// Frames written successfully, the final one included.
    pub frames: usize,
    /// Frames whose write failed.
    pub failed_frames: usize,
    /// Store status queries that failed.
    pub failed_queries: usize,
    /// Final frame counts per state.
    pub waiting: usize,
    pub done: usize,
    pub exists: usize,
}

impl ProgressSummary {
    pub fn jobs(&self) -> usize {
        self.waiting + self.done + self.exists
    }
}

/// Cancels the loop. Cheap to clone; only the first effective call matters.
#[derive(Debug, Clone)]
pub struct StopHandle {
    state: StateCell,
    cancel: CancellationToken,
}

impl StopHandle {
    /// Signal that the fetch has finished. No-op unless the loop is running.
    pub fn stop(&self) {
        if self.state.transition(ControllerState::Running, ControllerState::Stopping) {
            tracing::debug!("stopping progress display");
            self.cancel.cancel();
        } else {
            tracing::debug!(state = ?self.state.get(), "progress stop ignored");
        }
    }

    pub fn state(&self) -> ControllerState {
        self.state.get()
    }
}

/// Resolves once the final frame is out and the loop has exited.
#[derive(Debug)]
pub struct DoneSignal {
    handle: JoinHandle<ProgressSummary>,
    state: StateCell,
}

impl DoneSignal {
    pub async fn wait(self) -> ProgressSummary {
        match self.handle.await {
            Ok(summary) => summary,
            Err(err) => {
                tracing::warn!(error = %err, "progress task ended abnormally");
                self.state.set(ControllerState::Stopped);
                ProgressSummary::default()
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

pub struct ProgressController {
    store: Arc<dyn ContentStore>,
    config: ProgressConfig,
    state: StateCell,
    cancel: CancellationToken,
}

impl ProgressController {
    pub fn new(store: Arc<dyn ContentStore>, config: ProgressConfig) -> Self {
        Self {
            store,
            config,
            state: StateCell::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> ControllerState {
        self.state.get()
    }

    /// Spawn the sampling loop over `jobs`, drawing to `out`. Must be called
    /// inside a tokio runtime. Fails if this controller was already started.
    pub fn start<W>(&self, jobs: JobSet, out: W) -> Result<(StopHandle, DoneSignal), ControllerError>
    where
        W: Write + Send + 'static,
    {
        if !self
            .state
            .transition(ControllerState::Idle, ControllerState::Running)
        {
            return Err(ControllerError::AlreadyStarted(self.state.get()));
        }
        tracing::debug!(interval_ms = self.config.tick_interval_ms, "starting progress display");

        let progress = ProgressLoop {
            jobs,
            sampler: StatusSampler::new(Arc::clone(&self.store)),
            renderer: ProgressRenderer::from_config(out, &self.config),
            interval: self.config.tick_interval(),
            state: self.state.clone(),
            failed_frames: 0,
        };
        let handle = tokio::spawn(progress.run(self.cancel.clone()));

        Ok((
            self.stop_handle(),
            DoneSignal {
                handle,
                state: self.state.clone(),
            },
        ))
    }

    /// Same as [`StopHandle::stop`]; a no-op before `start`.
    pub fn stop(&self) {
        self.stop_handle().stop();
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            state: self.state.clone(),
            cancel: self.cancel.clone(),
        }
    }
}

struct ProgressLoop<W: Write> {
    jobs: JobSet,
    sampler: StatusSampler,
    renderer: ProgressRenderer<W>,
    interval: Duration,
    state: StateCell,
    failed_frames: usize,
}

impl<W: Write> ProgressLoop<W> {
    async fn run(mut self, cancel: CancellationToken) -> ProgressSummary {
        let started = Instant::now();
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let snapshot = self.jobs.snapshot();
                    let status = self.sampler.sample(&snapshot.jobs).await;
                    let rows = self.sampler.rows(&snapshot.jobs, &status);
                    self.draw(&snapshot, &rows, started);
                }
            }
        }

        // One more full cycle after cancellation; nothing is drawn after it.
        self.jobs.close();
        let snapshot = self.jobs.snapshot();
        let status = self.sampler.sample_final(&snapshot.jobs).await;
        let rows = self.sampler.rows(&snapshot.jobs, &status);
        self.draw(&snapshot, &rows, started);

        let summary = self.summary(&rows);
        self.state.set(ControllerState::Stopped);
        tracing::debug!(?summary, "progress display stopped");
        summary
    }

    fn draw(&mut self, snapshot: &JobSetSnapshot, rows: &[DisplayRow], started: Instant) {
        let header = FrameHeader {
            reference: snapshot.reference.clone(),
            resolved: snapshot.resolved,
        };
        if let Err(err) = self.renderer.render(&header, rows, started) {
            self.failed_frames += 1;
            tracing::warn!(error = %err, "progress frame write failed");
        }
    }

    fn summary(&self, final_rows: &[DisplayRow]) -> ProgressSummary {
        let mut summary = ProgressSummary {
            frames: self.renderer.frames(),
            failed_frames: self.failed_frames,
            failed_queries: self.sampler.failed_queries(),
            ..ProgressSummary::default()
        };
        for row in final_rows {
            match row.state {
                JobState::Done { .. } => summary.done += 1,
                JobState::Exists { .. } => summary.exists += 1,
                // The final sample never reports a transfer as in flight.
                JobState::Waiting | JobState::Downloading { .. } => summary.waiting += 1,
            }
        }
        summary
    }
}
