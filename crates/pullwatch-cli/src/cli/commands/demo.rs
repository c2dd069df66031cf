//! `pullwatch demo <reference>` – synthetic pull with the progress display attached.

use anyhow::Result;
use pullwatch_core::config::PullwatchConfig;
use pullwatch_core::{JobSet, MemoryStore, ProgressController};
use std::sync::Arc;
use std::time::Instant;

use crate::cli::simulated_pull::{self, PullPlan};

#[derive(Debug, Clone)]
pub struct DemoArgs {
    pub reference: String,
    pub layers: usize,
    pub layer_size: u64,
    pub fail: bool,
}

pub async fn run_demo(cfg: &PullwatchConfig, args: &DemoArgs) -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let jobs = JobSet::new(args.reference.clone());
    let controller = ProgressController::new(store.clone(), cfg.progress.clone());
    let (stop, done) = controller.start(jobs.clone(), std::io::stdout())?;

    let plan = PullPlan {
        reference: args.reference.clone(),
        layers: args.layers,
        layer_size: args.layer_size,
        fail_last_layer: args.fail,
    };
    let start = Instant::now();
    tracing::info!(reference = %args.reference, layers = args.layers, "pulling (simulated)");
    let result = simulated_pull::run(&store, &jobs, &plan, &cfg.demo).await;

    // The final frame must be out before anything else is printed.
    stop.stop();
    let summary = done.wait().await;
    tracing::debug!(jobs = summary.jobs(), ?summary, "progress finished");

    result?;
    println!(
        "pulled {} in {:.1}s",
        args.reference,
        start.elapsed().as_secs_f64()
    );
    Ok(())
}
