//! Synthetic image fetch used by `pullwatch demo`.
//!
//! Plays the fetch side of the handshake: announces each descriptor to the
//! job set as it is discovered and writes blobs into the in-memory store in
//! chunks, with at most `max_concurrent_downloads` layers in flight.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use pullwatch_core::config::DemoConfig;
use pullwatch_core::descriptor::{
    MEDIA_TYPE_OCI_CONFIG, MEDIA_TYPE_OCI_LAYER, MEDIA_TYPE_OCI_MANIFEST,
};
use pullwatch_core::{Descriptor, Digest, JobSet, MemoryStore};
use tokio::sync::Semaphore;

const MANIFEST_SIZE: u64 = 1_024;
const CONFIG_SIZE: u64 = 1_536;

#[derive(Debug, Clone)]
pub struct PullPlan {
    pub reference: String,
    pub layers: usize,
    pub layer_size: u64,
    pub fail_last_layer: bool,
}

/// Stand-in digest derived from the reference and blob index. Not a real
/// content hash.
pub fn synthetic_digest(reference: &str, index: usize) -> Digest {
    let mut hex = String::with_capacity(64);
    for round in 0..4u8 {
        let mut hasher = DefaultHasher::new();
        (reference, index, round).hash(&mut hasher);
        hex.push_str(&format!("{:016x}", hasher.finish()));
    }
    Digest::new(format!("sha256:{hex}"))
}

/// Descriptors in discovery order: manifest, config, then layers.
pub fn plan_descriptors(plan: &PullPlan) -> Vec<Descriptor> {
    let mut descs = vec![
        Descriptor::new(
            synthetic_digest(&plan.reference, 0),
            MEDIA_TYPE_OCI_MANIFEST,
            MANIFEST_SIZE,
        ),
        Descriptor::new(
            synthetic_digest(&plan.reference, 1),
            MEDIA_TYPE_OCI_CONFIG,
            CONFIG_SIZE,
        ),
    ];
    descs.extend((0..plan.layers).map(|i| {
        Descriptor::new(
            synthetic_digest(&plan.reference, i + 2),
            format!("{MEDIA_TYPE_OCI_LAYER}+gzip"),
            plan.layer_size,
        )
    }));
    descs
}

/// Write `desc` into the store chunk by chunk, then commit. With
/// `fail_halfway` the ingest is aborted once half the bytes are in.
async fn fetch_blob(
    store: &MemoryStore,
    desc: &Descriptor,
    cfg: &DemoConfig,
    fail_halfway: bool,
) -> Result<()> {
    let chunk = cfg.chunk_bytes.max(1);
    let interval = Duration::from_millis(cfg.chunk_interval_ms);
    store.begin(&desc.digest, desc.size);
    let mut written = 0u64;
    while written < desc.size {
        tokio::time::sleep(interval).await;
        written = store
            .advance(&desc.digest, chunk)
            .ok_or_else(|| anyhow!("ingest for {} disappeared", desc.digest))?;
        if fail_halfway && written * 2 >= desc.size {
            store.abort(&desc.digest);
            return Err(anyhow!(
                "{}: connection reset by peer (simulated)",
                desc.digest.short()
            ));
        }
    }
    store.commit(&desc.digest);
    Ok(())
}

/// Run the whole synthetic pull. Returns the first blob failure, after all
/// in-flight layers have settled.
pub async fn run(store: &Arc<MemoryStore>, jobs: &JobSet, plan: &PullPlan, cfg: &DemoConfig) -> Result<()> {
    // Resolving the reference.
    tokio::time::sleep(Duration::from_millis(cfg.chunk_interval_ms.saturating_mul(4))).await;
    jobs.mark_resolved();

    let descs = plan_descriptors(plan);
    let (manifest, children) = descs
        .split_first()
        .ok_or_else(|| anyhow!("empty pull plan"))?;
    jobs.add_descriptor(manifest);
    fetch_blob(store, manifest, cfg, false)
        .await
        .context("fetch manifest")?;

    for desc in children {
        jobs.add_descriptor(desc);
    }

    let limit = Arc::new(Semaphore::new(cfg.max_concurrent_downloads.max(1)));
    let mut join_set = tokio::task::JoinSet::new();
    // Only a layer is ever made to fail; the config blob comes first.
    let failing = match plan.fail_last_layer {
        true if plan.layers > 0 => Some(children.len() - 1),
        true => {
            tracing::warn!("no layers to fail; pulling normally");
            None
        }
        false => None,
    };
    for (i, desc) in children.iter().cloned().enumerate() {
        let store = Arc::clone(store);
        let limit = Arc::clone(&limit);
        let cfg = cfg.clone();
        let fail = failing == Some(i);
        join_set.spawn(async move {
            let _permit = limit
                .acquire_owned()
                .await
                .map_err(|e| anyhow!("download limiter closed: {e}"))?;
            fetch_blob(&store, &desc, &cfg, fail).await
        });
    }

    let mut first_err = None;
    while let Some(res) = join_set.join_next().await {
        let outcome = res.map_err(|e| anyhow!("blob task join: {e}")).and_then(|r| r);
        if let Err(err) = outcome {
            tracing::warn!("blob fetch failed: {err:#}");
            first_err.get_or_insert(err);
        }
    }
    match first_err {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
