//! # Batcher Demo
//!
//! Runs the batcher against a simulated inference backend under synthetic
//! concurrent load, then prints the final stats as JSON.
//!
//! Configuration is loaded the same way as in a real deployment (defaults,
//! `config/batcher.yaml`, `config/batcher.<env>.yaml`, `BATCHER__*` variables).
//! Ctrl-C stops the load early and drains what is already queued.

use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::task::JoinSet;
use tracing::{info, warn};

use request_batcher::config::ConfigManager;
use request_batcher::logging::init_structured_logging;
use request_batcher::{handler_fn, BatchFailure, Batcher, ItemFailure, ItemResult};

const PRODUCERS: usize = 8;
const REQUESTS_PER_PRODUCER: usize = 250;

/// Simulated backend: fixed call overhead plus a small per-item cost.
/// Prompts containing "reject" fail individually.
async fn simulated_inference(
    prompts: Vec<String>,
) -> Result<Vec<ItemResult<String>>, BatchFailure> {
    let cost = Duration::from_millis(40) + Duration::from_millis(2) * prompts.len() as u32;
    tokio::time::sleep(cost).await;

    Ok(prompts
        .into_iter()
        .map(|prompt| {
            if prompt.contains("reject") {
                Err(ItemFailure::new(format!("backend refused '{prompt}'")))
            } else {
                Ok(format!("completion for {prompt}"))
            }
        })
        .collect())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_structured_logging();

    let manager = ConfigManager::load().context("loading batcher configuration")?;
    info!(
        environment = manager.environment(),
        "🚀 DEMO: Starting request batcher demo"
    );

    let batcher = Arc::new(
        Batcher::from_manager(&manager, handler_fn(simulated_inference))
            .context("building batcher")?,
    );
    batcher.start().context("starting batcher")?;

    let mut producers = JoinSet::new();
    for producer in 0..PRODUCERS {
        let batcher = batcher.clone();
        producers.spawn(async move {
            let mut ok = 0usize;
            let mut failed = 0usize;
            for request in 0..REQUESTS_PER_PRODUCER {
                let prompt = if request % 97 == 0 {
                    format!("reject-{producer}-{request}")
                } else {
                    format!("prompt-{producer}-{request}")
                };
                let priority = (request % 3) as i32;
                match batcher.submit_with_priority(prompt, priority).await {
                    Ok(_) => ok += 1,
                    Err(_) => failed += 1,
                }
            }
            (ok, failed)
        });
    }

    let load = async {
        let mut ok = 0usize;
        let mut failed = 0usize;
        while let Some(joined) = producers.join_next().await {
            let (producer_ok, producer_failed) = joined.context("producer task failed")?;
            ok += producer_ok;
            failed += producer_failed;
        }
        anyhow::Ok((ok, failed))
    };

    tokio::select! {
        outcome = load => {
            let (ok, failed) = outcome?;
            info!(ok, failed, "DEMO: Synthetic load finished");
        }
        _ = signal::ctrl_c() => {
            warn!("DEMO: Ctrl-C received, stopping early");
        }
    }

    let summary = batcher.stop().await.context("stopping batcher")?;
    info!(
        batches = summary.batches_executed,
        drained = summary.items_drained,
        "🛑 DEMO: Batcher stopped"
    );

    println!("{}", serde_json::to_string_pretty(&batcher.stats())?);
    Ok(())
}
