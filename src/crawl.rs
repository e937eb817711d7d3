//! Lifecycle Controller (spec §4.5): owns startup (open persistence, seed
//! with previously-broken links, enqueue the start URL), the signal handler
//! that races against the dispatch loop, and shutdown (stop accepting new
//! submissions, abort in-flight work, reap the whole process tree, close
//! persistence).

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::signal;
use tracing::{info, warn};

use sitecrawl_core::types::strip_fragment;
use sitecrawl_core::AppConfig;
use sitecrawl_scheduler::{Scheduler, SchedulerConfig};
use sitecrawl_storage::Storage;
use sitecrawl_supervisor::{Supervisor, WorkerSpec};

pub async fn run(config: AppConfig, start_url: String) -> Result<()> {
    let start_url = strip_fragment(&start_url);

    let storage = Arc::new(Storage::new(&config.database.path, config.database.max_connections).await?);
    storage.run_migrations().await?;

    let spec = WorkerSpec::current_exe(vec!["obtain".to_string()])?;
    let supervisor = Arc::new(Supervisor::new(
        spec,
        Duration::from_secs(config.crawl.kill_grace_secs),
        config.crawl.max_retries,
    ));

    let scheduler_config = SchedulerConfig {
        start_url: start_url.clone(),
        user_agent: config.crawl.user_agent.clone(),
        obtainer_kind: config.crawl.obtainer,
        obtainer_execution_timeout: Duration::from_secs(config.crawl.obtainer_execution_timeout_secs),
        max_response_duration_secs: config.crawl.max_response_duration_secs,
        concurrency: config.crawl.concurrency,
    };
    let mut scheduler = Scheduler::new(scheduler_config, supervisor.clone(), storage.clone());

    seed(&mut scheduler, &storage, &start_url).await?;
    scheduler.enqueue(&start_url, "");

    tokio::select! {
        _ = scheduler.run_to_completion() => {
            info!(start_url, "crawl complete");
        }
        result = signal::ctrl_c() => {
            if let Err(e) = result {
                warn!(error = %e, "failed to install signal handler");
            } else {
                info!("shutdown signal received");
            }
            shutdown(&mut scheduler, &supervisor).await;
        }
    }

    storage.close().await;
    Ok(())
}

/// Seed with previously-broken URLs first (spec §4.5 step 2): for every
/// distinct parent of a row whose `response_code != 200`, look up that
/// row's own parent and enqueue the broken parent again from there — a
/// two-hop lookup that re-crawls pages known to host broken outlinks.
async fn seed(scheduler: &mut Scheduler, storage: &Storage, start_url: &str) -> Result<()> {
    let broken_parents = storage.select_broken_parents(start_url).await?;
    for p in broken_parents {
        let grandparent = storage.parent_of(&p, start_url).await?.unwrap_or_default();
        scheduler.enqueue(&p, &grandparent);
    }
    Ok(())
}

/// Shutdown (spec §4.5, shared between graceful completion and Ctrl-C):
/// stop accepting new submissions, abort in-flight workers, then reap the
/// entire process tree rooted at this process so no orphaned worker or
/// browser helper survives the crawl.
async fn shutdown(scheduler: &mut Scheduler, supervisor: &Supervisor) {
    scheduler.abort_all();
    // kill_on_drop on each worker's Command handles the immediate children;
    // this reaps anything those workers themselves spawned (browser helper
    // processes) that doesn't die with its parent.
    supervisor.kill_tree(std::process::id()).await;
}
