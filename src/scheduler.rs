use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info};

use crate::config::ConfigStore;
use crate::dedup::DedupStore;
use crate::deliver::DeliveryPipeline;
use crate::types::Result;
use crate::watcher::FeedWatcher;

/// One full check-and-deliver pass. The scheduler only knows how to
/// repeat this.
#[async_trait]
pub trait Cycle: Send + Sync {
    async fn run(&self) -> Result<()>;
}

/// Production cycle: prune the dedup index, check every feed, deliver
/// whatever is new.
pub struct CheckCycle {
    config: Arc<ConfigStore>,
    dedup: Arc<DedupStore>,
    watcher: FeedWatcher,
    pipeline: DeliveryPipeline,
}

impl CheckCycle {
    pub fn new(
        config: Arc<ConfigStore>,
        dedup: Arc<DedupStore>,
        watcher: FeedWatcher,
        pipeline: DeliveryPipeline,
    ) -> Self {
        Self {
            config,
            dedup,
            watcher,
            pipeline,
        }
    }
}

#[async_trait]
impl Cycle for CheckCycle {
    async fn run(&self) -> Result<()> {
        let retention = self.config.settings().dedup_retention_days;
        let removed = self.dedup.prune(retention)?;
        if removed > 0 {
            info!(removed, "pruned dedup index");
        }

        let new_by_feed = self.watcher.check_all_feeds().await;
        if new_by_feed.is_empty() {
            debug!("nothing new this cycle");
            return Ok(());
        }
        let posted = self.pipeline.dispatch_all(new_by_feed).await;
        info!(posted, "cycle finished");
        Ok(())
    }
}

/// Drives the cycle forever. The interval is re-read from config each
/// time around, a failed cycle backs off instead of killing the loop,
/// and shutdown is a watch flag raced against the sleep.
pub struct Scheduler {
    cycle: Arc<dyn Cycle>,
    config: Arc<ConfigStore>,
    handle: Mutex<Option<JoinHandle<()>>>,
    shutdown_tx: watch::Sender<bool>,
}

impl Scheduler {
    pub fn new(cycle: Arc<dyn Cycle>, config: Arc<ConfigStore>) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            cycle,
            config,
            handle: Mutex::new(None),
            shutdown_tx,
        }
    }

    /// Starts the loop, cancelling any previous one first (an interval
    /// change at runtime is just a restart). The first cycle runs
    /// immediately; the sleep comes after.
    pub fn start(&self) {
        let mut guard = self.handle.lock().expect("scheduler mutex poisoned");
        if let Some(previous) = guard.take() {
            info!("cancelling previous check loop");
            previous.abort();
        }

        let cycle = Arc::clone(&self.cycle);
        let config = Arc::clone(&self.config);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        *guard = Some(tokio::spawn(async move {
            info!(interval = ?config.check_interval(), "check loop started");
            loop {
                let wait = match cycle.run().await {
                    Ok(()) => config.check_interval(),
                    Err(e) => {
                        error!(error = %e, "check cycle failed, backing off");
                        Duration::from_secs(config.settings().error_backoff_secs)
                    }
                };
                tokio::select! {
                    _ = sleep(wait) => {}
                    _ = shutdown_rx.changed() => {
                        info!("check loop stopped");
                        break;
                    }
                }
            }
        }));
    }

    pub fn restart(&self) {
        self.start();
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .expect("scheduler mutex poisoned")
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Signals the loop to stop and waits for it. A cycle already in
    /// flight finishes first; the sleep is interrupted immediately.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let handle = self
            .handle
            .lock()
            .expect("scheduler mutex poisoned")
            .take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}
