use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;

use async_trait::async_trait;
use rss_courier::config::ConfigStore;
use rss_courier::scheduler::{Cycle, Scheduler};
use rss_courier::{CourierError, Result};
use tokio::time::{sleep, timeout};
use tracing::info;

static INIT: Once = Once::new();

fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .try_init()
            .ok();
    });
}

#[derive(Default)]
struct CountingCycle {
    runs: AtomicUsize,
}

#[async_trait]
impl Cycle for CountingCycle {
    async fn run(&self) -> Result<()> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
struct FailingCycle {
    runs: AtomicUsize,
}

#[async_trait]
impl Cycle for FailingCycle {
    async fn run(&self) -> Result<()> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        Err(CourierError::General("simulated cycle failure".to_string()))
    }
}

fn test_config(dir: &tempfile::TempDir) -> Arc<ConfigStore> {
    let config = Arc::new(ConfigStore::load(dir.path().join("config.json")));
    // long enough that the interval never elapses during a test
    config.set_check_interval_mins(1).unwrap();
    config
}

#[tokio::test]
async fn first_cycle_runs_immediately_on_start() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let cycle = Arc::new(CountingCycle::default());
    let scheduler = Scheduler::new(cycle.clone(), test_config(&dir));

    assert!(!scheduler.is_running());
    scheduler.start();
    sleep(Duration::from_millis(100)).await;

    assert_eq!(cycle.runs.load(Ordering::SeqCst), 1);
    assert!(scheduler.is_running());

    scheduler.shutdown().await;
}

#[tokio::test]
async fn shutdown_interrupts_the_interval_sleep() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let cycle = Arc::new(CountingCycle::default());
    let scheduler = Scheduler::new(cycle.clone(), test_config(&dir));

    scheduler.start();
    sleep(Duration::from_millis(100)).await;

    // the loop is parked on a 60s interval sleep; shutdown must not wait it out
    timeout(Duration::from_secs(2), scheduler.shutdown())
        .await
        .expect("shutdown did not return promptly");
    assert!(!scheduler.is_running());

    let runs = cycle.runs.load(Ordering::SeqCst);
    sleep(Duration::from_millis(150)).await;
    assert_eq!(cycle.runs.load(Ordering::SeqCst), runs);
    info!("loop stayed stopped after shutdown");
}

#[tokio::test]
async fn restart_spawns_a_fresh_loop_at_once() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let cycle = Arc::new(CountingCycle::default());
    let scheduler = Scheduler::new(cycle.clone(), test_config(&dir));

    scheduler.start();
    sleep(Duration::from_millis(100)).await;
    assert_eq!(cycle.runs.load(Ordering::SeqCst), 1);

    scheduler.restart();
    sleep(Duration::from_millis(100)).await;
    assert_eq!(cycle.runs.load(Ordering::SeqCst), 2);
    assert!(scheduler.is_running());

    scheduler.shutdown().await;
}

#[tokio::test]
async fn erroring_cycle_backs_off_instead_of_dying() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let cycle = Arc::new(FailingCycle::default());
    let scheduler = Scheduler::new(cycle.clone(), test_config(&dir));

    scheduler.start();
    sleep(Duration::from_millis(100)).await;

    // one failed run, then the loop waits out the error backoff
    assert_eq!(cycle.runs.load(Ordering::SeqCst), 1);
    assert!(scheduler.is_running());

    timeout(Duration::from_secs(2), scheduler.shutdown())
        .await
        .expect("shutdown did not return promptly");
    assert!(!scheduler.is_running());
}

#[tokio::test]
async fn shutdown_before_start_is_a_noop() {
    let dir = tempfile::tempdir().unwrap();
    let cycle = Arc::new(CountingCycle::default());
    let scheduler = Scheduler::new(cycle.clone(), test_config(&dir));

    scheduler.shutdown().await;
    assert!(!scheduler.is_running());
    assert_eq!(cycle.runs.load(Ordering::SeqCst), 0);
}
