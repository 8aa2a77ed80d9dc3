use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use chrono::Utc;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use rss_courier::config::{ConfigStore, FeedDescriptor};
use rss_courier::dedup::DedupStore;
use rss_courier::deliver::{DeliveryPipeline, DiscordNotifier};
use rss_courier::enrich::build_enricher;
use rss_courier::fetcher::{FetchFeed, Fetcher};
use rss_courier::scheduler::{CheckCycle, Cycle, Scheduler};
use rss_courier::types::FetchConfig;
use rss_courier::validator;
use rss_courier::watcher::FeedWatcher;

/// Watch RSS/Atom feeds and post new articles to Discord webhooks.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the settings file
    #[arg(long, default_value = "config.json")]
    config: PathBuf,

    /// Path to the seen-article index
    #[arg(long, default_value = "seen_articles.json")]
    dedup_file: PathBuf,

    /// Run a single check cycle and exit
    #[arg(long)]
    once: bool,

    /// Probe a feed URL and print what it contains, then exit
    #[arg(long, value_name = "URL")]
    probe: Option<String>,

    /// Validate and register a feed URL, then exit
    #[arg(long, value_name = "URL")]
    add_feed: Option<String>,

    /// Destination id for --add-feed
    #[arg(long, default_value = "default")]
    destination: String,

    /// Unregister a feed by id, then exit
    #[arg(long, value_name = "ID")]
    remove_feed: Option<String>,

    /// Register a destination webhook as "id=url", then exit
    #[arg(long, value_name = "ID=URL")]
    set_destination: Option<String>,

    /// Update the check interval in minutes, then exit
    #[arg(long, value_name = "MINUTES")]
    set_interval: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = Arc::new(ConfigStore::load(&args.config));
    let fetcher = Arc::new(Fetcher::new(FetchConfig::default()));

    if let Some(url) = &args.probe {
        return probe(fetcher.as_ref(), url).await;
    }
    if let Some(pair) = &args.set_destination {
        let Some((id, webhook)) = pair.split_once('=') else {
            bail!("--set-destination expects \"id=webhook-url\"");
        };
        config.set_destination(id, webhook)?;
        info!(destination = %id, "destination registered");
        return Ok(());
    }
    if let Some(mins) = args.set_interval {
        config.set_check_interval_mins(mins)?;
        info!(minutes = mins, "check interval updated");
        return Ok(());
    }
    if let Some(url) = &args.add_feed {
        return add_feed(&config, fetcher.as_ref(), url, &args.destination).await;
    }
    if let Some(id) = &args.remove_feed {
        if config.remove_feed(id)? {
            info!(feed = %id, "feed removed");
        } else {
            error!(feed = %id, "no such feed");
        }
        return Ok(());
    }

    let dedup = Arc::new(DedupStore::open(&args.dedup_file));
    info!(known_articles = dedup.len(), "dedup index loaded");

    let enricher = build_enricher(&config.settings().ai);
    let poster = Arc::new(DiscordNotifier::new());
    let dyn_fetcher: Arc<dyn FetchFeed> = fetcher;
    let watcher = FeedWatcher::new(Arc::clone(&config), Arc::clone(&dedup), dyn_fetcher);
    let pipeline = DeliveryPipeline::new(Arc::clone(&config), enricher, poster);
    let cycle = Arc::new(CheckCycle::new(
        Arc::clone(&config),
        Arc::clone(&dedup),
        watcher,
        pipeline,
    ));

    if args.once {
        info!("running a single check cycle");
        cycle.run().await?;
        return Ok(());
    }

    let scheduler = Scheduler::new(cycle, Arc::clone(&config));
    scheduler.start();
    info!("running, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    scheduler.shutdown().await;
    Ok(())
}

async fn probe(fetcher: &dyn FetchFeed, url: &str) -> Result<()> {
    match validator::probe_feed(fetcher, url).await {
        Ok(probe) => {
            info!(title = %probe.title, entries = probe.entry_count, "feed looks good");
            if !probe.description.is_empty() {
                info!(description = %probe.description, "feed description");
            }
            if let Some(latest) = &probe.latest_entry_title {
                info!(latest = %latest, "most recent entry");
            }
            Ok(())
        }
        Err(e) => {
            error!(%url, error = %e, "feed probe failed");
            Err(e.into())
        }
    }
}

async fn add_feed(
    config: &ConfigStore,
    fetcher: &dyn FetchFeed,
    url: &str,
    destination: &str,
) -> Result<()> {
    let probe = match validator::probe_feed(fetcher, url).await {
        Ok(probe) => probe,
        Err(e) => {
            error!(%url, error = %e, "feed rejected");
            return Err(e.into());
        }
    };
    if config.destination(destination).is_none() {
        info!(destination = %destination, "note: destination has no webhook yet, register one with --set-destination");
    }

    let id = next_feed_id(config);
    config.add_feed(
        &id,
        FeedDescriptor {
            url: url.to_string(),
            name: probe.title.clone(),
            destination_id: destination.to_string(),
            added_at: Utc::now(),
        },
    )?;
    info!(feed = %id, title = %probe.title, entries = probe.entry_count, "feed registered");
    Ok(())
}

fn next_feed_id(config: &ConfigStore) -> String {
    let feeds = config.feeds();
    let mut n = feeds.len() + 1;
    while feeds.contains_key(&format!("feed_{n}")) {
        n += 1;
    }
    format!("feed_{n}")
}
