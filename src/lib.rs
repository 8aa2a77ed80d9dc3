pub mod config;
pub mod dedup;
pub mod deliver;
pub mod enrich;
pub mod extract;
pub mod fetcher;
pub mod scheduler;
pub mod types;
pub mod validator;
pub mod watcher;

pub use types::*;
pub use config::{ConfigStore, FeedDescriptor, Settings};
pub use dedup::DedupStore;
pub use deliver::{ArticlePoster, DeliveryPipeline, DiscordNotifier};
pub use enrich::{build_enricher, DisabledEnricher, Enricher, Enrichment};
pub use fetcher::{FetchFeed, Fetcher};
pub use scheduler::{CheckCycle, Cycle, Scheduler};
pub use validator::{FeedProbe, ValidationError};
pub use watcher::FeedWatcher;
