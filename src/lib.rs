//! Resumable card import: paginated Scryfall search → normalize → dedup →
//! effect enrichment → SQLite, with checkpoints and a shared progress record.

pub mod batch;
pub mod checkpoint;
pub mod config;
pub mod db;
pub mod enrich;
pub mod error;
pub mod model;
pub mod normalize;
pub mod pipeline;
pub mod progress;
pub mod ratelimit;
pub mod scryfall;

pub use config::{RunOptions, Settings};
pub use error::ImportError;
pub use model::{CardRecord, EffectSet, ImportProgress, ImportStatus};
pub use pipeline::{ImportService, RunHandle, RunSummary};
