//! earshot-core - Discovery & Listen Orchestration Engine
//!
//! Answers a free-text music query by discovering a matching track across
//! several independent, unreliable sources, selecting the best candidate,
//! and producing an analysis result at the best fidelity the available data
//! supports: `full_audio` when audio can be retrieved and analyzed,
//! `descriptor_only` when catalog descriptors can stand in, `metadata_only`
//! when only catalog fields survive, `failed` otherwise.

pub mod analysis;
pub mod cache;
pub mod config;
pub mod dedup;
pub mod descriptor;
pub mod discovery;
pub mod error;
pub mod lyric_analysis;
pub mod lyrics;
pub mod metadata;
pub mod models;
pub mod modes;
pub mod orchestrator;
pub mod providers;
pub mod retrieval;
pub mod scorer;
pub mod synthesis;

pub use crate::cache::{CacheStatus, CacheStore};
pub use crate::config::Config;
pub use crate::error::{Error, Result};
pub use crate::models::{
    AnalysisMode, DiscoveryResult, FetchResult, ListenMode, ListenResult, SourceCandidate,
};
pub use crate::orchestrator::{ListenOptions, ListenOrchestrator};
