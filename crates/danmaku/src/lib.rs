//! Danmaku: core model and search machinery for aggregating timed comments
//! from multiple video platforms.
//!
//! ## Core Types
//!
//! - [`StandardDanmaku`] - A single timed comment in platform-neutral form
//! - [`MediaCandidate`] / [`EpisodeCandidate`] - A search hit and its episodes
//! - [`MatchQuery`] - A structured title query handed to every adapter
//! - [`PlatformAdapter`] - Trait for platform-specific integrations
//!
//! ## Matching
//!
//! - [`TitleMatcher`] - Configured, ordered substitution rules plus the
//!   season/language/mode-aware title comparison
//!
//! ## Aggregation
//!
//! - [`SearchOrchestrator`] - Concurrent fan-out over all registered adapters
//! - [`merge`] - Time-bucketed near-duplicate removal
//! - [`pool`] - Bounded worker pool used for segmented fetches

pub mod adapter;
pub mod matcher;
pub mod merge;
pub mod model;
pub mod pool;
pub mod registry;
pub mod search;

pub use adapter::{AdapterError, AdapterResult, PlatformAdapter};
pub use matcher::{SubstitutionRule, TitleMatcher};
pub use merge::merge;
pub use model::{
    DanmakuMode, EpisodeCandidate, MatchMode, MatchQuery, MediaCandidate, MediaKind,
    StandardDanmaku, WHITE_COLOR,
};
pub use registry::AdapterRegistry;
pub use search::{EnrichmentInfo, MetadataEnrichment, PlatformOptions, SearchOrchestrator};
