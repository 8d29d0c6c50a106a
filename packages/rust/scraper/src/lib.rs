//! Educational resource discovery.
//!
//! This crate provides:
//! - [`adapters`]: one [`SourceAdapter`] per external platform
//! - [`fetcher`]: the rate-limited HTTP fetcher adapters share
//! - [`postprocess`]: URL dedup and the per-concept quality filter
//! - [`engine`]: batched, concurrent discovery that persists results

pub mod adapters;
pub mod engine;
pub mod fetcher;
pub mod postprocess;

pub use adapters::{
    GeneralSitesAdapter, KhanAcademyAdapter, MathWorldAdapter, SearchTarget, SiteSpec,
    SourceAdapter, YouTubeAdapter, default_adapters, normalize_for_search, search_terms,
};
pub use engine::{ConceptOutcome, DiscoveryEngine, DiscoveryReport};
pub use fetcher::{RateLimitedFetcher, build_http_client};
pub use postprocess::{apply_quality_filter, dedup_by_url, post_process};
