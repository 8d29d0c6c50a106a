//! Shared types, error model, and configuration for MathPrereq.
//!
//! This crate is the foundation depended on by all other MathPrereq crates.
//! It provides:
//! - [`MathPrereqError`]: the unified error type
//! - Domain types ([`Query`], [`Concept`], [`EducationalResource`], [`PipelineStage`])
//! - Configuration ([`AppConfig`], [`PipelineConfig`], [`DiscoveryConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CacheSection, DiscoveryConfig, GraphSection, OpenRouterConfig, PipelineConfig,
    PipelineSection, QualityPolicy, QualitySection, ScraperSection, StorageSection, config_dir,
    config_file_path, init_config, load_config, load_config_from, resolve_db_path,
    resolve_graph_path, validate_api_key,
};
pub use error::{MathPrereqError, Result};
pub use types::{
    Concept, ConceptRole, Difficulty, EducationalResource, PipelineStage, ProcessingStep, Query,
    QueryId, ResourceKind, ScoredChunk, clamp_quality, concept_id, parse_concept_list,
};
