//! Query resolution and resource lookups for MathPrereq.
//!
//! This crate ties the collaborators together:
//! - [`pipeline`]: the four-stage [`QueryService::process_query`]
//! - [`cache`]: cache-first [`QueryService::smart_concept_query`]
//! - [`resources`]: [`QueryService::get_resources_for_concepts`]
//! - [`jobs`]: the detached background job supervisor
//! - [`services`]: collaborator traits, implemented by [`graph`], [`index`], and [`llm`]

pub mod cache;
pub mod graph;
pub mod index;
pub mod jobs;
pub mod llm;
pub mod pipeline;
pub mod resources;
pub mod services;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::{concept_prompt, is_fresh};
pub use graph::FileConceptGraph;
pub use index::{ChunkRecord, FtsIndex};
pub use jobs::BackgroundJobs;
pub use llm::{OpenRouterClient, OpenRouterClientBuilder};
pub use pipeline::{Collaborators, Provenance, QueryResult, QueryService};
pub use resources::resources_for_concepts;
pub use services::{ConceptGraph, GenerativeText, ResourceDiscovery, SemanticIndex};
