//! Collaborator seams consumed by the query pipeline.
//!
//! Each trait has one production implementation in this crate
//! ([`crate::graph`], [`crate::index`], [`crate::llm`]) and in-test fakes.

use async_trait::async_trait;

use mathprereq_scraper::{DiscoveryEngine, DiscoveryReport};
use mathprereq_shared::{Concept, Result, ScoredChunk};

/// Resolves concept names to an ordered prerequisite path.
#[async_trait]
pub trait ConceptGraph: Send + Sync {
    /// Prerequisites before targets. Unknown names are skipped, and an
    /// empty input yields an empty path.
    async fn resolve_prerequisite_path(&self, names: &[String]) -> Result<Vec<Concept>>;
}

/// Retrieves supporting text for a question.
#[async_trait]
pub trait SemanticIndex: Send + Sync {
    /// Up to `k` chunks in descending score order.
    async fn search(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>>;
}

/// Extracts concepts and drafts explanations.
#[async_trait]
pub trait GenerativeText: Send + Sync {
    /// Concept names in the order the model emitted them.
    async fn identify_concepts(&self, question: &str) -> Result<Vec<String>>;

    async fn generate_explanation(
        &self,
        question: &str,
        path: &[Concept],
        context: &[String],
    ) -> Result<String>;

    /// Model identifier recorded on queries.
    fn model(&self) -> &str;
}

/// Background resource discovery for a set of concepts.
#[async_trait]
pub trait ResourceDiscovery: Send + Sync {
    async fn discover(&self, names: &[String]) -> DiscoveryReport;
}

#[async_trait]
impl ResourceDiscovery for DiscoveryEngine {
    async fn discover(&self, names: &[String]) -> DiscoveryReport {
        DiscoveryEngine::discover(self, names).await
    }
}
