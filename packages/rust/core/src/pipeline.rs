//! Query resolution: question → concepts → prerequisite path → context → explanation.
//!
//! Stages run strictly in order, each under its own deadline and each
//! recorded as a [`ProcessingStep`](mathprereq_shared::ProcessingStep).
//! Context retrieval is the only stage whose failure is absorbed.
//! The finished query is saved by a background job, whatever its outcome.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{error, info, instrument, warn};

use mathprereq_shared::{
    Concept, MathPrereqError, PipelineConfig, PipelineStage, Query, QueryId, Result,
};
use mathprereq_storage::Storage;

use crate::jobs::BackgroundJobs;
use crate::services::{ConceptGraph, GenerativeText, ResourceDiscovery, SemanticIndex};

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Where an answer came from.
#[derive(Debug, Clone, PartialEq)]
pub enum Provenance {
    /// Produced by a pipeline run for this request.
    Fresh,
    /// Reused from an earlier successful query.
    Cached {
        query_id: QueryId,
        age: chrono::Duration,
    },
}

impl Provenance {
    pub fn is_cached(&self) -> bool {
        matches!(self, Self::Cached { .. })
    }

    pub fn cache_age(&self) -> Option<chrono::Duration> {
        match self {
            Self::Cached { age, .. } => Some(*age),
            Self::Fresh => None,
        }
    }
}

/// Answer returned to callers of [`QueryService`].
#[derive(Debug, Clone)]
pub struct QueryResult {
    /// Id of the query record that holds this answer.
    pub query_id: QueryId,
    pub identified_concepts: Vec<String>,
    pub prerequisite_path: Vec<Concept>,
    pub explanation: String,
    pub retrieved_context: Vec<String>,
    pub processing_time: Duration,
    pub provenance: Provenance,
}

impl QueryResult {
    pub(crate) fn from_query(query: &Query, processing_time: Duration, provenance: Provenance) -> Self {
        Self {
            query_id: query.id.clone(),
            identified_concepts: query.identified_concepts.clone(),
            prerequisite_path: query.prerequisite_path.clone(),
            explanation: query.explanation.clone(),
            retrieved_context: query.retrieved_context.clone(),
            processing_time,
            provenance,
        }
    }
}

// ---------------------------------------------------------------------------
// QueryService
// ---------------------------------------------------------------------------

/// External services the pipeline calls.
#[derive(Clone)]
pub struct Collaborators {
    pub graph: Arc<dyn ConceptGraph>,
    pub index: Arc<dyn SemanticIndex>,
    pub llm: Arc<dyn GenerativeText>,
    /// Background resource discovery. `None` disables it.
    pub discovery: Option<Arc<dyn ResourceDiscovery>>,
}

/// Entry point for question answering, cached concept lookups, and resources.
pub struct QueryService {
    pub(crate) services: Collaborators,
    pub(crate) storage: Arc<Storage>,
    pub(crate) jobs: BackgroundJobs,
    pub(crate) config: PipelineConfig,
}

impl QueryService {
    pub fn new(services: Collaborators, storage: Arc<Storage>, config: PipelineConfig) -> Self {
        Self {
            services,
            storage,
            jobs: BackgroundJobs::new(config.max_background_jobs),
            config,
        }
    }

    pub fn storage(&self) -> &Arc<Storage> {
        &self.storage
    }

    pub fn jobs(&self) -> &BackgroundJobs {
        &self.jobs
    }

    /// Wait for pending saves and discovery jobs.
    pub async fn shutdown(&self) {
        let pending = self.jobs.pending();
        if pending > 0 {
            info!(pending, "waiting for background jobs");
        }
        self.jobs.drain().await;
    }

    /// Answer a free-text question.
    ///
    /// Fatal stage failures are returned as [`MathPrereqError::Stage`]. The
    /// query record is persisted in the background either way.
    #[instrument(skip_all, fields(user_id = user_id.unwrap_or("-")))]
    pub async fn process_query(&self, question: &str, user_id: Option<&str>) -> Result<QueryResult> {
        let question = question.trim();
        if question.is_empty() {
            return Err(MathPrereqError::validation("question must not be empty"));
        }

        let start = Instant::now();
        let mut query = Query::new(question, user_id.map(str::to_string));
        query.model = Some(self.services.llm.model().to_string());
        info!(query_id = %query.id, "processing query");

        let outcome = self.run_stages(&mut query).await;
        let elapsed = start.elapsed();
        match &outcome {
            Ok(explanation) => query.mark_succeeded(explanation.clone(), elapsed),
            Err(e) => query.mark_failed(e, elapsed),
        }
        self.save_in_background(query.clone());

        match outcome {
            Ok(_) => {
                info!(
                    query_id = %query.id,
                    duration_ms = elapsed.as_millis() as u64,
                    concepts = query.identified_concepts.len(),
                    "query processed"
                );
                Ok(QueryResult::from_query(&query, elapsed, Provenance::Fresh))
            }
            Err(e) => {
                error!(query_id = %query.id, error = %e, "query processing failed");
                Err(e)
            }
        }
    }

    /// Run the four stages, filling in `query`. Returns the explanation.
    async fn run_stages(&self, query: &mut Query) -> Result<String> {
        let text = query.text.clone();
        let timeout = self.config.stage_timeout;

        let concepts = timed_stage(
            query,
            PipelineStage::IdentifyConcepts,
            timeout,
            self.services.llm.identify_concepts(&text),
        )
        .await
        .map_err(|e| MathPrereqError::stage(PipelineStage::IdentifyConcepts, e))?;
        let concepts: Vec<String> = concepts
            .into_iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();
        query.identified_concepts = concepts.clone();

        if !concepts.is_empty() {
            let selected: Vec<String> = concepts
                .iter()
                .take(self.config.max_discovery_concepts)
                .cloned()
                .collect();
            self.dispatch_discovery("query_discovery", selected);
        }

        let path = timed_stage(
            query,
            PipelineStage::FindPrerequisites,
            timeout,
            self.services.graph.resolve_prerequisite_path(&concepts),
        )
        .await
        .map_err(|e| MathPrereqError::stage(PipelineStage::FindPrerequisites, e))?;
        query.prerequisite_path = path.clone();

        let context = match timed_stage(
            query,
            PipelineStage::VectorSearch,
            timeout,
            self.services.index.search(&text, self.config.context_chunks),
        )
        .await
        {
            Ok(chunks) => chunks.into_iter().map(|c| c.content).collect(),
            Err(e) => {
                warn!(error = %e, "context retrieval failed, continuing without context");
                Vec::new()
            }
        };
        query.retrieved_context = context.clone();

        timed_stage(
            query,
            PipelineStage::GenerateExplanation,
            timeout,
            self.services
                .llm
                .generate_explanation(&text, &path, &context),
        )
        .await
        .map_err(|e| MathPrereqError::stage(PipelineStage::GenerateExplanation, e))
    }

    fn save_in_background(&self, query: Query) {
        let storage = self.storage.clone();
        self.jobs
            .spawn("save_query", self.config.save_timeout, async move {
                storage.insert_query(&query).await
            });
    }

    /// Hand concepts to background discovery, if configured.
    pub(crate) fn dispatch_discovery(&self, job: &'static str, concepts: Vec<String>) {
        let Some(discovery) = self.services.discovery.clone() else {
            return;
        };
        if concepts.is_empty() {
            return;
        }
        info!(job, concepts = ?concepts, "dispatching resource discovery");
        self.jobs
            .spawn(job, self.config.discovery_timeout, async move {
                let report = discovery.discover(&concepts).await;
                if !report.errors.is_empty() {
                    warn!(failed = report.errors.len(), "some concepts failed discovery");
                }
                Ok(())
            });
    }
}

/// Run one stage under `timeout` and record its step on `query`.
async fn timed_stage<T, F>(
    query: &mut Query,
    stage: PipelineStage,
    timeout: Duration,
    fut: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let start = Instant::now();
    let result = match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(MathPrereqError::timeout(stage.as_str(), timeout)),
    };
    let elapsed = start.elapsed();
    query.add_step(stage, elapsed, result.as_ref().err().map(ToString::to_string));
    info!(
        stage = stage.as_str(),
        duration_ms = elapsed.as_millis() as u64,
        success = result.is_ok(),
        "stage complete"
    );
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeGraph, FakeIndex, FakeLlm, Harness};

    const DERIVATIVE_CONCEPTS: [&str; 5] =
        ["algebra", "functions", "limits", "derivatives", "power rule"];

    #[tokio::test]
    async fn derivative_question_flows_through_all_stages() {
        let h = Harness::new(
            FakeLlm::with_concepts(&DERIVATIVE_CONCEPTS),
            FakeGraph::calculus(),
            FakeIndex::with_chunks(&["The power rule states d/dx x^n = n x^(n-1)."]),
        )
        .await;

        let result = h
            .service
            .process_query("How do I find the derivative of x^2?", Some("student-1"))
            .await
            .expect("query succeeds");

        assert_eq!(result.identified_concepts, DERIVATIVE_CONCEPTS);
        assert_eq!(result.provenance, Provenance::Fresh);
        assert_eq!(h.graph.requests(), vec![DERIVATIVE_CONCEPTS.map(String::from).to_vec()]);

        let path: Vec<_> = result.prerequisite_path.iter().map(|c| c.name.as_str()).collect();
        let target_pos = path.iter().position(|n| *n == "derivatives").expect("target");
        assert!(path[..target_pos].contains(&"limits"));
        assert_eq!(h.llm.explained_paths(), vec![result.prerequisite_path.clone()]);
        assert_eq!(result.retrieved_context.len(), 1);

        h.service.shutdown().await;
        let stored = h
            .storage
            .get_query(&result.query_id.to_string())
            .await
            .unwrap()
            .expect("query saved");
        assert!(stored.success);
        assert_eq!(stored.user_id.as_deref(), Some("student-1"));
        assert_eq!(stored.steps.len(), 4);
        assert!(stored.steps.iter().all(|s| s.success));
        assert_eq!(stored.model.as_deref(), Some("fake-model"));
        assert_eq!(h.discovery.batches(), vec![DERIVATIVE_CONCEPTS.map(String::from).to_vec()]);
    }

    #[tokio::test]
    async fn retrieval_failure_is_tolerated() {
        let h = Harness::new(
            FakeLlm::with_concepts(&["limits"]),
            FakeGraph::calculus(),
            FakeIndex::failing(),
        )
        .await;

        let result = h
            .service
            .process_query("what is a limit", None)
            .await
            .expect("query succeeds without context");
        assert!(result.retrieved_context.is_empty());
        assert!(!result.explanation.is_empty());

        h.service.shutdown().await;
        let stored = h
            .storage
            .get_query(&result.query_id.to_string())
            .await
            .unwrap()
            .expect("saved");
        let search = stored
            .steps
            .iter()
            .find(|s| s.name == "vector_search")
            .expect("step recorded");
        assert!(!search.success);
        assert!(stored.success);
    }

    #[tokio::test]
    async fn identification_failure_aborts_and_is_saved() {
        let h = Harness::new(FakeLlm::failing_identify(), FakeGraph::calculus(), FakeIndex::empty())
            .await;

        let err = h
            .service
            .process_query("explain limits", None)
            .await
            .expect_err("fatal stage");
        assert_eq!(err.failed_stage(), Some(PipelineStage::IdentifyConcepts));
        assert!(h.graph.requests().is_empty());

        h.service.shutdown().await;
        let saved = h.storage.recent_queries(10).await.unwrap();
        assert_eq!(saved.len(), 1);
        assert!(!saved[0].success);
        assert!(saved[0].explanation.is_empty());
        assert!(saved[0].error_message.is_some());
        assert_eq!(saved[0].steps.len(), 1);
        assert!(h.discovery.batches().is_empty());
    }

    #[tokio::test]
    async fn explanation_failure_discards_partial_results() {
        let h = Harness::new(
            FakeLlm::with_concepts(&["limits", "continuity"]).failing_explanation(),
            FakeGraph::calculus(),
            FakeIndex::empty(),
        )
        .await;

        let err = h
            .service
            .process_query("limits and continuity", None)
            .await
            .expect_err("fatal stage");
        assert_eq!(err.failed_stage(), Some(PipelineStage::GenerateExplanation));
        assert!(err.to_string().starts_with("explanation generation failed"));

        h.service.shutdown().await;
        let saved = h.storage.recent_queries(10).await.unwrap();
        assert!(!saved[0].success);
        assert!(saved[0].explanation.is_empty());
        assert_eq!(saved[0].steps.len(), 4);
        // Concepts were identified, so discovery still ran.
        assert_eq!(h.discovery.batches().len(), 1);
    }

    #[tokio::test]
    async fn slow_stage_times_out() {
        let mut h = Harness::new(
            FakeLlm::with_concepts(&["limits"]),
            FakeGraph::calculus().delayed(Duration::from_secs(5)),
            FakeIndex::empty(),
        )
        .await;
        h.service.config.stage_timeout = Duration::from_millis(50);

        let err = h
            .service
            .process_query("limits", None)
            .await
            .expect_err("timeout is fatal");
        assert_eq!(err.failed_stage(), Some(PipelineStage::FindPrerequisites));
        assert!(err.to_string().contains("timed out"));
        h.service.shutdown().await;
    }

    #[tokio::test]
    async fn discovery_limited_to_configured_concepts() {
        let h = Harness::new(
            FakeLlm::with_concepts(&["a", "b", "c", "d", "e", "f", "g"]),
            FakeGraph::calculus(),
            FakeIndex::empty(),
        )
        .await;

        h.service.process_query("many things", None).await.unwrap();
        h.service.shutdown().await;
        assert_eq!(h.discovery.batches()[0], vec!["a", "b", "c", "d", "e"]);
    }

    #[tokio::test]
    async fn blank_question_is_rejected() {
        let h = Harness::new(FakeLlm::with_concepts(&["x"]), FakeGraph::calculus(), FakeIndex::empty())
            .await;
        let err = h.service.process_query("   ", None).await.expect_err("invalid");
        assert!(matches!(err, MathPrereqError::Validation { .. }));
        assert_eq!(h.llm.identify_calls(), 0);
    }
}
