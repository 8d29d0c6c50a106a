//! In-crate fakes for the collaborator traits.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use mathprereq_scraper::DiscoveryReport;
use mathprereq_shared::{
    Concept, ConceptRole, MathPrereqError, PipelineConfig, Result, ScoredChunk,
};
use mathprereq_storage::Storage;

use crate::pipeline::{Collaborators, QueryService};
use crate::services::{ConceptGraph, GenerativeText, ResourceDiscovery, SemanticIndex};

// ---------------------------------------------------------------------------
// Generative text
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeLlm {
    concepts: Vec<String>,
    fail_identify: bool,
    fail_explanation: bool,
    identify_questions: Mutex<Vec<String>>,
    explained_paths: Mutex<Vec<Vec<Concept>>>,
}

impl FakeLlm {
    pub fn with_concepts(concepts: &[&str]) -> Self {
        Self {
            concepts: concepts.iter().map(|c| c.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn failing_identify() -> Self {
        Self {
            fail_identify: true,
            ..Self::default()
        }
    }

    pub fn failing_explanation(mut self) -> Self {
        self.fail_explanation = true;
        self
    }

    pub fn identify_calls(&self) -> usize {
        self.identify_questions.lock().unwrap().len()
    }

    pub fn identify_questions(&self) -> Vec<String> {
        self.identify_questions.lock().unwrap().clone()
    }

    pub fn explained_paths(&self) -> Vec<Vec<Concept>> {
        self.explained_paths.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerativeText for FakeLlm {
    async fn identify_concepts(&self, question: &str) -> Result<Vec<String>> {
        self.identify_questions
            .lock()
            .unwrap()
            .push(question.to_string());
        if self.fail_identify {
            return Err(MathPrereqError::Generation("model unavailable".into()));
        }
        Ok(self.concepts.clone())
    }

    async fn generate_explanation(
        &self,
        question: &str,
        path: &[Concept],
        _context: &[String],
    ) -> Result<String> {
        self.explained_paths.lock().unwrap().push(path.to_vec());
        if self.fail_explanation {
            return Err(MathPrereqError::Generation("empty completion".into()));
        }
        Ok(format!("Explanation for: {question}"))
    }

    fn model(&self) -> &str {
        "fake-model"
    }
}

// ---------------------------------------------------------------------------
// Concept graph
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeGraph {
    path: Vec<Concept>,
    delay: Option<Duration>,
    requests: Mutex<Vec<Vec<String>>>,
}

fn concept(name: &str, role: ConceptRole) -> Concept {
    Concept {
        id: name.replace(' ', "_"),
        name: name.to_string(),
        description: String::new(),
        role,
    }
}

impl FakeGraph {
    /// A fixed algebra → functions → limits → derivatives path.
    pub fn calculus() -> Self {
        Self {
            path: vec![
                concept("algebra", ConceptRole::Prerequisite),
                concept("functions", ConceptRole::Prerequisite),
                concept("limits", ConceptRole::Prerequisite),
                concept("derivatives", ConceptRole::Target),
            ],
            ..Self::default()
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn requests(&self) -> Vec<Vec<String>> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConceptGraph for FakeGraph {
    async fn resolve_prerequisite_path(&self, names: &[String]) -> Result<Vec<Concept>> {
        self.requests.lock().unwrap().push(names.to_vec());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.path.clone())
    }
}

// ---------------------------------------------------------------------------
// Semantic index
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeIndex {
    chunks: Vec<String>,
    fail: bool,
}

impl FakeIndex {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_chunks(chunks: &[&str]) -> Self {
        Self {
            chunks: chunks.iter().map(|c| c.to_string()).collect(),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl SemanticIndex for FakeIndex {
    async fn search(&self, _query: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        if self.fail {
            return Err(MathPrereqError::Storage("index offline".into()));
        }
        Ok(self
            .chunks
            .iter()
            .take(k)
            .map(|c| ScoredChunk {
                content: c.clone(),
                score: 1.0,
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeDiscovery {
    batches: Mutex<Vec<Vec<String>>>,
}

impl FakeDiscovery {
    /// Concept lists received, in dispatch order.
    pub fn batches(&self) -> Vec<Vec<String>> {
        self.batches.lock().unwrap().clone()
    }
}

#[async_trait]
impl ResourceDiscovery for FakeDiscovery {
    async fn discover(&self, names: &[String]) -> DiscoveryReport {
        self.batches.lock().unwrap().push(names.to_vec());
        DiscoveryReport::default()
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub async fn temp_storage() -> Arc<Storage> {
    let path = std::env::temp_dir().join(format!("mp_test_{}.db", Uuid::now_v7()));
    Arc::new(Storage::open(&path).await.expect("open storage"))
}

/// A service wired to fakes, with handles kept for assertions.
pub struct Harness {
    pub service: QueryService,
    pub storage: Arc<Storage>,
    pub llm: Arc<FakeLlm>,
    pub graph: Arc<FakeGraph>,
    pub discovery: Arc<FakeDiscovery>,
}

impl Harness {
    pub async fn new(llm: FakeLlm, graph: FakeGraph, index: FakeIndex) -> Self {
        let storage = temp_storage().await;
        let llm = Arc::new(llm);
        let graph = Arc::new(graph);
        let discovery = Arc::new(FakeDiscovery::default());
        let services = Collaborators {
            graph: graph.clone(),
            index: Arc::new(index),
            llm: llm.clone(),
            discovery: Some(discovery.clone()),
        };
        let service = QueryService::new(services, storage.clone(), PipelineConfig::default());
        Self {
            service,
            storage,
            llm,
            graph,
            discovery,
        }
    }
}
