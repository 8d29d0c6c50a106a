//! Core domain types: queries, processing telemetry, concepts, and resources.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::MathPrereqError;

// ---------------------------------------------------------------------------
// QueryId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for query identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryId(pub Uuid);

impl QueryId {
    /// Generate a new time-sortable query identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for QueryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for QueryId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// Pipeline stages and telemetry
// ---------------------------------------------------------------------------

/// The four ordered stages of query resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    IdentifyConcepts,
    FindPrerequisites,
    VectorSearch,
    GenerateExplanation,
}

impl PipelineStage {
    /// All stages in execution order.
    pub const ALL: [PipelineStage; 4] = [
        Self::IdentifyConcepts,
        Self::FindPrerequisites,
        Self::VectorSearch,
        Self::GenerateExplanation,
    ];

    /// Step name recorded in a [`ProcessingStep`].
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IdentifyConcepts => "identify_concepts",
            Self::FindPrerequisites => "find_prerequisites",
            Self::VectorSearch => "vector_search",
            Self::GenerateExplanation => "generate_explanation",
        }
    }

    /// Whether a failure in this stage aborts the pipeline.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::VectorSearch)
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::IdentifyConcepts => "concept identification",
            Self::FindPrerequisites => "prerequisite path resolution",
            Self::VectorSearch => "context retrieval",
            Self::GenerateExplanation => "explanation generation",
        };
        f.write_str(text)
    }
}

/// Timing and outcome of one pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingStep {
    /// Stage name, e.g. `identify_concepts`.
    pub name: String,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// Concept
// ---------------------------------------------------------------------------

/// Position of a concept within a resolved prerequisite path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConceptRole {
    Prerequisite,
    Target,
}

/// A node of the concept graph. Identity is by `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Concept {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub role: ConceptRole,
}

// ---------------------------------------------------------------------------
// Query
// ---------------------------------------------------------------------------

/// One user interaction, mutated by a single pipeline run and then persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    pub id: QueryId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub text: String,
    /// Concept names in extraction order.
    pub identified_concepts: Vec<String>,
    /// Prerequisites first, then targets.
    pub prerequisite_path: Vec<Concept>,
    /// Empty unless the run succeeded.
    pub explanation: String,
    pub retrieved_context: Vec<String>,
    pub timestamp: DateTime<Utc>,
    pub processing_time_ms: u64,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub steps: Vec<ProcessingStep>,
    /// Generative model that produced the explanation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl Query {
    /// Start a new query record for `text`.
    pub fn new(text: impl Into<String>, user_id: Option<String>) -> Self {
        Self {
            id: QueryId::new(),
            user_id,
            text: text.into(),
            identified_concepts: Vec::new(),
            prerequisite_path: Vec::new(),
            explanation: String::new(),
            retrieved_context: Vec::new(),
            timestamp: Utc::now(),
            processing_time_ms: 0,
            success: false,
            error_message: None,
            steps: Vec::new(),
            model: None,
        }
    }

    /// Append a timed step to the telemetry log.
    pub fn add_step(&mut self, stage: PipelineStage, duration: Duration, error: Option<String>) {
        self.steps.push(ProcessingStep {
            name: stage.as_str().to_string(),
            duration_ms: duration.as_millis() as u64,
            success: error.is_none(),
            error,
        });
    }

    /// Mark the run successful with its final explanation.
    pub fn mark_succeeded(&mut self, explanation: String, elapsed: Duration) {
        self.explanation = explanation;
        self.success = true;
        self.error_message = None;
        self.processing_time_ms = elapsed.as_millis() as u64;
    }

    /// Mark the run failed. Any partial explanation is discarded.
    pub fn mark_failed(&mut self, error: &MathPrereqError, elapsed: Duration) {
        self.explanation.clear();
        self.success = false;
        self.error_message = Some(error.to_string());
        self.processing_time_ms = elapsed.as_millis() as u64;
    }

    /// Total processing time as a [`Duration`].
    pub fn processing_time(&self) -> Duration {
        Duration::from_millis(self.processing_time_ms)
    }

    /// Whether this record can serve a cached answer.
    pub fn is_reusable(&self) -> bool {
        self.success && !self.explanation.trim().is_empty()
    }
}

// ---------------------------------------------------------------------------
// EducationalResource
// ---------------------------------------------------------------------------

/// Kind of learning asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Video,
    Article,
    Tutorial,
    Reference,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Article => "article",
            Self::Tutorial => "tutorial",
            Self::Reference => "reference",
        }
    }
}

impl FromStr for ResourceKind {
    type Err = MathPrereqError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "video" => Ok(Self::Video),
            "article" => Ok(Self::Article),
            "tutorial" => Ok(Self::Tutorial),
            "reference" => Ok(Self::Reference),
            other => Err(MathPrereqError::parse(format!(
                "unknown resource kind: {other}"
            ))),
        }
    }
}

/// Difficulty tier of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Beginner,
    Intermediate,
    Advanced,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Beginner => "beginner",
            Self::Intermediate => "intermediate",
            Self::Advanced => "advanced",
        }
    }
}

impl FromStr for Difficulty {
    type Err = MathPrereqError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "beginner" => Ok(Self::Beginner),
            "intermediate" => Ok(Self::Intermediate),
            "advanced" => Ok(Self::Advanced),
            other => Err(MathPrereqError::parse(format!("unknown difficulty: {other}"))),
        }
    }
}

/// One externally discovered learning asset. `url` is the dedup key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EducationalResource {
    pub id: String,
    /// Normalized concept identifier, see [`concept_id`].
    pub concept_id: String,
    pub concept_name: String,
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub description: String,
    pub kind: ResourceKind,
    pub source_domain: String,
    pub difficulty: Difficulty,
    /// Always within `[0, 1]`.
    pub quality_score: f64,
    pub scraped_at: DateTime<Utc>,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub is_verified: bool,
}

fn default_language() -> String {
    "en".into()
}

impl EducationalResource {
    /// Build a resource for `concept_name` with defaults for the optional fields.
    pub fn new(
        concept_name: &str,
        title: impl Into<String>,
        url: impl Into<String>,
        kind: ResourceKind,
        source_domain: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            concept_id: concept_id(concept_name),
            concept_name: concept_name.to_string(),
            title: title.into(),
            url: url.into(),
            description: String::new(),
            kind,
            source_domain: source_domain.into(),
            difficulty: Difficulty::Intermediate,
            quality_score: 0.0,
            scraped_at: Utc::now(),
            language: default_language(),
            duration: None,
            view_count: None,
            thumbnail_url: None,
            author: None,
            tags: Vec::new(),
            is_verified: false,
        }
    }

    /// Set the difficulty tier.
    pub fn with_difficulty(mut self, difficulty: Difficulty) -> Self {
        self.difficulty = difficulty;
        self
    }

    /// Set the quality score, clamped to `[0, 1]`.
    pub fn with_quality(mut self, score: f64) -> Self {
        self.quality_score = clamp_quality(score);
        self
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Clamp a heuristic score into `[0, 1]`. NaN maps to 0.
pub fn clamp_quality(score: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 1.0)
    }
}

/// A retrieved text chunk and its relevance (higher is better).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub content: String,
    pub score: f64,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Normalize a concept name into a stable identifier.
///
/// Lower-cases, maps spaces and hyphens to `_`, and strips anything that is
/// not ASCII alphanumeric or `_`.
pub fn concept_id(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .filter_map(|c| match c {
            ' ' | '-' => Some('_'),
            c if c.is_ascii_alphanumeric() || c == '_' => Some(c),
            _ => None,
        })
        .collect()
}

/// Split a model reply into concept names.
///
/// Accepts comma- or line-separated lists. List markers (`-`, `*`, `1.`,
/// `2)`), wrapping quotes or backticks, and a trailing period are removed;
/// empty entries are dropped.
pub fn parse_concept_list(raw: &str) -> Vec<String> {
    raw.split([',', '\n'])
        .map(clean_concept)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn clean_concept(token: &str) -> &str {
    let mut t = token.trim().trim_start_matches(['-', '*', '•']).trim_start();

    let unnumbered = t.trim_start_matches(|c: char| c.is_ascii_digit());
    if unnumbered.len() < t.len() {
        if let Some(rest) = unnumbered
            .strip_prefix('.')
            .or_else(|| unnumbered.strip_prefix(')'))
        {
            t = rest.trim_start();
        }
    }

    t.trim_end_matches('.')
        .trim()
        .trim_matches(['"', '\'', '`'])
        .trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_id_roundtrip() {
        let id = QueryId::new();
        let parsed: QueryId = id.to_string().parse().expect("parse");
        assert_eq!(id, parsed);
    }

    #[test]
    fn concept_id_normalizes() {
        assert_eq!(concept_id("Integration by Parts"), "integration_by_parts");
        assert_eq!(concept_id("L'Hôpital's rule"), "lhpitals_rule");
        assert_eq!(concept_id("chain-rule"), "chain_rule");
        assert_eq!(concept_id("x^2 + y^2"), "x2__y2");
    }

    #[test]
    fn concept_list_preserves_order_and_drops_empties() {
        let parsed = parse_concept_list(" algebra, functions,, limits ,derivatives, power rule,");
        assert_eq!(
            parsed,
            vec!["algebra", "functions", "limits", "derivatives", "power rule"]
        );
        assert!(parse_concept_list("  ,  ").is_empty());
    }

    #[test]
    fn concept_list_strips_list_markers_and_quotes() {
        let parsed = parse_concept_list("1. Algebra\n2) \"Functions\"\n- `limits`\n* derivatives.\n");
        assert_eq!(parsed, vec!["Algebra", "Functions", "limits", "derivatives"]);

        let parsed = parse_concept_list("'chain rule', 3D geometry, L'Hôpital's rule");
        assert_eq!(parsed, vec!["chain rule", "3D geometry", "L'Hôpital's rule"]);
    }

    #[test]
    fn failed_query_never_keeps_explanation() {
        let mut query = Query::new("what is a limit?", None);
        query.explanation = "partial draft".into();
        query.mark_failed(
            &MathPrereqError::Generation("boom".into()),
            Duration::from_millis(12),
        );
        assert!(!query.success);
        assert!(query.explanation.is_empty());
        assert!(!query.is_reusable());
        assert_eq!(query.processing_time_ms, 12);
    }

    #[test]
    fn add_step_records_outcome() {
        let mut query = Query::new("q", None);
        query.add_step(PipelineStage::VectorSearch, Duration::from_millis(5), Some("down".into()));
        query.add_step(PipelineStage::GenerateExplanation, Duration::from_millis(7), None);
        assert_eq!(query.steps[0].name, "vector_search");
        assert!(!query.steps[0].success);
        assert!(query.steps[1].success);
    }

    #[test]
    fn quality_is_clamped() {
        let r = EducationalResource::new("limits", "t", "https://a", ResourceKind::Video, "a")
            .with_quality(1.4);
        assert_eq!(r.quality_score, 1.0);
        assert_eq!(clamp_quality(-0.2), 0.0);
        assert_eq!(clamp_quality(f64::NAN), 0.0);
        assert_eq!(r.concept_id, "limits");
    }

    #[test]
    fn kinds_parse_from_storage_strings() {
        for kind in [
            ResourceKind::Video,
            ResourceKind::Article,
            ResourceKind::Tutorial,
            ResourceKind::Reference,
        ] {
            assert_eq!(kind.as_str().parse::<ResourceKind>().expect("parse"), kind);
        }
        assert!("podcast".parse::<ResourceKind>().is_err());
    }
}
