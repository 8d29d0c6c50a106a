//! Cache-first concept lookups.
//!
//! A concept query reuses the newest successful answer that mentions the
//! concept, as long as it is younger than the freshness window. Otherwise
//! the pipeline runs on a synthesized, detailed prompt. Either way the
//! concept's resources are refreshed in the background.

use std::collections::HashSet;
use std::time::Instant;

use chrono::Utc;
use regex::{Regex, RegexBuilder};
use tracing::{debug, info, instrument, warn};

use mathprereq_shared::{MathPrereqError, Query, Result};
use mathprereq_storage::CacheMatch;

use crate::pipeline::{Provenance, QueryResult, QueryService};

/// Candidates read for a concept matcher. The store returns them newest first.
const CONCEPT_CANDIDATE_LIMIT: u32 = 20;

/// Substring matches read before the whole-word check.
const TEXT_CANDIDATE_LIMIT: u32 = 200;

/// Ordered matchers over cached queries. The first one with a hit wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Matcher {
    /// Identified concept equals the name as given.
    Exact,
    /// Identified concept equals the name ignoring case.
    CaseInsensitive,
    /// Question text contains the name as a whole word.
    WordInText,
}

impl Matcher {
    const ORDER: [Matcher; 3] = [Self::Exact, Self::CaseInsensitive, Self::WordInText];
}

/// Whether an answer of `age` may be reused. The window end is exclusive.
pub fn is_fresh(age: chrono::Duration, max_age: chrono::Duration) -> bool {
    age < max_age
}

/// Prompt used when a concept has no usable cached answer.
pub fn concept_prompt(concept: &str) -> String {
    format!(
        "Please provide a comprehensive explanation of the mathematical concept \"{concept}\".\n\n\
         Include the following in your explanation:\n\
         1. Definition and core principles\n\
         2. Prerequisites needed to understand this concept\n\
         3. Key formulas or theorems (if applicable)\n\
         4. Step-by-step examples with clear explanations\n\
         5. Common applications and real-world uses\n\
         6. Common mistakes students make and how to avoid them\n\
         7. Connections to other mathematical concepts\n\n\
         Make the explanation educational, detailed, and suitable for students learning this concept."
    )
}

impl QueryService {
    /// Answer for a bare concept name, from cache when fresh.
    #[instrument(skip_all, fields(concept = %concept_name.trim()))]
    pub async fn smart_concept_query(
        &self,
        concept_name: &str,
        user_id: Option<&str>,
    ) -> Result<QueryResult> {
        let concept = concept_name.trim();
        if concept.is_empty() {
            return Err(MathPrereqError::validation("concept name must not be empty"));
        }
        let start = Instant::now();

        let cached = match self.find_cached_concept_query(concept).await {
            Ok(found) => found,
            Err(e) => {
                warn!(error = %e, "cache lookup failed, processing fresh");
                None
            }
        };

        if let Some(cached) = cached {
            let age = Utc::now() - cached.timestamp;
            if is_fresh(age, self.config.cache_max_age) {
                info!(
                    cached_query_id = %cached.id,
                    age_hours = age.num_hours(),
                    "serving concept from cache"
                );
                let refresh = refresh_concepts(
                    concept,
                    &cached.identified_concepts,
                    self.config.max_refresh_concepts,
                );
                self.dispatch_discovery("concept_refresh", refresh);

                let provenance = Provenance::Cached {
                    query_id: cached.id.clone(),
                    age,
                };
                return Ok(QueryResult::from_query(&cached, start.elapsed(), provenance));
            }
            info!(age_days = age.num_days(), "cached answer is stale");
        } else {
            debug!("no cached answer");
        }

        self.dispatch_discovery("concept_refresh", vec![concept.to_string()]);
        self.process_query(&concept_prompt(concept), user_id).await
    }

    /// The newest reusable query matching `concept`, trying each matcher in order.
    ///
    /// Each matcher reads the store on its own, so a newer match for a later
    /// matcher never hides an older match for an earlier one.
    pub async fn find_cached_concept_query(&self, concept: &str) -> Result<Option<Query>> {
        let word = word_pattern(concept)?;
        for matcher in Matcher::ORDER {
            let (by, limit) = match matcher {
                Matcher::Exact => (CacheMatch::Concept(concept), CONCEPT_CANDIDATE_LIMIT),
                Matcher::CaseInsensitive => {
                    (CacheMatch::ConceptIgnoreCase(concept), CONCEPT_CANDIDATE_LIMIT)
                }
                Matcher::WordInText => (CacheMatch::TextContains(concept), TEXT_CANDIDATE_LIMIT),
            };
            let hit = self
                .storage
                .find_cache_candidates(by, limit)
                .await?
                .into_iter()
                .filter(Query::is_reusable)
                .filter(|q| matcher != Matcher::WordInText || word.is_match(&q.text))
                .max_by_key(|q| q.timestamp);
            if let Some(hit) = hit {
                debug!(?matcher, query_id = %hit.id, "cache match");
                return Ok(Some(hit));
            }
        }
        Ok(None)
    }
}

fn word_pattern(concept: &str) -> Result<Regex> {
    RegexBuilder::new(&format!(r"\b{}\b", regex::escape(concept)))
        .case_insensitive(true)
        .build()
        .map_err(|e| MathPrereqError::validation(format!("bad concept pattern: {e}")))
}

/// The requested concept followed by previously identified ones, deduplicated
/// ignoring case, capped at `max`.
fn refresh_concepts(concept: &str, identified: &[String], max: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    std::iter::once(concept)
        .chain(identified.iter().map(String::as_str))
        .map(str::trim)
        .filter(|c| !c.is_empty() && seen.insert(c.to_lowercase()))
        .take(max)
        .map(str::to_string)
        .collect()
}
