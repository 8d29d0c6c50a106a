//! Source adapters: one per external educational platform.
//!
//! Each adapter turns a concept into zero or more [`EducationalResource`]s.
//! The [`SourceAdapter`] trait is the seam the discovery engine fans out over.

mod general;
mod khan_academy;
mod mathworld;
mod youtube;

pub use general::{GeneralSitesAdapter, SiteSpec};
pub use khan_academy::KhanAcademyAdapter;
pub use mathworld::MathWorldAdapter;
pub use youtube::YouTubeAdapter;

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use scraper::Selector;
use url::Url;

use mathprereq_shared::{DiscoveryConfig, EducationalResource, Result, concept_id};

use crate::fetcher::{RateLimitedFetcher, build_http_client};

/// The concept being searched for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchTarget {
    /// Normalized identifier, see [`concept_id`].
    pub concept_id: String,
    /// Display name as requested.
    pub concept_name: String,
}

impl SearchTarget {
    pub fn new(concept_name: &str) -> Self {
        let name = concept_name.trim();
        Self {
            concept_id: concept_id(name),
            concept_name: name.to_string(),
        }
    }
}

/// A searchable educational source.
///
/// Implementations never panic on bad markup. A network or parse failure
/// is returned as an error and the caller treats it as zero results.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Short source name for logs.
    fn name(&self) -> &'static str;

    /// Search the source for resources about `target`.
    async fn search(&self, target: &SearchTarget) -> Result<Vec<EducationalResource>>;
}

/// The standard set of four sources, each with its own rate limiter.
pub fn default_adapters(config: &DiscoveryConfig) -> Result<Vec<Arc<dyn SourceAdapter>>> {
    let client = build_http_client(config)?;
    let fetcher = |name| RateLimitedFetcher::from_config(name, client.clone(), config);

    Ok(vec![
        Arc::new(YouTubeAdapter::new(fetcher("youtube"))),
        Arc::new(KhanAcademyAdapter::new(fetcher("khan_academy"))),
        Arc::new(MathWorldAdapter::new(fetcher("mathworld"))),
        Arc::new(GeneralSitesAdapter::new(fetcher("general_sites"))),
    ])
}

// ---------------------------------------------------------------------------
// Search term variants
// ---------------------------------------------------------------------------

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

static COMMON_WORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(basic|advanced|elementary|introduction|to|the|of|and|in)\b")
        .expect("valid common-words regex")
});

/// Title-case a concept name and collapse internal whitespace.
pub fn normalize_for_search(concept: &str) -> String {
    concept
        .split_whitespace()
        .map(|word| {
            let lower = word.to_lowercase();
            let mut chars = lower.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Query variants for a concept, most specific first.
///
/// `Basic Functions` yields `Basic Functions`, `Basic Functions mathematics`,
/// `Basic Functions math tutorial`, and the stripped `Functions`.
pub fn search_terms(concept: &str) -> Vec<String> {
    let normalized = normalize_for_search(concept);
    if normalized.is_empty() {
        return Vec::new();
    }

    let mut terms = vec![
        normalized.clone(),
        format!("{normalized} mathematics"),
        format!("{normalized} math tutorial"),
    ];

    if normalized.contains(' ') {
        let stripped = COMMON_WORDS.replace_all(&normalized, "");
        let stripped = WHITESPACE.replace_all(stripped.trim(), " ").into_owned();
        if !stripped.is_empty() && stripped != normalized {
            terms.push(stripped);
        }
    }
    terms
}

// ---------------------------------------------------------------------------
// HTML helpers
// ---------------------------------------------------------------------------

pub(crate) static ANCHOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("valid anchor selector"));

/// Resolve `href` against `origin`. Absolute links pass through.
pub(crate) fn absolute_url(origin: &str, href: &str) -> Option<String> {
    let base = Url::parse(origin).ok()?;
    let mut resolved = base.join(href).ok()?;
    resolved.set_fragment(None);
    match resolved.scheme() {
        "http" | "https" => Some(resolved.to_string()),
        _ => None,
    }
}

/// Collapse whitespace runs in extracted element text.
pub(crate) fn clean_text(raw: &str) -> String {
    WHITESPACE.replace_all(raw.trim(), " ").into_owned()
}

/// Truncate at a word boundary when possible, appending `...`.
pub(crate) fn truncate_text(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let truncated: String = text.chars().take(max_chars).collect();
    match truncated.rfind(' ') {
        Some(space) if space > truncated.len() / 2 => format!("{}...", &truncated[..space]),
        _ => format!("{truncated}..."),
    }
}
