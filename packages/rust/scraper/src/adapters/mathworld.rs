//! Wolfram MathWorld topic search.

use std::sync::LazyLock;

use async_trait::async_trait;
use scraper::{Html, Selector};
use tracing::instrument;
use url::Url;

use mathprereq_shared::{Difficulty, EducationalResource, MathPrereqError, ResourceKind, Result};

use super::{SearchTarget, SourceAdapter, absolute_url, clean_text};
use crate::fetcher::RateLimitedFetcher;

const ORIGIN: &str = "https://mathworld.wolfram.com";
const MAX_RESULTS: usize = 2;
const QUALITY: f64 = 0.8;

static TOPIC_LINK: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href*='/topics/']").expect("valid topic selector"));

/// Reference/encyclopedia adapter.
pub struct MathWorldAdapter {
    fetcher: RateLimitedFetcher,
    base_url: String,
}

impl MathWorldAdapter {
    pub fn new(fetcher: RateLimitedFetcher) -> Self {
        Self {
            fetcher,
            base_url: ORIGIN.into(),
        }
    }

    /// Point searches at a different host (mock servers in tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl SourceAdapter for MathWorldAdapter {
    fn name(&self) -> &'static str {
        "mathworld"
    }

    #[instrument(skip_all, fields(source = "mathworld", concept = %target.concept_name))]
    async fn search(&self, target: &SearchTarget) -> Result<Vec<EducationalResource>> {
        let url = Url::parse_with_params(
            &format!("{}/search/", self.base_url),
            &[("query", target.concept_name.as_str())],
        )
        .map_err(|e| MathPrereqError::parse(format!("bad search url: {e}")))?;

        let body = self.fetcher.get_text(url.as_str()).await?;
        Ok(parse_search_page(&body, target))
    }
}

pub(crate) fn parse_search_page(html: &str, target: &SearchTarget) -> Vec<EducationalResource> {
    let doc = Html::parse_document(html);

    doc.select(&TOPIC_LINK)
        .filter_map(|el| {
            let title = clean_text(&el.text().collect::<String>());
            if title.chars().count() <= 5 {
                return None;
            }
            let url = absolute_url(ORIGIN, el.value().attr("href")?)?;
            Some((title, url))
        })
        .take(MAX_RESULTS)
        .map(|(title, url)| {
            let mut resource = EducationalResource::new(
                &target.concept_name,
                format!("{title} - MathWorld"),
                url,
                ResourceKind::Reference,
                "mathworld.wolfram.com",
            )
            .with_description(format!(
                "Mathematical definition and explanation of {}",
                target.concept_name
            ))
            .with_difficulty(Difficulty::Intermediate)
            .with_quality(QUALITY);
            resource.concept_id = target.concept_id.clone();
            resource.tags = vec!["mathworld".into(), "reference".into(), "definition".into()];
            resource.is_verified = true;
            resource
        })
        .collect()
}
