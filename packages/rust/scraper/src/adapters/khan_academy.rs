//! Khan Academy lesson search.

use async_trait::async_trait;
use scraper::Html;
use tracing::instrument;
use url::Url;

use mathprereq_shared::{Difficulty, EducationalResource, MathPrereqError, ResourceKind, Result};

use super::{ANCHOR, SearchTarget, SourceAdapter, absolute_url, clean_text};
use crate::fetcher::RateLimitedFetcher;

const ORIGIN: &str = "https://www.khanacademy.org";
const MAX_RESULTS: usize = 3;
const QUALITY: f64 = 0.9;

/// Structured-lesson platform adapter.
pub struct KhanAcademyAdapter {
    fetcher: RateLimitedFetcher,
    base_url: String,
}

impl KhanAcademyAdapter {
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
impl SourceAdapter for KhanAcademyAdapter {
    fn name(&self) -> &'static str {
        "khan_academy"
    }

    #[instrument(skip_all, fields(source = "khan_academy", concept = %target.concept_name))]
    async fn search(&self, target: &SearchTarget) -> Result<Vec<EducationalResource>> {
        let url = Url::parse_with_params(
            &format!("{}/search", self.base_url),
            &[
                ("search_again", "1"),
                ("page_search_query", target.concept_name.as_str()),
            ],
        )
        .map_err(|e| MathPrereqError::parse(format!("bad search url: {e}")))?;

        let body = self.fetcher.get_text(url.as_str()).await?;
        Ok(parse_search_page(&body, target))
    }
}

/// Lesson (`/e/`) and video (`/v/`) links with a descriptive title.
pub(crate) fn parse_search_page(html: &str, target: &SearchTarget) -> Vec<EducationalResource> {
    let doc = Html::parse_document(html);
    let mut resources = Vec::new();

    for el in doc.select(&ANCHOR) {
        if resources.len() >= MAX_RESULTS {
            break;
        }
        let Some(href) = el.value().attr("href") else {
            continue;
        };
        if !href.contains("/e/") && !href.contains("/v/") {
            continue;
        }

        let mut title = clean_text(&el.text().collect::<String>());
        if title.is_empty() {
            title = el
                .value()
                .attr("aria-label")
                .map(clean_text)
                .unwrap_or_default();
        }
        if title.chars().count() <= 10 {
            continue;
        }

        let Some(url) = absolute_url(ORIGIN, href) else {
            continue;
        };

        let mut resource = EducationalResource::new(
            &target.concept_name,
            title,
            url,
            ResourceKind::Tutorial,
            "khanacademy.org",
        )
        .with_description(format!("Khan Academy lesson on {}", target.concept_name))
        .with_difficulty(Difficulty::Beginner)
        .with_quality(QUALITY);
        resource.concept_id = target.concept_id.clone();
        resource.tags = vec!["khan-academy".into(), "tutorial".into()];
        resource.is_verified = true;
        resources.push(resource);
    }
    resources
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::fetcher::build_http_client;
    use mathprereq_shared::DiscoveryConfig;

    const PAGE: &str = r#"
<html><body>
  <a href="/math/calculus">Calculus course overview</a>
  <a href="/math/calc/v/limits-intro">Introduction to limits</a>
  <a href="/math/calc/e/limits-practice" aria-label="Practice: limits from graphs"></a>
  <a href="/math/calc/v/short">Short</a>
  <a href="https://www.khanacademy.org/math/calc/v/one-sided">One-sided limits explained</a>
  <a href="/math/calc/v/fourth">A fourth matching lesson</a>
</body></html>"#;

    #[test]
    fn parses_lesson_links() {
        let target = SearchTarget::new("limits");
        let resources = parse_search_page(PAGE, &target);
        let titles: Vec<_> = resources.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(
            titles,
            vec![
                "Introduction to limits",
                "Practice: limits from graphs",
                "One-sided limits explained"
            ]
        );
        assert_eq!(
            resources[0].url,
            "https://www.khanacademy.org/math/calc/v/limits-intro"
        );
        assert!(resources.iter().all(|r| r.kind == ResourceKind::Tutorial));
        assert!(resources.iter().all(|r| (r.quality_score - 0.9).abs() < 1e-9));
        assert!(resources.iter().all(|r| r.is_verified));
    }

    #[tokio::test]
    async fn search_hits_query_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("page_search_query", "chain rule"))
            .respond_with(ResponseTemplate::new(200).set_body_string(PAGE))
            .expect(1)
            .mount(&server)
            .await;

        let client = build_http_client(&DiscoveryConfig::default()).expect("client");
        let adapter = KhanAcademyAdapter::new(RateLimitedFetcher::new(
            "khan_academy",
            client,
            50,
            Duration::from_secs(1),
        ))
        .with_base_url(server.uri());

        let resources = adapter
            .search(&SearchTarget::new("chain rule"))
            .await
            .expect("search");
        assert_eq!(resources.len(), 3);
        assert_eq!(resources[0].concept_id, "chain_rule");
    }

    #[tokio::test]
    async fn http_error_is_returned() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = build_http_client(&DiscoveryConfig::default()).expect("client");
        let adapter = KhanAcademyAdapter::new(RateLimitedFetcher::new(
            "khan_academy",
            client,
            50,
            Duration::from_secs(1),
        ))
        .with_base_url(server.uri());

        assert!(adapter.search(&SearchTarget::new("limits")).await.is_err());
    }
}
