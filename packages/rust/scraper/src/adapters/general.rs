//! Generic sweep over smaller educational sites.
//!
//! Search result pages are scanned for any link whose text mentions the
//! concept; each site contributes at a fixed quality score.

use async_trait::async_trait;
use scraper::Html;
use tracing::{instrument, warn};
use url::Url;

use mathprereq_shared::{Difficulty, EducationalResource, MathPrereqError, ResourceKind, Result};

use super::{ANCHOR, SearchTarget, SourceAdapter, absolute_url, clean_text};
use crate::fetcher::RateLimitedFetcher;

/// Total links contributed across all sites.
const MAX_RESULTS: usize = 4;
const MIN_TITLE_CHARS: usize = 10;
const MAX_TITLE_CHARS: usize = 200;

/// One site searched by the sweep.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteSpec {
    /// Domain recorded on resources.
    pub domain: String,
    /// Scheme and host, used for the search request and link resolution.
    pub origin: String,
    pub search_path: String,
    pub query_param: String,
    pub quality: f64,
}

impl SiteSpec {
    fn search_url(&self, term: &str) -> Result<Url> {
        Url::parse_with_params(
            &format!("{}{}", self.origin, self.search_path),
            &[(self.query_param.as_str(), term)],
        )
        .map_err(|e| MathPrereqError::parse(format!("bad search url for {}: {e}", self.domain)))
    }
}

/// The default sites: Brilliant and Math is Fun.
pub fn default_sites() -> Vec<SiteSpec> {
    vec![
        SiteSpec {
            domain: "brilliant.org".into(),
            origin: "https://brilliant.org".into(),
            search_path: "/search/".into(),
            query_param: "q".into(),
            quality: 0.8,
        },
        SiteSpec {
            domain: "mathsisfun.com".into(),
            origin: "https://www.mathsisfun.com".into(),
            search_path: "/search/search.html".into(),
            query_param: "query".into(),
            quality: 0.7,
        },
    ]
}

/// Generic article sweep adapter.
pub struct GeneralSitesAdapter {
    fetcher: RateLimitedFetcher,
    sites: Vec<SiteSpec>,
}

impl GeneralSitesAdapter {
    pub fn new(fetcher: RateLimitedFetcher) -> Self {
        Self {
            fetcher,
            sites: default_sites(),
        }
    }

    /// Replace the site list.
    pub fn with_sites(mut self, sites: Vec<SiteSpec>) -> Self {
        self.sites = sites;
        self
    }
}

#[async_trait]
impl SourceAdapter for GeneralSitesAdapter {
    fn name(&self) -> &'static str {
        "general_sites"
    }

    #[instrument(skip_all, fields(source = "general_sites", concept = %target.concept_name))]
    async fn search(&self, target: &SearchTarget) -> Result<Vec<EducationalResource>> {
        let mut resources = Vec::new();

        for site in &self.sites {
            if resources.len() >= MAX_RESULTS {
                break;
            }
            let url = site.search_url(&target.concept_name)?;
            match self.fetcher.get_text(url.as_str()).await {
                Ok(body) => {
                    let remaining = MAX_RESULTS - resources.len();
                    resources.extend(parse_site_page(&body, site, target, remaining));
                }
                Err(e) => warn!(site = %site.domain, error = %e, "site search failed"),
            }
        }
        Ok(resources)
    }
}

/// Links whose text mentions the concept, up to `limit`.
pub(crate) fn parse_site_page(
    html: &str,
    site: &SiteSpec,
    target: &SearchTarget,
    limit: usize,
) -> Vec<EducationalResource> {
    let doc = Html::parse_document(html);
    let concept = target.concept_name.to_lowercase();

    doc.select(&ANCHOR)
        .filter_map(|el| {
            let href = el.value().attr("href")?;
            if href.starts_with('#') {
                return None;
            }
            let text = clean_text(&el.text().collect::<String>());
            let len = text.chars().count();
            if !(MIN_TITLE_CHARS..=MAX_TITLE_CHARS).contains(&len) {
                return None;
            }
            if !text.to_lowercase().contains(&concept) {
                return None;
            }
            let url = absolute_url(&site.origin, href)?;
            Some((text, url))
        })
        .take(limit)
        .map(|(title, url)| {
            let mut resource = EducationalResource::new(
                &target.concept_name,
                title,
                url,
                ResourceKind::Article,
                site.domain.clone(),
            )
            .with_description(format!("Educational content about {}", target.concept_name))
            .with_difficulty(Difficulty::Intermediate)
            .with_quality(site.quality);
            resource.concept_id = target.concept_id.clone();
            resource.tags = vec!["article".into(), "education".into()];
            resource
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::fetcher::build_http_client;
    use mathprereq_shared::DiscoveryConfig;

    fn site(origin: &str, domain: &str, quality: f64) -> SiteSpec {
        SiteSpec {
            domain: domain.into(),
            origin: origin.into(),
            search_path: "/search".into(),
            query_param: "q".into(),
            quality,
        }
    }

    const PAGE: &str = r##"
<html><body>
  <a href="#top">Derivatives back to top link</a>
  <a href="/wiki/derivatives/">Derivatives: rules and examples</a>
  <a href="/x">Deriv</a>
  <a href="/wiki/unrelated">Completely unrelated article</a>
  <a href="/wiki/power-rule">Power rule for derivatives</a>
  <a href="/wiki/quotient">Quotient rule and derivatives of ratios</a>
</body></html>"##;

    #[test]
    fn keeps_relevant_descriptive_links() {
        let site_spec = site("https://brilliant.org", "brilliant.org", 0.8);
        let resources = parse_site_page(PAGE, &site_spec, &SearchTarget::new("derivatives"), 10);
        let urls: Vec<_> = resources.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://brilliant.org/wiki/derivatives/",
                "https://brilliant.org/wiki/power-rule",
                "https://brilliant.org/wiki/quotient",
            ]
        );
        assert!(resources.iter().all(|r| r.kind == ResourceKind::Article));
        assert!(resources.iter().all(|r| r.source_domain == "brilliant.org"));
    }

    #[tokio::test]
    async fn sweep_caps_total_across_sites() {
        let a = MockServer::start().await;
        let b = MockServer::start().await;
        for server in [&a, &b] {
            Mock::given(method("GET"))
                .and(path("/search"))
                .and(query_param("q", "derivatives"))
                .respond_with(ResponseTemplate::new(200).set_body_string(PAGE))
                .mount(server)
                .await;
        }

        let client = build_http_client(&DiscoveryConfig::default()).expect("client");
        let adapter = GeneralSitesAdapter::new(RateLimitedFetcher::new(
            "general_sites",
            client,
            50,
            Duration::from_secs(1),
        ))
        .with_sites(vec![site(&a.uri(), "a.org", 0.8), site(&b.uri(), "b.org", 0.7)]);

        let resources = adapter
            .search(&SearchTarget::new("derivatives"))
            .await
            .expect("search");
        assert_eq!(resources.len(), 4);
        assert_eq!(resources.iter().filter(|r| r.source_domain == "a.org").count(), 3);
        assert!((resources[3].quality_score - 0.7).abs() < 1e-9);
    }

    #[tokio::test]
    async fn failing_site_does_not_block_others() {
        let down = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&down)
            .await;
        let up = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(PAGE))
            .mount(&up)
            .await;

        let client = build_http_client(&DiscoveryConfig::default()).expect("client");
        let adapter = GeneralSitesAdapter::new(RateLimitedFetcher::new(
            "general_sites",
            client,
            50,
            Duration::from_secs(1),
        ))
        .with_sites(vec![site(&down.uri(), "down.org", 0.8), site(&up.uri(), "up.org", 0.7)]);

        let resources = adapter
            .search(&SearchTarget::new("derivatives"))
            .await
            .expect("search");
        assert_eq!(resources.len(), 3);
    }
}
