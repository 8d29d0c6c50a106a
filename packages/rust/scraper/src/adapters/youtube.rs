//! YouTube search results, parsed from the embedded `ytInitialData` JSON.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, instrument, warn};
use url::Url;

use mathprereq_shared::{Difficulty, EducationalResource, MathPrereqError, ResourceKind, Result};

use super::{SearchTarget, SourceAdapter, search_terms, truncate_text};
use crate::fetcher::RateLimitedFetcher;

const DEFAULT_BASE_URL: &str = "https://www.youtube.com";
const INITIAL_DATA_MARKER: &str = "var ytInitialData = ";

/// Search terms tried per concept.
const MAX_TERMS: usize = 2;
/// Educational videos taken from one results page.
const MAX_PER_PAGE: usize = 3;
/// Total videos contributed per concept.
const MAX_RESULTS: usize = 5;

const EDUCATIONAL_KEYWORDS: &[&str] = &[
    "tutorial", "explained", "learn", "how to", "lesson", "lecture", "calculus",
    "mathematics", "math", "derivative", "integral", "step by step", "example",
    "practice", "course", "education",
];

const EDUCATIONAL_CHANNELS: &[&str] = &[
    "khan academy", "patrickjmt", "professor leonard", "organic chemistry tutor",
    "mathologer", "blackpenredpen", "bprp", "krista king math", "math and science",
    "eddie woo", "nancy pi", "professor dave explains", "3blue1brown",
];

const REPUTABLE_CHANNELS: &[&str] = &[
    "khan academy", "patrickjmt", "professor leonard", "organic chemistry tutor",
    "mathologer", "3blue1brown",
];

const VERIFIED_CHANNELS: &[&str] = &[
    "Khan Academy", "PatrickJMT", "Professor Leonard", "Organic Chemistry Tutor",
    "Mathologer", "3Blue1Brown",
];

const BEGINNER_KEYWORDS: &[&str] = &[
    "intro", "basic", "beginner", "simple", "easy", "start", "fundamental",
];

const ADVANCED_KEYWORDS: &[&str] = &[
    "advanced", "complex", "graduate", "proof", "theorem", "rigorous",
];

const MATH_TAGS: &[&str] = &[
    "calculus", "derivative", "integral", "limit", "function", "algebra", "geometry",
    "trigonometry", "statistics", "probability",
];

static DIGITS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\d,]+").expect("valid digits regex"));

/// One `videoRenderer` entry from a results page.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct VideoData {
    pub video_id: String,
    pub title: String,
    pub description: String,
    pub duration: String,
    pub view_count: String,
    pub channel: String,
    pub thumbnail_url: String,
}

/// Video-platform adapter.
pub struct YouTubeAdapter {
    fetcher: RateLimitedFetcher,
    base_url: String,
}

impl YouTubeAdapter {
    pub fn new(fetcher: RateLimitedFetcher) -> Self {
        Self {
            fetcher,
            base_url: DEFAULT_BASE_URL.into(),
        }
    }

    /// Point searches at a different host (mock servers in tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn results_url(&self, term: &str) -> Result<String> {
        Url::parse_with_params(
            &format!("{}/results", self.base_url),
            &[("search_query", term)],
        )
        .map(String::from)
        .map_err(|e| MathPrereqError::parse(format!("bad search url: {e}")))
    }
}

#[async_trait]
impl SourceAdapter for YouTubeAdapter {
    fn name(&self) -> &'static str {
        "youtube"
    }

    #[instrument(skip_all, fields(source = "youtube", concept = %target.concept_name))]
    async fn search(&self, target: &SearchTarget) -> Result<Vec<EducationalResource>> {
        let mut resources = Vec::new();

        for term in search_terms(&target.concept_name).iter().take(MAX_TERMS) {
            let url = self.results_url(term)?;
            match self.fetcher.get_text(&url).await {
                Ok(body) => {
                    let videos = parse_results_page(&body);
                    debug!(term = %term, videos = videos.len(), "parsed results page");
                    resources.extend(videos_to_resources(&videos, target));
                }
                Err(e) => warn!(term = %term, error = %e, "search term failed"),
            }
        }

        resources.truncate(MAX_RESULTS);
        Ok(resources)
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Extract all videos from a results page. Unparseable pages yield nothing.
pub(crate) fn parse_results_page(html: &str) -> Vec<VideoData> {
    let Some(start) = html.find(INITIAL_DATA_MARKER) else {
        return Vec::new();
    };
    let json = &html[start + INITIAL_DATA_MARKER.len()..];

    // The object is followed by `;</script>`; read exactly one JSON value.
    let data = match serde_json::Deserializer::from_str(json)
        .into_iter::<Value>()
        .next()
    {
        Some(Ok(value)) => value,
        _ => return Vec::new(),
    };

    let Some(sections) = data
        .pointer("/contents/twoColumnSearchResultsRenderer/primaryContents/sectionListRenderer/contents")
        .and_then(Value::as_array)
    else {
        return Vec::new();
    };

    sections
        .iter()
        .filter_map(|section| section.pointer("/itemSectionRenderer/contents"))
        .filter_map(Value::as_array)
        .flatten()
        .filter_map(|item| item.get("videoRenderer"))
        .map(|renderer| VideoData {
            video_id: renderer
                .get("videoId")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            title: text_of(renderer.get("title")),
            description: text_of(renderer.get("descriptionSnippet")),
            duration: accessibility_label(renderer.get("lengthText")),
            view_count: text_of(renderer.get("viewCountText")),
            channel: text_of(renderer.get("ownerText")),
            thumbnail_url: renderer
                .pointer("/thumbnail/thumbnails")
                .and_then(Value::as_array)
                .and_then(|thumbs| thumbs.last())
                .and_then(|t| t.get("url"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        })
        .filter(|v| !v.video_id.is_empty() && !v.title.is_empty())
        .collect()
}

/// Text from a `{runs: [{text}]}` or `{simpleText}` object.
fn text_of(value: Option<&Value>) -> String {
    let Some(value) = value else {
        return String::new();
    };
    if let Some(runs) = value.get("runs").and_then(Value::as_array) {
        return runs
            .iter()
            .filter_map(|run| run.get("text").and_then(Value::as_str))
            .collect();
    }
    value
        .get("simpleText")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn accessibility_label(value: Option<&Value>) -> String {
    value
        .and_then(|v| v.pointer("/accessibility/accessibilityData/label"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| text_of(value))
}

fn videos_to_resources(videos: &[VideoData], target: &SearchTarget) -> Vec<EducationalResource> {
    videos
        .iter()
        .filter(|v| is_educational(v))
        .take(MAX_PER_PAGE)
        .map(|video| {
            let mut resource = EducationalResource::new(
                &target.concept_name,
                video.title.clone(),
                format!("https://www.youtube.com/watch?v={}", video.video_id),
                ResourceKind::Video,
                "youtube.com",
            )
            .with_description(truncate_text(&video.description, 500))
            .with_difficulty(assess_difficulty(video))
            .with_quality(quality_score(video));

            resource.concept_id = target.concept_id.clone();
            resource.duration = non_empty(&video.duration);
            resource.thumbnail_url = non_empty(&video.thumbnail_url);
            resource.author = non_empty(&video.channel);
            resource.view_count = Some(parse_view_count(&video.view_count)).filter(|&n| n > 0);
            resource.tags = video_tags(video);
            resource.is_verified = VERIFIED_CHANNELS
                .iter()
                .any(|c| c.eq_ignore_ascii_case(video.channel.trim()));
            resource
        })
        .collect()
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}

// ---------------------------------------------------------------------------
// Heuristics
// ---------------------------------------------------------------------------

pub(crate) fn is_educational(video: &VideoData) -> bool {
    let channel = video.channel.to_lowercase();
    let content = format!(
        "{} {} {}",
        video.title.to_lowercase(),
        channel,
        video.description.to_lowercase()
    );
    EDUCATIONAL_KEYWORDS.iter().any(|k| content.contains(k))
        || EDUCATIONAL_CHANNELS.iter().any(|c| channel.contains(c))
}

pub(crate) fn assess_difficulty(video: &VideoData) -> Difficulty {
    let content = format!("{} {}", video.title, video.description).to_lowercase();
    let beginner = BEGINNER_KEYWORDS.iter().filter(|k| content.contains(*k)).count();
    let advanced = ADVANCED_KEYWORDS.iter().filter(|k| content.contains(*k)).count();
    match beginner.cmp(&advanced) {
        std::cmp::Ordering::Greater => Difficulty::Beginner,
        std::cmp::Ordering::Less => Difficulty::Advanced,
        std::cmp::Ordering::Equal => Difficulty::Intermediate,
    }
}

/// Baseline 0.5 plus reputation, title, length, and popularity bonuses.
pub(crate) fn quality_score(video: &VideoData) -> f64 {
    let mut score: f64 = 0.5;

    let channel = video.channel.to_lowercase();
    if REPUTABLE_CHANNELS.iter().any(|c| channel.contains(c)) {
        score += 0.3;
    }

    let title = video.title.to_lowercase();
    if video.title.chars().count() > 20 {
        score += 0.1;
    }
    if title.contains("explained") || title.contains("tutorial") {
        score += 0.1;
    }

    // Durations mentioning 1x or 2x minutes tend to be full lessons.
    if video.duration.contains('1') || video.duration.contains('2') {
        score += 0.1;
    }

    if parse_view_count(&video.view_count) > 10_000 {
        score += 0.1;
    }

    score.min(1.0)
}

/// First number in a view-count string, e.g. `1,234 views` is 1234.
pub(crate) fn parse_view_count(text: &str) -> u64 {
    DIGITS
        .find(text)
        .and_then(|m| m.as_str().replace(',', "").parse().ok())
        .unwrap_or(0)
}

fn video_tags(video: &VideoData) -> Vec<String> {
    let content = format!("{} {}", video.title, video.description).to_lowercase();
    MATH_TAGS
        .iter()
        .filter(|t| content.contains(*t))
        .map(|t| t.to_string())
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

    fn renderer(id: &str, title: &str, channel: &str, views: &str, length: &str) -> Value {
        serde_json::json!({
            "videoRenderer": {
                "videoId": id,
                "title": { "runs": [{ "text": title }] },
                "descriptionSnippet": { "runs": [{ "text": "Learn " }, { "text": "step by step" }] },
                "lengthText": {
                    "accessibility": { "accessibilityData": { "label": length } },
                    "simpleText": "12:05"
                },
                "viewCountText": { "simpleText": views },
                "ownerText": { "runs": [{ "text": channel }] },
                "thumbnail": { "thumbnails": [
                    { "url": "https://i.ytimg.com/small.jpg" },
                    { "url": "https://i.ytimg.com/large.jpg" }
                ]}
            }
        })
    }

    fn results_page(items: Vec<Value>) -> String {
        let data = serde_json::json!({
            "contents": { "twoColumnSearchResultsRenderer": { "primaryContents": {
                "sectionListRenderer": { "contents": [
                    { "itemSectionRenderer": { "contents": items } },
                    { "continuationItemRenderer": {} }
                ]}
            }}}
        });
        format!(
            "<html><script>window.x = 1;</script><script>{INITIAL_DATA_MARKER}{data};</script></html>"
        )
    }

    fn target() -> SearchTarget {
        SearchTarget::new("limits")
    }

    #[test]
    fn parses_video_renderers() {
        let page = results_page(vec![
            renderer("abc", "Limits Explained", "Khan Academy", "1,234,567 views", "12 minutes, 5 seconds"),
            serde_json::json!({ "shelfRenderer": {} }),
            renderer("", "No id", "x", "", ""),
        ]);
        let videos = parse_results_page(&page);
        assert_eq!(videos.len(), 1);
        let v = &videos[0];
        assert_eq!(v.video_id, "abc");
        assert_eq!(v.title, "Limits Explained");
        assert_eq!(v.description, "Learn step by step");
        assert_eq!(v.duration, "12 minutes, 5 seconds");
        assert_eq!(v.view_count, "1,234,567 views");
        assert_eq!(v.thumbnail_url, "https://i.ytimg.com/large.jpg");
    }

    #[test]
    fn page_without_data_yields_nothing() {
        assert!(parse_results_page("<html>blocked</html>").is_empty());
        assert!(parse_results_page(&format!("{INITIAL_DATA_MARKER}{{broken")).is_empty());
    }

    #[test]
    fn view_count_parsing() {
        assert_eq!(parse_view_count("1,234,567 views"), 1_234_567);
        assert_eq!(parse_view_count("No views"), 0);
        assert_eq!(parse_view_count(""), 0);
    }

    #[test]
    fn quality_rewards_reputation_and_popularity() {
        let best = VideoData {
            title: "Limits Explained for Beginners".into(),
            channel: "3Blue1Brown".into(),
            duration: "12 minutes".into(),
            view_count: "2,000,000 views".into(),
            ..Default::default()
        };
        assert_eq!(quality_score(&best), 1.0);

        let plain = VideoData {
            title: "limits".into(),
            channel: "someone".into(),
            duration: "5 minutes".into(),
            view_count: "30 views".into(),
            ..Default::default()
        };
        assert!((quality_score(&plain) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn difficulty_from_keywords() {
        let intro = VideoData {
            title: "Intro to limits, the basic idea".into(),
            ..Default::default()
        };
        assert_eq!(assess_difficulty(&intro), Difficulty::Beginner);
        let proof = VideoData {
            title: "Rigorous epsilon-delta proof".into(),
            ..Default::default()
        };
        assert_eq!(assess_difficulty(&proof), Difficulty::Advanced);
        assert_eq!(assess_difficulty(&VideoData::default()), Difficulty::Intermediate);
    }

    #[test]
    fn non_educational_videos_are_dropped() {
        let vlog = VideoData {
            video_id: "v".into(),
            title: "My trip vlog".into(),
            channel: "travel".into(),
            ..Default::default()
        };
        assert!(!is_educational(&vlog));
        assert!(videos_to_resources(&[vlog], &target()).is_empty());
    }

    #[test]
    fn resources_carry_video_fields() {
        let videos = parse_results_page(&results_page(vec![renderer(
            "abc",
            "Limits Explained",
            "Khan Academy",
            "20,000 views",
            "9 minutes",
        )]));
        let resources = videos_to_resources(&videos, &target());
        assert_eq!(resources.len(), 1);
        let r = &resources[0];
        assert_eq!(r.url, "https://www.youtube.com/watch?v=abc");
        assert_eq!(r.kind, ResourceKind::Video);
        assert_eq!(r.view_count, Some(20_000));
        assert_eq!(r.author.as_deref(), Some("Khan Academy"));
        assert!(r.is_verified);
        assert!(r.tags.contains(&"limit".to_string()));
        // 0.5 + channel 0.3 + "explained" 0.1 + views 0.1
        assert!((r.quality_score - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn search_caps_results_across_terms() {
        let server = MockServer::start().await;
        let items: Vec<Value> = (0..4)
            .map(|i| renderer(&format!("v{i}"), "Limits tutorial", "Khan Academy", "10 views", "3 minutes"))
            .collect();
        let other: Vec<Value> = (4..8)
            .map(|i| renderer(&format!("v{i}"), "Limits tutorial", "Khan Academy", "10 views", "3 minutes"))
            .collect();
        Mock::given(method("GET"))
            .and(path("/results"))
            .and(query_param("search_query", "Limits"))
            .respond_with(ResponseTemplate::new(200).set_body_string(results_page(items)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/results"))
            .and(query_param("search_query", "Limits mathematics"))
            .respond_with(ResponseTemplate::new(200).set_body_string(results_page(other)))
            .mount(&server)
            .await;

        let client = build_http_client(&DiscoveryConfig::default()).expect("client");
        let adapter = YouTubeAdapter::new(RateLimitedFetcher::new(
            "youtube",
            client,
            50,
            Duration::from_secs(1),
        ))
        .with_base_url(server.uri());

        let resources = adapter.search(&target()).await.expect("search");
        // Three per page, five overall.
        assert_eq!(resources.len(), 5);
        assert_eq!(resources[0].url, "https://www.youtube.com/watch?v=v0");
        assert_eq!(resources[3].url, "https://www.youtube.com/watch?v=v4");
    }

    #[tokio::test]
    async fn failed_terms_are_skipped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let client = build_http_client(&DiscoveryConfig::default()).expect("client");
        let adapter = YouTubeAdapter::new(RateLimitedFetcher::new(
            "youtube",
            client,
            50,
            Duration::from_secs(1),
        ))
        .with_base_url(server.uri());

        assert!(adapter.search(&target()).await.expect("search").is_empty());
    }
}
