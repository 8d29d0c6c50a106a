//! Merge-time cleanup of discovered resources: URL dedup and the quality filter.

use std::collections::{HashMap, HashSet};

use mathprereq_shared::{EducationalResource, QualityPolicy, ResourceKind};
use tracing::debug;

/// Drop resources whose URL was already seen. The first occurrence wins.
pub fn dedup_by_url(resources: Vec<EducationalResource>) -> Vec<EducationalResource> {
    let mut seen = HashSet::new();
    resources
        .into_iter()
        .filter(|r| seen.insert(r.url.clone()))
        .collect()
}

#[derive(Default)]
struct KindCounts {
    total: usize,
    videos: usize,
    articles: usize,
}

/// Keep the best resources per concept under `policy`.
///
/// Resources are visited best score first, newest first among equal
/// scores. Below-threshold items are dropped, each concept is capped in
/// total, and videos and text lessons (articles plus tutorials) have their
/// own caps. References are bounded only by the per-concept total.
pub fn apply_quality_filter(
    mut resources: Vec<EducationalResource>,
    policy: &QualityPolicy,
) -> Vec<EducationalResource> {
    resources.sort_by(|a, b| {
        b.quality_score
            .total_cmp(&a.quality_score)
            .then_with(|| b.scraped_at.cmp(&a.scraped_at))
    });

    let mut counts: HashMap<String, KindCounts> = HashMap::new();
    let mut kept = Vec::new();

    for resource in resources {
        if resource.quality_score < policy.min_score {
            continue;
        }
        let c = counts.entry(resource.concept_id.clone()).or_default();
        if c.total >= policy.max_per_concept {
            continue;
        }
        match resource.kind {
            ResourceKind::Video if c.videos >= policy.max_videos => continue,
            ResourceKind::Article | ResourceKind::Tutorial if c.articles >= policy.max_articles => {
                continue;
            }
            ResourceKind::Video => c.videos += 1,
            ResourceKind::Article | ResourceKind::Tutorial => c.articles += 1,
            ResourceKind::Reference => {}
        }
        c.total += 1;
        kept.push(resource);
    }
    kept
}

/// Dedup then filter, as applied to one concept's merged adapter output.
pub fn post_process(
    resources: Vec<EducationalResource>,
    policy: &QualityPolicy,
) -> Vec<EducationalResource> {
    let merged = resources.len();
    let unique = dedup_by_url(resources);
    let unique_count = unique.len();
    let kept = apply_quality_filter(unique, policy);
    debug!(merged, unique = unique_count, kept = kept.len(), "post-processed resources");
    kept
}
