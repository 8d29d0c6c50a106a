//! Stored learning resources for a set of concepts.

use tracing::{debug, warn};

use mathprereq_shared::{EducationalResource, Result, concept_id};
use mathprereq_storage::Storage;

use crate::pipeline::QueryService;

impl QueryService {
    /// Best resources across `names`, highest quality first, at most `limit`.
    pub async fn get_resources_for_concepts(
        &self,
        names: &[String],
        limit: usize,
    ) -> Result<Vec<EducationalResource>> {
        resources_for_concepts(&self.storage, names, limit).await
    }
}

/// Stored resources for `names`, highest quality first, at most `limit`.
///
/// A concept whose lookup fails is skipped with a warning.
pub async fn resources_for_concepts(
    storage: &Storage,
    names: &[String],
    limit: usize,
) -> Result<Vec<EducationalResource>> {
    let per_concept = u32::try_from(limit).unwrap_or(u32::MAX);
    let mut all = Vec::new();

    for name in names {
        let id = concept_id(name.trim());
        if id.is_empty() {
            continue;
        }
        match storage.resources_for_concept(&id, per_concept).await {
            Ok(found) => {
                debug!(concept = %name, count = found.len(), "resources loaded");
                all.extend(found);
            }
            Err(e) => warn!(concept = %name, error = %e, "resource lookup failed"),
        }
    }

    all.sort_by(|a, b| b.quality_score.total_cmp(&a.quality_score));
    all.truncate(limit);
    Ok(all)
}

#[cfg(test)]
mod tests {
    use crate::testing::{FakeGraph, FakeIndex, FakeLlm, Harness};
    use mathprereq_shared::{EducationalResource, ResourceKind};

    fn res(concept: &str, url: &str, quality: f64) -> EducationalResource {
        EducationalResource::new(concept, "title", url, ResourceKind::Article, "example.org")
            .with_quality(quality)
    }

    #[tokio::test]
    async fn merges_sorts_and_truncates() {
        let h = Harness::new(FakeLlm::default(), FakeGraph::default(), FakeIndex::empty()).await;
        h.storage
            .upsert_resources(&[
                res("chain rule", "https://a/1", 0.5),
                res("chain rule", "https://a/2", 0.9),
                res("limits", "https://b/1", 0.7),
                res("limits", "https://b/2", 0.95),
                res("series", "https://c/1", 1.0),
            ])
            .await
            .unwrap();

        let names = vec!["Chain Rule".to_string(), "limits".to_string(), "unknown".to_string()];
        let found = h.service.get_resources_for_concepts(&names, 3).await.unwrap();
        let urls: Vec<_> = found.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, vec!["https://b/2", "https://a/2", "https://b/1"]);
    }

    #[tokio::test]
    async fn no_resources_is_empty_not_error() {
        let h = Harness::new(FakeLlm::default(), FakeGraph::default(), FakeIndex::empty()).await;
        let found = h
            .service
            .get_resources_for_concepts(&["integrals".to_string()], 10)
            .await
            .unwrap();
        assert!(found.is_empty());
    }
}
