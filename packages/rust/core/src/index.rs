//! Full-text semantic index over stored course chunks.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use mathprereq_shared::{MathPrereqError, Result, ScoredChunk};
use mathprereq_storage::Storage;

use crate::services::SemanticIndex;

/// One chunk in an import file.
#[derive(Debug, Clone, Deserialize)]
pub struct ChunkRecord {
    #[serde(default)]
    pub concept: Option<String>,
    pub content: String,
    #[serde(default)]
    pub source: Option<String>,
}

/// [`SemanticIndex`] backed by the store's FTS5 table.
#[derive(Clone)]
pub struct FtsIndex {
    storage: Arc<Storage>,
}

impl FtsIndex {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    /// Store chunks, skipping blank ones. Returns how many were stored.
    pub async fn import(&self, records: &[ChunkRecord]) -> Result<usize> {
        let mut stored = 0;
        for record in records {
            let content = record.content.trim();
            if content.is_empty() {
                continue;
            }
            self.storage
                .insert_chunk(record.concept.as_deref(), content, record.source.as_deref())
                .await?;
            stored += 1;
        }
        info!(stored, skipped = records.len() - stored, "imported chunks");
        Ok(stored)
    }

    /// Load a JSON array of [`ChunkRecord`]s from `path` and import it.
    pub async fn import_file(&self, path: &Path) -> Result<usize> {
        let content = std::fs::read_to_string(path).map_err(|e| MathPrereqError::io(path, e))?;
        let records: Vec<ChunkRecord> = serde_json::from_str(&content)
            .map_err(|e| MathPrereqError::parse(format!("{}: {e}", path.display())))?;
        self.import(&records).await
    }
}

#[async_trait]
impl SemanticIndex for FtsIndex {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let k = u32::try_from(k).unwrap_or(u32::MAX);
        self.storage.search_chunks(query, k).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::temp_storage;

    fn record(concept: &str, content: &str) -> ChunkRecord {
        ChunkRecord {
            concept: Some(concept.into()),
            content: content.into(),
            source: None,
        }
    }

    #[tokio::test]
    async fn imported_chunks_are_searchable() {
        let index = FtsIndex::new(temp_storage().await);
        let stored = index
            .import(&[
                record("derivatives", "The power rule gives the derivative of x^n."),
                record("limits", "A limit describes behaviour near a point."),
                record("limits", "   "),
            ])
            .await
            .unwrap();
        assert_eq!(stored, 2);

        let hits = index.search("derivative power rule", 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].content.contains("power rule"));
        assert!(index.search("derivative", 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn import_file_reads_json_array() {
        let index = FtsIndex::new(temp_storage().await);
        let path = std::env::temp_dir().join(format!("mp_chunks_{}.json", uuid::Uuid::now_v7()));
        std::fs::write(
            &path,
            r#"[{"concept": "integration", "content": "Integration by parts reverses the product rule.", "source": "notes"}]"#,
        )
        .unwrap();

        assert_eq!(index.import_file(&path).await.unwrap(), 1);
        let hits = index.search("integration", 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn malformed_file_is_parse_error() {
        let index = FtsIndex::new(temp_storage().await);
        let path = std::env::temp_dir().join(format!("mp_chunks_{}.json", uuid::Uuid::now_v7()));
        std::fs::write(&path, "not json").unwrap();
        let err = index.import_file(&path).await.unwrap_err();
        assert!(matches!(err, MathPrereqError::Parse { .. }));
        let _ = std::fs::remove_file(&path);
    }
}
