//! Turso Embedded / libSQL storage layer.
//!
//! The [`Storage`] struct wraps a libSQL database holding query records,
//! discovered learning resources, and the text chunks behind full-text
//! retrieval.
//!
//! **Access rules:**
//! - Query records are insert-only.
//! - Resources are upserted by URL; re-discovery updates the row in place.
//! - Multi-statement writes run in one transaction under a write lock.
//! - Timestamps are fixed-width RFC 3339 UTC strings, so text order is time order.

mod migrations;

use std::collections::HashSet;
use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Connection, Database, Transaction, params};
use mathprereq_shared::{EducationalResource, MathPrereqError, Query, Result, ScoredChunk};
use serde::Serialize;
use tokio::sync::Mutex;

/// How a cache lookup matches stored queries against a term.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheMatch<'a> {
    /// An identified concept equals the term exactly.
    Concept(&'a str),
    /// An identified concept equals the term ignoring case.
    ConceptIgnoreCase(&'a str),
    /// The question text contains the term ignoring case.
    TextContains(&'a str),
}

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
    /// Serializes writers so a transaction never interleaves with other statements.
    write_lock: Mutex<()>,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| MathPrereqError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| MathPrereqError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| MathPrereqError::Storage(e.to_string()))?;

        let storage = Self {
            db,
            conn,
            readonly: false,
            write_lock: Mutex::new(()),
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database at `path` in read-only mode (stats and history).
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| MathPrereqError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| MathPrereqError::Storage(e.to_string()))?;

        Ok(Self {
            db,
            conn,
            readonly: true,
            write_lock: Mutex::new(()),
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        MathPrereqError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(MathPrereqError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    async fn begin(&self) -> Result<Transaction> {
        self.conn
            .transaction()
            .await
            .map_err(|e| MathPrereqError::Storage(e.to_string()))
    }

    // -----------------------------------------------------------------------
    // Query operations
    // -----------------------------------------------------------------------

    /// Persist a completed query and its concept index in one transaction.
    /// Inserting the same id twice is an error.
    pub async fn insert_query(&self, query: &Query) -> Result<()> {
        self.check_writable()?;
        let _guard = self.write_lock.lock().await;
        let tx = self.begin().await?;
        let result = insert_query_rows(&tx, query).await;
        finish(tx, result).await
    }

    /// Get a query by id.
    pub async fn get_query(&self, id: &str) -> Result<Option<Query>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {QUERY_COLUMNS} FROM queries q WHERE q.id = ?1"),
                params![id],
            )
            .await
            .map_err(|e| MathPrereqError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_query(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(MathPrereqError::Storage(e.to_string())),
        }
    }

    /// Successful, explained queries matching `by`, most recent first, at most `limit`.
    pub async fn find_cache_candidates(&self, by: CacheMatch<'_>, limit: u32) -> Result<Vec<Query>> {
        let (condition, term) = match by {
            CacheMatch::Concept(term) => (
                "EXISTS (SELECT 1 FROM query_concepts c WHERE c.query_id = q.id AND c.concept = ?1)",
                term.trim().to_string(),
            ),
            CacheMatch::ConceptIgnoreCase(term) => (
                "EXISTS (SELECT 1 FROM query_concepts c \
                 WHERE c.query_id = q.id AND c.concept_lower = ?1)",
                term.trim().to_lowercase(),
            ),
            CacheMatch::TextContains(term) => {
                ("instr(lower(q.text), ?1) > 0", term.trim().to_lowercase())
            }
        };
        if term.is_empty() {
            return Ok(Vec::new());
        }

        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {QUERY_COLUMNS} FROM queries q
                     WHERE q.success = 1
                       AND length(trim(q.explanation)) > 0
                       AND {condition}
                     ORDER BY q.timestamp DESC
                     LIMIT ?2"
                ),
                params![term.as_str(), limit],
            )
            .await
            .map_err(|e| MathPrereqError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_query(&row)?);
        }
        Ok(results)
    }

    /// Most recent queries regardless of outcome.
    pub async fn recent_queries(&self, limit: u32) -> Result<Vec<Query>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {QUERY_COLUMNS} FROM queries q ORDER BY q.timestamp DESC LIMIT ?1"),
                params![limit],
            )
            .await
            .map_err(|e| MathPrereqError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_query(&row)?);
        }
        Ok(results)
    }

    /// Delete queries recorded before `cutoff`. Returns the number removed.
    pub async fn purge_queries_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        self.check_writable()?;
        let _guard = self.write_lock.lock().await;
        let tx = self.begin().await?;
        let result = purge_query_rows(&tx, &timestamp(&cutoff)).await;
        finish(tx, result).await
    }

    // -----------------------------------------------------------------------
    // Statistics
    // -----------------------------------------------------------------------

    /// Aggregate counts over all persisted queries.
    pub async fn query_stats(&self) -> Result<QueryStats> {
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*), COALESCE(SUM(success), 0), COALESCE(AVG(processing_time_ms), 0.0)
                 FROM queries",
                params![],
            )
            .await
            .map_err(|e| MathPrereqError::Storage(e.to_string()))?;

        let row = rows
            .next()
            .await
            .map_err(|e| MathPrereqError::Storage(e.to_string()))?
            .ok_or_else(|| MathPrereqError::Storage("empty aggregate result".into()))?;

        let total = get_i64(&row, 0)? as u64;
        let successful = get_i64(&row, 1)? as u64;
        let success_rate = if total == 0 {
            0.0
        } else {
            successful as f64 * 100.0 / total as f64
        };
        Ok(QueryStats {
            total,
            successful,
            success_rate,
            avg_processing_ms: get_f64(&row, 2)?,
        })
    }

    /// Most frequently identified concepts, case-folded.
    pub async fn popular_concepts(&self, limit: u32) -> Result<Vec<ConceptCount>> {
        let mut rows = self
            .conn
            .query(
                "SELECT concept_lower, COUNT(*) AS n FROM query_concepts
                 GROUP BY concept_lower
                 ORDER BY n DESC, concept_lower ASC
                 LIMIT ?1",
                params![limit],
            )
            .await
            .map_err(|e| MathPrereqError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(ConceptCount {
                concept: get_string(&row, 0)?,
                count: get_i64(&row, 1)? as u64,
            });
        }
        Ok(results)
    }

    /// Per-day query volume since `since`, oldest day first.
    pub async fn query_trends(&self, since: DateTime<Utc>) -> Result<Vec<DailyQueries>> {
        let mut rows = self
            .conn
            .query(
                "SELECT substr(timestamp, 1, 10) AS day, COUNT(*), COALESCE(SUM(success), 0)
                 FROM queries
                 WHERE timestamp >= ?1
                 GROUP BY day
                 ORDER BY day",
                params![timestamp(&since)],
            )
            .await
            .map_err(|e| MathPrereqError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(DailyQueries {
                day: get_string(&row, 0)?,
                total: get_i64(&row, 1)? as u64,
                successful: get_i64(&row, 2)? as u64,
            });
        }
        Ok(results)
    }

    /// Coverage summary of the resource table.
    pub async fn resource_stats(&self) -> Result<ResourceStats> {
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(DISTINCT concept_id), COUNT(*), COALESCE(AVG(quality_score), 0.0)
                 FROM resources",
                params![],
            )
            .await
            .map_err(|e| MathPrereqError::Storage(e.to_string()))?;

        let row = rows
            .next()
            .await
            .map_err(|e| MathPrereqError::Storage(e.to_string()))?
            .ok_or_else(|| MathPrereqError::Storage("empty aggregate result".into()))?;

        Ok(ResourceStats {
            concepts: get_i64(&row, 0)? as u64,
            total: get_i64(&row, 1)? as u64,
            avg_quality: get_f64(&row, 2)?,
        })
    }

    // -----------------------------------------------------------------------
    // Resource operations
    // -----------------------------------------------------------------------

    /// Upsert resources keyed on URL. The existing row keeps its id.
    pub async fn upsert_resources(&self, resources: &[EducationalResource]) -> Result<usize> {
        self.check_writable()?;
        let _guard = self.write_lock.lock().await;
        let tx = self.begin().await?;
        let mut result = Ok(resources.len());
        for resource in resources {
            if let Err(e) = upsert_resource(&tx, resource).await {
                result = Err(e);
                break;
            }
        }
        finish(tx, result).await
    }

    /// Make `keep` the complete stored set for `concept_id`.
    ///
    /// Every row in `keep` is upserted, and the concept's rows whose URL is
    /// not in `keep` are deleted, all in one transaction. Returns the number
    /// of rows deleted.
    pub async fn replace_concept_resources(
        &self,
        concept_id: &str,
        keep: &[EducationalResource],
    ) -> Result<u64> {
        self.check_writable()?;
        let _guard = self.write_lock.lock().await;
        let tx = self.begin().await?;
        let result = replace_concept_rows(&tx, concept_id, keep).await;
        finish(tx, result).await
    }

    /// Whether any resource for `concept_id` was scraped at or after `since`.
    pub async fn has_recent_resources(&self, concept_id: &str, since: DateTime<Utc>) -> Result<bool> {
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*) FROM resources WHERE concept_id = ?1 AND scraped_at >= ?2",
                params![concept_id, timestamp(&since)],
            )
            .await
            .map_err(|e| MathPrereqError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(get_i64(&row, 0)? > 0),
            Ok(None) => Ok(false),
            Err(e) => Err(MathPrereqError::Storage(e.to_string())),
        }
    }

    /// Resources for a concept, best quality first, newest first among ties.
    pub async fn resources_for_concept(
        &self,
        concept_id: &str,
        limit: u32,
    ) -> Result<Vec<EducationalResource>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, concept_id, concept_name, title, url, description, kind, source_domain,
                        difficulty, quality_score, scraped_at, language, duration, view_count,
                        thumbnail_url, author, tags, is_verified
                 FROM resources WHERE concept_id = ?1
                 ORDER BY quality_score DESC, scraped_at DESC
                 LIMIT ?2",
                params![concept_id, limit],
            )
            .await
            .map_err(|e| MathPrereqError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_resource(&row)?);
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Chunk operations (FTS5 retrieval)
    // -----------------------------------------------------------------------

    /// Store a text chunk for retrieval. Returns its row id.
    pub async fn insert_chunk(
        &self,
        concept: Option<&str>,
        content: &str,
        source: Option<&str>,
    ) -> Result<i64> {
        self.check_writable()?;
        let _guard = self.write_lock.lock().await;
        self.conn
            .execute(
                "INSERT INTO chunks (concept, content, source, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![concept, content, source, timestamp(&Utc::now())],
            )
            .await
            .map_err(|e| MathPrereqError::Storage(e.to_string()))?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Full-text search over chunks. Any query term may match.
    pub async fn search_chunks(&self, query: &str, k: u32) -> Result<Vec<ScoredChunk>> {
        let Some(expr) = fts_match_expr(query) else {
            return Ok(Vec::new());
        };

        let mut rows = self
            .conn
            .query(
                "SELECT c.content, rank
                 FROM chunks_fts fts
                 JOIN chunks c ON c.id = fts.rowid
                 WHERE chunks_fts MATCH ?1
                 ORDER BY rank
                 LIMIT ?2",
                params![expr, k],
            )
            .await
            .map_err(|e| MathPrereqError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let content = get_string(&row, 0)?;
            // bm25 rank is lower-is-better; flip it so higher is better.
            let rank: f64 = row.get(1).unwrap_or(0.0);
            results.push(ScoredChunk {
                content,
                score: -rank,
            });
        }
        Ok(results)
    }
}

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// Aggregate query statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryStats {
    pub total: u64,
    pub successful: u64,
    /// Percentage in `[0, 100]`.
    pub success_rate: f64,
    pub avg_processing_ms: f64,
}

/// A concept and how many queries identified it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConceptCount {
    pub concept: String,
    pub count: u64,
}

/// Query volume for one UTC day (`YYYY-MM-DD`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyQueries {
    pub day: String,
    pub total: u64,
    pub successful: u64,
}

/// Resource table coverage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceStats {
    pub concepts: u64,
    pub total: u64,
    pub avg_quality: f64,
}

// ---------------------------------------------------------------------------
// Transactional writes
// ---------------------------------------------------------------------------

/// Commit on success, roll back on failure.
async fn finish<T>(tx: Transaction, result: Result<T>) -> Result<T> {
    match result {
        Ok(value) => {
            tx.commit()
                .await
                .map_err(|e| MathPrereqError::Storage(e.to_string()))?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback) = tx.rollback().await {
                tracing::warn!(error = %rollback, "rollback failed");
            }
            Err(e)
        }
    }
}

async fn insert_query_rows(conn: &Connection, query: &Query) -> Result<()> {
    conn.execute(
        "INSERT INTO queries (id, user_id, text, identified_concepts, prerequisite_path,
                              explanation, retrieved_context, timestamp, processing_time_ms,
                              success, error_message, steps, model)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            query.id.to_string(),
            query.user_id.as_deref(),
            query.text.as_str(),
            to_json(&query.identified_concepts)?,
            to_json(&query.prerequisite_path)?,
            query.explanation.as_str(),
            to_json(&query.retrieved_context)?,
            timestamp(&query.timestamp),
            query.processing_time_ms as i64,
            i64::from(query.success),
            query.error_message.as_deref(),
            to_json(&query.steps)?,
            query.model.as_deref(),
        ],
    )
    .await
    .map_err(|e| MathPrereqError::Storage(e.to_string()))?;

    for (position, concept) in query.identified_concepts.iter().enumerate() {
        conn.execute(
            "INSERT INTO query_concepts (query_id, position, concept, concept_lower)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                query.id.to_string(),
                position as i64,
                concept.as_str(),
                concept.to_lowercase(),
            ],
        )
        .await
        .map_err(|e| MathPrereqError::Storage(e.to_string()))?;
    }
    Ok(())
}

async fn purge_query_rows(conn: &Connection, cutoff: &str) -> Result<u64> {
    conn.execute(
        "DELETE FROM query_concepts
         WHERE query_id IN (SELECT id FROM queries WHERE timestamp < ?1)",
        params![cutoff],
    )
    .await
    .map_err(|e| MathPrereqError::Storage(e.to_string()))?;

    conn.execute("DELETE FROM queries WHERE timestamp < ?1", params![cutoff])
        .await
        .map_err(|e| MathPrereqError::Storage(e.to_string()))
}

async fn upsert_resource(conn: &Connection, r: &EducationalResource) -> Result<()> {
    conn.execute(
        "INSERT INTO resources (id, concept_id, concept_name, title, url, description, kind,
                                source_domain, difficulty, quality_score, scraped_at, language,
                                duration, view_count, thumbnail_url, author, tags, is_verified)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)
         ON CONFLICT(url) DO UPDATE SET
           concept_id = excluded.concept_id,
           concept_name = excluded.concept_name,
           title = excluded.title,
           description = excluded.description,
           kind = excluded.kind,
           source_domain = excluded.source_domain,
           difficulty = excluded.difficulty,
           quality_score = excluded.quality_score,
           scraped_at = excluded.scraped_at,
           language = excluded.language,
           duration = excluded.duration,
           view_count = excluded.view_count,
           thumbnail_url = excluded.thumbnail_url,
           author = excluded.author,
           tags = excluded.tags,
           is_verified = excluded.is_verified",
        params![
            r.id.as_str(),
            r.concept_id.as_str(),
            r.concept_name.as_str(),
            r.title.as_str(),
            r.url.as_str(),
            r.description.as_str(),
            r.kind.as_str(),
            r.source_domain.as_str(),
            r.difficulty.as_str(),
            mathprereq_shared::clamp_quality(r.quality_score),
            timestamp(&r.scraped_at),
            r.language.as_str(),
            r.duration.as_deref(),
            r.view_count.map(|v| v as i64),
            r.thumbnail_url.as_deref(),
            r.author.as_deref(),
            to_json(&r.tags)?,
            i64::from(r.is_verified),
        ],
    )
    .await
    .map_err(|e| MathPrereqError::Storage(e.to_string()))?;
    Ok(())
}

async fn replace_concept_rows(
    conn: &Connection,
    concept_id: &str,
    keep: &[EducationalResource],
) -> Result<u64> {
    for resource in keep {
        upsert_resource(conn, resource).await?;
    }

    let keep_urls: HashSet<&str> = keep.iter().map(|r| r.url.as_str()).collect();
    let mut rows = conn
        .query(
            "SELECT url FROM resources WHERE concept_id = ?1",
            params![concept_id],
        )
        .await
        .map_err(|e| MathPrereqError::Storage(e.to_string()))?;
    let mut dropped = Vec::new();
    while let Ok(Some(row)) = rows.next().await {
        let url = get_string(&row, 0)?;
        if !keep_urls.contains(url.as_str()) {
            dropped.push(url);
        }
    }

    let mut removed = 0;
    for url in &dropped {
        removed += conn
            .execute("DELETE FROM resources WHERE url = ?1", params![url.as_str()])
            .await
            .map_err(|e| MathPrereqError::Storage(e.to_string()))?;
    }
    Ok(removed)
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

const QUERY_COLUMNS: &str = "q.id, q.user_id, q.text, q.identified_concepts, q.prerequisite_path, \
     q.explanation, q.retrieved_context, q.timestamp, q.processing_time_ms, q.success, \
     q.error_message, q.steps, q.model";

/// Format a timestamp for storage (fixed width, millisecond precision, `Z`).
fn timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| MathPrereqError::Storage(format!("invalid date: {e}")))
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| MathPrereqError::Storage(e.to_string()))
}

fn from_json<T: serde::de::DeserializeOwned>(s: &str) -> Result<T> {
    serde_json::from_str(s).map_err(|e| MathPrereqError::Storage(format!("invalid JSON column: {e}")))
}

fn get_string(row: &libsql::Row, idx: i32) -> Result<String> {
    row.get::<String>(idx)
        .map_err(|e| MathPrereqError::Storage(e.to_string()))
}

fn get_i64(row: &libsql::Row, idx: i32) -> Result<i64> {
    row.get::<i64>(idx)
        .map_err(|e| MathPrereqError::Storage(e.to_string()))
}

fn get_f64(row: &libsql::Row, idx: i32) -> Result<f64> {
    row.get::<f64>(idx)
        .map_err(|e| MathPrereqError::Storage(e.to_string()))
}

/// Convert a database row to a [`Query`].
fn row_to_query(row: &libsql::Row) -> Result<Query> {
    let id = get_string(row, 0)?;
    Ok(Query {
        id: id
            .parse()
            .map_err(|e| MathPrereqError::Storage(format!("invalid query id {id}: {e}")))?,
        user_id: row.get::<String>(1).ok(),
        text: get_string(row, 2)?,
        identified_concepts: from_json(&get_string(row, 3)?)?,
        prerequisite_path: from_json(&get_string(row, 4)?)?,
        explanation: get_string(row, 5)?,
        retrieved_context: from_json(&get_string(row, 6)?)?,
        timestamp: parse_timestamp(&get_string(row, 7)?)?,
        processing_time_ms: get_i64(row, 8)? as u64,
        success: get_i64(row, 9)? != 0,
        error_message: row.get::<String>(10).ok(),
        steps: from_json(&get_string(row, 11)?)?,
        model: row.get::<String>(12).ok(),
    })
}

/// Convert a database row to an [`EducationalResource`].
fn row_to_resource(row: &libsql::Row) -> Result<EducationalResource> {
    Ok(EducationalResource {
        id: get_string(row, 0)?,
        concept_id: get_string(row, 1)?,
        concept_name: get_string(row, 2)?,
        title: get_string(row, 3)?,
        url: get_string(row, 4)?,
        description: get_string(row, 5)?,
        kind: get_string(row, 6)?.parse()?,
        source_domain: get_string(row, 7)?,
        difficulty: get_string(row, 8)?.parse()?,
        quality_score: get_f64(row, 9)?,
        scraped_at: parse_timestamp(&get_string(row, 10)?)?,
        language: get_string(row, 11)?,
        duration: row.get::<String>(12).ok(),
        view_count: row.get::<i64>(13).ok().map(|v| v as u64),
        thumbnail_url: row.get::<String>(14).ok(),
        author: row.get::<String>(15).ok(),
        tags: from_json(&get_string(row, 16)?)?,
        is_verified: get_i64(row, 17)? != 0,
    })
}

/// Build an FTS5 `MATCH` expression that ORs the query's alphanumeric terms.
///
/// Each term is quoted so FTS operators in user text are treated as words.
fn fts_match_expr(query: &str) -> Option<String> {
    let mut terms: Vec<String> = Vec::new();
    for term in query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
    {
        if !terms.contains(&term) {
            terms.push(term);
        }
    }
    if terms.is_empty() {
        return None;
    }
    Some(
        terms
            .iter()
            .map(|t| format!("\"{t}\""))
            .collect::<Vec<_>>()
            .join(" OR "),
    )
}
