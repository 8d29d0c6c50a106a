//! SQL migration definitions for the MathPrereq database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Initial schema: queries, query_concepts, resources",
            sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- One row per resolved (or failed) question
CREATE TABLE IF NOT EXISTS queries (
    id                  TEXT PRIMARY KEY,
    user_id             TEXT,
    text                TEXT NOT NULL,
    identified_concepts TEXT NOT NULL,
    prerequisite_path   TEXT NOT NULL,
    explanation         TEXT NOT NULL DEFAULT '',
    retrieved_context   TEXT NOT NULL,
    timestamp           TEXT NOT NULL,
    processing_time_ms  INTEGER NOT NULL,
    success             INTEGER NOT NULL,
    error_message       TEXT,
    steps               TEXT NOT NULL,
    model               TEXT
);

CREATE INDEX IF NOT EXISTS idx_queries_timestamp ON queries(timestamp);

-- Identified concepts, one row each, for cache lookup and popularity
CREATE TABLE IF NOT EXISTS query_concepts (
    query_id      TEXT NOT NULL REFERENCES queries(id) ON DELETE CASCADE,
    position      INTEGER NOT NULL,
    concept       TEXT NOT NULL,
    concept_lower TEXT NOT NULL,
    PRIMARY KEY (query_id, position)
);

CREATE INDEX IF NOT EXISTS idx_query_concepts_lower ON query_concepts(concept_lower);

-- Discovered learning resources, unique by URL
CREATE TABLE IF NOT EXISTS resources (
    id            TEXT PRIMARY KEY,
    concept_id    TEXT NOT NULL,
    concept_name  TEXT NOT NULL,
    title         TEXT NOT NULL,
    url           TEXT NOT NULL UNIQUE,
    description   TEXT NOT NULL DEFAULT '',
    kind          TEXT NOT NULL,
    source_domain TEXT NOT NULL,
    difficulty    TEXT NOT NULL,
    quality_score REAL NOT NULL,
    scraped_at    TEXT NOT NULL,
    language      TEXT NOT NULL DEFAULT 'en',
    duration      TEXT,
    view_count    INTEGER,
    thumbnail_url TEXT,
    author        TEXT,
    tags          TEXT NOT NULL DEFAULT '[]',
    is_verified   INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_resources_concept ON resources(concept_id, scraped_at);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
        Migration {
            version: 2,
            description: "Context chunks with FTS5 for semantic retrieval",
            sql: r#"
CREATE TABLE IF NOT EXISTS chunks (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    concept    TEXT,
    content    TEXT NOT NULL,
    source     TEXT,
    created_at TEXT NOT NULL
);

CREATE VIRTUAL TABLE IF NOT EXISTS chunks_fts USING fts5(
    content,
    concept,
    content=chunks,
    content_rowid=id
);

-- Triggers to keep FTS in sync with chunks table
CREATE TRIGGER IF NOT EXISTS chunks_fts_insert AFTER INSERT ON chunks BEGIN
    INSERT INTO chunks_fts(rowid, content, concept)
    VALUES (new.id, new.content, new.concept);
END;

CREATE TRIGGER IF NOT EXISTS chunks_fts_delete AFTER DELETE ON chunks BEGIN
    INSERT INTO chunks_fts(chunks_fts, rowid, content, concept)
    VALUES ('delete', old.id, old.content, old.concept);
END;

CREATE TRIGGER IF NOT EXISTS chunks_fts_update AFTER UPDATE ON chunks BEGIN
    INSERT INTO chunks_fts(chunks_fts, rowid, content, concept)
    VALUES ('delete', old.id, old.content, old.concept);
    INSERT INTO chunks_fts(rowid, content, concept)
    VALUES (new.id, new.content, new.concept);
END;

INSERT INTO schema_migrations (version) VALUES (2);
"#,
        },
    ]
}
