//! SQLite-backed primary store for documents, tokens and settings.
//!
//! One connection guarded by one mutex; every public operation takes the
//! lock exactly once, so callers never observe partially applied writes and
//! the adapter offers the single-writer discipline the engine relies on.
//! Statements go through the connection's prepared-statement cache.

use std::path::Path;

use ngram_model::{Count, DocId, TokenId};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

use crate::{PostingsRecord, StoreError, TokenInfo};

pub struct IndexStore {
    conn: Mutex<Connection>,
}

fn backend(e: impl ToString) -> StoreError {
    StoreError::Backend(e.to_string())
}

impl IndexStore {
    /// Open a file-backed store at `path` and initialize the schema if absent.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(backend)?;
        Self::from_connection(conn)
    }

    /// Open an in-memory store (tests, throwaway indexes).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(backend)?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        init_schema(&conn).map_err(backend)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    // ---- documents ----

    /// Doc id for `title`, or 0 when the title is unknown.
    pub fn get_document_id(&self, title: &str) -> Result<DocId, StoreError> {
        let conn = self.conn.lock();
        let id: Option<i64> = conn
            .prepare_cached("SELECT id FROM documents WHERE title = ?1")
            .map_err(backend)?
            .query_row(params![title], |row| row.get(0))
            .optional()
            .map_err(backend)?;
        Ok(id.unwrap_or(0) as DocId)
    }

    /// Title of `doc_id`, or "" when missing.
    pub fn get_document_title(&self, doc_id: DocId) -> Result<String, StoreError> {
        let conn = self.conn.lock();
        let title: Option<String> = conn
            .prepare_cached("SELECT title FROM documents WHERE id = ?1")
            .map_err(backend)?
            .query_row(params![doc_id], |row| row.get(0))
            .optional()
            .map_err(backend)?;
        Ok(title.unwrap_or_default())
    }

    /// Body of `doc_id`, or "" when missing.
    pub fn get_document_body(&self, doc_id: DocId) -> Result<String, StoreError> {
        let conn = self.conn.lock();
        let body: Option<String> = conn
            .prepare_cached("SELECT body FROM documents WHERE id = ?1")
            .map_err(backend)?
            .query_row(params![doc_id], |row| row.get(0))
            .optional()
            .map_err(backend)?;
        Ok(body.unwrap_or_default())
    }

    /// Insert a document row, or overwrite the body (keeping the id and
    /// token_count) when the title already exists.
    pub fn add_document(
        &self,
        title: &str,
        body: &str,
        token_count: Count,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.prepare_cached(
            "INSERT INTO documents (title, body, token_count) VALUES (?1, ?2, ?3)
             ON CONFLICT(title) DO UPDATE SET body = excluded.body",
        )
        .map_err(backend)?
        .execute(params![title, body, token_count])
        .map_err(backend)?;
        Ok(())
    }

    pub fn update_document_token_count(
        &self,
        doc_id: DocId,
        token_count: Count,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.prepare_cached("UPDATE documents SET token_count = ?1 WHERE id = ?2")
            .map_err(backend)?
            .execute(params![token_count, doc_id])
            .map_err(backend)?;
        Ok(())
    }

    pub fn get_document_count(&self) -> Result<Count, StoreError> {
        let conn = self.conn.lock();
        let n: i64 = conn
            .prepare_cached("SELECT COUNT(*) FROM documents")
            .map_err(backend)?
            .query_row([], |row| row.get(0))
            .map_err(backend)?;
        Ok(n as Count)
    }

    /// Sum of per-document token counts.
    pub fn get_total_token_count(&self) -> Result<i64, StoreError> {
        let conn = self.conn.lock();
        let result = conn
            .prepare_cached("SELECT COALESCE(SUM(token_count), 0) FROM documents")
            .map_err(backend)?
            .query_row([], |row| row.get(0))
            .map_err(backend);
        result
    }

    pub fn get_document_token_count(&self, doc_id: DocId) -> Result<Count, StoreError> {
        let conn = self.conn.lock();
        let n: Option<i64> = conn
            .prepare_cached("SELECT token_count FROM documents WHERE id = ?1")
            .map_err(backend)?
            .query_row(params![doc_id], |row| row.get(0))
            .optional()
            .map_err(backend)?;
        Ok(n.unwrap_or(0) as Count)
    }

    pub fn get_all_document_token_counts(&self) -> Result<Vec<(DocId, Count)>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached("SELECT id, token_count FROM documents ORDER BY id")
            .map_err(backend)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, i64>(0)? as DocId, row.get::<_, i64>(1)? as Count))
            })
            .map_err(backend)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(backend)
    }

    /// All `(title, body)` pairs ordered by doc id.
    pub fn get_all_documents(&self) -> Result<Vec<(String, String)>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached("SELECT title, body FROM documents ORDER BY id")
            .map_err(backend)?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .map_err(backend)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(backend)
    }

    /// Doc ids whose title or body contains `needle` as a raw substring,
    /// ordered by doc id. `instr` keeps the match case-sensitive and free of
    /// LIKE wildcard surprises.
    pub fn search_documents_like(&self, needle: &str) -> Result<Vec<DocId>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(
                "SELECT id FROM documents
                 WHERE instr(title, ?1) > 0 OR instr(body, ?1) > 0
                 ORDER BY id",
            )
            .map_err(backend)?;
        let rows = stmt
            .query_map(params![needle], |row| Ok(row.get::<_, i64>(0)? as DocId))
            .map_err(backend)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(backend)
    }

    // ---- tokens ----

    /// Id and df of `token`. With `insert`, an unknown token is created with
    /// docs_count = 0 and an empty postings blob.
    pub fn get_token_info(
        &self,
        token: &str,
        insert: bool,
    ) -> Result<Option<TokenInfo>, StoreError> {
        let conn = self.conn.lock();
        if let Some(info) = query_token_info(&conn, token).map_err(backend)? {
            return Ok(Some(info));
        }
        if !insert {
            return Ok(None);
        }
        conn.prepare_cached(
            "INSERT OR IGNORE INTO tokens (token, docs_count, postings) VALUES (?1, 0, ?2)",
        )
        .map_err(backend)?
        .execute(params![token, &[] as &[u8]])
        .map_err(backend)?;
        query_token_info(&conn, token).map_err(backend)
    }

    /// Token text for `token_id`, or "" when missing.
    pub fn get_token(&self, token_id: TokenId) -> Result<String, StoreError> {
        let conn = self.conn.lock();
        let token: Option<String> = conn
            .prepare_cached("SELECT token FROM tokens WHERE id = ?1")
            .map_err(backend)?
            .query_row(params![token_id], |row| row.get(0))
            .optional()
            .map_err(backend)?;
        Ok(token.unwrap_or_default())
    }

    pub fn get_postings(&self, token_id: TokenId) -> Result<Option<PostingsRecord>, StoreError> {
        let conn = self.conn.lock();
        let result = conn
            .prepare_cached("SELECT docs_count, postings FROM tokens WHERE id = ?1")
            .map_err(backend)?
            .query_row(params![token_id], |row| {
                Ok(PostingsRecord {
                    docs_count: row.get::<_, i64>(0)? as Count,
                    postings: row.get(1)?,
                })
            })
            .optional()
            .map_err(backend);
        result
    }

    /// Write df and the encoded blob in one statement so the pair can never
    /// diverge.
    pub fn update_postings(
        &self,
        token_id: TokenId,
        docs_count: Count,
        postings: &[u8],
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.prepare_cached("UPDATE tokens SET docs_count = ?1, postings = ?2 WHERE id = ?3")
            .map_err(backend)?
            .execute(params![docs_count, postings, token_id])
            .map_err(backend)?;
        Ok(())
    }

    // ---- settings ----

    /// Value of setting `key`, or "" when absent.
    pub fn get_setting(&self, key: &str) -> Result<String, StoreError> {
        let conn = self.conn.lock();
        let value: Option<String> = conn
            .prepare_cached("SELECT value FROM settings WHERE key = ?1")
            .map_err(backend)?
            .query_row(params![key], |row| row.get(0))
            .optional()
            .map_err(backend)?;
        Ok(value.unwrap_or_default())
    }

    pub fn set_setting(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.prepare_cached("INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)")
            .map_err(backend)?
            .execute(params![key, value])
            .map_err(backend)?;
        Ok(())
    }

    // ---- transactions ----

    pub fn begin_transaction(&self) -> Result<(), StoreError> {
        self.conn
            .lock()
            .execute_batch("BEGIN IMMEDIATE")
            .map_err(backend)
    }

    pub fn commit_transaction(&self) -> Result<(), StoreError> {
        self.conn.lock().execute_batch("COMMIT").map_err(backend)
    }

    pub fn rollback_transaction(&self) -> Result<(), StoreError> {
        self.conn.lock().execute_batch("ROLLBACK").map_err(backend)
    }
}

fn query_token_info(conn: &Connection, token: &str) -> rusqlite::Result<Option<TokenInfo>> {
    conn.prepare_cached("SELECT id, docs_count FROM tokens WHERE token = ?1")?
        .query_row(params![token], |row| {
            Ok(TokenInfo {
                id: row.get::<_, i64>(0)? as TokenId,
                docs_count: row.get::<_, i64>(1)? as Count,
            })
        })
        .optional()
}

fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key   TEXT PRIMARY KEY,
            value TEXT
        );

        CREATE TABLE IF NOT EXISTS documents (
            id          INTEGER PRIMARY KEY,
            title       TEXT NOT NULL,
            body        TEXT NOT NULL,
            token_count INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS tokens (
            id         INTEGER PRIMARY KEY,
            token      TEXT NOT NULL,
            docs_count INTEGER NOT NULL,
            postings   BLOB NOT NULL
        );

        CREATE UNIQUE INDEX IF NOT EXISTS title_index ON documents(title);
        CREATE UNIQUE INDEX IF NOT EXISTS token_index ON tokens(token);
        "#,
    )
}
