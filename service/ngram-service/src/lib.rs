//! Engine facade over the n-gram store: document ingest with a buffered
//! inverted index, transactional flush, and ranked querying.

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::{debug, warn};

use ngram_model::{settings, Count, DocId, EngineConfig, ScoringMethod, TokenId};
use ngram_store::{IndexStore, InvertedIndex, PostingItem, PostingList, StoreError};

pub mod search;
pub mod tokenizer;

pub use search::SearchHit;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("config error: {0}")]
    Config(String),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("input error: {0}")]
    Input(String),
    #[error("io error: {0}")]
    Io(String),
}

/// Per-document emitted-token counts plus their running sum, kept in step
/// with `documents.token_count`. The in-memory copy is authoritative at
/// runtime; it is rebuilt from the store on startup.
#[derive(Debug, Default)]
struct DocLengthCache {
    lengths: HashMap<DocId, Count>,
    total_tokens: i64,
}

impl DocLengthCache {
    fn update(&mut self, doc_id: DocId, len: Count) {
        let prev = self.lengths.insert(doc_id, len).unwrap_or(0);
        self.total_tokens += i64::from(len) - i64::from(prev);
    }

    fn len_of(&self, doc_id: DocId) -> Count {
        self.lengths.get(&doc_id).copied().unwrap_or(0)
    }
}

/// Owns the store, the ingest buffer and the caches. Writers (`add_document`,
/// `flush`, setters) take `&mut self`; queries take `&self` and may run
/// concurrently with each other once the environment is shared read-only.
pub struct SearchEnvironment {
    cfg: EngineConfig,
    store: IndexStore,
    buffer: InvertedIndex,
    doc_lengths: RwLock<DocLengthCache>,
    indexed_count: Count,
}

/// Disk and buffered postings of one query token, for diagnostics.
#[derive(Debug, Clone)]
pub struct TokenDump {
    pub token_id: TokenId,
    pub text: String,
    pub disk_docs_count: Count,
    pub disk_items: Vec<PostingItem>,
    pub buffered_items: Vec<PostingItem>,
}

impl SearchEnvironment {
    /// Open (or create) the database at `cfg.db_path` and reconcile settings.
    pub fn new(cfg: EngineConfig) -> Result<Self, ServiceError> {
        if let Some(dir) = cfg.db_path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| ServiceError::Io(e.to_string()))?;
        }
        let store = IndexStore::open(&cfg.db_path)?;
        Self::with_store(cfg, store)
    }

    /// In-memory environment; nothing survives drop. Used by tests and
    /// throwaway indexes.
    pub fn open_in_memory(cfg: EngineConfig) -> Result<Self, ServiceError> {
        let store = IndexStore::open_in_memory()?;
        Self::with_store(cfg, store)
    }

    fn with_store(mut cfg: EngineConfig, store: IndexStore) -> Result<Self, ServiceError> {
        cfg.validate_soft().map_err(ServiceError::Config)?;

        let doc_count = store.get_document_count()?;

        // Index-critical settings are frozen once documents exist: a stored
        // value that disagrees with the configuration is a hard error, not a
        // silent misdecode of every existing blob.
        let stored_len = store.get_setting(settings::TOKEN_LEN)?;
        if !stored_len.is_empty() {
            let stored: i32 = stored_len
                .parse()
                .map_err(|_| ServiceError::Config(format!("bad stored token_len {stored_len:?}")))?;
            if doc_count > 0 && stored != cfg.token_len {
                return Err(ServiceError::Config(format!(
                    "token_len {} does not match the index (built with {}); reindex required",
                    cfg.token_len, stored
                )));
            }
        }
        let stored_method = store.get_setting(settings::COMPRESS_METHOD)?;
        if !stored_method.is_empty() {
            let stored = ngram_model::CompressMethod::from_setting(&stored_method).ok_or_else(
                || ServiceError::Config(format!("bad stored compress_method {stored_method:?}")),
            )?;
            if doc_count > 0 && stored != cfg.compress_method {
                return Err(ServiceError::Config(format!(
                    "compress_method {:?} does not match the index (built with {:?}); reindex required",
                    cfg.compress_method, stored
                )));
            }
        }
        store.set_setting(settings::TOKEN_LEN, &cfg.token_len.to_string())?;
        store.set_setting(
            settings::COMPRESS_METHOD,
            cfg.compress_method.as_setting(),
        )?;

        // Runtime settings persisted by a previous run carry over.
        let stored_phrase = store.get_setting(settings::ENABLE_PHRASE_SEARCH)?;
        if !stored_phrase.is_empty() {
            cfg.enable_phrase_search = stored_phrase == "1";
        }
        let stored_scoring = store.get_setting(settings::SCORING_METHOD)?;
        if let Some(method) = ScoringMethod::from_setting(&stored_scoring) {
            cfg.scoring_method = method;
        }
        let stored_k1 = store.get_setting(settings::BM25_K1)?;
        if let Ok(k1) = stored_k1.trim().parse::<f64>() {
            cfg.bm25_k1 = k1;
        }
        let stored_b = store.get_setting(settings::BM25_B)?;
        if let Ok(b) = stored_b.trim().parse::<f64>() {
            cfg.bm25_b = b;
        }
        let indexed_count = store
            .get_setting(settings::INDEXED_COUNT)?
            .trim()
            .parse::<Count>()
            .unwrap_or(0);

        let mut cache = DocLengthCache::default();
        for (doc_id, len) in store.get_all_document_token_counts()? {
            cache.update(doc_id, len);
        }

        cfg.validate_soft().map_err(ServiceError::Config)?;
        debug!(
            docs = doc_count,
            token_len = cfg.token_len,
            method = ?cfg.compress_method,
            "environment initialized"
        );
        Ok(Self {
            cfg,
            store,
            buffer: InvertedIndex::new(),
            doc_lengths: RwLock::new(cache),
            indexed_count,
        })
    }

    /// Flush what is left in the buffer and persist the runtime settings.
    pub fn shutdown(mut self) -> Result<(), ServiceError> {
        let flushed = self.flush();

        self.store
            .set_setting(settings::TOKEN_LEN, &self.cfg.token_len.to_string())?;
        self.store.set_setting(
            settings::COMPRESS_METHOD,
            self.cfg.compress_method.as_setting(),
        )?;
        self.store.set_setting(
            settings::ENABLE_PHRASE_SEARCH,
            if self.cfg.enable_phrase_search { "1" } else { "0" },
        )?;
        self.store
            .set_setting(settings::SCORING_METHOD, self.cfg.scoring_method.as_setting())?;
        self.store
            .set_setting(settings::BM25_K1, &self.cfg.bm25_k1.to_string())?;
        self.store
            .set_setting(settings::BM25_B, &self.cfg.bm25_b.to_string())?;
        self.store
            .set_setting(settings::INDEXED_COUNT, &self.indexed_count.to_string())?;
        flushed
    }

    // ---- ingest ----

    /// Index one `(title, body)` document.
    ///
    /// An empty title is a no-op separator signal; an empty body is an input
    /// error and leaves the buffer untouched. Re-adding a known title
    /// overwrites its body while keeping the doc id.
    pub fn add_document(&mut self, title: &str, body: &str) -> Result<(), ServiceError> {
        if title.is_empty() {
            return Ok(());
        }
        if self.has_reached_index_limit() {
            return Ok(());
        }
        if body.is_empty() {
            warn!(title, "skipping document with empty body");
            return Err(ServiceError::Input(format!("empty body for title {title:?}")));
        }

        self.store.add_document(title, body, 0)?;
        let doc_id = self.store.get_document_id(title)?;
        if doc_id <= 0 {
            return Err(ServiceError::Store(StoreError::Backend(format!(
                "no doc id after upsert of {title:?}"
            ))));
        }

        let term_count = self.buffer_postings(doc_id, body)?;
        self.store.update_document_token_count(doc_id, term_count)?;
        self.doc_lengths.write().update(doc_id, term_count);
        self.indexed_count += 1;

        if self.has_reached_index_limit() {
            // One final flush so the capped index is fully persisted.
            return self.flush();
        }
        if self.cfg.buffer_update_threshold > 0
            && self.buffer.size() >= self.cfg.buffer_update_threshold as usize
        {
            self.flush()?;
        }
        Ok(())
    }

    /// Tokenize `body` into the buffer; returns the number of emitted
    /// positions (the document length).
    fn buffer_postings(&mut self, doc_id: DocId, body: &str) -> Result<Count, ServiceError> {
        let n = self.cfg.token_len as usize;
        let mut term_count: Count = 0;
        for (token, position) in tokenizer::ngram_windows(body, n) {
            term_count += 1;
            match self.store.get_token_info(&token, true)? {
                Some(info) if info.id > 0 => self.buffer.add(info.id, doc_id, position),
                _ => warn!(token = %token, "no token id after insert"),
            }
        }
        Ok(term_count)
    }

    /// Merge the buffer into the persistent postings under one transaction.
    ///
    /// On failure the transaction is rolled back and the buffer is kept, so
    /// a later flush can retry with nothing lost.
    pub fn flush(&mut self) -> Result<(), ServiceError> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        debug!(tokens = self.buffer.size(), "flushing index buffer");

        self.store.begin_transaction()?;
        let merged = self.merge_buffer_into_store();
        match merged.and_then(|()| self.store.commit_transaction()) {
            Ok(()) => {
                self.buffer.clear();
                Ok(())
            }
            Err(e) => {
                let _ = self.store.rollback_transaction();
                warn!(error = %e, "flush failed; buffer retained for retry");
                Err(ServiceError::Store(e))
            }
        }
    }

    fn merge_buffer_into_store(&self) -> Result<(), StoreError> {
        let method = self.cfg.compress_method;
        for (token_id, buffered) in self.buffer.iter() {
            let merged = match self.store.get_postings(token_id)? {
                Some(rec) if !rec.postings.is_empty() => {
                    let mut existing = PostingList::deserialize(&rec.postings, method);
                    existing.merge(buffered);
                    existing
                }
                _ => buffered.clone(),
            };
            let bytes = merged.serialize(method);
            self.store
                .update_postings(token_id, merged.documents_count(), &bytes)?;
        }
        Ok(())
    }

    // ---- accessors ----

    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    pub fn store(&self) -> &IndexStore {
        &self.store
    }

    pub fn indexed_count(&self) -> Count {
        self.indexed_count
    }

    pub fn has_reached_index_limit(&self) -> bool {
        self.cfg.max_index_count >= 0 && self.indexed_count >= self.cfg.max_index_count
    }

    /// Distinct tokens currently buffered.
    pub fn buffered_tokens(&self) -> usize {
        self.buffer.size()
    }

    pub fn set_phrase_search_enabled(&mut self, enabled: bool) {
        self.cfg.enable_phrase_search = enabled;
    }

    pub fn set_scoring_method(&mut self, method: ScoringMethod) {
        self.cfg.scoring_method = method;
    }

    pub fn set_bm25_params(&mut self, k1: f64, b: f64) {
        self.cfg.bm25_k1 = k1;
        self.cfg.bm25_b = b;
    }

    pub fn set_buffer_update_threshold(&mut self, threshold: i32) {
        self.cfg.buffer_update_threshold = threshold;
    }

    pub fn set_max_index_count(&mut self, max_count: i32) {
        self.cfg.max_index_count = max_count;
    }

    pub(crate) fn document_length(&self, doc_id: DocId) -> Count {
        self.doc_lengths.read().len_of(doc_id)
    }

    pub(crate) fn total_tokens(&self) -> i64 {
        self.doc_lengths.read().total_tokens
    }

    // ---- diagnostics ----

    /// Disk and buffered postings for each token of `query`, in query order.
    pub fn dump_query_postings(&self, query: &str) -> Result<Vec<TokenDump>, ServiceError> {
        let n = self.cfg.token_len as usize;
        let mut dumps = Vec::new();
        for (token, _) in tokenizer::ngram_windows(query, n) {
            let Some(info) = self.store.get_token_info(&token, false)? else {
                continue;
            };
            let (disk_docs_count, disk_items) = match self.store.get_postings(info.id)? {
                Some(rec) => {
                    let list = PostingList::deserialize(&rec.postings, self.cfg.compress_method);
                    (rec.docs_count, list.items().to_vec())
                }
                None => (0, Vec::new()),
            };
            let buffered_items = self
                .buffer
                .get(info.id)
                .map(|list| list.items().to_vec())
                .unwrap_or_default();
            dumps.push(TokenDump {
                token_id: info.id,
                text: token,
                disk_docs_count,
                disk_items,
                buffered_items,
            });
        }
        Ok(dumps)
    }

    /// UTF-8 safe preview of a document body (see [`preview_text`]).
    pub fn body_preview(&self, doc_id: DocId, max_chars: usize) -> Result<String, ServiceError> {
        let body = self.store.get_document_body(doc_id)?;
        Ok(preview_text(&body, max_chars))
    }
}

/// Collapse whitespace and cut `text` at `max_chars` code points, appending
/// an ellipsis when something was dropped. Operates on code points so a
/// multi-byte character is never split.
pub fn preview_text(text: &str, max_chars: usize) -> String {
    let mut collapsed = String::with_capacity(text.len());
    let mut last_space = false;
    for ch in text.chars() {
        let ch = if ch == '\r' || ch == '\n' || ch == '\t' { ' ' } else { ch };
        if ch == ' ' {
            if last_space {
                continue;
            }
            last_space = true;
        } else {
            last_space = false;
        }
        collapsed.push(ch);
    }
    if collapsed.chars().count() <= max_chars {
        return collapsed;
    }
    let mut preview: String = collapsed.chars().take(max_chars).collect();
    preview.push_str("...");
    preview
}
