//! Persistence layer: the SQLite store adapter, the postings data model and
//! its two byte encodings.

pub mod codec;
pub mod postings;
pub mod sqlite_store;

use ngram_model::{Count, TokenId};

pub use postings::{InvertedIndex, PostingItem, PostingList};
pub use sqlite_store::IndexStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("backend error: {0}")]
    Backend(String),
}

/// Id and document frequency of one token row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenInfo {
    pub id: TokenId,
    pub docs_count: Count,
}

/// Persisted postings of one token: the stored df and the encoded blob.
#[derive(Debug, Clone)]
pub struct PostingsRecord {
    pub docs_count: Count,
    pub postings: Vec<u8>,
}
