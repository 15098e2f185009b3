//! Source adapters turning external files into `(title, body)` documents.
//!
//! Loaders are pure producers: they parse and filter their input and hand
//! each surviving document to a caller-supplied sink. The sink returns
//! `false` to stop early (index limit reached), and the loader reports how
//! many documents it delivered.

pub mod ndjson;
pub mod tsv;
pub mod wiki;

#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse error: {0}")]
    Parse(String),
}

/// One document as produced by a source adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDocument {
    pub title: String,
    pub body: String,
}

/// Receives documents from a loader; return `false` to stop the run.
pub type DocumentSink<'a> = dyn FnMut(RawDocument) -> bool + 'a;
