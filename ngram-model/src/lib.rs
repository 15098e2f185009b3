//! Shared, lightweight schema for the n-gram search engine.

use serde::{Deserialize, Serialize};

/// Document identifier assigned by the store (> 0 once persisted).
pub type DocId = i32;

/// Token identifier assigned by the store (> 0 once persisted).
pub type TokenId = i32;

/// 0-based ordinal of an n-gram window within a document.
pub type Position = i32;

/// Count type shared by document counts, position counts and lengths.
pub type Count = i32;

/// Default n-gram window length (bigram).
pub const DEFAULT_TOKEN_LEN: i32 = 2;

/// Default distinct-token threshold that triggers a buffer flush.
pub const DEFAULT_BUFFER_UPDATE_THRESHOLD: i32 = 2048;

/// On-disk encoding of a token's postings blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompressMethod {
    /// Fixed-width little-endian integers.
    None,
    /// Golomb-Rice coded bitstream with delta-coded doc ids and positions.
    Golomb,
}

impl CompressMethod {
    pub fn as_setting(self) -> &'static str {
        match self {
            CompressMethod::None => "0",
            CompressMethod::Golomb => "1",
        }
    }

    pub fn from_setting(value: &str) -> Option<Self> {
        match value.trim() {
            "0" => Some(CompressMethod::None),
            "1" => Some(CompressMethod::Golomb),
            _ => None,
        }
    }
}

/// Ranking formula applied to documents surviving intersection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScoringMethod {
    /// 1 + ln(tf) weighted by smoothed idf.
    TfIdf,
    /// Okapi BM25 with configurable k1 and b.
    Bm25,
}

impl ScoringMethod {
    pub fn as_setting(self) -> &'static str {
        match self {
            ScoringMethod::TfIdf => "0",
            ScoringMethod::Bm25 => "1",
        }
    }

    pub fn from_setting(value: &str) -> Option<Self> {
        match value.trim() {
            "0" => Some(ScoringMethod::TfIdf),
            "1" => Some(ScoringMethod::Bm25),
            _ => None,
        }
    }
}

/// Setting keys persisted in the store's `settings` table.
pub mod settings {
    /// N-gram window length (index-critical; fixed once documents exist).
    pub const TOKEN_LEN: &str = "token_len";
    /// Postings blob encoding (index-critical; fixed once documents exist).
    pub const COMPRESS_METHOD: &str = "compress_method";
    /// Whether queries verify positional adjacency ("0"/"1").
    pub const ENABLE_PHRASE_SEARCH: &str = "enable_phrase_search";
    /// Ranking formula ("0" = tf-idf, "1" = BM25).
    pub const SCORING_METHOD: &str = "scoring_method";
    pub const BM25_K1: &str = "bm25_k1";
    pub const BM25_B: &str = "bm25_b";
    /// Documents indexed so far (best effort, informational).
    pub const INDEXED_COUNT: &str = "indexed_count";
}

/// Runtime configuration of the engine.
///
/// `token_len` and `compress_method` decide the storage layout and are
/// persisted on first use; the remaining fields are runtime tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Path of the SQLite database file.
    pub db_path: std::path::PathBuf,
    /// N-gram window length in code points (>= 1).
    pub token_len: i32,
    /// Postings blob encoding.
    pub compress_method: CompressMethod,
    /// Distinct buffered tokens that trigger a flush (<= 0 disables).
    pub buffer_update_threshold: i32,
    /// Max documents to index this run (< 0 = unlimited).
    pub max_index_count: i32,
    /// Verify positional adjacency for multi-token queries.
    pub enable_phrase_search: bool,
    /// Ranking formula.
    pub scoring_method: ScoringMethod,
    /// BM25 term-frequency saturation (typical 1.2 .. 2.0).
    pub bm25_k1: f64,
    /// BM25 length normalization strength (0 .. 1).
    pub bm25_b: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            db_path: std::path::PathBuf::from("target/demo/ngram.db"),
            token_len: DEFAULT_TOKEN_LEN,
            compress_method: CompressMethod::None,
            buffer_update_threshold: DEFAULT_BUFFER_UPDATE_THRESHOLD,
            max_index_count: -1,
            enable_phrase_search: false,
            scoring_method: ScoringMethod::Bm25,
            bm25_k1: 1.2,
            bm25_b: 0.75,
        }
    }
}

impl EngineConfig {
    /// Soft validation suitable for startup.
    pub fn validate_soft(&self) -> Result<(), String> {
        if self.token_len < 1 {
            return Err(format!("token_len must be >= 1, got {}", self.token_len));
        }
        if !(self.bm25_b >= 0.0 && self.bm25_b <= 1.0) {
            return Err(format!("bm25_b must be within [0, 1], got {}", self.bm25_b));
        }
        if self.bm25_k1 < 0.0 {
            return Err(format!("bm25_k1 must be >= 0, got {}", self.bm25_k1));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setting_round_trip_for_enums() {
        for m in [CompressMethod::None, CompressMethod::Golomb] {
            assert_eq!(CompressMethod::from_setting(m.as_setting()), Some(m));
        }
        for s in [ScoringMethod::TfIdf, ScoringMethod::Bm25] {
            assert_eq!(ScoringMethod::from_setting(s.as_setting()), Some(s));
        }
        assert_eq!(CompressMethod::from_setting("7"), None);
        assert_eq!(ScoringMethod::from_setting(""), None);
    }

    #[test]
    fn default_config_is_valid() {
        assert!(EngineConfig::default().validate_soft().is_ok());
    }

    #[test]
    fn token_len_below_one_is_rejected() {
        let cfg = EngineConfig {
            token_len: 0,
            ..EngineConfig::default()
        };
        assert!(cfg.validate_soft().is_err());
    }
}
