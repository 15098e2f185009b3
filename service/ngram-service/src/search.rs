//! Query pipeline: tokenize the query, union persistent and buffered
//! postings per token, intersect the document sets, optionally verify
//! phrase adjacency, then score and rank.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::time::Instant;

use tracing::info;

use ngram_model::{Count, DocId, Position, ScoringMethod, TokenId};
use ngram_store::PostingList;

use crate::{tokenizer, SearchEnvironment, ServiceError};

/// One ranked result.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub doc_id: DocId,
    pub score: f64,
}

/// Decoded postings of one query token: persistent entries merged with the
/// in-memory buffer.
struct TokenPostings {
    doc_ids: Vec<DocId>,
    docs_count: Count,
    tf: HashMap<DocId, Count>,
    positions: HashMap<DocId, Vec<Position>>,
}

impl SearchEnvironment {
    /// Ranked search over the index, sorted by score descending then doc id
    /// ascending. A query producing no known tokens falls back to a raw
    /// substring scan over titles and bodies with a uniform score of 1.0.
    pub fn search(&self, query: &str) -> Result<Vec<SearchHit>, ServiceError> {
        let started = Instant::now();

        let phase = Instant::now();
        let token_ids = self.query_token_ids(query)?;
        let tokenize_us = phase.elapsed().as_micros() as u64;

        if token_ids.is_empty() {
            let hits: Vec<SearchHit> = self
                .store
                .search_documents_like(query)?
                .into_iter()
                .map(|doc_id| SearchHit { doc_id, score: 1.0 })
                .collect();
            info!(
                query,
                tokens = 0usize,
                fallback = "like",
                results = hits.len(),
                elapsed_us = started.elapsed().as_micros() as u64,
                "query completed"
            );
            return Ok(hits);
        }

        let phase = Instant::now();
        let mut token_postings = Vec::with_capacity(token_ids.len());
        for &token_id in &token_ids {
            token_postings.push(self.collect_token_postings(token_id)?);
        }
        let postings_us = phase.elapsed().as_micros() as u64;

        let phase = Instant::now();
        let candidates = intersect_candidates(&token_postings);
        let intersect_us = phase.elapsed().as_micros() as u64;

        let phase = Instant::now();
        let phrase_applied = self.cfg.enable_phrase_search && token_ids.len() >= 2;
        let surviving = if phrase_applied {
            phrase_filter(&candidates, &token_postings)
        } else {
            candidates
        };
        let phrase_us = phase.elapsed().as_micros() as u64;

        let phase = Instant::now();
        let mut hits = self.score_documents(&surviving, &token_postings)?;
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then(a.doc_id.cmp(&b.doc_id))
        });
        let score_us = phase.elapsed().as_micros() as u64;

        let top: Vec<String> = hits
            .iter()
            .take(10)
            .map(|h| format!("{}:{:.4}", h.doc_id, h.score))
            .collect();
        info!(
            query,
            tokens = token_ids.len(),
            token_ids = ?token_ids,
            phrase = phrase_applied,
            results = hits.len(),
            top = %top.join(" "),
            elapsed_us = started.elapsed().as_micros() as u64,
            tokenize_us,
            postings_us,
            intersect_us,
            phrase_us,
            score_us,
            "query completed"
        );
        Ok(hits)
    }

    /// Token ids of the query's n-grams, read-only lookups, order and
    /// duplicates preserved; unknown tokens are dropped.
    fn query_token_ids(&self, query: &str) -> Result<Vec<TokenId>, ServiceError> {
        let n = self.cfg.token_len as usize;
        let mut ids = Vec::new();
        for (token, _) in tokenizer::ngram_windows(query, n) {
            if let Some(info) = self.store.get_token_info(&token, false)? {
                if info.id > 0 {
                    ids.push(info.id);
                }
            }
        }
        Ok(ids)
    }

    fn collect_token_postings(&self, token_id: TokenId) -> Result<TokenPostings, ServiceError> {
        let mut doc_ids: Vec<DocId> = Vec::new();
        let mut tf: HashMap<DocId, Count> = HashMap::new();
        let mut positions: HashMap<DocId, Vec<Position>> = HashMap::new();
        let mut docs_count: Count = 0;

        if let Some(rec) = self.store.get_postings(token_id)? {
            docs_count = rec.docs_count;
            if !rec.postings.is_empty() {
                let list = PostingList::deserialize(&rec.postings, self.cfg.compress_method);
                for item in list.items() {
                    if item.doc_id <= 0 {
                        continue;
                    }
                    doc_ids.push(item.doc_id);
                    tf.insert(item.doc_id, item.positions.len() as Count);
                    positions.insert(item.doc_id, item.positions.clone());
                }
            }
        }

        // Buffered postings not yet flushed: new documents append, known
        // documents accumulate tf and re-sort their position vector.
        if let Some(buffered) = self.buffer.get(token_id) {
            for item in buffered.items() {
                if item.doc_id <= 0 {
                    continue;
                }
                match tf.get_mut(&item.doc_id) {
                    None => {
                        doc_ids.push(item.doc_id);
                        tf.insert(item.doc_id, item.positions.len() as Count);
                        positions.insert(item.doc_id, item.positions.clone());
                    }
                    Some(count) => {
                        *count += item.positions.len() as Count;
                        if let Some(existing) = positions.get_mut(&item.doc_id) {
                            existing.extend_from_slice(&item.positions);
                            existing.sort_unstable();
                        }
                    }
                }
            }
        }

        doc_ids.sort_unstable();
        Ok(TokenPostings {
            doc_ids,
            docs_count,
            tf,
            positions,
        })
    }

    fn score_documents(
        &self,
        docs: &[DocId],
        tokens: &[TokenPostings],
    ) -> Result<Vec<SearchHit>, ServiceError> {
        let total_docs = self.store.get_document_count()?;
        let n = f64::from(total_docs);
        let avgdl = if total_docs > 0 {
            self.total_tokens() as f64 / n
        } else {
            0.0
        };

        let idfs: Vec<f64> = tokens
            .iter()
            .map(|t| {
                let df = f64::from(t.docs_count.max(0));
                let idf = match self.cfg.scoring_method {
                    ScoringMethod::Bm25 => (((n - df + 0.5) / (df + 0.5)) + 1.0).ln().max(0.0),
                    ScoringMethod::TfIdf => ((1.0 + n) / (1.0 + df)).ln() + 1.0,
                };
                if idf.is_finite() {
                    idf
                } else {
                    0.0
                }
            })
            .collect();

        let k1 = self.cfg.bm25_k1;
        let b = self.cfg.bm25_b;
        let mut hits = Vec::with_capacity(docs.len());
        for &doc_id in docs {
            let dl = f64::from(self.document_length(doc_id));
            let mut score = 0.0;
            for (token, idf) in tokens.iter().zip(&idfs) {
                let Some(&raw_tf) = token.tf.get(&doc_id) else {
                    continue;
                };
                if raw_tf <= 0 {
                    continue;
                }
                let tf = f64::from(raw_tf);
                score += match self.cfg.scoring_method {
                    ScoringMethod::Bm25 => {
                        idf * (tf * (k1 + 1.0)) / (tf + k1 * (1.0 - b + b * dl / avgdl))
                    }
                    ScoringMethod::TfIdf => (1.0 + tf.ln()) * idf,
                };
            }
            if !score.is_finite() {
                score = 0.0;
            }
            hits.push(SearchHit { doc_id, score });
        }
        Ok(hits)
    }
}

/// Sorted-set intersection of the per-token doc-id lists, starting from the
/// smallest list. Non-positive ids never survive.
fn intersect_candidates(tokens: &[TokenPostings]) -> Vec<DocId> {
    let Some(smallest) = tokens.iter().min_by_key(|t| t.doc_ids.len()) else {
        return Vec::new();
    };
    let mut result: Vec<DocId> = smallest.doc_ids.iter().copied().filter(|&d| d > 0).collect();

    for token in tokens {
        if std::ptr::eq(token, smallest) {
            continue;
        }
        let mut narrowed = Vec::with_capacity(result.len());
        let (mut p, mut q) = (0usize, 0usize);
        while p < result.len() && q < token.doc_ids.len() {
            match result[p].cmp(&token.doc_ids[q]) {
                Ordering::Equal => {
                    narrowed.push(result[p]);
                    p += 1;
                    q += 1;
                }
                Ordering::Less => p += 1,
                Ordering::Greater => q += 1,
            }
        }
        result = narrowed;
        if result.is_empty() {
            break;
        }
    }
    result
}

/// Keep the documents where the query tokens occur at consecutive positions:
/// the surviving chain after token i holds the positions of token i that
/// extend some occurrence of tokens 0..=i.
fn phrase_filter(candidates: &[DocId], tokens: &[TokenPostings]) -> Vec<DocId> {
    let mut result = Vec::with_capacity(candidates.len());
    'docs: for &doc_id in candidates {
        let Some(first) = tokens[0].positions.get(&doc_id) else {
            continue;
        };
        let mut chain: Vec<Position> = first.clone();

        for token in &tokens[1..] {
            let Some(next_positions) = token.positions.get(&doc_id) else {
                continue 'docs;
            };
            let mut advanced = Vec::with_capacity(chain.len());
            let (mut p, mut q) = (0usize, 0usize);
            while p < chain.len() && q < next_positions.len() {
                let need = chain[p] + 1;
                match next_positions[q].cmp(&need) {
                    Ordering::Equal => {
                        advanced.push(need);
                        p += 1;
                        q += 1;
                    }
                    Ordering::Less => q += 1,
                    Ordering::Greater => p += 1,
                }
            }
            if advanced.is_empty() {
                continue 'docs;
            }
            chain = advanced;
        }
        result.push(doc_id);
    }
    result
}
