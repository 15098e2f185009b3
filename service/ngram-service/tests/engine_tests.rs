//! End-to-end engine scenarios: ingest, flush, query, phrase filtering and
//! ranking against an in-memory store.

use ngram_model::{CompressMethod, EngineConfig, ScoringMethod};
use ngram_service::{SearchEnvironment, SearchHit};
use proptest::prelude::*;

fn engine(cfg: EngineConfig) -> SearchEnvironment {
    SearchEnvironment::open_in_memory(cfg).unwrap()
}

fn doc_ids(hits: &[SearchHit]) -> Vec<i32> {
    hits.iter().map(|h| h.doc_id).collect()
}

#[test]
fn empty_corpus_returns_no_results() {
    let e = engine(EngineConfig::default());
    assert!(e.search("anything").unwrap().is_empty());
}

#[test]
fn single_document_is_found_through_all_its_tokens() {
    let mut e = engine(EngineConfig::default());
    e.add_document("AI", "Artificial Intelligence").unwrap();
    e.flush().unwrap();

    let doc_id = e.store().get_document_id("AI").unwrap();
    assert_eq!(e.store().get_document_token_count(doc_id).unwrap(), 20);

    let hits = e.search("intel").unwrap();
    assert_eq!(doc_ids(&hits), vec![doc_id]);
    assert!(hits[0].score > 0.0);

    // Unknown tokens fall back to the substring scan, which finds nothing.
    assert!(e.search("xyz").unwrap().is_empty());
}

#[test]
fn buffered_documents_are_searchable_before_flush() {
    let mut e = engine(EngineConfig::default());
    e.add_document("AI", "Artificial Intelligence").unwrap();
    assert!(e.buffered_tokens() > 0);

    let doc_id = e.store().get_document_id("AI").unwrap();
    assert_eq!(doc_ids(&e.search("intel").unwrap()), vec![doc_id]);
}

#[test]
fn substring_fallback_scans_titles_and_bodies() {
    let mut e = engine(EngineConfig::default());
    // Only the title carries "xyz"; titles are not tokenized, so the query
    // resolves no token ids and the raw substring scan takes over.
    e.add_document("xyz corp", "aa bb").unwrap();
    e.flush().unwrap();
    let doc_id = e.store().get_document_id("xyz corp").unwrap();

    let hits = e.search("xyz").unwrap();
    assert_eq!(doc_ids(&hits), vec![doc_id]);
    assert_eq!(hits[0].score, 1.0);
}

#[test]
fn phrase_filter_distinguishes_reordered_bodies() {
    for phrase in [true, false] {
        let mut e = engine(EngineConfig {
            enable_phrase_search: phrase,
            ..EngineConfig::default()
        });
        e.add_document("A", "abcd").unwrap();
        e.add_document("B", "acbd").unwrap();
        e.flush().unwrap();
        let a = e.store().get_document_id("A").unwrap();

        // Only A contains both "bc" and "cd"; with the phrase filter on,
        // their adjacency in A still holds.
        assert_eq!(doc_ids(&e.search("bcd").unwrap()), vec![a]);
    }
}

#[test]
fn phrase_filter_drops_non_adjacent_matches() {
    let mut e = engine(EngineConfig {
        enable_phrase_search: true,
        ..EngineConfig::default()
    });
    // "ab" and "cd" occur but never adjacently ("ab" at 0, "cd" at 3).
    e.add_document("gap", "abxcd").unwrap();
    e.flush().unwrap();
    assert!(e.search("abcd").unwrap().is_empty());

    let mut off = engine(EngineConfig::default());
    off.add_document("gap", "abxcd").unwrap();
    off.flush().unwrap();
    // Intersection alone keeps it: tokens "ab" and "cd" are both present.
    // ("abcd" also needs "bc", absent, so query a pair that exists.)
    let doc = off.store().get_document_id("gap").unwrap();
    assert_eq!(doc_ids(&off.search("ab cd").unwrap()), vec![doc]);
}

#[test]
fn flush_merges_buffered_postings_with_persistent_rows() {
    let mut e = engine(EngineConfig::default());
    e.add_document("first", "abx").unwrap();
    e.flush().unwrap();
    e.add_document("second", "aby").unwrap();
    e.flush().unwrap();

    let first = e.store().get_document_id("first").unwrap();
    let second = e.store().get_document_id("second").unwrap();

    let info = e.store().get_token_info("ab", false).unwrap().unwrap();
    assert_eq!(info.docs_count, 2);

    let rec = e.store().get_postings(info.id).unwrap().unwrap();
    let list = ngram_store::PostingList::deserialize(&rec.postings, CompressMethod::None);
    let docs: Vec<i32> = list.items().iter().map(|i| i.doc_id).collect();
    assert_eq!(docs, vec![first, second]);
    assert_eq!(list.items()[0].positions, vec![0]);
    assert_eq!(list.items()[1].positions, vec![0]);
}

#[test]
fn golomb_index_round_trips_through_queries() {
    let mut e = engine(EngineConfig {
        compress_method: CompressMethod::Golomb,
        ..EngineConfig::default()
    });
    e.add_document("AI", "Artificial Intelligence").unwrap();
    e.add_document("ML", "machine intelligence systems").unwrap();
    e.flush().unwrap();

    let ai = e.store().get_document_id("AI").unwrap();
    let ml = e.store().get_document_id("ML").unwrap();
    let hits = e.search("intelligence").unwrap();
    let mut found = doc_ids(&hits);
    found.sort_unstable();
    assert_eq!(found, vec![ai, ml]);
}

#[test]
fn bm25_prefers_rare_terms_more_than_tf_idf() {
    fn build(method: ScoringMethod) -> (SearchEnvironment, i32) {
        let mut e = engine(EngineConfig {
            scoring_method: method,
            ..EngineConfig::default()
        });
        // One short document holds the rare term; the common filler term
        // appears everywhere.
        e.add_document("rare", "zq").unwrap();
        for i in 0..8 {
            e.add_document(
                &format!("common-{i}"),
                "fillerfillerfillerfillerfillerfiller",
            )
            .unwrap();
        }
        e.flush().unwrap();
        let rare = e.store().get_document_id("rare").unwrap();
        (e, rare)
    }

    let (bm25, rare) = build(ScoringMethod::Bm25);
    let bm25_hits = bm25.search("zq").unwrap();
    assert_eq!(doc_ids(&bm25_hits), vec![rare]);
    assert!(bm25_hits[0].score > 0.0);

    let (tfidf, rare) = build(ScoringMethod::TfIdf);
    let tfidf_hits = tfidf.search("zq").unwrap();
    assert_eq!(doc_ids(&tfidf_hits), vec![rare]);

    // BM25's idf weighting of the rare term exceeds the smoothed tf-idf
    // weight in this corpus shape.
    assert!(bm25_hits[0].score > tfidf_hits[0].score);
}

#[test]
fn ties_are_broken_by_ascending_doc_id() {
    let mut e = engine(EngineConfig::default());
    e.add_document("twin-b", "sametext").unwrap();
    e.add_document("twin-a", "sametext").unwrap();
    e.flush().unwrap();

    let hits = e.search("same").unwrap();
    assert_eq!(hits.len(), 2);
    assert!(hits[0].doc_id < hits[1].doc_id);
    assert_eq!(hits[0].score, hits[1].score);
}

#[test]
fn multi_token_intersection_requires_every_token() {
    let mut e = engine(EngineConfig::default());
    e.add_document("both", "abcd").unwrap();
    e.add_document("partial", "abzz").unwrap();
    e.flush().unwrap();
    let both = e.store().get_document_id("both").unwrap();

    // "abcd" needs ab, bc, cd; only "both" has all three.
    assert_eq!(doc_ids(&e.search("abcd").unwrap()), vec![both]);
}

#[test]
fn dump_reports_disk_and_buffered_postings() {
    let mut e = engine(EngineConfig::default());
    e.add_document("one", "abc").unwrap();
    e.flush().unwrap();
    e.add_document("two", "abz").unwrap();

    let dumps = e.dump_query_postings("ab").unwrap();
    assert_eq!(dumps.len(), 1);
    assert_eq!(dumps[0].text, "ab");
    assert_eq!(dumps[0].disk_docs_count, 1);
    assert_eq!(dumps[0].disk_items.len(), 1);
    assert_eq!(dumps[0].buffered_items.len(), 1);
}

// ---- property tests ----

/// Brute-force substring check under the same tokenizer rules: does `phrase`
/// occur as consecutive windows in `body`?
fn brute_force_phrase_match(body: &str, phrase: &str, n: usize) -> bool {
    let body_tokens = ngram_service::tokenizer::ngram_windows(body, n);
    let phrase_tokens = ngram_service::tokenizer::ngram_windows(phrase, n);
    if phrase_tokens.is_empty() {
        return false;
    }
    let body_texts: Vec<&str> = body_tokens.iter().map(|(t, _)| t.as_str()).collect();
    let phrase_texts: Vec<&str> = phrase_tokens.iter().map(|(t, _)| t.as_str()).collect();
    body_texts
        .windows(phrase_texts.len())
        .any(|w| w == phrase_texts.as_slice())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn intersection_matches_brute_force(
        bodies in prop::collection::vec("[abc]{2,12}", 1..6),
        query in "[abc]{2,4}",
    ) {
        let mut e = engine(EngineConfig::default());
        for (i, body) in bodies.iter().enumerate() {
            e.add_document(&format!("doc-{i}"), body).unwrap();
        }
        e.flush().unwrap();

        let found = doc_ids(&e.search(&query).unwrap());

        let n = e.config().token_len as usize;
        let query_tokens = ngram_service::tokenizer::ngram_windows(&query, n);

        // Tokens of the corpus; query tokens outside it resolve no id and
        // are dropped before intersection.
        let corpus_tokens: std::collections::HashSet<String> = bodies
            .iter()
            .flat_map(|b| ngram_service::tokenizer::ngram_windows(b, n))
            .map(|(t, _)| t)
            .collect();
        let retained: Vec<&str> = query_tokens
            .iter()
            .map(|(t, _)| t.as_str())
            .filter(|t| corpus_tokens.contains(*t))
            .collect();

        for (i, body) in bodies.iter().enumerate() {
            let doc_id = e.store().get_document_id(&format!("doc-{i}")).unwrap();
            let expected = if retained.is_empty() {
                // Substring fallback over the raw text.
                body.contains(&query)
            } else {
                let body_texts: std::collections::HashSet<String> =
                    ngram_service::tokenizer::ngram_windows(body, n)
                        .into_iter()
                        .map(|(t, _)| t)
                        .collect();
                retained.iter().all(|t| body_texts.contains(*t))
            };
            prop_assert_eq!(
                found.contains(&doc_id),
                expected,
                "doc {} body {:?} query {:?}", doc_id, body, query
            );
        }
    }

    #[test]
    fn phrase_search_matches_brute_force(
        bodies in prop::collection::vec("[ab]{2,10}", 1..5),
        query in "[ab]{3,5}",
    ) {
        let mut e = engine(EngineConfig {
            enable_phrase_search: true,
            ..EngineConfig::default()
        });
        for (i, body) in bodies.iter().enumerate() {
            e.add_document(&format!("doc-{i}"), body).unwrap();
        }
        e.flush().unwrap();

        let n = e.config().token_len as usize;
        let query_tokens = ngram_service::tokenizer::ngram_windows(&query, n);
        prop_assume!(query_tokens.len() >= 2);

        // Keep only runs where every query token exists in the corpus, so
        // no token is dropped and the phrase semantics stay comparable to
        // the brute-force check.
        let corpus_tokens: std::collections::HashSet<String> = bodies
            .iter()
            .flat_map(|b| ngram_service::tokenizer::ngram_windows(b, n))
            .map(|(t, _)| t)
            .collect();
        prop_assume!(query_tokens.iter().all(|(t, _)| corpus_tokens.contains(t)));

        let found = doc_ids(&e.search(&query).unwrap());
        for (i, body) in bodies.iter().enumerate() {
            let doc_id = e.store().get_document_id(&format!("doc-{i}")).unwrap();
            prop_assert_eq!(
                found.contains(&doc_id),
                brute_force_phrase_match(body, &query, n),
                "doc {} body {:?} query {:?}", doc_id, body, query
            );
        }
    }
}
