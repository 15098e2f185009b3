//! Minimal ingest-then-search demo against a throwaway in-memory index.
//!
//! Run with: cargo run -p ngram-service --example ingest_and_search

use ngram_model::EngineConfig;
use ngram_service::SearchEnvironment;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut env = SearchEnvironment::open_in_memory(EngineConfig::default())?;

    env.add_document("AI", "Artificial Intelligence")?;
    env.add_document("ML", "machine learning and artificial neural networks")?;
    env.add_document("犬", "犬と猫の物語。犬は元気です。")?;
    env.flush()?;

    for query in ["intel", "artificial", "犬は"] {
        let hits = env.search(query)?;
        println!("query {query:?} -> {} hit(s)", hits.len());
        for hit in hits {
            let title = env.store().get_document_title(hit.doc_id)?;
            println!("  doc {} ({title}) score {:.4}", hit.doc_id, hit.score);
        }
    }
    Ok(())
}
