use std::path::PathBuf;

use document_loader::{ndjson, tsv, wiki, RawDocument};
use ngram_model::{CompressMethod, EngineConfig, ScoringMethod};
use ngram_service::SearchEnvironment;
use tracing::info;

fn print_usage() {
    eprintln!(
        "Usage:\n\
         ngram-cli index [db_path] (--tsv PATH [--header] | --ndjson PATH | --json PATH | --wiki PATH)\n\
         \x20                 [--ngram N] [--golomb] [--threshold N] [--max N] [--phrase]\n\
         ngram-cli search [db_path] --query Q [--phrase] [--tfidf] [--top N] [--bodies]\n\
         ngram-cli dump [db_path] --query Q\n\
         ngram-cli list [db_path]\n\
         \n\
         Notes: db_path defaults to target/demo/ngram.db; --ngram and --golomb are fixed\n\
         once the index holds documents.\n"
    );
}

fn take_value(args: &[String], i: &mut usize, flag: &str) -> Result<String, String> {
    if *i + 1 < args.len() {
        let v = args[*i + 1].clone();
        *i += 2;
        Ok(v)
    } else {
        Err(format!("{flag} requires a value"))
    }
}

/// Detect an optional leading db path, defaulting like the demo tools do.
fn split_db_path(mut tail: Vec<String>) -> (PathBuf, Vec<String>) {
    let default_db = PathBuf::from("target/demo/ngram.db");
    if !tail.is_empty() && !tail[0].starts_with('-') {
        let db = PathBuf::from(tail.remove(0));
        (db, tail)
    } else {
        (default_db, tail)
    }
}

enum Source {
    Tsv { path: PathBuf, header: bool },
    Ndjson(PathBuf),
    JsonArray(PathBuf),
    Wiki(PathBuf),
}

fn do_index(tail: Vec<String>) -> Result<(), Box<dyn std::error::Error>> {
    let (db_path, rest) = split_db_path(tail);

    let mut source: Option<Source> = None;
    let mut header = false;
    let mut cfg = EngineConfig {
        db_path,
        ..EngineConfig::default()
    };
    let mut phrase: Option<bool> = None;

    let mut i = 0;
    while i < rest.len() {
        match rest[i].as_str() {
            "--tsv" => {
                let path = PathBuf::from(take_value(&rest, &mut i, "--tsv")?);
                source = Some(Source::Tsv { path, header });
            }
            "--header" => {
                header = true;
                if let Some(Source::Tsv { header: h, .. }) = source.as_mut() {
                    *h = true;
                }
                i += 1;
            }
            "--ndjson" => {
                source = Some(Source::Ndjson(PathBuf::from(take_value(
                    &rest, &mut i, "--ndjson",
                )?)));
            }
            "--json" => {
                source = Some(Source::JsonArray(PathBuf::from(take_value(
                    &rest, &mut i, "--json",
                )?)));
            }
            "--wiki" => {
                source = Some(Source::Wiki(PathBuf::from(take_value(
                    &rest, &mut i, "--wiki",
                )?)));
            }
            "--ngram" => {
                cfg.token_len = take_value(&rest, &mut i, "--ngram")?.parse()?;
            }
            "--golomb" => {
                cfg.compress_method = CompressMethod::Golomb;
                i += 1;
            }
            "--threshold" => {
                cfg.buffer_update_threshold = take_value(&rest, &mut i, "--threshold")?.parse()?;
            }
            "--max" => {
                cfg.max_index_count = take_value(&rest, &mut i, "--max")?.parse()?;
            }
            "--phrase" => {
                phrase = Some(true);
                i += 1;
            }
            other => {
                eprintln!("Unknown arg: {other}");
                print_usage();
                return Ok(());
            }
        }
    }

    let Some(source) = source else {
        eprintln!("One of --tsv / --ndjson / --json / --wiki must be provided");
        print_usage();
        return Ok(());
    };

    let mut env = SearchEnvironment::new(cfg)?;
    if let Some(enabled) = phrase {
        env.set_phrase_search_enabled(enabled);
    }

    let mut submitted = 0u64;
    let mut skipped = 0u64;
    {
        let mut sink = |doc: RawDocument| {
            match env.add_document(&doc.title, &doc.body) {
                Ok(()) => submitted += 1,
                Err(e) => {
                    skipped += 1;
                    eprintln!("skipping {:?}: {e}", doc.title);
                }
            }
            if submitted % 1000 == 0 && submitted > 0 {
                info!(submitted, "indexing progress");
            }
            !env.has_reached_index_limit()
        };
        match source {
            Source::Tsv { path, header } => {
                tsv::load_tsv(&path, header, &mut sink)?;
            }
            Source::Ndjson(path) => {
                ndjson::load_ndjson(&path, &mut sink)?;
            }
            Source::JsonArray(path) => {
                ndjson::load_json_array(&path, &mut sink)?;
            }
            Source::Wiki(path) => {
                wiki::load_wiki_xml(&path, &mut sink)?;
            }
        }
    }

    env.shutdown()?;
    println!("Indexed {submitted} document(s), skipped {skipped}");
    Ok(())
}

fn do_search(tail: Vec<String>) -> Result<(), Box<dyn std::error::Error>> {
    let (db_path, rest) = split_db_path(tail);

    let mut query: Option<String> = None;
    let mut phrase: Option<bool> = None;
    let mut scoring: Option<ScoringMethod> = None;
    let mut top = 10usize;
    let mut bodies = false;

    let mut i = 0;
    while i < rest.len() {
        match rest[i].as_str() {
            "--query" => query = Some(take_value(&rest, &mut i, "--query")?),
            "--phrase" => {
                phrase = Some(true);
                i += 1;
            }
            "--tfidf" => {
                scoring = Some(ScoringMethod::TfIdf);
                i += 1;
            }
            "--top" => top = take_value(&rest, &mut i, "--top")?.parse()?,
            "--bodies" => {
                bodies = true;
                i += 1;
            }
            other => {
                eprintln!("Unknown arg: {other}");
                print_usage();
                return Ok(());
            }
        }
    }

    let Some(query) = query else {
        eprintln!("--query is required");
        print_usage();
        return Ok(());
    };

    let cfg = EngineConfig {
        db_path,
        ..EngineConfig::default()
    };
    let mut env = SearchEnvironment::new(cfg)?;
    if let Some(enabled) = phrase {
        env.set_phrase_search_enabled(enabled);
    }
    if let Some(method) = scoring {
        env.set_scoring_method(method);
    }

    let hits = env.search(&query)?;
    if hits.is_empty() {
        println!("No documents found matching the query.");
        return Ok(());
    }

    println!("Found {} matching documents:", hits.len());
    println!("{}", "=".repeat(60));
    for (rank, hit) in hits.iter().take(top).enumerate() {
        let title = env.store().get_document_title(hit.doc_id)?;
        if title.is_empty() {
            println!("{}. Document ID: {}, Score: {:.4}", rank + 1, hit.doc_id, hit.score);
        } else {
            println!(
                "{}. Document ID: {}, Title: {}, Score: {:.4}",
                rank + 1,
                hit.doc_id,
                title,
                hit.score
            );
        }
        if bodies {
            println!("   Body: {}", env.body_preview(hit.doc_id, 240)?);
        }
    }
    if hits.len() > top {
        println!("... and {} more documents.", hits.len() - top);
    }
    println!("{}", "=".repeat(60));
    Ok(())
}

fn do_dump(tail: Vec<String>) -> Result<(), Box<dyn std::error::Error>> {
    let (db_path, rest) = split_db_path(tail);

    let mut query: Option<String> = None;
    let mut i = 0;
    while i < rest.len() {
        match rest[i].as_str() {
            "--query" => query = Some(take_value(&rest, &mut i, "--query")?),
            other => {
                eprintln!("Unknown arg: {other}");
                print_usage();
                return Ok(());
            }
        }
    }
    let Some(query) = query else {
        eprintln!("--query is required");
        print_usage();
        return Ok(());
    };

    let cfg = EngineConfig {
        db_path,
        ..EngineConfig::default()
    };
    let env = SearchEnvironment::new(cfg)?;
    let dumps = env.dump_query_postings(&query)?;
    if dumps.is_empty() {
        println!("No known tokens in query.");
        return Ok(());
    }
    for dump in dumps {
        println!(
            "- Token: {:?} (id={}), docs(disk)={}, docs(mem)={}",
            dump.text,
            dump.token_id,
            dump.disk_docs_count,
            dump.buffered_items.len()
        );
        for item in &dump.disk_items {
            println!("    [disk] doc {} positions: {:?}", item.doc_id, item.positions);
        }
        for item in &dump.buffered_items {
            println!("    [mem] doc {} positions: {:?}", item.doc_id, item.positions);
        }
    }
    Ok(())
}

fn do_list(tail: Vec<String>) -> Result<(), Box<dyn std::error::Error>> {
    let (db_path, rest) = split_db_path(tail);
    if let Some(arg) = rest.first() {
        eprintln!("Unknown arg: {arg}");
        print_usage();
        return Ok(());
    }

    let cfg = EngineConfig {
        db_path,
        ..EngineConfig::default()
    };
    let env = SearchEnvironment::new(cfg)?;
    let docs = env.store().get_all_documents()?;
    println!("Total documents: {}", docs.len());
    if docs.is_empty() {
        return Ok(());
    }
    println!("{}", "=".repeat(60));
    for (i, (title, body)) in docs.iter().enumerate() {
        let title = if title.is_empty() { "<untitled>" } else { title };
        println!("{}) Title: {title}", i + 1);
        println!("   Body: {}", ngram_service::preview_text(body, 240));
        if i + 1 < docs.len() {
            println!("{}", "-".repeat(60));
        }
    }
    println!("{}", "=".repeat(60));
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() {
        print_usage();
        return Ok(());
    }
    let command = args.remove(0);
    match command.as_str() {
        "index" => do_index(args),
        "search" => do_search(args),
        "dump" => do_dump(args),
        "list" => do_list(args),
        _ => {
            eprintln!("Unknown command: {command}");
            print_usage();
            Ok(())
        }
    }
}
