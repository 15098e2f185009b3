//! JSON sources: newline-delimited objects or one top-level array, each
//! object carrying `title` and `body` string fields.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use serde::Deserialize;

use crate::{DocumentSink, LoaderError, RawDocument};

#[derive(Debug, Deserialize)]
struct DocRecord {
    title: String,
    body: String,
}

impl DocRecord {
    fn into_document(self) -> Option<RawDocument> {
        if self.title.is_empty() || self.body.is_empty() {
            return None;
        }
        Some(RawDocument {
            title: self.title,
            body: self.body,
        })
    }
}

/// Read one JSON object per line. Blank lines and objects that fail to
/// parse or lack a usable title/body are skipped.
pub fn load_ndjson(path: &Path, sink: &mut DocumentSink<'_>) -> Result<u64, LoaderError> {
    let file = File::open(path)?;
    read_ndjson(BufReader::new(file), sink)
}

pub fn read_ndjson<R: BufRead>(
    reader: R,
    sink: &mut DocumentSink<'_>,
) -> Result<u64, LoaderError> {
    let mut delivered = 0u64;
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let Ok(record) = serde_json::from_str::<DocRecord>(&line) else {
            continue;
        };
        let Some(doc) = record.into_document() else {
            continue;
        };
        delivered += 1;
        if !sink(doc) {
            break;
        }
    }
    Ok(delivered)
}

/// Read a single top-level JSON array of objects.
pub fn load_json_array(path: &Path, sink: &mut DocumentSink<'_>) -> Result<u64, LoaderError> {
    let file = File::open(path)?;
    read_json_array(BufReader::new(file), sink)
}

pub fn read_json_array<R: Read>(
    reader: R,
    sink: &mut DocumentSink<'_>,
) -> Result<u64, LoaderError> {
    let records: Vec<DocRecord> =
        serde_json::from_reader(reader).map_err(|e| LoaderError::Parse(e.to_string()))?;
    let mut delivered = 0u64;
    for record in records {
        let Some(doc) = record.into_document() else {
            continue;
        };
        delivered += 1;
        if !sink(doc) {
            break;
        }
    }
    Ok(delivered)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ndjson_skips_malformed_and_incomplete_lines() {
        let input = r#"{"title":"a","body":"first"}
not json
{"title":"","body":"no title"}
{"title":"b","body":"second","extra":42}
"#;
        let mut docs = Vec::new();
        let delivered = read_ndjson(input.as_bytes(), &mut |doc| {
            docs.push(doc);
            true
        })
        .unwrap();
        assert_eq!(delivered, 2);
        assert_eq!(docs[0].title, "a");
        assert_eq!(docs[1].body, "second");
    }

    #[test]
    fn json_array_parses_with_a_standard_parser() {
        let input = r#"[
            {"title":"a","body":"first"},
            {"title":"b","body":"second"}
        ]"#;
        let mut docs = Vec::new();
        read_json_array(input.as_bytes(), &mut |doc| {
            docs.push(doc);
            true
        })
        .unwrap();
        assert_eq!(docs.len(), 2);
    }

    #[test]
    fn json_array_with_escapes_round_trips() {
        let input = r#"[{"title":"quote \" here","body":"line\nbreak"}]"#;
        let mut docs = Vec::new();
        read_json_array(input.as_bytes(), &mut |doc| {
            docs.push(doc);
            true
        })
        .unwrap();
        assert_eq!(docs[0].title, "quote \" here");
        assert_eq!(docs[0].body, "line\nbreak");
    }

    #[test]
    fn broken_array_is_a_parse_error() {
        let result = read_json_array("[{".as_bytes(), &mut |_| true);
        assert!(matches!(result, Err(LoaderError::Parse(_))));
    }
}
