//! Tab-separated source: one `title \t body` record per line.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::{DocumentSink, LoaderError, RawDocument};

/// Read TSV records from `path`. Blank lines and lines without a tab or
/// with an empty title/body are skipped.
pub fn load_tsv(
    path: &Path,
    has_header: bool,
    sink: &mut DocumentSink<'_>,
) -> Result<u64, LoaderError> {
    let file = File::open(path)?;
    read_tsv(BufReader::new(file), has_header, sink)
}

pub fn read_tsv<R: BufRead>(
    reader: R,
    has_header: bool,
    sink: &mut DocumentSink<'_>,
) -> Result<u64, LoaderError> {
    let mut delivered = 0u64;
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if has_header && line_no == 0 {
            continue;
        }
        if line.is_empty() {
            continue;
        }
        let Some((title, body)) = line.split_once('\t') else {
            continue;
        };
        if title.is_empty() || body.is_empty() {
            continue;
        }
        delivered += 1;
        let keep_going = sink(RawDocument {
            title: title.to_string(),
            body: body.to_string(),
        });
        if !keep_going {
            break;
        }
    }
    Ok(delivered)
}
