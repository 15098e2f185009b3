//! Wikipedia XML dump source: extracts `<page>` title/text pairs, filters
//! non-content pages and strips the most common wiki markup.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::LazyLock;

use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;

use crate::{DocumentSink, LoaderError, RawDocument};

/// Namespace prefixes of pages that are never content.
const SKIPPED_PREFIXES: [&str; 6] = [
    "Wikipedia:",
    "Help:",
    "Category:",
    "Template:",
    "File:",
    "Image:",
];

/// Minimum cleaned-content length worth indexing.
const MIN_CONTENT_LEN: usize = 100;

static MARKUP_RULES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        // File and image references disappear entirely.
        (r"\[\[(?:File|Image):[^\]]*\]\]", ""),
        // Internal links keep the display text: [[target|text]] / [[target]].
        (r"\[\[([^\]|]+)\|([^\]]+)\]\]", "$2"),
        (r"\[\[([^\]]+)\]\]", "$1"),
        // External links keep the label when present.
        (r"\[http[^\s\]]+ ([^\]]+)\]", "$1"),
        (r"\[http[^\s\]]+\]", ""),
        // Templates.
        (r"\{\{[^}]*\}\}", ""),
        // Bold and italic apostrophes.
        (r"'''([^']+)'''", "$1"),
        (r"''([^']+)''", "$1"),
        // References before the generic tag sweep so their content goes too.
        (r"<ref[^>]*>[^<]*</ref>", ""),
        (r"<ref[^>]*/>", ""),
        (r"<[^>]+>", ""),
        // Collapse whitespace last.
        (r"\s+", " "),
    ]
    .into_iter()
    .map(|(pattern, replacement)| (Regex::new(pattern).expect("markup rule"), replacement))
    .collect()
});

/// Strip wiki markup down to plain text.
pub fn clean_wiki_text(raw: &str) -> String {
    let mut cleaned = raw.to_string();
    for (pattern, replacement) in MARKUP_RULES.iter() {
        cleaned = pattern.replace_all(&cleaned, *replacement).into_owned();
    }
    cleaned.trim().to_string()
}

/// Whether a page is indexable content: non-empty, not a redirect, not a
/// disambiguation page, outside the system namespaces, long enough to
/// matter.
pub fn is_valid_page(title: &str, content: &str) -> bool {
    if title.is_empty() || content.is_empty() {
        return false;
    }
    if content.contains("#REDIRECT") || content.contains("#redirect") {
        return false;
    }
    if title.contains("(disambiguation)") {
        return false;
    }
    if SKIPPED_PREFIXES.iter().any(|p| title.starts_with(p)) {
        return false;
    }
    if content.len() < MIN_CONTENT_LEN {
        return false;
    }
    true
}

/// Stream pages out of a Wikipedia XML dump at `path`.
pub fn load_wiki_xml(path: &Path, sink: &mut DocumentSink<'_>) -> Result<u64, LoaderError> {
    let file = File::open(path)?;
    read_wiki_xml(BufReader::new(file), sink)
}

pub fn read_wiki_xml<R: BufRead>(
    reader: R,
    sink: &mut DocumentSink<'_>,
) -> Result<u64, LoaderError> {
    let mut xml = Reader::from_reader(reader);
    let mut buf = Vec::new();

    let mut in_page = false;
    let mut in_title = false;
    let mut in_text = false;
    let mut title = String::new();
    let mut text = String::new();
    let mut delivered = 0u64;

    loop {
        match xml
            .read_event_into(&mut buf)
            .map_err(|e| LoaderError::Parse(e.to_string()))?
        {
            Event::Start(e) => match e.name().as_ref() {
                b"page" => {
                    in_page = true;
                    title.clear();
                    text.clear();
                }
                b"title" if in_page => in_title = true,
                b"text" if in_page => in_text = true,
                _ => {}
            },
            Event::Text(t) => {
                if in_title || in_text {
                    let chunk = t
                        .unescape()
                        .map_err(|e| LoaderError::Parse(e.to_string()))?;
                    if in_title {
                        title.push_str(&chunk);
                    } else {
                        text.push_str(&chunk);
                    }
                }
            }
            Event::End(e) => match e.name().as_ref() {
                b"title" => in_title = false,
                b"text" => in_text = false,
                b"page" => {
                    in_page = false;
                    if is_valid_page(&title, &text) {
                        let body = clean_wiki_text(&text);
                        if !body.is_empty() {
                            delivered += 1;
                            let keep_going = sink(RawDocument {
                                title: title.clone(),
                                body,
                            });
                            if !keep_going {
                                break;
                            }
                        }
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(delivered)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(title: &str, text: &str) -> String {
        format!("<mediawiki><page><title>{title}</title><revision><text>{text}</text></revision></page></mediawiki>")
    }

    fn collect(xml: &str) -> Vec<RawDocument> {
        let mut docs = Vec::new();
        read_wiki_xml(xml.as_bytes(), &mut |doc| {
            docs.push(doc);
            true
        })
        .unwrap();
        docs
    }

    fn long_filler() -> String {
        "All human beings are born free and equal in dignity and rights. ".repeat(3)
    }

    #[test]
    fn extracts_title_and_cleaned_text() {
        let body = format!("Intro with [[linked article|a link]]. {}", long_filler());
        let docs = collect(&page("Article", &body));
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].title, "Article");
        assert!(docs[0].body.contains("Intro with a link."));
        assert!(!docs[0].body.contains("[["));
    }

    #[test]
    fn redirects_and_system_pages_are_skipped() {
        let filler = long_filler();
        let xml = format!(
            "<mediawiki>{}{}{}{}</mediawiki>",
            page("Real", &filler)
                .replace("<mediawiki>", "")
                .replace("</mediawiki>", ""),
            page("Redirected", &format!("#REDIRECT [[Real]] {filler}"))
                .replace("<mediawiki>", "")
                .replace("</mediawiki>", ""),
            page("Template:Box", &filler)
                .replace("<mediawiki>", "")
                .replace("</mediawiki>", ""),
            page("Name (disambiguation)", &filler)
                .replace("<mediawiki>", "")
                .replace("</mediawiki>", ""),
        );
        let docs = collect(&xml);
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].title, "Real");
    }

    #[test]
    fn short_pages_are_skipped() {
        assert!(collect(&page("Stub", "too short")).is_empty());
    }

    #[test]
    fn markup_cleanup_rules() {
        assert_eq!(clean_wiki_text("a [[b|c]] d"), "a c d");
        assert_eq!(clean_wiki_text("a [[b]] d"), "a b d");
        assert_eq!(clean_wiki_text("x {{infobox|k=v}} y"), "x y");
        assert_eq!(clean_wiki_text("'''bold''' and ''italic''"), "bold and italic");
        assert_eq!(clean_wiki_text("see [http://e.org the site] now"), "see the site now");
        assert_eq!(clean_wiki_text("a<ref name=\"x\">cite</ref> b"), "a b");
        assert_eq!(clean_wiki_text("keep [[Image:pic.png|thumb]] none"), "keep none");
        assert_eq!(clean_wiki_text("a\n\n  b\tc"), "a b c");
    }

    #[test]
    fn sink_stops_streaming_early() {
        let filler = long_filler();
        let pages: String = (0..3)
            .map(|i| {
                page(&format!("P{i}"), &filler)
                    .replace("<mediawiki>", "")
                    .replace("</mediawiki>", "")
            })
            .collect();
        let xml = format!("<mediawiki>{pages}</mediawiki>");

        let mut seen = 0;
        read_wiki_xml(xml.as_bytes(), &mut |_| {
            seen += 1;
            false
        })
        .unwrap();
        assert_eq!(seen, 1);
    }
}
