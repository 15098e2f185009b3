//! Sliding character-n-gram tokenizer.
//!
//! Both ingest and query sides go through [`ngram_windows`], which is a pure
//! function of the input text and the window length, so the two sides can
//! never disagree on token boundaries.

use ngram_model::Position;

/// Fullwidth/ideographic punctuation skipped in addition to the ASCII set.
const IGNORED_WIDE: [char; 16] = [
    '\u{3000}', // ideographic space
    '\u{3001}', // 、
    '\u{3002}', // 。
    '\u{FF08}', // （
    '\u{FF09}', // ）
    '\u{FF01}', // ！
    '\u{FF0C}', // ，
    '\u{FF1A}', // ：
    '\u{FF1B}', // ；
    '\u{FF1F}', // ？
    '\u{FF3B}', // ［
    '\u{FF3D}', // ］
    '\u{201C}', // “
    '\u{201D}', // ”
    '\u{2018}', // ‘
    '\u{2019}', // ’
];

/// Whether `ch` separates n-gram windows. ASCII whitespace and punctuation
/// are separators, except '.' which stays indexable so numeric fragments
/// like "2." and ".5" form tokens.
pub fn is_ignored_char(ch: char) -> bool {
    if ch.is_ascii() {
        return ch.is_ascii_whitespace() || (ch.is_ascii_punctuation() && ch != '.');
    }
    IGNORED_WIDE.contains(&ch)
}

/// Emit every window of exactly `n` non-ignored code points, sliding one
/// code point at a time. ASCII characters are lowercased; the position is
/// the 0-based ordinal of the emitted window, so adjacent tokens differ by
/// exactly one.
pub fn ngram_windows(text: &str, n: usize) -> Vec<(String, Position)> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut pos = 0usize;
    let mut next_position: Position = 0;

    while pos < chars.len() {
        while pos < chars.len() && is_ignored_char(chars[pos]) {
            pos += 1;
        }
        if pos >= chars.len() {
            break;
        }

        let start = pos;
        let mut count = 0usize;
        while pos < chars.len() && count < n && !is_ignored_char(chars[pos]) {
            pos += 1;
            count += 1;
        }

        if count == n {
            let token: String = chars[start..start + n]
                .iter()
                .map(|c| c.to_ascii_lowercase())
                .collect();
            tokens.push((token, next_position));
            next_position += 1;
        }

        // Slide the window one code point; runs shorter than n re-scan and
        // fall out without emitting.
        pos = start + 1;
    }

    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(tokens: &[(String, Position)]) -> Vec<&str> {
        tokens.iter().map(|(t, _)| t.as_str()).collect()
    }

    #[test]
    fn bigrams_skip_whitespace_and_lowercase_ascii() {
        let tokens = ngram_windows("Artificial Intelligence", 2);
        assert_eq!(
            texts(&tokens),
            vec![
                "ar", "rt", "ti", "if", "fi", "ic", "ci", "ia", "al", "in", "nt", "te", "el",
                "ll", "li", "ig", "ge", "en", "nc", "ce"
            ]
        );
        // Positions are consecutive ordinals.
        for (i, (_, p)) in tokens.iter().enumerate() {
            assert_eq!(*p, i as Position);
        }
    }

    #[test]
    fn ascii_punctuation_separates_windows_except_period() {
        assert_eq!(texts(&ngram_windows("ab,cd", 2)), vec!["ab", "cd"]);
        assert_eq!(texts(&ngram_windows("a-b", 2)), Vec::<&str>::new());
        // '.' is a token character.
        assert_eq!(texts(&ngram_windows("2.5", 2)), vec!["2.", ".5"]);
    }

    #[test]
    fn fullwidth_punctuation_separates_windows() {
        assert_eq!(texts(&ngram_windows("犬。猫と", 2)), vec!["猫と"]);
        assert_eq!(texts(&ngram_windows("ab　cd", 2)), vec!["ab", "cd"]);
        assert_eq!(texts(&ngram_windows("“ab”", 2)), vec!["ab"]);
    }

    #[test]
    fn runs_shorter_than_n_emit_nothing() {
        assert!(ngram_windows("a b c", 2).is_empty());
        assert!(ngram_windows("", 2).is_empty());
        assert!(ngram_windows("   ", 2).is_empty());
    }

    #[test]
    fn unigrams_emit_each_character() {
        let tokens = ngram_windows("a b", 1);
        assert_eq!(texts(&tokens), vec!["a", "b"]);
        assert_eq!(tokens[0].1, 0);
        assert_eq!(tokens[1].1, 1);
    }

    #[test]
    fn trigram_windows_overlap_by_one() {
        assert_eq!(texts(&ngram_windows("abcd", 3)), vec!["abc", "bcd"]);
    }

    #[test]
    fn non_ascii_is_not_lowercased() {
        assert_eq!(texts(&ngram_windows("ÉA", 2)), vec!["Éa"]);
    }

    #[test]
    fn tokenization_is_deterministic() {
        let text = "Mixed 日本語 and ASCII, twice.";
        assert_eq!(ngram_windows(text, 2), ngram_windows(text, 2));
    }
}
