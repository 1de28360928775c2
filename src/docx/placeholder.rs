//! `{{KEY}}` tokens: KEY starts with `A-Z` and continues with `A-Z`, `0-9`
//! or `_`. Matching is leftmost-first, non-overlapping and case-sensitive.
//!
//! The scanner is a hand-written state machine, linear in the input length.

use std::collections::BTreeMap;
use std::ops::Range;

use crate::docx::xml::escape_text;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Placeholder<'a> {
    /// Byte range of the whole token, braces included.
    pub start: usize,
    pub end: usize,
    pub key: &'a str,
}

impl Placeholder<'_> {
    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }
}

pub struct Placeholders<'a> {
    text: &'a str,
    pos: usize,
}

pub fn scan(text: &str) -> Placeholders<'_> {
    Placeholders { text, pos: 0 }
}

impl<'a> Iterator for Placeholders<'a> {
    type Item = Placeholder<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let bytes = self.text.as_bytes();
        while self.pos + 1 < bytes.len() {
            let start = self.pos;
            if bytes[start] != b'{' || bytes[start + 1] != b'{' {
                self.pos += 1;
                continue;
            }
            match match_token(bytes, start) {
                Some(end) => {
                    self.pos = end;
                    return Some(Placeholder {
                        start,
                        end,
                        key: &self.text[start + 2..end - 2],
                    });
                }
                // Retry one byte later: `{{{KEY}}` matches at the second brace.
                None => self.pos += 1,
            }
        }
        self.pos = bytes.len();
        None
    }
}

/// End offset of a token starting with `{{` at `start`, if one is there.
fn match_token(bytes: &[u8], start: usize) -> Option<usize> {
    let mut i = start + 2;
    if !bytes.get(i)?.is_ascii_uppercase() {
        return None;
    }
    i += 1;
    while let Some(&b) = bytes.get(i) {
        if !is_key_byte(b) {
            break;
        }
        i += 1;
    }
    if bytes.get(i) == Some(&b'}') && bytes.get(i + 1) == Some(&b'}') {
        Some(i + 2)
    } else {
        None
    }
}

fn is_key_byte(b: u8) -> bool {
    b.is_ascii_uppercase() || b.is_ascii_digit() || b == b'_'
}

pub fn is_valid_key(key: &str) -> bool {
    let bytes = key.as_bytes();
    matches!(bytes.first(), Some(b) if b.is_ascii_uppercase())
        && bytes[1..].iter().all(|&b| is_key_byte(b))
}

/// Escapes a fill value for insertion into raw character data.
///
/// All five predefined entities are replaced, and every line break (`\r\n`,
/// `\n` or `\r`) collapses to one space so a value never splits a text node.
pub fn escape_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                out.push(' ');
            }
            '\n' => out.push(' '),
            _ => out.push(ch),
        }
    }
    out
}

pub fn escape_values(values: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    values
        .iter()
        .map(|(k, v)| (k.clone(), escape_value(v)))
        .collect()
}

/// Replaces every token whose key is in `values`; unknown tokens stay as they are.
/// Returns the new text and the number of tokens replaced.
pub fn substitute(text: &str, values: &BTreeMap<String, String>) -> (String, usize) {
    let mut out = String::with_capacity(text.len());
    let mut last = 0usize;
    let mut replaced = 0usize;
    for ph in scan(text) {
        let Some(value) = values.get(ph.key) else {
            continue;
        };
        out.push_str(&text[last..ph.start]);
        out.push_str(value);
        last = ph.end;
        replaced += 1;
    }
    if replaced == 0 {
        return (text.to_string(), 0);
    }
    out.push_str(&text[last..]);
    (out, replaced)
}

/// Like [`substitute`], but `text` is unescaped character data: the text
/// around each token is escaped on the way out while values, already
/// escaped, are inserted verbatim. The result is raw character data.
pub fn substitute_text(text: &str, values: &BTreeMap<String, String>) -> (String, usize) {
    let mut out = String::with_capacity(text.len());
    let mut last = 0usize;
    let mut replaced = 0usize;
    for ph in scan(text) {
        let Some(value) = values.get(ph.key) else {
            continue;
        };
        out.push_str(&escape_text(&text[last..ph.start]));
        out.push_str(value);
        last = ph.end;
        replaced += 1;
    }
    out.push_str(&escape_text(&text[last..]));
    (out, replaced)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(text: &str) -> Vec<&str> {
        scan(text).map(|p| p.key).collect()
    }

    #[test]
    fn finds_multiple_tokens_in_one_text() {
        assert_eq!(keys("{{DOCUMENT_ID}}  Rev {{REVISION}}"), vec!["DOCUMENT_ID", "REVISION"]);
    }

    #[test]
    fn grammar_is_uppercase_start_and_case_sensitive() {
        assert!(keys("{{name}} {{1ABC}} {{_X}} {{A-B}} {{ A }}").is_empty());
        assert_eq!(keys("{{A}}{{B2_C}}"), vec!["A", "B2_C"]);
        assert!(keys("{{UNCLOSED} {{ALSO").is_empty());
    }

    #[test]
    fn leftmost_match_after_extra_braces() {
        let found: Vec<Placeholder> = scan("x{{{KEY}}}").collect();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].key, "KEY");
        assert_eq!(found[0].range(), 2..9);
    }

    #[test]
    fn handles_non_ascii_around_tokens() {
        assert_eq!(keys("Größe: {{SIZE}} – ok"), vec!["SIZE"]);
    }

    #[test]
    fn validates_keys() {
        assert!(is_valid_key("REF_1_ID"));
        assert!(!is_valid_key("ref"));
        assert!(!is_valid_key(""));
        assert!(!is_valid_key("A B"));
    }

    #[test]
    fn escape_leaves_plain_text_alone() {
        assert_eq!(escape_value("plain text 123"), "plain text 123");
    }

    #[test]
    fn escape_covers_all_entities() {
        assert_eq!(
            escape_value(r#"R&D <Lab> "X" 'Y'"#),
            "R&amp;D &lt;Lab&gt; &quot;X&quot; &apos;Y&apos;"
        );
    }

    #[test]
    fn escape_collapses_line_breaks() {
        assert_eq!(escape_value("a\nb\r\nc\rd"), "a b c d");
    }

    #[test]
    fn substitute_keeps_unknown_tokens() {
        let mut values = BTreeMap::new();
        values.insert("NAME".to_string(), "Acme".to_string());
        let (out, n) = substitute("{{NAME}} / {{OTHER}} / {{NAME}}", &values);
        assert_eq!(out, "Acme / {{OTHER}} / Acme");
        assert_eq!(n, 2);

        let (out, n) = substitute("{{OTHER}}", &values);
        assert_eq!((out.as_str(), n), ("{{OTHER}}", 0));
    }

    #[test]
    fn substitute_text_escapes_around_values() {
        let mut values = BTreeMap::new();
        values.insert("NAME".to_string(), "A&amp;B".to_string());
        let (out, n) = substitute_text("R&D {{NAME}} <{{OTHER}}>", &values);
        assert_eq!(out, "R&amp;D A&amp;B &lt;{{OTHER}}&gt;");
        assert_eq!(n, 1);
    }
}
