use std::collections::BTreeMap;

use crate::docx::placeholder::{substitute, substitute_text};
use crate::docx::tree::{Document, Element, Node, W_NS};

/// Gray used for placeholder instructions in the bundled templates.
pub const TEMPLATE_GRAY: &str = "808080";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FillStats {
    /// Tokens replaced with a value.
    pub replaced: usize,
    /// `w:t` elements that had at least one replacement.
    pub text_nodes: usize,
    /// Runs whose placeholder styling was stripped.
    pub runs_restyled: usize,
}

/// Substitutes `{{KEY}}` tokens in every `w:t` of the part.
///
/// `values` must already be escaped (see [`crate::docx::placeholder::escape_value`]);
/// they are inserted verbatim into raw character data. Keys missing from
/// `values` leave their token in place. Only character data and the owning
/// run's `w:rPr` are rewritten; no element is created or removed.
pub fn fill_placeholders(doc: &mut Document, values: &BTreeMap<String, String>) -> FillStats {
    let mut stats = FillStats::default();
    fill_in(&mut doc.root, values, &mut stats);
    stats
}

fn fill_in(el: &mut Element, values: &BTreeMap<String, String>, stats: &mut FillStats) {
    let mut filled_text = false;
    for child in el.children.iter_mut() {
        let Node::Element(c) = child else {
            continue;
        };
        if c.is_w("t") {
            if fill_text(c, values, stats) {
                filled_text = true;
            }
        } else {
            fill_in(c, values, stats);
        }
    }
    if filled_text && el.is_w("r") && strip_template_styling(el) {
        stats.runs_restyled += 1;
    }
}

fn fill_text(t: &mut Element, values: &BTreeMap<String, String>, stats: &mut FillStats) -> bool {
    let raw = t.raw_text();
    let (new_raw, replaced) = if !raw.contains('&') {
        if !raw.contains("{{") {
            return false;
        }
        substitute(&raw, values)
    } else {
        // Braces or key letters may be written as character references.
        match quick_xml::escape::unescape(&raw) {
            Ok(text) => substitute_text(&text, values),
            Err(_) => substitute(&raw, values),
        }
    };
    if replaced == 0 {
        return false;
    }
    t.set_raw_text(new_raw);
    t.preserve_space();
    stats.replaced += replaced;
    stats.text_nodes += 1;
    true
}

/// Drops italic, complex-script italic and the template gray from a run.
/// Returns whether anything was removed.
pub fn strip_template_styling(run: &mut Element) -> bool {
    let Some(rpr) = run.first_w_child_mut("rPr") else {
        return false;
    };
    let before = rpr.children.len();
    rpr.children.retain(|n| match n {
        Node::Element(e) => !is_template_style(e),
        _ => true,
    });
    rpr.children.len() != before
}

fn is_template_style(e: &Element) -> bool {
    if e.is_w("i") || e.is_w("iCs") {
        return true;
    }
    e.is_w("color")
        && e.attr(W_NS, "val")
            .is_some_and(|v| v.eq_ignore_ascii_case(TEMPLATE_GRAY))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docx::placeholder::escape_values;
    use crate::docx::tree::tests::doc;

    fn values(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        let raw: BTreeMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        escape_values(&raw)
    }

    fn part(inner: &str) -> Document {
        doc(&format!(
            r#"<w:document xmlns:w="{W_NS}"><w:body>{inner}</w:body></w:document>"#
        ))
    }

    fn xml(d: &Document) -> String {
        String::from_utf8(d.to_bytes()).expect("utf8")
    }

    const STYLED: &str = r#"<w:rPr><w:b/><w:i/><w:iCs/><w:color w:val="808080"/><w:sz w:val="20"/></w:rPr>"#;

    #[test]
    fn replaces_and_strips_template_styling_but_keeps_bold() {
        let mut d = part(&format!(r#"<w:p><w:r>{STYLED}<w:t>{{{{NAME}}}}</w:t></w:r></w:p>"#));
        let stats = fill_placeholders(&mut d, &values(&[("NAME", "Acme & Co")]));

        assert_eq!(stats.replaced, 1);
        assert_eq!(stats.runs_restyled, 1);
        let out = xml(&d);
        assert!(out.contains(r#"<w:t xml:space="preserve">Acme &amp; Co</w:t>"#), "{out}");
        assert!(out.contains("<w:b/>"));
        assert!(out.contains(r#"<w:sz w:val="20"/>"#));
        assert!(!out.contains("<w:i/>"));
        assert!(!out.contains("<w:iCs/>"));
        assert!(!out.contains("808080"));
        assert_eq!(d.texts().expect("texts"), vec!["Acme & Co"]);
    }

    #[test]
    fn unknown_key_leaves_run_untouched() {
        let src = format!(r#"<w:p><w:r>{STYLED}<w:t>{{{{OTHER}}}}</w:t></w:r></w:p>"#);
        let mut d = part(&src);
        let before = xml(&d);
        let stats = fill_placeholders(&mut d, &values(&[("NAME", "x")]));
        assert_eq!(stats, FillStats::default());
        assert_eq!(xml(&d), before);
    }

    #[test]
    fn only_the_template_gray_is_removed() {
        let mut d = part(
            r#"<w:p><w:r><w:rPr><w:color w:val="80808F"/></w:rPr><w:t>{{A}}</w:t></w:r><w:r><w:rPr><w:color w:val="808080"/></w:rPr><w:t>{{B}}</w:t></w:r></w:p>"#,
        );
        fill_placeholders(&mut d, &values(&[("A", "1"), ("B", "2")]));
        let out = xml(&d);
        assert!(out.contains(r#"w:val="80808F""#));
        assert_eq!(out.matches("w:color").count(), 1);
    }

    #[test]
    fn multiple_tokens_and_partial_fill_in_one_text() {
        let mut d = part(r#"<w:p><w:r><w:t>{{DOCUMENT_ID}}  Rev {{REVISION}} {{LATER}}</w:t></w:r></w:p>"#);
        let stats = fill_placeholders(
            &mut d,
            &values(&[("DOCUMENT_ID", "SOP-001"), ("REVISION", "3")]),
        );
        assert_eq!(stats.replaced, 2);
        assert_eq!(d.texts().expect("texts"), vec!["SOP-001  Rev 3 {{LATER}}"]);
    }

    #[test]
    fn text_outside_a_run_is_filled_without_restyling() {
        let mut d = part(r#"<w:p><w:t>{{A}}</w:t></w:p>"#);
        let stats = fill_placeholders(&mut d, &values(&[("A", "ok")]));
        assert_eq!((stats.replaced, stats.runs_restyled), (1, 0));
    }

    #[test]
    fn token_spelled_with_character_references_is_filled() {
        let mut d = part(r#"<w:p><w:r><w:t>R&amp;D: &#123;&#123;NAME&#x7D;} &lt;x&gt;</w:t></w:r></w:p>"#);
        let stats = fill_placeholders(&mut d, &values(&[("NAME", "A&B")]));
        assert_eq!(stats.replaced, 1);
        assert!(xml(&d).contains(">R&amp;D: A&amp;B &lt;x&gt;</w:t>"), "{}", xml(&d));
        assert_eq!(d.texts().expect("texts"), vec!["R&D: A&B <x>"]);
    }

    #[test]
    fn escaped_text_without_a_supplied_key_is_left_as_written() {
        let src = r#"<w:p><w:r><w:t>&#123;&#123;OTHER}} &amp; more</w:t></w:r></w:p>"#;
        let mut d = part(src);
        let before = xml(&d);
        assert_eq!(fill_placeholders(&mut d, &values(&[("NAME", "x")])).replaced, 0);
        assert_eq!(xml(&d), before);
    }

    #[test]
    fn quotes_are_written_as_entities() {
        let mut d = part(r#"<w:p><w:r><w:t>{{Q}}</w:t></w:r></w:p>"#);
        fill_placeholders(&mut d, &values(&[("Q", r#"Said "hi" to O'Brien"#)]));
        assert!(xml(&d).contains("Said &quot;hi&quot; to O&apos;Brien"));
        assert_eq!(d.texts().expect("texts"), vec![r#"Said "hi" to O'Brien"#]);
    }
}
