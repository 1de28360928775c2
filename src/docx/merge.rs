use crate::docx::tree::{Document, Element, Node};

/// Merges adjacent `w:r` siblings whose run properties are identical, under
/// every element of the part. Returns the number of runs folded away.
///
/// Editors split one visible span into several runs on invisible boundaries
/// (spell-check state, revision ids), which can cut a `{{KEY}}` token in two.
/// Merging never crosses a non-run sibling such as a bookmark or a comment.
pub fn merge_runs(doc: &mut Document) -> usize {
    merge_in(&mut doc.root)
}

fn merge_in(el: &mut Element) -> usize {
    let mut merged = 0usize;
    for child in el.children.iter_mut() {
        if let Node::Element(c) = child {
            merged += merge_in(c);
        }
    }

    let mut i = 0usize;
    while i < el.children.len() {
        let Some(next) = next_significant(&el.children, i + 1) else {
            break;
        };
        if !runs_mergeable(&el.children[i], &el.children[next]) {
            i = next;
            continue;
        }
        if let (Node::Element(right), Some(left)) =
            (el.children.remove(next), el.children[i].as_element_mut())
        {
            absorb_run(left, right);
            merged += 1;
        }
        // Same index again: the extended run may also match its new neighbour.
    }
    merged
}

fn next_significant(children: &[Node], from: usize) -> Option<usize> {
    (from..children.len()).find(|&j| !children[j].is_ignorable())
}

fn runs_mergeable(a: &Node, b: &Node) -> bool {
    let (Some(a), Some(b)) = (a.as_element(), b.as_element()) else {
        return false;
    };
    if !a.is_w("r") || !b.is_w("r") {
        return false;
    }
    match (a.first_w_child("rPr"), b.first_w_child("rPr")) {
        (None, None) => true,
        (Some(pa), Some(pb)) => pa.canonical() == pb.canonical(),
        _ => false,
    }
}

/// Moves the content of `right` into `left`, keeping visible order.
///
/// When `left` ends with a `w:t` and `right` starts with one, the two texts are
/// joined into the left element; everything else from `right` (apart from its
/// `w:rPr`) is appended after it.
fn absorb_run(left: &mut Element, right: Element) {
    let mut content: Vec<Node> = right
        .children
        .into_iter()
        .filter(|n| !matches!(n, Node::Element(e) if e.is_w("rPr")) && !n.is_ignorable())
        .collect();

    let first_text = match content.first() {
        Some(Node::Element(e)) if e.is_w("t") => Some(e.raw_text()),
        _ => None,
    };
    if let (Some(first_text), Some(last_t)) = (first_text, last_content_text(left)) {
        let mut raw = last_t.raw_text();
        raw.push_str(&first_text);
        last_t.set_raw_text(raw);
        last_t.preserve_space();
        content.remove(0);
    }

    left.children.extend(content);
}

/// The run's last content child, if it is a `w:t`.
fn last_content_text(run: &mut Element) -> Option<&mut Element> {
    let idx = run.children.iter().rposition(|n| !n.is_ignorable())?;
    match &mut run.children[idx] {
        Node::Element(e) if e.is_w("t") => Some(e),
        _ => None,
    }
}
