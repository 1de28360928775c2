//! Owned element tree over the [`XmlEvent`] stream of one part.
//!
//! Names keep their source prefix for writing, and every element and
//! attribute also carries the namespace URI it resolves to, so matching and
//! run-property comparison do not depend on prefix spelling.

use crate::docx::xml::{escape_text, unescape_raw, write_xml_part, XmlEvent, XmlPart};
use crate::error::XmlError;

pub const W_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
pub const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
    CData(String),
    Comment(String),
    PI(String),
    DocType(String),
}

impl Node {
    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Node::Element(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_element_mut(&mut self) -> Option<&mut Element> {
        match self {
            Node::Element(e) => Some(e),
            _ => None,
        }
    }

    /// Whitespace between elements carries no content in WordprocessingML.
    pub fn is_ignorable(&self) -> bool {
        matches!(self, Node::Text(t) if t.chars().all(char::is_whitespace))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Attr {
    pub key: String,
    pub value: String,
    pub ns: Option<String>,
}

impl Attr {
    pub fn local_name(&self) -> &str {
        local_part(&self.key)
    }

    fn is_ns_decl(&self) -> bool {
        self.key == "xmlns" || self.key.starts_with("xmlns:")
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Element {
    pub name: String,
    pub ns: Option<String>,
    pub attrs: Vec<Attr>,
    pub children: Vec<Node>,
    self_closing: bool,
}

impl Element {
    pub fn local_name(&self) -> &str {
        local_part(&self.name)
    }

    pub fn is(&self, ns: &str, local: &str) -> bool {
        self.ns.as_deref() == Some(ns) && self.local_name() == local
    }

    pub fn is_w(&self, local: &str) -> bool {
        self.is(W_NS, local)
    }

    pub fn attr(&self, ns: &str, local: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|a| a.ns.as_deref() == Some(ns) && a.local_name() == local)
            .map(|a| a.value.as_str())
    }

    pub fn set_attr(&mut self, key: &str, ns: &str, value: &str) {
        let local = local_part(key);
        for a in self.attrs.iter_mut() {
            if a.ns.as_deref() == Some(ns) && a.local_name() == local {
                a.value = value.to_string();
                return;
            }
        }
        self.attrs.push(Attr {
            key: key.to_string(),
            value: value.to_string(),
            ns: Some(ns.to_string()),
        });
    }

    /// Marks a `w:t` so consumers keep its leading and trailing spaces.
    pub fn preserve_space(&mut self) {
        self.set_attr("xml:space", XML_NS, "preserve");
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(Node::as_element)
    }

    pub fn first_w_child(&self, local: &str) -> Option<&Element> {
        self.child_elements().find(|e| e.is_w(local))
    }

    pub fn first_w_child_mut(&mut self, local: &str) -> Option<&mut Element> {
        self.children
            .iter_mut()
            .filter_map(Node::as_element_mut)
            .find(|e| e.is_w(local))
    }

    /// Character data of this element in raw, escaped form.
    pub fn raw_text(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            match child {
                Node::Text(raw) => out.push_str(raw),
                Node::CData(text) => out.push_str(&escape_text(text)),
                _ => {}
            }
        }
        out
    }

    pub fn set_raw_text(&mut self, raw: String) {
        self.children
            .retain(|c| !matches!(c, Node::Text(_) | Node::CData(_)));
        if !raw.is_empty() {
            self.children.push(Node::Text(raw));
        }
    }

    /// Depth-first visit of every descendant element (self included).
    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a Element)) {
        f(self);
        for child in self.child_elements() {
            child.walk(f);
        }
    }

    /// Fingerprint independent of prefixes, namespace declarations,
    /// attribute order and pretty-printing whitespace.
    pub fn canonical(&self) -> String {
        let mut out = String::new();
        self.write_canonical(&mut out);
        out
    }

    fn write_canonical(&self, out: &mut String) {
        out.push('<');
        push_expanded(out, self.ns.as_deref(), self.local_name());
        let mut attrs: Vec<(String, String)> = self
            .attrs
            .iter()
            .filter(|a| !a.is_ns_decl())
            .map(|a| {
                let mut key = String::new();
                push_expanded(&mut key, a.ns.as_deref(), a.local_name());
                let value = quick_xml::escape::unescape(&a.value)
                    .map(|v| v.into_owned())
                    .unwrap_or_else(|_| a.value.clone());
                (key, value)
            })
            .collect();
        attrs.sort();
        for (k, v) in attrs {
            out.push(' ');
            out.push_str(&k);
            out.push_str("=\"");
            out.push_str(&v);
            out.push('"');
        }
        out.push('>');
        for child in &self.children {
            match child {
                Node::Element(e) => e.write_canonical(out),
                Node::Text(_) | Node::CData(_) if child.is_ignorable() => {}
                Node::Text(raw) => out.push_str(raw),
                Node::CData(text) => out.push_str(&escape_text(text)),
                Node::Comment(_) | Node::PI(_) | Node::DocType(_) => {}
            }
        }
        out.push_str("</>");
    }
}

fn push_expanded(out: &mut String, ns: Option<&str>, local: &str) {
    if let Some(ns) = ns {
        out.push('{');
        out.push_str(ns);
        out.push('}');
    }
    out.push_str(local);
}

fn local_part(name: &str) -> &str {
    name.rsplit_once(':').map(|(_, l)| l).unwrap_or(name)
}

fn prefix_part(name: &str) -> Option<&str> {
    name.split_once(':').map(|(p, _)| p)
}

/// A parsed part: the single root element plus whatever surrounds it.
#[derive(Clone, Debug)]
pub struct Document {
    pub name: String,
    pub prolog: Vec<Node>,
    pub root: Element,
    pub epilog: Vec<Node>,
}

#[derive(Default)]
struct NsScope {
    frames: Vec<Vec<(String, String)>>,
}

impl NsScope {
    fn push(&mut self, attrs: &[(String, String)]) {
        let mut frame = Vec::new();
        for (k, v) in attrs {
            if k == "xmlns" {
                frame.push((String::new(), v.clone()));
            } else if let Some(p) = k.strip_prefix("xmlns:") {
                frame.push((p.to_string(), v.clone()));
            }
        }
        self.frames.push(frame);
    }

    fn pop(&mut self) {
        self.frames.pop();
    }

    fn resolve(&self, prefix: &str) -> Option<String> {
        if prefix == "xml" {
            return Some(XML_NS.to_string());
        }
        self.frames
            .iter()
            .rev()
            .flat_map(|f| f.iter())
            .find(|(p, _)| p == prefix)
            .map(|(_, uri)| uri.clone())
            .filter(|uri| !uri.is_empty())
    }

    /// A prefix must be bound by an enclosing `xmlns:` declaration.
    fn resolve_prefix(&self, prefix: &str) -> Result<String, String> {
        self.resolve(prefix)
            .ok_or_else(|| format!("namespace prefix '{prefix}' is not declared"))
    }

    fn element_ns(&self, name: &str) -> Result<Option<String>, String> {
        match prefix_part(name) {
            Some(p) => self.resolve_prefix(p).map(Some),
            None => Ok(self.resolve("")),
        }
    }

    fn attr_ns(&self, key: &str) -> Result<Option<String>, String> {
        if key == "xmlns" || key.starts_with("xmlns:") {
            return Ok(None);
        }
        match prefix_part(key) {
            Some(p) => self.resolve_prefix(p).map(Some),
            None => Ok(None),
        }
    }
}

impl Document {
    pub fn from_part(part: &XmlPart) -> Result<Self, XmlError> {
        let structure = |detail: String| XmlError::Structure {
            part: part.name.clone(),
            detail,
        };

        let mut scope = NsScope::default();
        let mut stack: Vec<Element> = Vec::new();
        let mut prolog: Vec<Node> = Vec::new();
        let mut epilog: Vec<Node> = Vec::new();
        let mut root: Option<Element> = None;

        for ev in &part.events {
            let node = match ev {
                XmlEvent::Decl { .. } => continue,
                XmlEvent::Start { name, attrs } | XmlEvent::Empty { name, attrs } => {
                    scope.push(attrs);
                    let ns = scope.element_ns(name).map_err(&structure)?;
                    let attrs = attrs
                        .iter()
                        .map(|(k, v)| {
                            Ok(Attr {
                                key: k.clone(),
                                value: v.clone(),
                                ns: scope.attr_ns(k)?,
                            })
                        })
                        .collect::<Result<Vec<_>, String>>()
                        .map_err(&structure)?;
                    let el = Element {
                        name: name.clone(),
                        ns,
                        attrs,
                        children: Vec::new(),
                        self_closing: matches!(ev, XmlEvent::Empty { .. }),
                    };
                    if matches!(ev, XmlEvent::Start { .. }) {
                        stack.push(el);
                        continue;
                    }
                    scope.pop();
                    Node::Element(el)
                }
                XmlEvent::End { name } => {
                    let el = stack
                        .pop()
                        .ok_or_else(|| structure(format!("unexpected </{name}>")))?;
                    if &el.name != name {
                        return Err(structure(format!(
                            "</{name}> does not close <{}>",
                            el.name
                        )));
                    }
                    scope.pop();
                    Node::Element(el)
                }
                XmlEvent::Text { raw } => Node::Text(raw.clone()),
                XmlEvent::CData { text } => Node::CData(text.clone()),
                XmlEvent::Comment { text } => Node::Comment(text.clone()),
                XmlEvent::PI { content } => Node::PI(content.clone()),
                XmlEvent::DocType { text } => Node::DocType(text.clone()),
            };

            if let Some(parent) = stack.last_mut() {
                parent.children.push(node);
                continue;
            }
            let ignorable = node.is_ignorable();
            match node {
                Node::Element(el) => {
                    if root.is_some() {
                        return Err(structure(format!("second root element <{}>", el.name)));
                    }
                    root = Some(el);
                }
                Node::Text(_) | Node::CData(_) if !ignorable => {
                    return Err(structure("character data outside the root element".into()));
                }
                other if root.is_none() => prolog.push(other),
                other => epilog.push(other),
            }
        }

        if let Some(open) = stack.last() {
            return Err(structure(format!("<{}> is never closed", open.name)));
        }
        let root = root.ok_or_else(|| structure("no root element".into()))?;
        Ok(Self {
            name: part.name.clone(),
            prolog,
            root,
            epilog,
        })
    }

    pub fn parse(name: &str, xml_bytes: &[u8]) -> Result<Self, XmlError> {
        let part = crate::docx::xml::parse_xml_part(name, xml_bytes)?;
        Self::from_part(&part)
    }

    /// Serializes with a fresh `UTF-8`, `standalone="yes"` declaration.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut events = vec![XmlEvent::Decl {
            version: "1.0".to_string(),
            encoding: Some("UTF-8".to_string()),
            standalone: Some("yes".to_string()),
        }];
        for node in &self.prolog {
            push_events(node, &mut events);
        }
        push_element_events(&self.root, &mut events);
        for node in &self.epilog {
            push_events(node, &mut events);
        }
        write_xml_part(&XmlPart {
            name: self.name.clone(),
            events,
        })
    }

    /// Every `w:t` element in document order.
    pub fn text_elements(&self) -> Vec<&Element> {
        let mut out = Vec::new();
        self.root.walk(&mut |e| {
            if e.is_w("t") {
                out.push(e);
            }
        });
        out
    }

    /// Unescaped text of every `w:t`, in document order.
    pub fn texts(&self) -> Result<Vec<String>, XmlError> {
        self.text_elements()
            .into_iter()
            .map(|t| unescape_raw(&self.name, &t.raw_text()).map(|s| s.into_owned()))
            .collect()
    }
}

fn push_events(node: &Node, events: &mut Vec<XmlEvent>) {
    match node {
        Node::Element(el) => push_element_events(el, events),
        Node::Text(raw) => events.push(XmlEvent::Text { raw: raw.clone() }),
        Node::CData(text) => events.push(XmlEvent::CData { text: text.clone() }),
        Node::Comment(text) => events.push(XmlEvent::Comment { text: text.clone() }),
        Node::PI(content) => events.push(XmlEvent::PI {
            content: content.clone(),
        }),
        Node::DocType(text) => events.push(XmlEvent::DocType { text: text.clone() }),
    }
}

fn push_element_events(el: &Element, events: &mut Vec<XmlEvent>) {
    let attrs: Vec<(String, String)> = el
        .attrs
        .iter()
        .map(|a| (a.key.clone(), a.value.clone()))
        .collect();
    if el.children.is_empty() && el.self_closing {
        events.push(XmlEvent::Empty {
            name: el.name.clone(),
            attrs,
        });
        return;
    }
    events.push(XmlEvent::Start {
        name: el.name.clone(),
        attrs,
    });
    for child in &el.children {
        push_events(child, events);
    }
    events.push(XmlEvent::End {
        name: el.name.clone(),
    });
}
