use std::borrow::Cow;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::XmlError;

/// One XML event with text and attribute values kept in their raw, escaped
/// form, so that writing an unmodified event reproduces the source bytes.
#[derive(Clone, Debug, PartialEq)]
pub enum XmlEvent {
    Decl {
        version: String,
        encoding: Option<String>,
        standalone: Option<String>,
    },
    Start {
        name: String,
        attrs: Vec<(String, String)>,
    },
    End {
        name: String,
    },
    Empty {
        name: String,
        attrs: Vec<(String, String)>,
    },
    Text {
        raw: String,
    },
    CData {
        text: String,
    },
    Comment {
        text: String,
    },
    PI {
        content: String,
    },
    DocType {
        text: String,
    },
}

#[derive(Clone, Debug)]
pub struct XmlPart {
    pub name: String,
    pub events: Vec<XmlEvent>,
}

pub fn parse_xml_part(name: &str, xml_bytes: &[u8]) -> Result<XmlPart, XmlError> {
    let syntax = |source: quick_xml::Error| XmlError::Syntax {
        part: name.to_string(),
        source,
    };

    let mut reader = Reader::from_reader(xml_bytes);
    reader.config_mut().trim_text(false);

    let mut events: Vec<XmlEvent> = Vec::new();
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let ev = reader.read_event_into(&mut buf).map_err(syntax)?;
        match ev {
            Event::Eof => break,
            Event::Decl(d) => {
                let version = utf8(name, &d.version().map_err(syntax)?)?;
                let encoding = match d.encoding() {
                    Some(e) => Some(utf8(name, &e.map_err(|e| syntax(e.into()))?)?),
                    None => None,
                };
                let standalone = match d.standalone() {
                    Some(s) => Some(utf8(name, &s.map_err(|e| syntax(e.into()))?)?),
                    None => None,
                };
                events.push(XmlEvent::Decl {
                    version,
                    encoding,
                    standalone,
                });
            }
            Event::Start(s) => {
                events.push(XmlEvent::Start {
                    name: utf8(name, s.name().as_ref())?,
                    attrs: collect_attrs(name, &s)?,
                });
            }
            Event::End(e) => {
                events.push(XmlEvent::End {
                    name: utf8(name, e.name().as_ref())?,
                });
            }
            Event::Empty(s) => {
                events.push(XmlEvent::Empty {
                    name: utf8(name, s.name().as_ref())?,
                    attrs: collect_attrs(name, &s)?,
                });
            }
            Event::Text(t) => {
                events.push(XmlEvent::Text {
                    raw: utf8(name, &t.into_inner())?,
                });
            }
            Event::CData(t) => {
                events.push(XmlEvent::CData {
                    text: utf8(name, &t.into_inner())?,
                });
            }
            Event::Comment(t) => {
                events.push(XmlEvent::Comment {
                    text: utf8(name, &t.into_inner())?,
                });
            }
            Event::PI(t) => {
                let target = utf8(name, t.target())?;
                let content = utf8(name, t.content())?;
                events.push(XmlEvent::PI {
                    content: format!("{target}{content}"),
                });
            }
            Event::DocType(t) => {
                events.push(XmlEvent::DocType {
                    text: utf8(name, &t.into_inner())?,
                });
            }
        }
    }

    Ok(XmlPart {
        name: name.to_string(),
        events,
    })
}

fn utf8(part: &str, bytes: &[u8]) -> Result<String, XmlError> {
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|_| XmlError::Encoding {
            part: part.to_string(),
        })
}

fn collect_attrs(part: &str, s: &BytesStart<'_>) -> Result<Vec<(String, String)>, XmlError> {
    let mut attrs: Vec<(String, String)> = Vec::new();
    for a in s.attributes() {
        let a = a.map_err(|e| XmlError::Syntax {
            part: part.to_string(),
            source: e.into(),
        })?;
        let key = std::str::from_utf8(a.key.as_ref());
        // Raw value: character references such as `&#13;&#10;` must survive a
        // write untouched, unescaping them would normalize the value.
        let val = std::str::from_utf8(a.value.as_ref());
        match (key, val) {
            (Ok(k), Ok(v)) => attrs.push((k.to_string(), v.to_string())),
            _ => {
                return Err(XmlError::Encoding {
                    part: part.to_string(),
                })
            }
        }
    }
    Ok(attrs)
}

/// Resolves entity and character references in raw character data.
pub fn unescape_raw<'a>(part: &str, raw: &'a str) -> Result<Cow<'a, str>, XmlError> {
    quick_xml::escape::unescape(raw).map_err(|source| XmlError::Escape {
        part: part.to_string(),
        source,
    })
}

/// Escapes literal text for use as raw character data.
pub fn escape_text(text: &str) -> Cow<'_, str> {
    if !text.contains(['&', '<', '>']) {
        return Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(text.len() + 8);
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    Cow::Owned(out)
}

pub fn write_xml_part(part: &XmlPart) -> Vec<u8> {
    let mut out: Vec<u8> = Vec::new();

    fn write_start_like(out: &mut Vec<u8>, name: &str, attrs: &[(String, String)], empty: bool) {
        out.extend_from_slice(b"<");
        out.extend_from_slice(name.as_bytes());
        // Attribute values are stored as raw (already-escaped) XML bytes. Do NOT escape again.
        for (k, v) in attrs {
            out.extend_from_slice(b" ");
            out.extend_from_slice(k.as_bytes());
            out.extend_from_slice(b"=\"");
            out.extend_from_slice(v.as_bytes());
            out.extend_from_slice(b"\"");
        }
        if empty {
            out.extend_from_slice(b"/>");
        } else {
            out.extend_from_slice(b">");
        }
    }

    for ev in &part.events {
        match ev {
            XmlEvent::Decl {
                version,
                encoding,
                standalone,
            } => {
                out.extend_from_slice(b"<?xml version=\"");
                out.extend_from_slice(version.as_bytes());
                out.extend_from_slice(b"\"");
                if let Some(e) = encoding {
                    out.extend_from_slice(b" encoding=\"");
                    out.extend_from_slice(e.as_bytes());
                    out.extend_from_slice(b"\"");
                }
                if let Some(s) = standalone {
                    out.extend_from_slice(b" standalone=\"");
                    out.extend_from_slice(s.as_bytes());
                    out.extend_from_slice(b"\"");
                }
                out.extend_from_slice(b"?>");
            }
            XmlEvent::Start { name, attrs } => {
                write_start_like(&mut out, name, attrs, false);
            }
            XmlEvent::End { name } => {
                out.extend_from_slice(b"</");
                out.extend_from_slice(name.as_bytes());
                out.extend_from_slice(b">");
            }
            XmlEvent::Empty { name, attrs } => {
                write_start_like(&mut out, name, attrs, true);
            }
            XmlEvent::Text { raw } => {
                out.extend_from_slice(raw.as_bytes());
            }
            XmlEvent::CData { text } => {
                // CDATA must remain unescaped.
                out.extend_from_slice(b"<![CDATA[");
                out.extend_from_slice(text.as_bytes());
                out.extend_from_slice(b"]]>");
            }
            XmlEvent::Comment { text } => {
                out.extend_from_slice(b"<!--");
                out.extend_from_slice(text.as_bytes());
                out.extend_from_slice(b"-->");
            }
            XmlEvent::PI { content } => {
                out.extend_from_slice(b"<?");
                out.extend_from_slice(content.as_bytes());
                out.extend_from_slice(b"?>");
            }
            XmlEvent::DocType { text } => {
                out.extend_from_slice(b"<!DOCTYPE");
                out.extend_from_slice(text.as_bytes());
                out.extend_from_slice(b">");
            }
        }
    }

    out
}
