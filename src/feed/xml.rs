//! Generic XML tree for Atom feed responses, plus the small text helpers the
//! write path needs (value escaping, column tag normalization, raw entry
//! extraction).

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

/// SEC-003: Maximum element nesting depth. Atom feeds are shallow.
const MAX_DEPTH: usize = 64;

#[derive(Debug, Error, PartialEq)]
#[error("{0}")]
pub struct XmlError(pub String);

/// One element of a parsed document.
///
/// Names keep their namespace prefix (`gsx:name`, `gs:cell`) since the feed
/// mapping keys off prefixes, not namespace URIs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmlNode {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<XmlNode>,
}

impl XmlNode {
    /// Element name without its namespace prefix.
    pub fn local_name(&self) -> &str {
        self.name
            .split_once(':')
            .map_or(self.name.as_str(), |(_, local)| local)
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// First child with the given (prefixed) name.
    pub fn child(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlNode> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).map(|c| c.text.as_str())
    }

    /// True for `<x/>` and `<x></x>` without attributes.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty() && self.children.is_empty() && self.attributes.is_empty()
    }
}

/// Parses a complete document and returns its root element.
pub fn parse_document(xml: &str) -> Result<XmlNode, XmlError> {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<XmlNode> = Vec::new();
    let mut root: Option<XmlNode> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                if stack.len() >= MAX_DEPTH {
                    return Err(XmlError(format!(
                        "nesting depth exceeds maximum of {MAX_DEPTH} levels"
                    )));
                }
                stack.push(start_node(&e, &reader)?);
            }
            Ok(Event::Empty(e)) => {
                let node = start_node(&e, &reader)?;
                attach(&mut stack, &mut root, node)?;
            }
            Ok(Event::End(_)) => {
                let mut node = stack
                    .pop()
                    .ok_or_else(|| XmlError("unexpected closing tag".to_string()))?;
                // Indentation between child elements is not content
                if !node.children.is_empty() && node.text.trim().is_empty() {
                    node.text.clear();
                }
                attach(&mut stack, &mut root, node)?;
            }
            Ok(Event::Text(t)) => {
                if let Some(top) = stack.last_mut() {
                    let text = t
                        .unescape()
                        .map_err(|e| XmlError(format!("invalid text content: {e}")))?;
                    top.text.push_str(&text);
                }
            }
            Ok(Event::CData(c)) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&c));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(XmlError(format!(
                    "{e} at position {}",
                    reader.buffer_position()
                )))
            }
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(XmlError(format!("unclosed element <{}>", open.name)));
    }
    root.ok_or_else(|| XmlError("document has no root element".to_string()))
}

fn start_node(e: &BytesStart<'_>, reader: &Reader<&[u8]>) -> Result<XmlNode, XmlError> {
    let mut node = XmlNode {
        name: String::from_utf8_lossy(e.name().as_ref()).into_owned(),
        ..XmlNode::default()
    };
    for attr in e.attributes() {
        let attr = attr.map_err(|e| XmlError(format!("malformed attribute: {e}")))?;
        let value = attr
            .decode_and_unescape_value(reader.decoder())
            .map_err(|e| XmlError(format!("invalid attribute value: {e}")))?;
        node.attributes.push((
            String::from_utf8_lossy(attr.key.as_ref()).into_owned(),
            value.into_owned(),
        ));
    }
    Ok(node)
}

fn attach(
    stack: &mut [XmlNode],
    root: &mut Option<XmlNode>,
    node: XmlNode,
) -> Result<(), XmlError> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None if root.is_none() => *root = Some(node),
        None => return Err(XmlError("multiple root elements".to_string())),
    }
    Ok(())
}

/// Escapes a value for element text or a double-quoted attribute.
pub fn escape_value(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Normalizes a column name into a `gsx:` tag: whitespace and underscores are
/// stripped and the result lower-cased.
pub fn column_tag(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_whitespace() && *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

fn entry_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<entry[^>]*>[\s\S]*?</entry>").expect("valid entry regex"))
}

/// Returns every `<entry …>…</entry>` fragment of a raw feed, verbatim and in
/// document order.
pub fn entry_fragments(raw: &str) -> Vec<&str> {
    entry_regex().find_iter(raw).map(|m| m.as_str()).collect()
}
