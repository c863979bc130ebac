use regex::{NoExpand, Regex};
use reqwest::Method;
use std::collections::HashMap;

use super::value::FieldValue;
use crate::feed::xml::{column_tag, entry_fragments, escape_value};
use crate::feed::{FeedDocument, FeedError, Payload, Result, XmlNode};
use crate::spreadsheet::Spreadsheet;

const ATOM_NS: &str = "http://www.w3.org/2005/Atom";
const GSX_NS: &str = "http://schemas.google.com/spreadsheets/2006/extended";
const GD_NS: &str = "http://schemas.google.com/g/2005";

/// Header text → `gsx:` column tag, as assigned by the service.
pub type ColumnMap = HashMap<String, String>;

/// Keys that name entry metadata rather than columns.
const RESERVED_KEYS: [&str; 4] = ["id", "title", "content", "_links"];

/// One list-feed entry.
///
/// Fields are keyed by the worksheet's header row and kept in entry order.
/// The raw `<entry>` fragment is retained because edits are applied to it in
/// place: the service rejects most regenerated entries.
#[derive(Debug, Clone)]
pub struct Row {
    spreadsheet: Spreadsheet,
    pub id: Option<String>,
    pub title: Option<String>,
    pub content: Option<String>,
    headers: Vec<String>,
    fields: Vec<(String, FieldValue)>,
    column_map: ColumnMap,
    links: HashMap<String, String>,
    xml: String,
}

impl Row {
    /// Maps `gsx:` children to headers by position. Columns beyond the known
    /// headers are keyed by their tag.
    pub(crate) fn from_entry(
        spreadsheet: Spreadsheet,
        headers: &[String],
        entry: &XmlNode,
        xml: String,
    ) -> Self {
        let mut row = Row {
            spreadsheet,
            id: None,
            title: None,
            content: None,
            headers: headers.to_vec(),
            fields: Vec::new(),
            column_map: ColumnMap::new(),
            links: HashMap::new(),
            xml,
        };

        let mut idx = 0;
        for child in &entry.children {
            if let Some(tag) = child.name.strip_prefix("gsx:") {
                let header = headers
                    .get(idx)
                    .cloned()
                    .unwrap_or_else(|| tag.to_string());
                idx += 1;
                let value = if child.is_empty() {
                    FieldValue::Null
                } else {
                    FieldValue::from_feed(&child.text)
                };
                row.column_map.insert(header.clone(), tag.to_string());
                row.set(&header, value);
                continue;
            }
            match child.name.as_str() {
                "id" => row.id = Some(child.text.clone()),
                "title" => row.title = Some(child.text.clone()),
                "content" => row.content = Some(child.text.clone()),
                _ => {}
            }
        }
        row.links = links_of(entry);
        row
    }

    pub fn get(&self, header: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|(h, _)| h == header)
            .map(|(_, v)| v)
    }

    /// Sets a field locally. Call [`Row::save`] to send it.
    ///
    /// Only headers present in the row's column map are written on save.
    pub fn set(&mut self, header: &str, value: impl Into<FieldValue>) {
        let value = value.into();
        match self.fields.iter_mut().find(|(h, _)| h == header) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((header.to_string(), value)),
        }
    }

    pub fn fields(&self) -> &[(String, FieldValue)] {
        &self.fields
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn column_map(&self) -> &ColumnMap {
        &self.column_map
    }

    pub fn link(&self, rel: &str) -> Option<&str> {
        self.links.get(rel).map(String::as_str)
    }

    /// The retained `<entry>` fragment.
    pub fn xml(&self) -> &str {
        &self.xml
    }

    /// Header fields present in this row, in header order.
    pub fn to_json(&self) -> serde_json::Map<String, serde_json::Value> {
        self.headers
            .iter()
            .filter_map(|h| self.get(h).map(|v| (h.clone(), serde_json::Value::from(v))))
            .collect()
    }

    /// The retained fragment with every mapped field substituted in place.
    ///
    /// Only the first `<gsx:tag>…</gsx:tag>` (or `<gsx:tag/>`) per mapped
    /// field is rewritten; every other byte is kept.
    pub fn edit_xml(&self) -> String {
        let mut xml = with_namespaces(&self.xml);
        for (header, value) in &self.fields {
            let Some(tag) = self.column_map.get(header) else {
                continue;
            };
            let tag = column_tag(tag);
            let escaped = regex::escape(&tag);
            let pattern = format!(r"<gsx:{escaped}(?:\s*/>|>[\s\S]*?</gsx:{escaped}>)");
            let re = match Regex::new(&pattern) {
                Ok(re) => re,
                Err(e) => {
                    tracing::warn!(tag = %tag, error = %e, "Skipping unmatchable column tag");
                    continue;
                }
            };
            let replacement = format!(
                "<gsx:{tag}>{}</gsx:{tag}>",
                escape_value(&value.render())
            );
            xml = re.replacen(&xml, 1, NoExpand(&replacement)).into_owned();
        }
        xml
    }

    /// PUTs the edited fragment to the row's edit link.
    ///
    /// On success the retained fragment and links are replaced with the entry
    /// the service returns, since edit links are versioned.
    pub async fn save(&mut self) -> Result<()> {
        let edit = self.edit_link()?.to_string();
        let body = self.edit_xml();
        let response = self
            .spreadsheet
            .request_url(&edit, Method::PUT, Payload::Body(body))
            .await?;
        if let Some(doc) = response {
            self.refresh_from(&doc);
        }
        Ok(())
    }

    /// DELETEs the row via its edit link.
    pub async fn del(&self) -> Result<()> {
        let edit = self.edit_link()?;
        self.spreadsheet
            .request_url(edit, Method::DELETE, Payload::None)
            .await?;
        Ok(())
    }

    fn edit_link(&self) -> Result<&str> {
        self.link("edit").ok_or(FeedError::MissingLink("edit"))
    }

    fn refresh_from(&mut self, doc: &FeedDocument) {
        self.xml = first_entry(&doc.raw);
        self.links = links_of(&doc.root);
        if let Some(id) = doc.root.child_text("id") {
            self.id = Some(id.to_string());
        }
    }
}

/// `rel` → `href` for every `<link>` child.
pub(crate) fn links_of(entry: &XmlNode) -> HashMap<String, String> {
    entry
        .children_named("link")
        .filter_map(|link| Some((link.attr("rel")?.to_string(), link.attr("href")?.to_string())))
        .collect()
}

/// The first `<entry>` fragment of a response, or the whole body.
pub(crate) fn first_entry(raw: &str) -> String {
    entry_fragments(raw)
        .first()
        .map_or_else(|| raw.to_string(), |s| s.to_string())
}

/// Atom body for a new list-feed row.
pub(crate) fn new_row_xml<I, K, V>(column_map: &ColumnMap, data: I) -> String
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: Into<FieldValue>,
{
    let mut xml = format!("<entry xmlns=\"{ATOM_NS}\" xmlns:gsx=\"{GSX_NS}\">\n");
    for (key, value) in data {
        let key = key.as_ref();
        if RESERVED_KEYS.contains(&key) {
            continue;
        }
        let tag = column_tag(column_map.get(key).map_or(key, String::as_str));
        let value = escape_value(&value.into().render());
        xml.push_str(&format!("<gsx:{tag}>{value}</gsx:{tag}>\n"));
    }
    xml.push_str("</entry>");
    xml
}

/// Entries lifted out of a feed carry no namespace declarations of their own.
fn with_namespaces(fragment: &str) -> String {
    let Some(rest) = fragment.strip_prefix("<entry") else {
        return fragment.to_string();
    };
    let open_end = rest.find('>').unwrap_or(rest.len());
    let open = &rest[..open_end];
    if open.contains("xmlns=") {
        return fragment.to_string();
    }

    let mut decls = format!(" xmlns='{ATOM_NS}' xmlns:gsx='{GSX_NS}'");
    if fragment.contains("gd:") && !open.contains("xmlns:gd=") {
        decls.push_str(&format!(" xmlns:gd='{GD_NS}'"));
    }
    format!("<entry{decls}{rest}")
}
