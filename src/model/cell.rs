use reqwest::Method;
use std::collections::HashMap;

use super::row::links_of;
use super::value::FieldValue;
use crate::feed::xml::escape_value;
use crate::feed::{FeedError, Payload, Result, XmlNode};
use crate::spreadsheet::Spreadsheet;

/// One cells-feed entry. Rows and columns are 1-based.
#[derive(Debug, Clone)]
pub struct Cell {
    spreadsheet: Spreadsheet,
    worksheet_id: String,
    pub id: String,
    pub row: u32,
    pub col: u32,
    value: String,
    numeric_value: Option<f64>,
    input_value: Option<String>,
    links: HashMap<String, String>,
}

impl Cell {
    pub(crate) fn from_entry(
        spreadsheet: Spreadsheet,
        worksheet_id: &str,
        entry: &XmlNode,
    ) -> Result<Self> {
        let cell = entry
            .child("gs:cell")
            .ok_or_else(|| FeedError::MalformedEntry("entry has no gs:cell element".into()))?;
        Ok(Cell {
            spreadsheet,
            worksheet_id: worksheet_id.to_string(),
            id: entry.child_text("id").unwrap_or_default().to_string(),
            row: position(cell, "row")?,
            col: position(cell, "col")?,
            value: cell.text.clone(),
            numeric_value: cell.attr("numericValue").and_then(|v| v.parse().ok()),
            input_value: cell.attr("inputValue").map(str::to_string),
            links: links_of(entry),
        })
    }

    pub fn worksheet_id(&self) -> &str {
        &self.worksheet_id
    }

    /// Displayed value.
    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn numeric_value(&self) -> Option<f64> {
        self.numeric_value
    }

    /// What was typed into the cell, e.g. a formula. Only in `full` projection.
    pub fn input_value(&self) -> Option<&str> {
        self.input_value.as_deref()
    }

    pub fn link(&self, rel: &str) -> Option<&str> {
        self.links.get(rel).map(String::as_str)
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "row": self.row,
            "col": self.col,
            "value": self.value,
            "numericValue": self.numeric_value,
            "inputValue": self.input_value,
        })
    }

    /// Assigns a new input value and saves it.
    pub async fn set_value(&mut self, value: impl Into<FieldValue>) -> Result<()> {
        self.value = value.into().render();
        self.save().await
    }

    /// PUTs the current value to the cell's edit link.
    pub async fn save(&mut self) -> Result<()> {
        let edit = self
            .link("edit")
            .ok_or(FeedError::MissingLink("edit"))?
            .to_string();
        let body = self.edit_xml(&edit);
        let response = self
            .spreadsheet
            .request_url(&edit, Method::PUT, Payload::Body(body))
            .await?;
        if let Some(doc) = response {
            let updated = Cell::from_entry(self.spreadsheet.clone(), &self.worksheet_id, &doc.root)?;
            *self = updated;
        }
        Ok(())
    }

    /// Clears the cell.
    pub async fn del(&mut self) -> Result<()> {
        self.set_value("").await
    }

    fn edit_xml(&self, edit: &str) -> String {
        let id = if self.id.is_empty() { edit } else { self.id.as_str() };
        format!(
            "<entry xmlns='http://www.w3.org/2005/Atom' xmlns:gs='http://schemas.google.com/spreadsheets/2006'>\n  \
<id>{}</id>\n  \
<link rel=\"edit\" type=\"application/atom+xml\" href=\"{}\"/>\n  \
<gs:cell row=\"{}\" col=\"{}\" inputValue=\"{}\"/>\n\
</entry>",
            escape_value(id),
            escape_value(edit),
            self.row,
            self.col,
            escape_value(&self.value)
        )
    }
}

fn position(cell: &XmlNode, attr: &'static str) -> Result<u32> {
    cell.attr(attr)
        .and_then(|v| v.trim().parse().ok())
        .ok_or_else(|| FeedError::MalformedEntry(format!("gs:cell has no valid {attr} attribute")))
}
