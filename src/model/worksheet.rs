use chrono::{DateTime, Utc};

use super::{Cell, FieldValue, Row};
use crate::feed::{CellQuery, FeedError, Result, RowQuery, XmlNode};
use crate::spreadsheet::Spreadsheet;

/// Snapshot of one worksheet as listed by the worksheets feed.
///
/// Counts are not refreshed; fetch the info again to see remote changes.
#[derive(Debug, Clone)]
pub struct Worksheet {
    spreadsheet: Spreadsheet,
    pub id: String,
    pub title: String,
    pub row_count: u32,
    pub col_count: u32,
}

impl Worksheet {
    pub(crate) fn from_entry(spreadsheet: Spreadsheet, entry: &XmlNode) -> Result<Self> {
        let full_id = entry
            .child_text("id")
            .ok_or_else(|| FeedError::MalformedEntry("worksheet entry has no id".into()))?;
        // ".../worksheets/{key}/{visibility}/{projection}/{id}"
        let id = full_id.rsplit('/').next().unwrap_or(full_id).to_string();
        Ok(Worksheet {
            spreadsheet,
            id,
            title: entry.child_text("title").unwrap_or_default().to_string(),
            row_count: count(entry, "gs:rowCount"),
            col_count: count(entry, "gs:colCount"),
        })
    }

    pub async fn get_rows(&self, query: &RowQuery) -> Result<Vec<Row>> {
        self.spreadsheet.get_rows(&self.id, query).await
    }

    pub async fn get_cells(&self, query: &CellQuery) -> Result<Vec<Cell>> {
        self.spreadsheet.get_cells(&self.id, query).await
    }

    pub async fn add_row<I, K, V>(&self, data: I) -> Result<Row>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<FieldValue>,
    {
        self.spreadsheet.add_row(&self.id, data).await
    }
}

fn count(entry: &XmlNode, name: &str) -> u32 {
    entry
        .child_text(name)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(0)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Author {
    pub name: Option<String>,
    pub email: Option<String>,
}

/// Result of [`Spreadsheet::get_info`].
#[derive(Debug, Clone)]
pub struct SpreadsheetInfo {
    pub title: String,
    pub updated: Option<DateTime<Utc>>,
    pub author: Option<Author>,
    pub worksheets: Vec<Worksheet>,
}

impl SpreadsheetInfo {
    pub(crate) fn from_feed(spreadsheet: &Spreadsheet, feed: &XmlNode) -> Result<Self> {
        let updated = feed.child_text("updated").and_then(|raw| {
            match DateTime::parse_from_rfc3339(raw.trim()) {
                Ok(dt) => Some(dt.with_timezone(&Utc)),
                Err(e) => {
                    tracing::warn!(updated = %raw, error = %e, "Unparsable feed timestamp");
                    None
                }
            }
        });
        let author = feed.child("author").map(|a| Author {
            name: a.child_text("name").map(str::to_string),
            email: a.child_text("email").map(str::to_string),
        });
        let worksheets = feed
            .children_named("entry")
            .map(|entry| Worksheet::from_entry(spreadsheet.clone(), entry))
            .collect::<Result<Vec<_>>>()?;

        Ok(SpreadsheetInfo {
            title: feed.child_text("title").unwrap_or_default().to_string(),
            updated,
            author,
            worksheets,
        })
    }
}
