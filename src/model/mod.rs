//! Records mapped from feed entries.
//!
//! Each record keeps a handle to its [`crate::Spreadsheet`] so it can issue
//! follow-up calls (save, delete, fetch rows).

mod cell;
mod row;
mod value;
mod worksheet;

pub use cell::Cell;
pub use row::{ColumnMap, Row};
pub use value::FieldValue;
pub use worksheet::{Author, SpreadsheetInfo, Worksheet};

pub(crate) use row::{first_entry, new_row_xml};
