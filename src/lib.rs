//! Client for the Google Sheets legacy XML feed API.
//!
//! A [`Spreadsheet`] handle reads the worksheets, list and cells feeds of one
//! spreadsheet and writes rows and cells back through their edit links.
//!
//! ```no_run
//! use sheetfeed::{RowQuery, Spreadsheet};
//!
//! # async fn run() -> sheetfeed::Result<()> {
//! let sheet = Spreadsheet::new("1a2b3c")?;
//! let info = sheet.get_info().await?;
//! for ws in &info.worksheets {
//!     let rows = ws.get_rows(&RowQuery::default()).await?;
//!     println!("{}: {} rows", ws.title, rows.len());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`auth`] - Static tokens and service-account JWT renewal
//! - [`config`] - TOML client configuration
//! - [`feed`] - Transport, XML tree and query options
//! - [`model`] - Worksheets, rows, cells and field values

pub mod auth;
pub mod config;
pub mod feed;
pub mod model;
mod spreadsheet;

pub use auth::{AuthError, AuthMode, AuthToken, ServiceAccountKey, TokenKind};
pub use config::{Config, ConfigError, Projection, Visibility};
pub use feed::{CellQuery, FeedError, Result, RowQuery};
pub use model::{Author, Cell, ColumnMap, FieldValue, Row, SpreadsheetInfo, Worksheet};
pub use spreadsheet::Spreadsheet;
