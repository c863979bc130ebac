//! Transport and wire format for the Google Sheets legacy feed API.
//!
//! This module provides the layers underneath [`crate::Spreadsheet`]:
//!
//! - **Requests**: URL construction, status mapping and size-limited reads
//! - **XML**: a generic element tree for Atom responses
//! - **Queries**: typed options for the list and cells feeds
//!
//! # Architecture
//!
//! - [`client`] - HTTP dispatch with `reqwest`, no auth state of its own
//! - [`xml`] - `quick-xml` event reader building an [`XmlNode`] tree
//! - [`query`] - [`RowQuery`] and [`CellQuery`] option structs
//! - [`error`] - [`FeedError`], the crate-wide error type

mod client;
mod error;
mod query;
pub mod xml;

pub use client::FeedDocument;
pub(crate) use client::{FeedClient, Payload};
pub use error::{FeedError, Result};
pub use query::{CellQuery, RowQuery};
pub use xml::{XmlError, XmlNode};
