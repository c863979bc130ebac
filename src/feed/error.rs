use thiserror::Error;

use super::xml::XmlError;
use crate::auth::AuthError;

/// Errors that can occur while talking to the feed API.
///
/// Every public operation reports exactly one of these. Nothing is retried.
#[derive(Debug, Error)]
pub enum FeedError {
    /// The handle was constructed without a spreadsheet key
    #[error("Spreadsheet key not provided.")]
    MissingKey,
    /// HTTP 401
    #[error("Invalid authorization key.")]
    Unauthorized,
    /// The service answered 200 with an HTML login page
    #[error("Sheet is private. Use authentication or make public.")]
    PrivateSheet,
    /// HTTP response with status >= 400 (other than 401)
    #[error("HTTP error {status}: {reason} {body}")]
    Http {
        status: u16,
        reason: String,
        body: String,
    },
    /// Response body is not well-formed XML
    #[error("XML parse error: {0}")]
    Xml(#[from] XmlError),
    /// A data-returning call got an empty body
    #[error("No response to {0} call")]
    EmptyResponse(&'static str),
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Request timed out")]
    Timeout,
    #[error("Response too large (exceeds {0} bytes)")]
    ResponseTooLarge(usize),
    #[error("Invalid UTF-8 in response")]
    InvalidUtf8,
    #[error("Invalid feed URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The entry has no link with this `rel` (e.g. `values` projection)
    #[error("Entry has no '{0}' link")]
    MissingLink(&'static str),
    /// A required element or attribute is absent from an entry
    #[error("Malformed entry: {0}")]
    MalformedEntry(String),
    /// Credential loading or token renewal failed
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),
}

pub type Result<T> = std::result::Result<T, FeedError>;
