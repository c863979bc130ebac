//! Credentials for the feed API.
//!
//! - [`token`] - Static tokens and the auth mode the handle is in
//! - [`service_account`] - RS256 JWT assertion exchanged for an OAuth2 token

mod service_account;
mod token;

use thiserror::Error;

pub use service_account::{ServiceAccountKey, FEEDS_SCOPE};
pub use token::{AuthMode, AuthToken, TokenKind};

/// Errors raised while loading credentials or renewing a token.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Failed to read credentials file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid service account key: {0}")]
    InvalidKey(String),

    #[error("Failed to sign token assertion")]
    Signing,

    #[error("Token endpoint returned status {status}: {body}")]
    TokenEndpoint { status: u16, body: String },

    #[error("Token request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Token request timed out")]
    Timeout,

    #[error("Token response exceeds {0} bytes")]
    ResponseTooLarge(usize),
}
