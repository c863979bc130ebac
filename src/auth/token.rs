use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};

/// How requests are authorized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// No `Authorization` header.
    Anonymous,
    /// A caller-supplied token, never renewed.
    Token,
    /// A service-account token, renewed when it expires.
    Jwt,
}

/// Which `Authorization` scheme a token is sent with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// `Authorization: Bearer <token>` (OAuth2, service accounts).
    Bearer,
    /// `Authorization: GoogleLogin auth=<token>` (legacy ClientLogin).
    GoogleLogin,
}

/// An access token plus its optional expiry.
#[derive(Debug)]
pub struct AuthToken {
    pub kind: TokenKind,
    value: SecretString,
    pub expires: Option<DateTime<Utc>>,
}

impl AuthToken {
    pub fn bearer(value: impl Into<String>) -> Self {
        Self {
            kind: TokenKind::Bearer,
            value: SecretString::from(value.into()),
            expires: None,
        }
    }

    pub fn google_login(value: impl Into<String>) -> Self {
        Self {
            kind: TokenKind::GoogleLogin,
            value: SecretString::from(value.into()),
            expires: None,
        }
    }

    pub fn with_expiry(mut self, expires: DateTime<Utc>) -> Self {
        self.expires = Some(expires);
        self
    }

    /// A token without an expiry never counts as expired.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires.is_some_and(|exp| exp <= now)
    }

    /// Value for the `Authorization` header.
    pub(crate) fn header_value(&self) -> String {
        match self.kind {
            TokenKind::Bearer => format!("Bearer {}", self.value.expose_secret()),
            TokenKind::GoogleLogin => format!("GoogleLogin auth={}", self.value.expose_secret()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_header_values() {
        assert_eq!(AuthToken::bearer("abc").header_value(), "Bearer abc");
        assert_eq!(
            AuthToken::google_login("xyz").header_value(),
            "GoogleLogin auth=xyz"
        );
    }

    #[test]
    fn test_expiry() {
        let now = Utc::now();
        assert!(!AuthToken::bearer("a").is_expired(now));
        assert!(AuthToken::bearer("a").with_expiry(now).is_expired(now));
        assert!(AuthToken::bearer("a")
            .with_expiry(now - Duration::seconds(1))
            .is_expired(now));
        assert!(!AuthToken::bearer("a")
            .with_expiry(now + Duration::seconds(60))
            .is_expired(now));
    }

    #[test]
    fn test_debug_hides_value() {
        let debug_output = format!("{:?}", AuthToken::bearer("super-secret"));
        assert!(!debug_output.contains("super-secret"));
    }
}
