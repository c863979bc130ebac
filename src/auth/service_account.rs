use base64::prelude::BASE64_URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{Duration, Utc};
use futures::StreamExt;
use reqwest::header::CONTENT_TYPE;
use ring::signature::RsaKeyPair;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use super::{AuthError, AuthToken, TokenKind};

/// OAuth2 scope granting access to the spreadsheet feeds.
pub const FEEDS_SCOPE: &str = "https://spreadsheets.google.com/feeds";

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Lifetime requested for each assertion.
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// SEC-016: Upper bound on a token endpoint reply. Real replies are a few hundred bytes.
const MAX_TOKEN_RESPONSE_BYTES: usize = 64 * 1024;

#[derive(Deserialize)]
struct RawKey {
    client_email: String,
    private_key: String,
    #[serde(default)]
    private_key_id: Option<String>,
    #[serde(default)]
    token_uri: Option<String>,
}

/// The subset of a Google service-account JSON key needed for token renewal.
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key_id: Option<String>,
    pub token_uri: String,
    private_key: SecretString,
}

impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key_id", &self.private_key_id)
            .field("token_uri", &self.token_uri)
            .field("private_key", &"[REDACTED]")
            .finish()
    }
}

#[derive(Serialize)]
struct JwtHeader<'a> {
    alg: &'static str,
    typ: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    kid: Option<&'a str>,
}

#[derive(Serialize)]
struct JwtClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    exp: i64,
    iat: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
    expires_in: i64,
}

impl ServiceAccountKey {
    pub fn from_json(input: &str) -> Result<Self, AuthError> {
        let raw: RawKey = serde_json::from_str(input)
            .map_err(|e| AuthError::InvalidKey(format!("malformed key json: {e}")))?;
        Ok(Self {
            client_email: raw.client_email,
            private_key_id: raw.private_key_id,
            token_uri: raw.token_uri.unwrap_or_else(|| DEFAULT_TOKEN_URI.to_string()),
            private_key: SecretString::from(raw.private_key),
        })
    }

    pub fn from_file(path: &Path) -> Result<Self, AuthError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Builds a signed RS256 assertion for the feeds scope.
    pub(crate) fn signed_assertion(&self) -> Result<String, AuthError> {
        let iat = Utc::now().timestamp();
        let claims = JwtClaims {
            iss: &self.client_email,
            scope: FEEDS_SCOPE,
            aud: &self.token_uri,
            iat,
            exp: iat + ASSERTION_LIFETIME_SECS,
        };
        let header = JwtHeader {
            alg: "RS256",
            typ: "JWT",
            kid: self.private_key_id.as_deref(),
        };

        let header_json = serde_json::to_string(&header)
            .map_err(|e| AuthError::InvalidKey(format!("failed to encode jwt header: {e}")))?;
        let claims_json = serde_json::to_string(&claims)
            .map_err(|e| AuthError::InvalidKey(format!("failed to encode jwt claims: {e}")))?;
        let signing_input = format!(
            "{}.{}",
            BASE64_URL_SAFE_NO_PAD.encode(header_json),
            BASE64_URL_SAFE_NO_PAD.encode(claims_json)
        );

        let key_pair = self.key_pair()?;
        let mut signature = vec![0; key_pair.public().modulus_len()];
        key_pair
            .sign(
                &ring::signature::RSA_PKCS1_SHA256,
                &ring::rand::SystemRandom::new(),
                signing_input.as_bytes(),
                &mut signature,
            )
            .map_err(|_| AuthError::Signing)?;

        Ok(format!(
            "{}.{}",
            signing_input,
            BASE64_URL_SAFE_NO_PAD.encode(&signature)
        ))
    }

    fn key_pair(&self) -> Result<RsaKeyPair, AuthError> {
        let mut reader = std::io::Cursor::new(self.private_key.expose_secret().as_bytes());
        let item = rustls_pemfile::read_one(&mut reader)
            .map_err(|e| AuthError::InvalidKey(format!("invalid PEM private key: {e}")))?;
        match item {
            Some(rustls_pemfile::Item::Pkcs8Key(der)) => {
                RsaKeyPair::from_pkcs8(der.secret_pkcs8_der())
                    .map_err(|e| AuthError::InvalidKey(format!("rejected pkcs8 key: {e}")))
            }
            Some(rustls_pemfile::Item::Pkcs1Key(der)) => {
                RsaKeyPair::from_der(der.secret_pkcs1_der())
                    .map_err(|e| AuthError::InvalidKey(format!("rejected pkcs1 key: {e}")))
            }
            _ => Err(AuthError::InvalidKey("no RSA private key in PEM".to_string())),
        }
    }

    /// Exchanges a fresh assertion for an access token.
    pub(crate) async fn fetch_access_token(
        &self,
        client: &reqwest::Client,
        timeout: Option<std::time::Duration>,
    ) -> Result<AuthToken, AuthError> {
        let assertion = self.signed_assertion()?;
        let body = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer")
            .append_pair("assertion", &assertion)
            .finish();

        let request = client
            .post(&self.token_uri)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(body);
        let (status, text) = match timeout {
            Some(limit) => tokio::time::timeout(limit, exchange(request))
                .await
                .map_err(|_| AuthError::Timeout)??,
            None => exchange(request).await?,
        };

        if !status.is_success() {
            return Err(AuthError::TokenEndpoint {
                status: status.as_u16(),
                body: text,
            });
        }

        let token: TokenResponse = serde_json::from_str(&text).map_err(|e| {
            AuthError::InvalidKey(format!("unexpected token endpoint response: {e}"))
        })?;
        let kind = match token.token_type.as_deref() {
            Some(t) if !t.eq_ignore_ascii_case("bearer") => TokenKind::GoogleLogin,
            _ => TokenKind::Bearer,
        };
        let expires = Utc::now() + Duration::seconds(token.expires_in);

        tracing::info!(
            client_email = %self.client_email,
            expires = %expires,
            "Renewed service account token"
        );

        let token = match kind {
            TokenKind::Bearer => AuthToken::bearer(token.access_token),
            TokenKind::GoogleLogin => AuthToken::google_login(token.access_token),
        };
        Ok(token.with_expiry(expires))
    }
}

/// Sends the grant and reads at most [`MAX_TOKEN_RESPONSE_BYTES`] of the reply.
async fn exchange(
    request: reqwest::RequestBuilder,
) -> Result<(reqwest::StatusCode, String), AuthError> {
    let response = request.send().await?;
    let status = response.status();
    if response
        .content_length()
        .is_some_and(|len| len as usize > MAX_TOKEN_RESPONSE_BYTES)
    {
        return Err(AuthError::ResponseTooLarge(MAX_TOKEN_RESPONSE_BYTES));
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > MAX_TOKEN_RESPONSE_BYTES {
            return Err(AuthError::ResponseTooLarge(MAX_TOKEN_RESPONSE_BYTES));
        }
        bytes.extend_from_slice(&chunk);
    }
    Ok((status, String::from_utf8_lossy(&bytes).into_owned()))
}
