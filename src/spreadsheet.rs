use chrono::Utc;
use reqwest::Method;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::Mutex;
use url::Url;

use crate::auth::{AuthError, AuthMode, AuthToken, ServiceAccountKey};
use crate::config::{Config, Projection, Visibility};
use crate::feed::xml::{column_tag, entry_fragments};
use crate::feed::{
    CellQuery, FeedClient, FeedDocument, FeedError, Payload, Result, RowQuery, XmlNode,
};
use crate::model::{first_entry, new_row_xml, Cell, ColumnMap, FieldValue, Row, SpreadsheetInfo};

const USER_AGENT: &str = concat!("sheetfeed/", env!("CARGO_PKG_VERSION"));

/// Handle to one spreadsheet.
///
/// Cloning is cheap: clones share the HTTP client, the auth state and the
/// per-worksheet caches. Every model returned by this handle keeps a clone.
#[derive(Clone)]
pub struct Spreadsheet {
    inner: Arc<Inner>,
}

struct Inner {
    key: String,
    feed: FeedClient,
    visibility: Option<Visibility>,
    projection: Option<Projection>,
    auth: Mutex<AuthState>,
    /// Worksheet id → header row values, in column order.
    headers: RwLock<HashMap<String, Vec<String>>>,
    /// Held across a header fetch so concurrent first calls share it.
    header_fetch: Mutex<()>,
    /// Worksheet id → header → `gsx:` tag.
    column_maps: RwLock<HashMap<String, ColumnMap>>,
}

struct AuthState {
    mode: AuthMode,
    token: Option<AuthToken>,
    service_account: Option<ServiceAccountKey>,
}

impl fmt::Debug for Spreadsheet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Spreadsheet")
            .field("key", &self.inner.key)
            .finish_non_exhaustive()
    }
}

impl Spreadsheet {
    /// Anonymous handle with the default configuration.
    pub fn new(key: impl Into<String>) -> Result<Self> {
        Self::with_config(key, Config::default())
    }

    pub fn with_config(key: impl Into<String>, config: Config) -> Result<Self> {
        // PERF-019: Pooled client shared by every clone of the handle
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(Duration::from_secs(30))
            .tcp_keepalive(Duration::from_secs(60))
            .build()?;
        Self::with_client(key, config, http)
    }

    /// Uses a caller-supplied HTTP client. `config.auth_token`, when set, is
    /// installed as a Bearer token.
    pub fn with_client(
        key: impl Into<String>,
        config: Config,
        http: reqwest::Client,
    ) -> Result<Self> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(FeedError::MissingKey);
        }

        let auth = match config.auth_token.as_deref().filter(|t| !t.trim().is_empty()) {
            Some(token) => AuthState {
                mode: AuthMode::Token,
                token: Some(AuthToken::bearer(token)),
                service_account: None,
            },
            None => AuthState {
                mode: AuthMode::Anonymous,
                token: None,
                service_account: None,
            },
        };

        Ok(Self {
            inner: Arc::new(Inner {
                feed: FeedClient::new(http, &config),
                key,
                visibility: config.visibility,
                projection: config.projection,
                auth: Mutex::new(auth),
                headers: RwLock::new(HashMap::new()),
                header_fetch: Mutex::new(()),
                column_maps: RwLock::new(HashMap::new()),
            }),
        })
    }

    pub fn key(&self) -> &str {
        &self.inner.key
    }

    pub async fn auth_mode(&self) -> AuthMode {
        self.inner.auth.lock().await.mode
    }

    /// Installs a static token. Anonymous handles switch to token auth; a
    /// handle already on service-account auth keeps renewing.
    pub async fn set_auth_token(&self, token: AuthToken) {
        let mut auth = self.inner.auth.lock().await;
        if auth.mode == AuthMode::Anonymous {
            auth.mode = AuthMode::Token;
        }
        auth.token = Some(token);
    }

    /// Switches to service-account auth.
    ///
    /// A first token is fetched immediately. If that fails the handle keeps
    /// its previous auth state.
    pub async fn use_service_account_auth(&self, key: ServiceAccountKey) -> Result<()> {
        let mut auth = self.inner.auth.lock().await;
        let token = key
            .fetch_access_token(self.inner.feed.http(), self.inner.feed.timeout())
            .await?;
        auth.mode = AuthMode::Jwt;
        auth.token = Some(token);
        auth.service_account = Some(key);
        Ok(())
    }

    /// `Authorization` header value plus the scope it implies.
    ///
    /// Under service-account auth an expired token is renewed first. The
    /// lock is held across the renewal so concurrent callers wait for one
    /// round-trip instead of each issuing their own.
    async fn authorize(&self) -> Result<(Option<String>, Visibility, Projection)> {
        let mut auth = self.inner.auth.lock().await;

        let expired = auth
            .token
            .as_ref()
            .map_or(true, |token| token.is_expired(Utc::now()));
        if auth.mode == AuthMode::Jwt && expired {
            let key = auth
                .service_account
                .as_ref()
                .ok_or_else(|| AuthError::InvalidKey("no service account key loaded".into()))?;
            tracing::debug!(client_email = %key.client_email, "Service account token expired");
            let token = key
                .fetch_access_token(self.inner.feed.http(), self.inner.feed.timeout())
                .await?;
            auth.token = Some(token);
        }

        let header = match auth.mode {
            AuthMode::Anonymous => None,
            AuthMode::Token | AuthMode::Jwt => auth.token.as_ref().map(AuthToken::header_value),
        };
        let (default_visibility, default_projection) = if header.is_some() {
            (Visibility::Private, Projection::Full)
        } else {
            (Visibility::Public, Projection::Values)
        };
        Ok((
            header,
            self.inner.visibility.unwrap_or(default_visibility),
            self.inner.projection.unwrap_or(default_projection),
        ))
    }

    /// Request against `{feed_url}/{segments…}/{visibility}/{projection}`.
    pub(crate) async fn request(
        &self,
        segments: &[&str],
        method: Method,
        payload: Payload,
    ) -> Result<Option<FeedDocument>> {
        let (authorization, visibility, projection) = self.authorize().await?;
        let url = self.inner.feed.feed_url(segments, visibility, projection)?;
        self.inner.feed.send(method, url, payload, authorization).await
    }

    /// Request against an absolute URL such as an edit link.
    pub(crate) async fn request_url(
        &self,
        url: &str,
        method: Method,
        payload: Payload,
    ) -> Result<Option<FeedDocument>> {
        let url = Url::parse(url)?;
        let (authorization, _, _) = self.authorize().await?;
        self.inner.feed.send(method, url, payload, authorization).await
    }

    /// Title, author and worksheets.
    pub async fn get_info(&self) -> Result<SpreadsheetInfo> {
        let doc = self
            .request(&["worksheets", self.key()], Method::GET, Payload::None)
            .await?
            .ok_or(FeedError::EmptyResponse("get_info"))?;
        let info = SpreadsheetInfo::from_feed(self, &doc.root)?;
        tracing::debug!(
            key = %self.key(),
            worksheets = info.worksheets.len(),
            "Fetched spreadsheet info"
        );
        Ok(info)
    }

    pub async fn get_cells(&self, worksheet_id: &str, query: &CellQuery) -> Result<Vec<Cell>> {
        let doc = self
            .request(
                &["cells", self.key(), worksheet_id],
                Method::GET,
                Payload::Query(query.to_pairs()),
            )
            .await?
            .ok_or(FeedError::EmptyResponse("get_cells"))?;
        doc.root
            .children_named("entry")
            .map(|entry| Cell::from_entry(self.clone(), worksheet_id, entry))
            .collect()
    }

    /// Rows of the list feed.
    ///
    /// The first call for a worksheet also fetches its header row, which
    /// names the fields of every row.
    pub async fn get_rows(&self, worksheet_id: &str, query: &RowQuery) -> Result<Vec<Row>> {
        let headers = self.ensure_headers(worksheet_id).await?;
        let doc = self
            .request(
                &["list", self.key(), worksheet_id],
                Method::GET,
                Payload::Query(query.to_pairs()),
            )
            .await?
            .ok_or(FeedError::EmptyResponse("get_rows"))?;

        let fragments = entry_fragments(&doc.raw);
        let entries: Vec<&XmlNode> = doc.root.children_named("entry").collect();
        if fragments.len() != entries.len() {
            tracing::warn!(
                worksheet = %worksheet_id,
                fragments = fragments.len(),
                entries = entries.len(),
                "Entry fragments do not line up with parsed entries"
            );
        }

        let rows: Vec<Row> = entries
            .iter()
            .enumerate()
            .map(|(idx, entry)| {
                let xml = fragments.get(idx).map_or_else(String::new, |f| f.to_string());
                Row::from_entry(self.clone(), &headers, entry, xml)
            })
            .collect();

        if let Some(first) = rows.first() {
            self.inner
                .column_maps
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .entry(worksheet_id.to_string())
                .or_insert_with(|| first.column_map().clone());
        }
        Ok(rows)
    }

    /// Appends a row. Keys are header names; unknown keys are normalized
    /// into a column tag.
    pub async fn add_row<I, K, V>(&self, worksheet_id: &str, data: I) -> Result<Row>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<FieldValue>,
    {
        let headers = self.ensure_headers(worksheet_id).await?;
        let column_map = match self.column_map(worksheet_id) {
            Some(map) => map,
            None => {
                let first_row = RowQuery {
                    num: Some(1),
                    ..RowQuery::default()
                };
                self.get_rows(worksheet_id, &first_row).await?;
                // An empty worksheet yields no map to cache
                self.column_map(worksheet_id).unwrap_or_else(|| {
                    headers
                        .iter()
                        .map(|h| (h.clone(), column_tag(h)))
                        .collect()
                })
            }
        };

        let body = new_row_xml(&column_map, data);
        let doc = self
            .request(
                &["list", self.key(), worksheet_id],
                Method::POST,
                Payload::Body(body),
            )
            .await?
            .ok_or(FeedError::EmptyResponse("add_row"))?;
        let xml = first_entry(&doc.raw);
        Ok(Row::from_entry(self.clone(), &headers, &doc.root, xml))
    }

    async fn ensure_headers(&self, worksheet_id: &str) -> Result<Vec<String>> {
        if let Some(headers) = self.headers(worksheet_id) {
            return Ok(headers);
        }

        // Callers that lost the race find the cache filled once they get the lock
        let _fetching = self.inner.header_fetch.lock().await;
        if let Some(headers) = self.headers(worksheet_id) {
            return Ok(headers);
        }

        tracing::debug!(worksheet = %worksheet_id, "Fetching header row");
        let cells = self
            .get_cells(worksheet_id, &CellQuery::header_row())
            .await?;
        let names: Vec<String> = cells.iter().map(|c| c.value().to_string()).collect();

        let mut cache = self
            .inner
            .headers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(cache
            .entry(worksheet_id.to_string())
            .or_insert(names)
            .clone())
    }

    /// Cached header row of a worksheet, if fetched.
    pub fn headers(&self, worksheet_id: &str) -> Option<Vec<String>> {
        self.inner
            .headers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(worksheet_id)
            .cloned()
    }

    /// Cached header → column tag map of a worksheet, if fetched.
    pub fn column_map(&self, worksheet_id: &str) -> Option<ColumnMap> {
        self.inner
            .column_maps
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(worksheet_id)
            .cloned()
    }

    /// Drops both caches for a worksheet, e.g. after its header row changed.
    pub fn invalidate_headers(&self, worksheet_id: &str) {
        self.inner
            .headers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(worksheet_id);
        self.inner
            .column_maps
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(worksheet_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_blank_key_rejected() {
        assert!(matches!(Spreadsheet::new(""), Err(FeedError::MissingKey)));
        assert!(matches!(Spreadsheet::new("  "), Err(FeedError::MissingKey)));
    }

    #[tokio::test]
    async fn test_anonymous_scope() {
        let sheet = Spreadsheet::new("k").unwrap();
        assert_eq!(sheet.auth_mode().await, AuthMode::Anonymous);
        let (header, visibility, projection) = sheet.authorize().await.unwrap();
        assert_eq!(header, None);
        assert_eq!(visibility, Visibility::Public);
        assert_eq!(projection, Projection::Values);
    }

    #[tokio::test]
    async fn test_token_switches_scope() {
        let sheet = Spreadsheet::new("k").unwrap();
        sheet.set_auth_token(AuthToken::google_login("abc")).await;
        assert_eq!(sheet.auth_mode().await, AuthMode::Token);
        let (header, visibility, projection) = sheet.authorize().await.unwrap();
        assert_eq!(header.as_deref(), Some("GoogleLogin auth=abc"));
        assert_eq!(visibility, Visibility::Private);
        assert_eq!(projection, Projection::Full);
    }

    #[tokio::test]
    async fn test_configured_scope_wins() {
        let config = Config {
            visibility: Some(Visibility::Public),
            projection: Some(Projection::Full),
            auth_token: Some("t".into()),
            ..Config::default()
        };
        let sheet = Spreadsheet::with_config("k", config).unwrap();
        assert_eq!(sheet.auth_mode().await, AuthMode::Token);
        let (header, visibility, projection) = sheet.authorize().await.unwrap();
        assert_eq!(header.as_deref(), Some("Bearer t"));
        assert_eq!(visibility, Visibility::Public);
        assert_eq!(projection, Projection::Full);
    }

    #[tokio::test]
    async fn test_expired_static_token_still_sent() {
        let sheet = Spreadsheet::new("k").unwrap();
        let stale = AuthToken::bearer("old").with_expiry(Utc::now() - chrono::Duration::hours(1));
        sheet.set_auth_token(stale).await;
        let (header, _, _) = sheet.authorize().await.unwrap();
        assert_eq!(header.as_deref(), Some("Bearer old"));
    }

    #[test]
    fn test_invalidate_clears_caches() {
        let sheet = Spreadsheet::new("k").unwrap();
        sheet
            .inner
            .headers
            .write()
            .unwrap()
            .insert("od6".into(), vec!["Name".into()]);
        sheet
            .inner
            .column_maps
            .write()
            .unwrap()
            .insert("od6".into(), ColumnMap::from([("Name".into(), "name".into())]));
        assert_eq!(sheet.headers("od6"), Some(vec!["Name".to_string()]));

        sheet.invalidate_headers("od6");
        assert_eq!(sheet.headers("od6"), None);
        assert_eq!(sheet.column_map("od6"), None);
    }

    #[test]
    fn test_debug_shows_key_only() {
        let sheet = Spreadsheet::new("abc123").unwrap();
        let debug = format!("{:?}", sheet);
        assert!(debug.contains("abc123"));
        assert!(!debug.contains("auth"));
    }
}
