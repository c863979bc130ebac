use futures::StreamExt;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use std::time::Duration;
use url::Url;

use super::error::{FeedError, Result};
use super::xml::{self, XmlNode};
use crate::config::{Config, Projection, Visibility};

/// Content type for Atom request bodies.
const ATOM_CONTENT_TYPE: &str = "application/atom+xml";

/// A parsed feed response together with its raw text.
///
/// The raw text is kept because row edits are applied to the original
/// fragments rather than to a re-serialized tree.
#[derive(Debug, Clone)]
pub struct FeedDocument {
    pub root: XmlNode,
    pub raw: String,
}

/// Request payload: query pairs for reads, an Atom body for writes.
#[derive(Debug)]
pub(crate) enum Payload {
    None,
    Query(Vec<(&'static str, String)>),
    Body(String),
}

/// HTTP transport for the feed API. Knows nothing about auth state; the
/// caller passes a ready `Authorization` value.
#[derive(Debug, Clone)]
pub(crate) struct FeedClient {
    http: reqwest::Client,
    feed_url: String,
    timeout: Option<Duration>,
    max_response_bytes: usize,
}

impl FeedClient {
    pub fn new(http: reqwest::Client, config: &Config) -> Self {
        Self {
            http,
            feed_url: config.feed_url.trim_end_matches('/').to_string(),
            timeout: config.request_timeout(),
            max_response_bytes: config.max_response_bytes,
        }
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// `{feed_url}/{segments…}/{visibility}/{projection}`
    pub fn feed_url(
        &self,
        segments: &[&str],
        visibility: Visibility,
        projection: Projection,
    ) -> Result<Url> {
        let mut url = self.feed_url.clone();
        for segment in segments
            .iter()
            .copied()
            .chain([visibility.as_str(), projection.as_str()])
        {
            url.push('/');
            url.push_str(segment);
        }
        Ok(Url::parse(&url)?)
    }

    /// Issues one request and maps the response.
    ///
    /// Returns `Ok(None)` when the service answers with an empty body.
    pub async fn send(
        &self,
        method: Method,
        mut url: Url,
        payload: Payload,
        authorization: Option<String>,
    ) -> Result<Option<FeedDocument>> {
        if let Payload::Query(pairs) = &payload {
            if !pairs.is_empty() {
                url.query_pairs_mut()
                    .extend_pairs(pairs.iter().map(|(k, v)| (*k, v.as_str())));
            }
        }

        tracing::debug!(method = %method, url = %url, "Feed request");

        let mut request = self.http.request(method, url);
        if let Some(value) = authorization {
            request = request.header(AUTHORIZATION, value);
        }
        if let Payload::Body(body) = payload {
            request = request.header(CONTENT_TYPE, ATOM_CONTENT_TYPE).body(body);
        }

        // The deadline covers the body as well as the headers
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.exchange(request))
                .await
                .map_err(|_| FeedError::Timeout)?,
            None => self.exchange(request).await,
        }
    }

    /// Sends the request, maps the status and reads the body.
    async fn exchange(&self, request: reqwest::RequestBuilder) -> Result<Option<FeedDocument>> {
        let response = request.send().await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(FeedError::Unauthorized);
        }
        if status.as_u16() >= 400 {
            let body = read_limited_text(response, self.max_response_bytes)
                .await
                .unwrap_or_default();
            return Err(FeedError::Http {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
                body,
            });
        }

        // A login page instead of a feed means the sheet is not public
        let is_html = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("text/html"));
        if status == StatusCode::OK && is_html {
            return Err(FeedError::PrivateSheet);
        }

        let raw = read_limited_text(response, self.max_response_bytes).await?;
        if raw.is_empty() {
            return Ok(None);
        }
        let root = xml::parse_document(&raw)?;
        Ok(Some(FeedDocument { root, raw }))
    }
}

async fn read_limited_text(response: reqwest::Response, limit: usize) -> Result<String> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(FeedError::ResponseTooLarge(limit));
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FeedError::ResponseTooLarge(limit));
        }
        bytes.extend_from_slice(&chunk);
    }

    String::from_utf8(bytes).map_err(|_| FeedError::InvalidUtf8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> FeedClient {
        let config = Config {
            feed_url: format!("{}/feeds/", server.uri()),
            max_response_bytes: 1024,
            ..Config::default()
        };
        FeedClient::new(reqwest::Client::new(), &config)
    }

    async fn get(client: &FeedClient, base: &str, p: &str) -> Result<Option<FeedDocument>> {
        let url = Url::parse(&format!("{base}{p}")).unwrap();
        client.send(Method::GET, url, Payload::None, None).await
    }

    #[test]
    fn test_feed_url_appends_scope() {
        let client = FeedClient::new(reqwest::Client::new(), &Config::default());
        let url = client
            .feed_url(&["list", "key", "od6"], Visibility::Private, Projection::Full)
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://spreadsheets.google.com/feeds/list/key/od6/private/full"
        );
    }

    #[tokio::test]
    async fn test_query_pairs_appended() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feeds/cells/k/1/public/values"))
            .and(query_param("max-row", "1"))
            .and(query_param("return-empty", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<feed/>"))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let url = client
            .feed_url(&["cells", "k", "1"], Visibility::Public, Projection::Values)
            .unwrap();
        let doc = client
            .send(
                Method::GET,
                url,
                Payload::Query(vec![
                    ("max-row", "1".to_string()),
                    ("return-empty", "true".to_string()),
                ]),
                None,
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(doc.root.name, "feed");
        assert_eq!(doc.raw, "<feed/>");
    }

    #[tokio::test]
    async fn test_body_sent_as_atom() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(header("content-type", ATOM_CONTENT_TYPE))
            .and(header("authorization", "Bearer t"))
            .and(body_string("<entry/>"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let url = Url::parse(&format!("{}/edit/1", server.uri())).unwrap();
        let result = client
            .send(
                Method::PUT,
                url,
                Payload::Body("<entry/>".to_string()),
                Some("Bearer t".to_string()),
            )
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let server = MockServer::start().await;
        Mock::given(path("/unauthorized"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(path("/missing"))
            .respond_with(ResponseTemplate::new(404).set_body_string("no such sheet"))
            .mount(&server)
            .await;
        Mock::given(path("/login"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Content-Type", "text/html; charset=UTF-8")
                    .set_body_raw("<html></html>", "text/html; charset=UTF-8"),
            )
            .mount(&server)
            .await;

        let client = client_for(&server);
        let base = server.uri();

        assert!(matches!(
            get(&client, &base, "/unauthorized").await,
            Err(FeedError::Unauthorized)
        ));
        match get(&client, &base, "/missing").await {
            Err(FeedError::Http {
                status,
                reason,
                body,
            }) => {
                assert_eq!(status, 404);
                assert_eq!(reason, "Not Found");
                assert_eq!(body, "no such sheet");
            }
            other => panic!("Expected Http error, got {:?}", other),
        }
        assert!(matches!(
            get(&client, &base, "/login").await,
            Err(FeedError::PrivateSheet)
        ));
    }

    #[tokio::test]
    async fn test_oversized_response_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(2048)))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let url = Url::parse(&server.uri()).unwrap();
        let result = client.send(Method::GET, url, Payload::None, None).await;
        assert!(matches!(result, Err(FeedError::ResponseTooLarge(1024))));
    }

    #[tokio::test]
    async fn test_stalled_body_times_out() {
        // Headers promise 100 bytes, then the server goes quiet
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            use tokio::io::{AsyncReadExt, AsyncWriteExt};
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            let _ = socket
                .write_all(
                    b"HTTP/1.1 200 OK\r\nContent-Type: application/atom+xml\r\n\
                      Content-Length: 100\r\n\r\n<feed>",
                )
                .await;
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let config = Config {
            feed_url: format!("http://{addr}/feeds/"),
            request_timeout_secs: 1,
            ..Config::default()
        };
        let client = FeedClient::new(reqwest::Client::new(), &config);
        let url = Url::parse(&format!("http://{addr}/feeds/x")).unwrap();

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            client.send(Method::GET, url, Payload::None, None),
        )
        .await
        .expect("send should give up on its own");
        assert!(matches!(result, Err(FeedError::Timeout)));
    }

    #[tokio::test]
    async fn test_malformed_xml() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<feed><entry></feed>"))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let url = Url::parse(&server.uri()).unwrap();
        let result = client.send(Method::GET, url, Payload::None, None).await;
        assert!(matches!(result, Err(FeedError::Xml(_))));
    }
}
