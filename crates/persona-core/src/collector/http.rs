//! HTTP collectors.
//!
//! `PageCollector` fetches raw pages for the website, reviews and competitor sources.
//! `SocialSearchCollector` queries a JSON search endpoint. Text extraction happens
//! downstream; these only fetch and classify failures.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::json;
use tracing::{debug, warn};

use super::handler::Collector;
use super::payload::{CompetitorPayload, ReviewsPayload, SocialPayload, WebsitePayload};
use crate::domain::CollectorError;

const DEFAULT_USER_AGENT: &str = "persona-research/0.1";

/// Maps an HTTP status to a collector error. `None` for success.
///
/// 408, 429 and 5xx are worth retrying; any other non-success status is not.
pub fn classify_status(status: StatusCode) -> Option<CollectorError> {
    if status.is_success() {
        return None;
    }
    let message = format!("HTTP {status}");
    if status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
    {
        Some(CollectorError::transient(message))
    } else {
        Some(CollectorError::permanent(message))
    }
}

/// Maps a transport error to a collector error.
fn classify_request(url: &str, err: reqwest::Error) -> CollectorError {
    if err.is_builder() {
        return CollectorError::permanent(format!("invalid request for {url}: {err}"));
    }
    if let Some(status) = err.status() {
        if let Some(classified) = classify_status(status) {
            return classified;
        }
    }
    CollectorError::transient(format!("request to {url} failed: {err}"))
}

#[derive(Clone)]
pub struct PageCollector {
    client: reqwest::Client,
    user_agent: String,
    max_body_bytes: usize,
}

impl PageCollector {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client))
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_body_bytes: 512 * 1024,
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Reading stops after this many bytes; the stored body ends at a char boundary.
    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    async fn fetch(&self, url: &str) -> Result<serde_json::Value, CollectorError> {
        debug!(url = %url, "fetching page");
        let response = self
            .client
            .get(url)
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .send()
            .await
            .map_err(|e| {
                warn!(url = %url, error = %e, "page request failed");
                classify_request(url, e)
            })?;

        let status = response.status();
        if let Some(err) = classify_status(status) {
            warn!(url = %url, status = %status, "page fetch rejected");
            return Err(err);
        }

        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let (body, truncated) = read_capped(response, self.max_body_bytes)
            .await
            .map_err(|e| classify_request(url, e))?;
        if truncated {
            debug!(url = %url, max_body_bytes = self.max_body_bytes, "page body truncated");
        }

        Ok(json!({
            "url": url,
            "finalUrl": final_url,
            "status": status.as_u16(),
            "contentType": content_type,
            "body": body,
            "truncated": truncated,
        }))
    }
}

/// Pulls body chunks until `max_bytes` is reached. The rest is never read.
async fn read_capped(
    mut response: reqwest::Response,
    max_bytes: usize,
) -> Result<(String, bool), reqwest::Error> {
    let mut buf = Vec::new();
    let mut truncated = false;
    while let Some(chunk) = response.chunk().await? {
        let room = max_bytes - buf.len();
        if chunk.len() > room {
            buf.extend_from_slice(&chunk[..room]);
            truncated = true;
            break;
        }
        buf.extend_from_slice(&chunk);
    }
    Ok((decode_prefix(&buf), truncated))
}

/// Decodes UTF-8, dropping a multi-byte char cut off at the end.
fn decode_prefix(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(e) if e.error_len().is_none() => {
            String::from_utf8_lossy(&bytes[..e.valid_up_to()]).into_owned()
        }
        Err(_) => String::from_utf8_lossy(bytes).into_owned(),
    }
}

#[async_trait]
impl Collector<WebsitePayload> for PageCollector {
    async fn collect(&self, payload: WebsitePayload) -> Result<serde_json::Value, CollectorError> {
        let mut page = self.fetch(&payload.url).await?;
        page["keywords"] = json!(payload.keywords);
        Ok(page)
    }
}

#[async_trait]
impl Collector<ReviewsPayload> for PageCollector {
    async fn collect(&self, payload: ReviewsPayload) -> Result<serde_json::Value, CollectorError> {
        self.fetch(&payload.marketplace_url).await
    }
}

#[async_trait]
impl Collector<CompetitorPayload> for PageCollector {
    /// Fails as a whole on the first failing page; a retry refetches every page.
    async fn collect(&self, payload: CompetitorPayload) -> Result<serde_json::Value, CollectorError> {
        let mut pages = Vec::with_capacity(payload.urls.len());
        for url in &payload.urls {
            pages.push(self.fetch(url).await?);
        }
        Ok(json!({ "pages": pages }))
    }
}

/// Posts `{ "query", "limit" }` to a search endpoint and keeps its JSON response.
pub struct SocialSearchCollector {
    client: reqwest::Client,
    endpoint: String,
    limit: usize,
}

impl SocialSearchCollector {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            limit: 50,
        })
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

#[async_trait]
impl Collector<SocialPayload> for SocialSearchCollector {
    async fn collect(&self, payload: SocialPayload) -> Result<serde_json::Value, CollectorError> {
        #[derive(serde::Serialize)]
        struct Request<'a> {
            query: String,
            keywords: &'a [String],
            limit: usize,
        }

        let request = Request {
            query: payload.keywords.join(" OR "),
            keywords: &payload.keywords,
            limit: self.limit,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                warn!(endpoint = %self.endpoint, error = %e, "social search failed");
                classify_request(&self.endpoint, e)
            })?;

        if let Some(err) = classify_status(response.status()) {
            return Err(err);
        }

        let results: serde_json::Value = response.json().await.map_err(|e| {
            CollectorError::permanent(format!("social search returned invalid JSON: {e}"))
        })?;

        Ok(json!({
            "query": request.query,
            "results": results,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ErrorKind;
    use rstest::rstest;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[rstest]
    #[case::not_found(StatusCode::NOT_FOUND, ErrorKind::Permanent)]
    #[case::forbidden(StatusCode::FORBIDDEN, ErrorKind::Permanent)]
    #[case::rate_limited(StatusCode::TOO_MANY_REQUESTS, ErrorKind::Transient)]
    #[case::request_timeout(StatusCode::REQUEST_TIMEOUT, ErrorKind::Transient)]
    #[case::bad_gateway(StatusCode::BAD_GATEWAY, ErrorKind::Transient)]
    #[case::unavailable(StatusCode::SERVICE_UNAVAILABLE, ErrorKind::Transient)]
    fn status_classification(#[case] status: StatusCode, #[case] expected: ErrorKind) {
        let err = classify_status(status).unwrap();
        assert_eq!(err.kind, expected);
        assert!(err.message.contains(status.as_str()));
    }

    #[test]
    fn success_is_not_an_error() {
        assert!(classify_status(StatusCode::OK).is_none());
        assert!(classify_status(StatusCode::NO_CONTENT).is_none());
    }

    #[test]
    fn decode_drops_a_cut_char() {
        assert_eq!(decode_prefix(b"hello"), "hello");
        // 'é' is two bytes; a prefix ending inside it backs off.
        assert_eq!(decode_prefix(&"héllo".as_bytes()[..2]), "h");
    }

    /// Serves one response with `body` on a local port and returns its URL.
    async fn serve_once(body: Vec<u8>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 2048];
            let _ = socket.read(&mut request).await;
            let head = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: text/html\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
                body.len()
            );
            // The client may hang up once it has read enough.
            let _ = socket.write_all(head.as_bytes()).await;
            let _ = socket.write_all(&body).await;
        });
        format!("http://{addr}/page")
    }

    fn local_collector(max_body_bytes: usize) -> PageCollector {
        let client = reqwest::Client::builder().no_proxy().build().unwrap();
        PageCollector::with_client(client)
            .with_user_agent("persona-test")
            .with_max_body_bytes(max_body_bytes)
    }

    #[tokio::test]
    async fn oversized_body_is_cut_at_the_cap() {
        let url = serve_once(vec![b'a'; 256 * 1024]).await;
        let page = Collector::<ReviewsPayload>::collect(
            &local_collector(1024),
            ReviewsPayload {
                marketplace_url: url,
            },
        )
        .await
        .unwrap();

        assert_eq!(page["status"], 200);
        assert_eq!(page["truncated"], true);
        assert_eq!(page["body"].as_str().unwrap().len(), 1024);
        assert_eq!(page["contentType"], "text/html");
    }

    #[tokio::test]
    async fn small_body_is_kept_whole() {
        let url = serve_once(b"<html>ok</html>".to_vec()).await;
        let page = Collector::<WebsitePayload>::collect(
            &local_collector(1024),
            WebsitePayload {
                url,
                keywords: vec!["sleep".to_string()],
            },
        )
        .await
        .unwrap();

        assert_eq!(page["truncated"], false);
        assert_eq!(page["body"], "<html>ok</html>");
        assert_eq!(page["keywords"], serde_json::json!(["sleep"]));
        assert!(page.get("fetchedAt").is_none());
    }

    #[tokio::test]
    async fn unparseable_url_is_permanent() {
        let collector = PageCollector::new(Duration::from_secs(1)).unwrap();
        let err = Collector::<ReviewsPayload>::collect(
            &collector,
            ReviewsPayload {
                marketplace_url: "not a url".to_string(),
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Permanent);
    }
}
