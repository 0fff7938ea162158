use bytes::Bytes;
use reqwest::header::{ACCEPT_ENCODING, CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Client, Request, StatusCode};
use std::borrow::Cow;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace};

use crate::config::Config;
use crate::constants::{BODY_PREVIEW_LIMIT, CONTENT_TYPE_JSON, USER_AGENT_VALUE};
use crate::errors::ForwardError;

/// Posts raw payloads to the configured upstream endpoint.
///
/// Cloning is cheap: the inner `reqwest::Client` shares its connection pool.
#[derive(Clone, Debug)]
pub struct UpstreamClient {
    client: Client,
    url: String,
    timeout: Option<Duration>,
}

/// What the upstream answered, passed back to the caller untouched.
#[derive(Debug)]
pub struct UpstreamReply {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl UpstreamClient {
    pub fn new(config: &Config) -> Result<Self, String> {
        let client = Client::builder()
            .build()
            .map_err(|error| format!("failed to initialize upstream HTTP client: {error}"))?;
        Ok(Self {
            client,
            url: config.upstream_url.clone(),
            timeout: config.upstream_timeout(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Sends `body` upstream exactly once. No retries are attempted.
    pub async fn forward(&self, body: Bytes, request_id: &str) -> Result<UpstreamReply, ForwardError> {
        let request_bytes = body.len();
        let request = self.build_request(body, request_id)?;

        let timeout_secs = self.timeout.map(|value| value.as_secs());
        info!(
            phase = "upstream_request_start",
            request_id,
            url = %self.url,
            body_bytes = request_bytes,
            timeout_secs = ?timeout_secs,
            "Forwarding request to: {}",
            self.url
        );

        let request_started = Instant::now();
        let response = self.client.execute(request).await.map_err(|error| {
            log_send_error(&error, request_id, &self.url, timeout_secs, request_started.elapsed());
            ForwardError::Connect
        })?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(ToOwned::to_owned);
        debug!(
            phase = "upstream_response_headers",
            request_id,
            status = %status,
            content_type = content_type.as_deref().unwrap_or("<missing>"),
            content_length = ?response.content_length(),
            elapsed_ms = request_started.elapsed().as_millis() as u64,
            "Received upstream response headers"
        );

        let body_read_started = Instant::now();
        let body = response.bytes().await.map_err(|error| {
            error!(
                phase = "upstream_body_read_failed",
                request_id,
                status = %status,
                elapsed_ms = body_read_started.elapsed().as_millis() as u64,
                "Failed to read upstream response body: {error}"
            );
            ForwardError::ReadResponse
        })?;

        info!(
            phase = "upstream_response",
            request_id,
            status = status.as_u16(),
            body_bytes = body.len(),
            elapsed_ms = request_started.elapsed().as_millis() as u64,
            "Upstream API response status: {}",
            status.as_u16()
        );
        trace!(
            phase = "upstream_response_body",
            request_id,
            body = %preview_bytes(&body, BODY_PREVIEW_LIMIT),
            "Upstream API response body"
        );

        Ok(UpstreamReply {
            status,
            content_type,
            body,
        })
    }

    fn build_request(&self, body: Bytes, request_id: &str) -> Result<Request, ForwardError> {
        let mut request_builder = self
            .client
            .post(&self.url)
            .headers(build_upstream_headers())
            .body(body);

        if let Some(duration) = self.timeout {
            request_builder = request_builder.timeout(duration);
        }

        request_builder.build().map_err(|error| {
            error!(
                phase = "upstream_request_build_failed",
                request_id,
                url = %self.url,
                "Failed to create upstream request: {error}"
            );
            ForwardError::CreateRequest
        })
    }
}

fn log_send_error(
    error: &reqwest::Error,
    request_id: &str,
    url: &str,
    timeout_secs: Option<u64>,
    elapsed: Duration,
) {
    let elapsed_ms = elapsed.as_millis() as u64;

    if error.is_timeout() {
        error!(
            phase = "upstream_connect_timeout",
            request_id,
            url,
            timeout_secs = ?timeout_secs,
            elapsed_ms,
            "Upstream timeout before response headers"
        );
        return;
    }

    if error.is_connect() {
        error!(
            phase = "upstream_connect_error",
            request_id,
            url,
            elapsed_ms,
            "Upstream connection failed before response headers: {error}"
        );
        return;
    }

    error!(
        phase = "upstream_request_error",
        request_id,
        url,
        elapsed_ms,
        "Upstream request failed before response headers: {error}"
    );
}

fn build_upstream_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE_JSON));
    // Relayed bodies must reach the caller exactly as the upstream encoded them.
    headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));
    headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));
    headers
}

pub fn preview_bytes(body: &[u8], limit: usize) -> String {
    match std::str::from_utf8(body) {
        Ok(text) => preview_text(text, limit).into_owned(),
        Err(_) => {
            let len = body.len().min(limit);
            let mut preview = String::with_capacity(len * 2 + 32);
            for byte in &body[..len] {
                use std::fmt::Write;
                let _ = write!(&mut preview, "{byte:02x}");
            }
            if body.len() > limit {
                preview.push_str("...(truncated)");
            }
            format!("<non-utf8 hex: {preview}>")
        }
    }
}

fn preview_text(text: &str, limit: usize) -> Cow<'_, str> {
    let mut iterator = text.chars();
    let preview: String = iterator.by_ref().take(limit).collect();
    if iterator.next().is_none() {
        Cow::Borrowed(text)
    } else {
        Cow::Owned(format!("{preview}...(truncated)"))
    }
}
