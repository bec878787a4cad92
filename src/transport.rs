//! HTTP transport used by the scraper.
//!
//! One [`HttpSession`] is one logged-in browsing session: it owns the cookie
//! jar, the optional upstream proxy and the base URL that relative paths
//! resolve against. Redirects are followed by hand so the caller learns the
//! final URL and how many hops it took.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::{StreamExt, TryStreamExt};
use reqwest::cookie::Jar;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE, LOCATION};
use reqwest::redirect::Policy;
use reqwest::{Client, StatusCode, Url};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::Config;

const MAX_REDIRECTS: u32 = 10;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid URL: {0}")]
    Url(String),
    #[error("request build failed: {0}")]
    Build(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("too many redirects (stopped after {0})")]
    TooManyRedirects(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => Self::GET,
            Method::Post => Self::POST,
        }
    }
}

/// Per-request knobs.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    /// Extra headers, appended to the session defaults.
    pub headers: Vec<(String, String)>,
    /// Request body; sent form-encoded unless a content type is given.
    pub body: Option<Vec<u8>>,
    pub follow_redirects: bool,
    /// Hand back the body as a stream instead of buffering it.
    pub raw_output: bool,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            headers: Vec::new(),
            body: None,
            follow_redirects: true,
            raw_output: false,
        }
    }
}

impl RequestOptions {
    #[must_use]
    pub fn streaming() -> Self {
        Self {
            raw_output: true,
            ..Self::default()
        }
    }
}

/// What happened on the wire, besides the body.
#[derive(Debug, Clone)]
pub struct ResponseInfo {
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// URL of the last hop of the redirect chain.
    pub effective_url: String,
    pub redirect_count: u32,
}

pub enum ResponseBody {
    Buffered(Bytes),
    Stream(BoxStream<'static, Result<Bytes, TransportError>>),
}

impl std::fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buffered(bytes) => f.debug_tuple("Buffered").field(&bytes.len()).finish(),
            Self::Stream(_) => f.write_str("Stream"),
        }
    }
}

#[derive(Debug)]
pub struct Response {
    pub body: ResponseBody,
    pub info: ResponseInfo,
}

impl Response {
    /// Collect the whole body, draining the stream if there is one.
    ///
    /// # Errors
    ///
    /// Returns an error if reading a streamed body fails midway.
    pub async fn into_bytes(self) -> Result<Bytes, TransportError> {
        match self.body {
            ResponseBody::Buffered(bytes) => Ok(bytes),
            ResponseBody::Stream(stream) => {
                let chunks: Vec<Bytes> = stream.try_collect().await?;
                Ok(chunks.concat().into())
            }
        }
    }

    /// Collect the body as text, replacing invalid UTF-8.
    ///
    /// # Errors
    ///
    /// Returns an error if reading a streamed body fails midway.
    pub async fn into_text(self) -> Result<String, TransportError> {
        let bytes = self.into_bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Convert into a byte stream, wrapping a buffered body if needed.
    #[must_use]
    pub fn into_stream(self) -> BoxStream<'static, Result<Bytes, TransportError>> {
        match self.body {
            ResponseBody::Buffered(bytes) => futures_util::stream::once(async move { Ok(bytes) }).boxed(),
            ResponseBody::Stream(stream) => stream,
        }
    }
}

/// The `request(url, method, options)` contract the scraper depends on.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Issue one logical request, following redirects unless told not to.
    ///
    /// Non-2xx statuses are not errors; only failures to talk to the server are.
    async fn request(
        &self,
        url: &str,
        method: Method,
        options: RequestOptions,
    ) -> Result<Response, TransportError>;
}

/// reqwest-backed session with a cookie jar scoped to its lifetime.
pub struct HttpSession {
    base: Url,
    client: Client,
}

impl HttpSession {
    /// Build a session from the scraper configuration.
    ///
    /// The configured cookie string, if any, seeds the jar for the base host.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL or proxy URL is invalid, or the
    /// client cannot be built.
    pub fn new(config: &Config) -> Result<Self, TransportError> {
        let base = Url::parse(&config.base_url).map_err(|e| TransportError::Url(e.to_string()))?;

        let jar = Arc::new(Jar::default());
        if let Some(cookie) = &config.session_cookie {
            for pair in cookie.split(';').map(str::trim).filter(|p| !p.is_empty()) {
                jar.add_cookie_str(pair, &base);
            }
        }

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));

        let mut builder = Client::builder()
            .user_agent(config.user_agent.as_str())
            .default_headers(headers)
            .cookie_provider(jar)
            .redirect(Policy::none())
            .connect_timeout(Duration::from_secs(10))
            .timeout(config.request_timeout);

        if let Some(proxy) = &config.upstream_proxy {
            let proxy =
                reqwest::Proxy::all(proxy.as_str()).map_err(|e| TransportError::Build(e.to_string()))?;
            builder = builder.proxy(proxy);
        } else {
            builder = builder.no_proxy();
        }

        let client = builder
            .build()
            .map_err(|e| TransportError::Build(e.to_string()))?;

        Ok(Self { base, client })
    }

    /// Absolute URLs are used as-is; anything else is a path on the base host.
    fn resolve(&self, url: &str) -> Result<Url, TransportError> {
        match Url::parse(url) {
            Ok(abs) if abs.has_host() => Ok(abs),
            _ => self
                .base
                .join(&format!("/{}", url.trim_start_matches('/')))
                .map_err(|e| TransportError::Url(e.to_string())),
        }
    }
}

#[async_trait]
impl Transport for HttpSession {
    async fn request(
        &self,
        url: &str,
        method: Method,
        options: RequestOptions,
    ) -> Result<Response, TransportError> {
        let mut current = self.resolve(url)?;
        let mut method = method;
        let mut body = options.body.clone();
        let mut redirect_count = 0u32;

        loop {
            debug!(url = %current, ?method, redirect_count, "Sending request");

            let mut rb = self.client.request(method.into(), current.clone());
            let mut has_content_type = false;
            for (name, value) in &options.headers {
                has_content_type |= name.eq_ignore_ascii_case(CONTENT_TYPE.as_str());
                rb = rb.header(name.as_str(), value.as_str());
            }
            if let Some(bytes) = &body {
                if !has_content_type {
                    rb = rb.header(CONTENT_TYPE, "application/x-www-form-urlencoded");
                }
                rb = rb.body(bytes.clone());
            }

            let resp = rb.send().await.map_err(|e| {
                warn!(url = %current, error = %e, "Request failed");
                TransportError::Network(e.to_string())
            })?;
            let status = resp.status();

            if options.follow_redirects && status.is_redirection() {
                if let Some(location) = resp.headers().get(LOCATION).and_then(|v| v.to_str().ok()) {
                    if redirect_count >= MAX_REDIRECTS {
                        return Err(TransportError::TooManyRedirects(redirect_count));
                    }
                    let next = current
                        .join(location)
                        .map_err(|e| TransportError::Url(e.to_string()))?;
                    if method == Method::Post
                        && matches!(
                            status,
                            StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND | StatusCode::SEE_OTHER
                        )
                    {
                        method = Method::Get;
                        body = None;
                    }
                    debug!(from = %current, to = %next, %status, "Following redirect");
                    redirect_count += 1;
                    current = next;
                    continue;
                }
            }

            let info = ResponseInfo {
                status,
                headers: resp.headers().clone(),
                effective_url: current.to_string(),
                redirect_count,
            };

            let body = if options.raw_output {
                ResponseBody::Stream(
                    resp.bytes_stream()
                        .map_err(|e| TransportError::Network(e.to_string()))
                        .boxed(),
                )
            } else {
                ResponseBody::Buffered(
                    resp.bytes()
                        .await
                        .map_err(|e| TransportError::Network(e.to_string()))?,
                )
            };

            debug!(url = %info.effective_url, %status, redirect_count, "Response received");
            return Ok(Response { body, info });
        }
    }
}
