//! Shared fixtures: an in-memory transport and sample mbasic pages.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use mbasic_scraper::cache::TtlCache;
use mbasic_scraper::scraper::Scraper;
use mbasic_scraper::transport::{
    Method, RequestOptions, Response, ResponseBody, ResponseInfo, Transport, TransportError,
};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::StatusCode;

pub const BASE: &str = "https://mbasic.facebook.com";

#[derive(Clone)]
struct Scripted {
    status: StatusCode,
    body: String,
    headers: Vec<(&'static str, &'static str)>,
    effective_url: Option<String>,
    redirect_count: u32,
    location: Option<String>,
}

/// Serves canned responses by exact URL and records every request.
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<HashMap<String, Scripted>>,
    requests: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn insert(&self, url: &str, scripted: Scripted) {
        self.routes.lock().unwrap().insert(url.to_string(), scripted);
    }

    pub fn page(&self, url: &str, body: &str) {
        self.insert(
            url,
            Scripted {
                status: StatusCode::OK,
                body: body.to_string(),
                headers: Vec::new(),
                effective_url: None,
                redirect_count: 0,
                location: None,
            },
        );
    }

    /// A page reached through `redirect_count` redirects, ending at `effective_url`.
    pub fn redirected(&self, url: &str, effective_url: &str, redirect_count: u32, body: &str) {
        self.insert(
            url,
            Scripted {
                status: StatusCode::OK,
                body: body.to_string(),
                headers: Vec::new(),
                effective_url: Some(effective_url.to_string()),
                redirect_count,
                location: None,
            },
        );
    }

    pub fn asset(&self, url: &str, body: &str, headers: Vec<(&'static str, &'static str)>) {
        self.insert(
            url,
            Scripted {
                status: StatusCode::OK,
                body: body.to_string(),
                headers,
                effective_url: None,
                redirect_count: 0,
                location: None,
            },
        );
    }

    /// A bare 302 pointing at `location`; the transport itself never follows it.
    pub fn redirect(&self, url: &str, location: &str) {
        self.insert(
            url,
            Scripted {
                status: StatusCode::FOUND,
                body: String::new(),
                headers: Vec::new(),
                effective_url: None,
                redirect_count: 0,
                location: Some(location.to_string()),
            },
        );
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn request(
        &self,
        url: &str,
        _method: Method,
        options: RequestOptions,
    ) -> Result<Response, TransportError> {
        self.requests.lock().unwrap().push(url.to_string());

        let scripted = self
            .routes
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| TransportError::Network(format!("connection refused: {url}")))?;

        let mut headers = HeaderMap::new();
        for (name, value) in scripted.headers {
            headers.insert(
                HeaderName::from_static(name),
                HeaderValue::from_static(value),
            );
        }
        if let Some(location) = &scripted.location {
            headers.insert(
                reqwest::header::LOCATION,
                HeaderValue::from_str(location)
                    .map_err(|e| TransportError::Build(e.to_string()))?,
            );
        }

        let effective_url = scripted.effective_url.unwrap_or_else(|| {
            if url.starts_with("http") {
                url.to_string()
            } else {
                format!("{BASE}{url}")
            }
        });

        let bytes = Bytes::from(scripted.body);
        let body = if options.raw_output {
            ResponseBody::Stream(futures_util::stream::iter([Ok(bytes)]).boxed())
        } else {
            ResponseBody::Buffered(bytes)
        };

        Ok(Response {
            body,
            info: ResponseInfo {
                status: scripted.status,
                headers,
                effective_url,
                redirect_count: scripted.redirect_count,
            },
        })
    }
}

pub fn cache(dir: &Path) -> Arc<TtlCache> {
    Arc::new(TtlCache::new(dir, Duration::from_secs(600)))
}

pub fn scraper(transport: &Arc<ScriptedTransport>, dir: &Path) -> Scraper {
    Scraper::new(transport.clone(), cache(dir))
}

// ========== Pages ==========

pub fn timeline_page(inner: &str) -> String {
    format!(
        r#"<html><body><div id="root"><div class="bx" id="structured_composer_async_container">{inner}</div></div></body></html>"#
    )
}

pub fn years_page() -> String {
    timeline_page(
        r#"<div class="h"><a href="/y/2020">2020</a></div><div class="h"><a href="/y/2021">2021</a></div>"#,
    )
}

pub fn post_card(id: &str) -> String {
    format!(
        r#"<article class="ch" data-ft="&#123;&quot;top_level_post_id&quot;:&quot;{id}&quot;,&quot;page_insights&quot;:&quot;x&quot;&#125;"><div>preview</div></article>"#
    )
}

pub fn posts_page(ids: &[&str]) -> String {
    let cards: String = ids.iter().map(|id| post_card(id)).collect();
    timeline_page(&cards)
}

pub fn text_post_page(id: &str, text: &str) -> String {
    format!(
        r#"<html><body><div data-ft="&#123;&quot;top_level_post_id&quot;:&quot;{id}&quot;&#125;"><div data-ft="&#123;&quot;tn&quot;:&quot;*s&quot;&#125;"><p>{text}</p></div></div><div id="ufi_{id}">Like</div></body></html>"#
    )
}

pub const PHOTO_URL: &str = "https://scontent.xx.fbcdn.net/v/beach.jpg?a=1&b=2";
pub const PREVIEW_URL: &str = "https://external.xx.fbcdn.net/safe_image.php?d=9";

pub fn photo_post_page(id: &str) -> String {
    format!(
        r#"<html><body><div data-ft="&#123;&quot;top_level_post_id&quot;:&quot;{id}&quot;&#125;"><div data-ft="&#123;&quot;tn&quot;:&quot;,g&quot;&#125;"><div>Beach day</div></div><div style="text-align:center;"><img src="https://scontent.xx.fbcdn.net/v/beach.jpg?a=1&amp;b=2" width="640" height="480" alt="May be an image of sand"></div><div data-ft="&#123;&quot;tn&quot;:&quot;H&quot;&#125;"><a href="https://lm.facebook.com/l.php?u=https%3A%2F%2Fexample.org%2Fa&amp;h=x"><div><img src="https://external.xx.fbcdn.net/safe_image.php?d=9" width="100" height="100"></div><div><h3>Shared headline</h3></div></a></div></div><div id="ufi_{id}">Like</div></body></html>"#
    )
}

pub const VIDEO_POST_PAGE: &str = "<html><body><div>video player</div></body></html>";
