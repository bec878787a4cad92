//! The public operations: timeline years, timeline posts, single posts and
//! the asset proxy.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::stream::BoxStream;
use reqwest::header::{HeaderMap, LOCATION};
use reqwest::StatusCode;
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::TtlCache;
use crate::error::{Result, ScrapeError};
use crate::extract::{
    parse_embedded_link, parse_post_content, parse_post_info, parse_timeline_posts,
    parse_timeline_years,
};
use crate::models::{Post, TimelinePost, TimelineYears};
use crate::rewrite::{IdentityRewriter, UrlRewriter};
use crate::signer::UrlSigner;
use crate::transport::{
    Method, RequestOptions, Response, ResponseInfo, Transport, TransportError,
};

/// The year index is always cached for ten minutes, whatever the default TTL.
pub const TIMELINE_YEARS_TTL: Duration = Duration::from_secs(600);

const MAX_PROXY_REDIRECTS: u32 = 10;

pub const DEFAULT_ALLOWED_DOMAINS: &[&str] = &["facebook.com", "fbcdn.net"];

/// What to fetch through the proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyTarget {
    /// A plain URL, checked against the allowed domains.
    Direct(String),
    /// A token minted by [`UrlSigner::sign`].
    Signed(String),
}

/// A proxied upstream response: its status, the forwardable headers and the
/// body as it arrives.
pub struct ProxiedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: BoxStream<'static, Result<Bytes, TransportError>>,
}

pub struct Scraper {
    transport: Arc<dyn Transport>,
    cache: Arc<TtlCache>,
    rewriter: Arc<dyn UrlRewriter>,
    signer: Option<Arc<UrlSigner>>,
    allowed_domains: Vec<String>,
}

impl Scraper {
    pub fn new(transport: Arc<dyn Transport>, cache: Arc<TtlCache>) -> Self {
        Self {
            transport,
            cache,
            rewriter: Arc::new(IdentityRewriter),
            signer: None,
            allowed_domains: DEFAULT_ALLOWED_DOMAINS.iter().map(ToString::to_string).collect(),
        }
    }

    #[must_use]
    pub fn with_rewriter(mut self, rewriter: Arc<dyn UrlRewriter>) -> Self {
        self.rewriter = rewriter;
        self
    }

    /// Accept signed proxy targets minted by `signer`.
    #[must_use]
    pub fn with_signer(mut self, signer: Arc<UrlSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    #[must_use]
    pub fn with_allowed_domains(mut self, domains: Vec<String>) -> Self {
        self.allowed_domains = domains
            .into_iter()
            .map(|d| d.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|d| !d.is_empty())
            .collect();
        self
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<TtlCache> {
        &self.cache
    }

    async fn fetch_page(&self, url: &str) -> Result<(String, ResponseInfo)> {
        let response = self
            .transport
            .request(url, Method::Get, RequestOptions::default())
            .await?;
        let info = response.info.clone();
        debug!(
            url,
            status = %info.status,
            effective_url = %info.effective_url,
            redirect_count = info.redirect_count,
            "Fetched page"
        );
        Ok((response.into_text().await?, info))
    }

    /// Year → timeline URL for a profile.
    ///
    /// Always fetches. When the profile page carries no year index and the
    /// request was redirected, the redirect target is retried once as
    /// `?v=timeline`.
    ///
    /// # Errors
    ///
    /// [`ScrapeError::InvalidIdentifier`] for a blank username,
    /// [`ScrapeError::ExtractionFailed`] or [`ScrapeError::RegionNotFound`]
    /// when no year index can be found, transport errors as-is. A failed
    /// cache write is logged and does not fail the call.
    pub async fn get_timeline_years(&self, username: &str) -> Result<TimelineYears> {
        let username = checked_username(username)?;
        let (page, info) = self
            .fetch_page(&format!("/profile.php?id={}", urlencoding::encode(username)))
            .await?;

        let years = match parse_timeline_years(&page) {
            Ok(years) => years,
            Err(e) if info.redirect_count == 0 => {
                debug!(username, error = %e, "No year index and no redirect to follow");
                return Err(ScrapeError::ExtractionFailed("timeline years"));
            }
            Err(e) => {
                let base = info
                    .effective_url
                    .split_once('?')
                    .map_or(info.effective_url.as_str(), |(base, _)| base);
                let fallback = format!("{base}?v=timeline");
                debug!(username, error = %e, %fallback, "Retrying year index on timeline view");

                let (page, _) = self.fetch_page(&fallback).await?;
                parse_timeline_years(&page)?
            }
        };

        if let Err(e) = self
            .cache
            .set(&years_key(username), &years, Some(TIMELINE_YEARS_TTL))
            .await
        {
            warn!(username, error = %e, "Failed to cache timeline years");
        }
        info!(username, years = years.len(), "Timeline years extracted");
        Ok(years)
    }

    /// Post references of one year of a profile, newest year by default.
    ///
    /// `limit` caps the number of post cards read. With `fetch_content`, each
    /// post is also opened; a post whose body cannot be extracted keeps
    /// `content: None`.
    ///
    /// # Errors
    ///
    /// [`ScrapeError::YearNotFound`] for a year missing from the index, plus
    /// everything [`Self::get_timeline_years`] and the post extraction return.
    pub async fn get_timeline_posts(
        &self,
        username: &str,
        year: Option<i32>,
        limit: Option<usize>,
        fetch_content: bool,
    ) -> Result<Vec<TimelinePost>> {
        let username = checked_username(username)?;
        let years = match self.cache.get::<TimelineYears>(&years_key(username)).await {
            Some(years) if !years.is_empty() => years,
            _ => self.get_timeline_years(username).await?,
        };

        let year = match year {
            Some(year) => year,
            None => *years
                .keys()
                .next_back()
                .ok_or(ScrapeError::ExtractionFailed("timeline years"))?,
        };
        let url = years.get(&year).ok_or(ScrapeError::YearNotFound(year))?;

        let (page, _) = self.fetch_page(url).await?;
        let infos = parse_timeline_posts(&page, limit)?;

        let mut posts = Vec::with_capacity(infos.len());
        for info in infos {
            let mut post = TimelinePost { info, content: None };
            if fetch_content {
                if let Some(id) = post.post_id() {
                    post.content = match self.get_post(&id).await {
                        Ok(full) => Some(full.content),
                        Err(e @ ScrapeError::Transport(_)) => return Err(e),
                        Err(e) => {
                            warn!(post_id = %id, error = %e, "Leaving post content empty");
                            None
                        }
                    };
                }
            }
            posts.push(post);
        }

        info!(username, year, count = posts.len(), "Timeline posts extracted");
        Ok(posts)
    }

    /// A single post with its metadata, body and link preview.
    ///
    /// # Errors
    ///
    /// [`ScrapeError::InvalidIdentifier`] before any request when `post_id`
    /// is neither all digits nor a `pfbid` identifier;
    /// [`ScrapeError::ExtractionFailed`] when the body matches no known layout.
    pub async fn get_post(&self, post_id: &str) -> Result<Post> {
        let post_id = post_id.trim();
        if !is_valid_post_id(post_id) {
            return Err(ScrapeError::InvalidIdentifier(format!(
                "post id {post_id:?} must be numeric or start with \"pfbid\""
            )));
        }

        let key = format!("post/{post_id}");
        if let Some(post) = self.cache.get::<Post>(&key).await {
            return Ok(post);
        }

        let (page, _) = self.fetch_page(&format!("/{post_id}")).await?;
        let (info, body) = parse_post_info(&page);
        let mut content = parse_post_content(body)?;
        let mut embedded_link = parse_embedded_link(&page);

        for url in content.photo_urls_mut() {
            *url = self.rewriter.rewrite(url);
        }
        if let Some(image) = embedded_link
            .as_mut()
            .and_then(|link| link.image_preview.as_mut())
        {
            image.url = self.rewriter.rewrite(&image.url);
        }

        let post = Post {
            info,
            content,
            embedded_link,
        };
        if let Err(e) = self.cache.set(&key, &post, None).await {
            warn!(post_id, error = %e, "Failed to cache post");
        }
        debug!(post_id, "Post extracted");
        Ok(post)
    }

    /// Fetch an asset for relaying to a client.
    ///
    /// Only `https` URLs on an allowed domain (or a subdomain of one) are
    /// fetched, whether given directly or through a signed token. Redirects
    /// are followed only while each hop passes the same check. Only the
    /// `content-*`, `date` and `access-*` response headers are kept.
    ///
    /// # Errors
    ///
    /// [`ScrapeError::SignatureInvalid`] for a bad token or when no signer is
    /// configured, [`ScrapeError::DisallowedUrl`] for any other URL or
    /// redirect hop, and transport errors as-is.
    pub async fn http_get(&self, target: ProxyTarget) -> Result<ProxiedResponse> {
        let url = match target {
            ProxyTarget::Direct(url) => url,
            ProxyTarget::Signed(token) => self
                .signer
                .as_ref()
                .ok_or(ScrapeError::SignatureInvalid)?
                .verify(&token)?,
        };
        let response = self.fetch_allowed(url).await?;

        let headers = forwarded_headers(&response.info.headers);
        let status = response.info.status;
        debug!(url = %response.info.effective_url, %status, "Proxying asset");

        Ok(ProxiedResponse {
            status,
            headers,
            body: response.into_stream(),
        })
    }

    /// Fetch `url` for the proxy, following redirects one hop at a time so
    /// every hop is held to the same scheme and domain rules.
    async fn fetch_allowed(&self, mut url: String) -> Result<Response> {
        let options = RequestOptions {
            follow_redirects: false,
            ..RequestOptions::streaming()
        };

        for hop in 0..=MAX_PROXY_REDIRECTS {
            self.check_allowed(&url)?;
            let response = self
                .transport
                .request(&url, Method::Get, options.clone())
                .await?;

            let location = response
                .info
                .headers
                .get(LOCATION)
                .filter(|_| response.info.status.is_redirection())
                .and_then(|value| value.to_str().ok())
                .map(str::to_owned);
            let Some(location) = location else {
                return Ok(response);
            };

            let next = Url::parse(&url)
                .and_then(|current| current.join(&location))
                .map_err(|_| ScrapeError::DisallowedUrl(location.clone()))?;
            debug!(from = %url, to = %next, hop, "Following asset redirect");
            url = next.into();
        }

        Err(TransportError::TooManyRedirects(MAX_PROXY_REDIRECTS).into())
    }

    fn check_allowed(&self, raw: &str) -> Result<()> {
        let disallowed = || ScrapeError::DisallowedUrl(raw.to_string());
        let url = Url::parse(raw).map_err(|_| disallowed())?;
        if url.scheme() != "https" {
            return Err(disallowed());
        }

        let host = url.host_str().ok_or_else(disallowed)?.to_ascii_lowercase();
        let allowed = self.allowed_domains.iter().any(|domain| {
            host == *domain
                || host
                    .strip_suffix(domain.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.'))
        });

        if allowed {
            Ok(())
        } else {
            Err(disallowed())
        }
    }
}

fn checked_username(username: &str) -> Result<&str> {
    let username = username.trim();
    if username.is_empty() {
        return Err(ScrapeError::InvalidIdentifier(
            "username cannot be empty".to_string(),
        ));
    }
    Ok(username)
}

fn years_key(username: &str) -> String {
    format!("timeline_years/{username}")
}

/// All digits, or `pfbid` followed by alphanumerics.
fn is_valid_post_id(id: &str) -> bool {
    match id.strip_prefix("pfbid") {
        Some(rest) => !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_alphanumeric()),
        None => !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()),
    }
}

/// Whether an upstream response header may be relayed to the client.
#[must_use]
pub fn is_forwarded_header(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    name.starts_with("content-") || name == "date" || name.starts_with("access-")
}

fn forwarded_headers(upstream: &HeaderMap) -> HeaderMap {
    upstream
        .iter()
        .filter(|(name, _)| is_forwarded_header(name.as_str()))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}
