//! Timeline pages: the year index of a profile and the post cards of a year.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

use super::region::{locate, Container};
use super::strategy::{Strategy, StrategyChain};
use super::text::decode_entities;
use super::decode_data_ft;
use crate::error::{Result, ScrapeError};
use crate::models::TimelineYears;

/// Single-letter class, bare year text.
static YEAR_LINK_COMPACT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<div class="[a-z]"><a href="([^"]+)">(\d{4})</a>"#).unwrap()
});

/// Two three-letter classes, year optionally wrapped in a span.
static YEAR_LINK_SPANNED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<div class="[a-z]{3} [a-z]{3}"><a href="([^"]+)">(?:<span>)?(\d{4})(?:</span>)?</a>"#)
        .unwrap()
});

static POST_DATA_FT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<[^>]+?data-ft="([^"]+?&quot;top_level_post_id&quot;[^"]+?)""#).unwrap()
});

static TIMELINE_YEARS: StrategyChain<TimelineYears> = StrategyChain::new(
    "timeline years",
    &[
        Strategy {
            name: "compact year links",
            extract: compact_years,
        },
        Strategy {
            name: "spanned year links",
            extract: spanned_years,
        },
    ],
);

fn compact_years(region: &str) -> Option<TimelineYears> {
    collect_years(&YEAR_LINK_COMPACT, region)
}

fn spanned_years(region: &str) -> Option<TimelineYears> {
    collect_years(&YEAR_LINK_SPANNED, region)
}

fn collect_years(pattern: &Regex, region: &str) -> Option<TimelineYears> {
    let years: TimelineYears = pattern
        .captures_iter(region)
        .filter_map(|caps| {
            let href = decode_entities(&caps[1]).into_owned();
            let year = caps[2].parse::<i32>().ok()?;
            (!href.is_empty()).then_some((year, href))
        })
        .collect();

    (!years.is_empty()).then_some(years)
}

/// Extract the year → URL index from a profile or timeline page.
///
/// # Errors
///
/// [`ScrapeError::RegionNotFound`] when the page has no timeline container,
/// [`ScrapeError::ExtractionFailed`] when neither year-link layout matches.
pub fn parse_timeline_years(document: &str) -> Result<TimelineYears> {
    let region = locate(document, Container::ComposerAsync)?;
    TIMELINE_YEARS.run(region)
}

/// Extract the metadata blobs of the post cards on a year page.
///
/// `limit` caps how many cards are looked at. Cards whose blob does not decode
/// still count toward it but are left out of the result.
///
/// # Errors
///
/// [`ScrapeError::RegionNotFound`] when the page has no timeline container,
/// [`ScrapeError::ExtractionFailed`] when it holds no post cards at all.
pub fn parse_timeline_posts(document: &str, limit: Option<usize>) -> Result<Vec<Value>> {
    let region = locate(document, Container::ComposerAsync)?;

    let mut cards = POST_DATA_FT.captures_iter(region).peekable();
    if cards.peek().is_none() {
        return Err(ScrapeError::ExtractionFailed("posts"));
    }

    let take = limit.unwrap_or(usize::MAX);
    let posts: Vec<Value> = cards
        .take(take)
        .filter_map(|caps| {
            let info = decode_data_ft(&caps[1]);
            if info.is_none() {
                warn!(raw_len = caps[1].len(), "Skipping post card with undecodable metadata");
            }
            info
        })
        .collect();

    debug!(count = posts.len(), "Extracted timeline posts");
    Ok(posts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(inner: &str) -> String {
        format!(
            r#"<html><body><div id="root"><div id="structured_composer_async_container">{inner}</div></div></body></html>"#
        )
    }

    #[test]
    fn test_compact_layout() {
        let doc = page(
            r#"<div class="x"><a href="/years/2020">2020</a></div><div class="x"><a href="/years/2021">2021</a></div>"#,
        );
        let years = parse_timeline_years(&doc).unwrap();
        assert_eq!(years.len(), 2);
        assert_eq!(years[&2020], "/years/2020");
        assert_eq!(years[&2021], "/years/2021");
    }

    #[test]
    fn test_spanned_layout_with_entities() {
        let doc = page(
            r#"<div class="abc def"><a href="/profile.php?id=4&amp;sectionLoadingID=m_timeline_loading_div_1609&amp;timeend=1640995199"><span>2021</span></a></div><div class="abc def"><a href="/profile.php?id=4&amp;timeend=1609459199">2020</a></div>"#,
        );
        let years = parse_timeline_years(&doc).unwrap();
        assert_eq!(
            years[&2021],
            "/profile.php?id=4&sectionLoadingID=m_timeline_loading_div_1609&timeend=1640995199"
        );
        assert_eq!(years[&2020], "/profile.php?id=4&timeend=1609459199");
    }

    #[test]
    fn test_no_year_links() {
        let doc = page(r#"<div class="x"><a href="/about">About</a></div>"#);
        assert!(matches!(
            parse_timeline_years(&doc),
            Err(ScrapeError::ExtractionFailed("timeline years"))
        ));
    }

    #[test]
    fn test_missing_container() {
        let doc = "<html><body><div id=\"login_form\"></div></body></html>";
        assert!(matches!(
            parse_timeline_years(doc),
            Err(ScrapeError::RegionNotFound(_))
        ));
    }

    fn card(id: &str) -> String {
        format!(
            r#"<article data-ft="&#123;&quot;top_level_post_id&quot;:&quot;{id}&quot;,&quot;content_owner_id_new&quot;:&quot;4&quot;&#125;"><div>body</div></article>"#
        )
    }

    #[test]
    fn test_posts_decoded_in_order() {
        let doc = page(&format!("{}{}", card("111"), card("222")));
        let posts = parse_timeline_posts(&doc, None).unwrap();
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0]["top_level_post_id"], "111");
        assert_eq!(posts[1]["content_owner_id_new"], "4");
    }

    #[test]
    fn test_posts_skip_undecodable() {
        let broken = r#"<article data-ft="&#123;&quot;top_level_post_id&quot;:oops&#125;"></article>"#;
        let doc = page(&format!("{}{broken}{}", card("1"), card("3")));
        let posts = parse_timeline_posts(&doc, None).unwrap();
        let ids: Vec<_> = posts.iter().map(|p| p["top_level_post_id"].clone()).collect();
        assert_eq!(ids, vec!["1", "3"]);
    }

    #[test]
    fn test_posts_limit_counts_cards() {
        let broken = r#"<article data-ft="&#123;&quot;top_level_post_id&quot;:oops&#125;"></article>"#;
        let doc = page(&format!("{broken}{}{}", card("1"), card("2")));
        let posts = parse_timeline_posts(&doc, Some(2)).unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0]["top_level_post_id"], "1");
    }

    #[test]
    fn test_no_posts() {
        let doc = page("<div>nothing here</div>");
        assert!(matches!(
            parse_timeline_posts(&doc, None),
            Err(ScrapeError::ExtractionFailed("posts"))
        ));
    }
}
