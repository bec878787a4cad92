//! Single post pages.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use super::balanced::scan_div;
use super::strategy::{Strategy, StrategyChain};
use super::text::normalize;
use super::{decode_data_ft, parse_img_tag};
use crate::error::Result;
use crate::models::PostContent;

/// The post's metadata blob followed by its body, up to the feedback (`ufi_`) block.
static POST_INFO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?s)<[^>]+?data-ft="([^"]+?&quot;top_level_post_id&quot;[^"]+?)"[^>]*>(.+?)<[^>]+?id="ufi_[^"]*""#,
    )
    .unwrap()
});

static TEXT_BODY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<[^>]+?data-ft="&#123;&quot;tn&quot;:&quot;\*s&quot;&#125;"[^>]*>"#).unwrap()
});

static CENTERED_IMG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<div style="text-align:center;">(<img[^>]+>)"#).unwrap()
});

static CAPTION_BODY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<[^>]+?data-ft="&#123;&quot;tn&quot;:&quot;,g&quot;&#125;"[^>]*>"#).unwrap()
});

static ACTOR_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?s)<[^>]+?class="actor-link".+?</a>"#).unwrap());

static POST_CONTENT: StrategyChain<PostContent> = StrategyChain::new(
    "post content",
    &[
        Strategy {
            name: "text post",
            extract: text_post,
        },
        Strategy {
            name: "photo post",
            extract: photo_post,
        },
    ],
);

/// Everything after the first match of `marker`.
fn after<'a>(marker: &Regex, input: &'a str) -> Option<&'a str> {
    marker.find(input).map(|m| &input[m.end()..])
}

fn text_post(body: &str) -> Option<PostContent> {
    let inner = scan_div(after(&TEXT_BODY, body)?)?;
    Some(PostContent::Text {
        text: normalize(inner),
    })
}

/// Only the first photo of a multi-photo post is read.
fn photo_post(body: &str) -> Option<PostContent> {
    let caps = CENTERED_IMG.captures(body)?;
    let photo = parse_img_tag(&caps[1])?;

    Some(PostContent::Photo {
        text: caption(body),
        photos: vec![photo],
    })
}

fn caption(body: &str) -> Option<String> {
    let rest = after(&CAPTION_BODY, body)?;
    let rest = ACTOR_LINK.replace_all(rest, "");
    let text = normalize(scan_div(&rest)?);
    (!text.is_empty()).then_some(text)
}

/// Split a post page into its metadata blob and the markup of its body.
///
/// When the page has no decodable blob, the metadata is `None` and the whole
/// document is returned as the body.
pub fn parse_post_info(document: &str) -> (Option<Value>, &str) {
    POST_INFO
        .captures(document)
        .and_then(|caps| {
            let info = decode_data_ft(&caps[1])?;
            let body = caps.get(2)?.as_str();
            Some((Some(info), body))
        })
        .unwrap_or((None, document))
}

/// Recover the body of a post, trying the text layout before the photo layout.
///
/// # Errors
///
/// Returns [`crate::ScrapeError::ExtractionFailed`] when neither layout matches.
pub fn parse_post_content(body: &str) -> Result<PostContent> {
    POST_CONTENT.run(body)
}
