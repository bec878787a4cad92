//! Shared-link attachment cards.

use std::sync::LazyLock;

use regex::Regex;

use super::balanced::scan_div;
use super::region::{locate, Container};
use super::strategy::{Strategy, StrategyChain};
use super::text::{decode_entities, normalize_block};
use super::parse_img_tag;
use crate::models::EmbeddedLinkPreview;

static FIRST_IMG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<img[^>]+>").unwrap());

/// The outbound redirector link; the target sits percent-encoded in `u=`.
static REDIRECT_TARGET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<a[^>]+href="[^"]+[&?]u=([^&?"]+)[^"]*"[^>]*>"#).unwrap()
});

static EMBEDDED_LINK: StrategyChain<EmbeddedLinkPreview> = StrategyChain::new(
    "embedded link",
    &[Strategy {
        name: "link attachment card",
        extract: attachment_card,
    }],
);

fn attachment_card(document: &str) -> Option<EmbeddedLinkPreview> {
    let region = locate(document, Container::LinkAttachment).ok()?;
    let card = scan_div(region)?;

    let image_preview = FIRST_IMG
        .find(card)
        .and_then(|m| parse_img_tag(m.as_str()));

    let url = REDIRECT_TARGET.captures(card).map(|caps| {
        let raw = decode_entities(&caps[1]).into_owned();
        match urlencoding::decode(&raw) {
            Ok(decoded) => decoded.into_owned(),
            Err(_) => raw,
        }
    });

    Some(EmbeddedLinkPreview {
        url,
        description: normalize_block(card),
        image_preview,
    })
}

/// Extract the shared-link card of a post page, if it has one.
#[must_use]
pub fn parse_embedded_link(document: &str) -> Option<EmbeddedLinkPreview> {
    EMBEDDED_LINK.try_run(document)
}
