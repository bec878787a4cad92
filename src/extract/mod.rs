//! Extraction pipeline for mbasic pages.
//!
//! Pages are narrowed to a region first ([`region`]), nested bodies are cut
//! out with a depth-counting scan ([`balanced`]), and records are recovered
//! by ordered strategy chains ([`strategy`]). Free text goes through
//! [`text::normalize`].

pub mod balanced;
mod link_preview;
mod post;
pub mod region;
pub mod strategy;
pub mod text;
mod timeline;

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::models::PhotoRef;

pub use link_preview::parse_embedded_link;
pub use post::{parse_post_content, parse_post_info};
pub use timeline::{parse_timeline_posts, parse_timeline_years};

static IMG_SRC: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"\bsrc="([^"]+)""#).unwrap());
static IMG_WIDTH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"\bwidth="(\d+)""#).unwrap());
static IMG_HEIGHT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"\bheight="(\d+)""#).unwrap());
static IMG_ALT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"\balt="([^"]+)""#).unwrap());

/// Decode an entity-escaped `data-ft` attribute into its JSON object.
pub(crate) fn decode_data_ft(raw: &str) -> Option<Value> {
    serde_json::from_str::<Value>(&text::decode_entities(raw))
        .ok()
        .filter(Value::is_object)
}

/// Read an `<img …>` tag. A tag without `src` yields nothing.
pub(crate) fn parse_img_tag(tag: &str) -> Option<PhotoRef> {
    let attr = |re: &Regex| re.captures(tag).map(|caps| caps[1].to_string());

    let url = text::decode_entities(&attr(&IMG_SRC)?).into_owned();
    Some(PhotoRef {
        url,
        width: attr(&IMG_WIDTH).and_then(|w| w.parse().ok()),
        height: attr(&IMG_HEIGHT).and_then(|h| h.parse().ok()),
        alt: attr(&IMG_ALT).map(|a| text::decode_entities(&a).into_owned()),
    })
}
