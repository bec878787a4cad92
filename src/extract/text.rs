//! Text cleanup for markup fragments: entity decoding and tag stripping.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

static LINE_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<br\s*/?>").unwrap());

static PARAGRAPH_CLOSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</p\s*>").unwrap());

static HEADING_CLOSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</h\d\s*>").unwrap());

static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());

/// Decode HTML entities in a single pass.
///
/// Covers decimal and hex character references and the full HTML5 named
/// entity set. A decoded `&` never starts a new entity, so `&amp;lt;`
/// decodes to `&lt;` and not to `<`.
pub fn decode_entities(s: &str) -> Cow<'_, str> {
    html_escape::decode_html_entities(s)
}

/// Turn a markup fragment into plain text.
///
/// Line breaks become `\n`, closed paragraphs become a blank line, every other
/// tag is dropped, entities are decoded, and each line is trimmed.
pub fn normalize(html: &str) -> String {
    let text = LINE_BREAK.replace_all(html, "\n");
    let text = PARAGRAPH_CLOSE.replace_all(&text, "\n\n");
    let text = TAG.replace_all(&text, "");
    let text = decode_entities(&text);

    text.lines()
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Like [`normalize`], but heading and paragraph closes each end a single
/// line. Used for link preview cards where the title sits in an `<h3>`.
pub fn normalize_block(html: &str) -> String {
    let text = HEADING_CLOSE.replace_all(html, "\n");
    normalize(&PARAGRAPH_CLOSE.replace_all(&text, "\n"))
}
