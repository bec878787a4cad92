//! Locating named containers inside a raw page.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Result, ScrapeError};

static COMPOSER_ASYNC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<div[^>]*?id="structured_composer_async_container"[^>]*>(.+?)</body>"#)
        .unwrap()
});

static LINK_ATTACHMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<div[^>]+?data-ft="&#123;&quot;tn&quot;:&quot;H&quot;&#125;"[^>]*>(.+?)</body>"#)
        .unwrap()
});

/// Structural containers the extractor knows how to find.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    /// The timeline/profile body holding year links and post cards.
    ComposerAsync,
    /// The attachment card of a shared external link.
    LinkAttachment,
}

impl Container {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::ComposerAsync => "structured_composer_async_container",
            Self::LinkAttachment => "link attachment",
        }
    }

    fn pattern(self) -> &'static Regex {
        match self {
            Self::ComposerAsync => &COMPOSER_ASYNC,
            Self::LinkAttachment => &LINK_ATTACHMENT,
        }
    }
}

/// Return everything between the container's opening tag and `</body>`.
///
/// # Errors
///
/// Returns [`ScrapeError::RegionNotFound`] when the container is absent, which
/// callers treat as "try the next strategy" rather than a hard failure.
pub fn locate(document: &str, container: Container) -> Result<&str> {
    container
        .pattern()
        .captures(document)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .ok_or(ScrapeError::RegionNotFound(container.name()))
}
