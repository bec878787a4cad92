//! Records returned across the API boundary.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Year → URL of the page listing that year's posts.
pub type TimelineYears = BTreeMap<i32, String>;

/// An image reference inside a post or a link preview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhotoRef {
    pub url: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub alt: Option<String>,
}

/// Body of a post. Exactly one variant is populated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PostContent {
    Text {
        text: String,
    },
    Photo {
        /// Caption, if the post has one.
        text: Option<String>,
        photos: Vec<PhotoRef>,
    },
}

impl PostContent {
    /// Iterate mutably over every photo URL, for rewriting.
    pub fn photo_urls_mut(&mut self) -> impl Iterator<Item = &mut String> {
        let photos = match self {
            Self::Text { .. } => None,
            Self::Photo { photos, .. } => Some(photos),
        };
        photos.into_iter().flatten().map(|p| &mut p.url)
    }
}

/// A shared external link attached to a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddedLinkPreview {
    pub url: Option<String>,
    pub description: String,
    pub image_preview: Option<PhotoRef>,
}

/// A single post page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    /// Metadata blob of the post, when the page carries one.
    pub info: Option<Value>,
    pub content: PostContent,
    pub embedded_link: Option<EmbeddedLinkPreview>,
}

/// A post reference found while scanning a timeline page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelinePost {
    pub info: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<PostContent>,
}

impl TimelinePost {
    /// The post identifier, which the site emits either as a string or a number.
    #[must_use]
    pub fn post_id(&self) -> Option<String> {
        match self.info.get("top_level_post_id")? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}
