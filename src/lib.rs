//! mbasic scraper library.
//!
//! Extracts profile timelines, posts and shared-link previews from the
//! JavaScript-free mobile rendering of Facebook, caches the results on disk
//! and relays page assets through a signed-URL proxy.

// Fixtures embed HTML in raw strings.
#![allow(clippy::needless_raw_string_hashes)]

pub mod cache;
pub mod config;
pub mod error;
pub mod extract;
pub mod models;
pub mod rewrite;
pub mod scraper;
pub mod signer;
pub mod transport;
pub mod web;

pub use error::{Result, ScrapeError};
