use thiserror::Error;

use crate::transport::TransportError;

/// Errors surfaced by the extraction core and the scraper operations.
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// The named container is missing from the document. Usually a layout
    /// change or an interstitial (login, checkpoint) page.
    #[error("cannot find region: {0}")]
    RegionNotFound(&'static str),

    /// Every strategy for the record type was tried and none matched.
    #[error("cannot extract {0}")]
    ExtractionFailed(&'static str),

    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("year {0} not found")]
    YearNotFound(i32),

    #[error("signature verification failed")]
    SignatureInvalid,

    #[error("url not allowed: {0}")]
    DisallowedUrl(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("cache write failed: {0}")]
    Cache(#[from] std::io::Error),
}

impl ScrapeError {
    /// HTTP status code used when the error crosses the API boundary.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::InvalidIdentifier(_) => 400,
            Self::SignatureInvalid | Self::DisallowedUrl(_) => 403,
            Self::RegionNotFound(_) | Self::ExtractionFailed(_) | Self::YearNotFound(_) => 422,
            Self::Transport(_) => 502,
            Self::Cache(_) => 500,
        }
    }
}

pub type Result<T, E = ScrapeError> = std::result::Result<T, E>;
