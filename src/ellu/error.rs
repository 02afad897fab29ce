//! Error types for the reader adapter. Every variant names the operation that failed
//! and, for per-chapter work, the chapter number.

use crate::epub::EpubError;
use thiserror::Error;

/// Transport failure from a [Fetch](super::Fetch) implementation.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("could not reach {url}")]
    Network { url: String, source: reqwest::Error },

    #[error("HTTP {status} from {url}")]
    HttpStatus { status: u16, url: String },

    #[error("failed to read response body from {url}")]
    BodyRead { url: String, source: reqwest::Error },

    #[error("failed to create HTTP client: {0}")]
    Client(reqwest::Error),
}

/// Failure of one of the download stages. No stage retries; any error ends the run.
#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("Invalid URL: {input}: {reason}")]
    InvalidUrl { input: String, reason: String },

    #[error("fetching {context}")]
    Fetch {
        context: String,
        #[source]
        source: FetchError,
    },

    #[error("chapter manifest not found on reader page {url} (no `new Reader(` line)")]
    ManifestNotFound { url: String },

    #[error("decoding {context}: {reason}")]
    Decode { context: String, reason: String },

    #[error("parsing {context}: {message}")]
    Parse { context: String, message: String },

    #[error("chapter {chapter}: adding image {url} to EPUB")]
    ResourceFetch {
        chapter: u32,
        url: String,
        #[source]
        source: EpubError,
    },

    #[error("chapter {chapter}: adding to EPUB")]
    Assembly {
        chapter: u32,
        #[source]
        source: EpubError,
    },
}

impl ReaderError {
    pub(crate) fn fetch(context: impl Into<String>, source: FetchError) -> Self {
        ReaderError::Fetch {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn parse(context: impl Into<String>, message: impl Into<String>) -> Self {
        ReaderError::Parse {
            context: context.into(),
            message: message.into(),
        }
    }

    pub(crate) fn decode(context: impl Into<String>, reason: impl ToString) -> Self {
        ReaderError::Decode {
            context: context.into(),
            reason: reason.to_string(),
        }
    }
}
