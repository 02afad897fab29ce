//! Ellu web reader adapter. Resolves book metadata, extracts the chapter manifest,
//! fetches chapter bodies, and rewrites embedded images for the EPUB builder.
//!
//! Stages run strictly in order and the first error ends the run:
//! [metadata::resolve] → [manifest::extract_chapters] → [content::populate_chapters]
//! → [assets::assemble].

mod client;
mod error;

pub mod assets;
pub mod content;
pub mod manifest;
pub mod metadata;

#[cfg(test)]
pub(crate) mod testing;

pub use assets::{assemble, STATIC_ASSET_PREFIX};
pub use client::{Fetch, Fetched, PoliteClient, PoliteClientBuilder, SESSION_COOKIE};
pub use error::{FetchError, ReaderError};

use crate::model::Book;
use reqwest::Url;
use scraper::Selector;

/// Parse a CSS selector or return a parse error (avoids panics from Selector::parse).
pub(crate) fn parse_selector(sel: &str) -> Result<Selector, ReaderError> {
    Selector::parse(sel).map_err(|e| ReaderError::parse(format!("selector {:?}", sel), e.to_string()))
}

/// Options for a download run.
#[derive(Default)]
pub struct ScrapeOptions<'a> {
    /// Use `/reader-preview` instead of `/reader`.
    pub preview: bool,
    /// Called with (done, total) as chapter bodies are fetched.
    pub progress: Option<&'a dyn Fn(u32, u32)>,
    /// Stop after the manifest; chapter bodies stay empty.
    pub toc_only: bool,
}

/// Parse the input URL and require an http(s) scheme and a host.
pub fn parse_page_url(input: &str) -> Result<Url, ReaderError> {
    let url = Url::parse(input).map_err(|e| ReaderError::InvalidUrl {
        input: input.to_string(),
        reason: e.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(ReaderError::InvalidUrl {
            input: input.to_string(),
            reason: "expected an http(s) URL with a host".to_string(),
        });
    }
    Ok(url)
}

/// Scheme, host and port of the book page; asset paths are joined onto it.
pub fn site_origin(page_url: &Url) -> Result<Url, ReaderError> {
    Url::parse(&page_url.origin().ascii_serialization()).map_err(|e| ReaderError::InvalidUrl {
        input: page_url.to_string(),
        reason: e.to_string(),
    })
}

/// `<origin>/reader?book_id=<id>`, or `/reader-preview` in preview mode.
pub fn reader_url(origin: &Url, book_id: u64, preview: bool) -> Result<Url, ReaderError> {
    let path = if preview { "reader-preview" } else { "reader" };
    let mut url = origin.join(path).map_err(|e| ReaderError::InvalidUrl {
        input: origin.to_string(),
        reason: e.to_string(),
    })?;
    url.query_pairs_mut()
        .append_pair("book_id", &book_id.to_string());
    Ok(url)
}

/// Resolve the book, extract its chapters, and fetch their bodies (unless `toc_only`).
pub fn scrape_book(
    client: &mut dyn Fetch,
    page_url: &Url,
    options: &ScrapeOptions<'_>,
) -> Result<Book, ReaderError> {
    let mut book = metadata::resolve(client, page_url)?;
    let reader = reader_url(&site_origin(page_url)?, book.id, options.preview)?;
    book.chapters = manifest::extract_chapters(client, &reader)?;
    if !options.toc_only {
        content::populate_chapters(client, &reader, &mut book.chapters, options.progress)?;
    }
    Ok(book)
}
