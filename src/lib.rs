//! ellu-dl: CLI downloader for books in the Ellu web reader, outputting EPUB.

pub mod cli;
pub mod config;
pub mod ellu;
pub mod epub;
pub mod model;

// Re-exports for CLI and consumers.
pub use ellu::{
    assemble, scrape_book, Fetch, FetchError, PoliteClient, PoliteClientBuilder, ReaderError,
    ScrapeOptions,
};
pub use epub::{DocumentBuilder, EpubBuilder, EpubError, EpubOptions, EpubVersion};
pub use model::{Book, Chapter};
