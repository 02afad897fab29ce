//! Book page: catalog number from the URL path, internal id, title and author from the page.

use super::error::ReaderError;
use super::{parse_selector, Fetch};
use crate::model::Book;
use reqwest::Url;
use scraper::Html;

const BOOK_PATH_PREFIX: &str = "/books/";
const BOOK_PAGE_CONTEXT: &str = "book page";

/// Head of the book page: internal id, title, author.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookHead {
    pub id: u64,
    pub title: String,
    pub author: String,
}

/// Catalog number from a `/books/<n>[/...]` path.
pub fn catalog_number(page_url: &Url) -> Result<u64, ReaderError> {
    let rest = page_url
        .path()
        .strip_prefix(BOOK_PATH_PREFIX)
        .ok_or_else(|| ReaderError::InvalidUrl {
            input: page_url.to_string(),
            reason: "URL format not recognized (expected /books/<number>)".to_string(),
        })?;
    let segment = rest.split('/').next().unwrap_or_default();
    segment.parse::<u64>().map_err(|e| {
        ReaderError::parse(
            format!("URL path {}", page_url.path()),
            format!("catalog number {:?}: {}", segment, e),
        )
    })
}

/// Parse the book page: `#book_id[value]`, `.book-head > h1`, `.book-head > p`.
pub fn parse_book_page(html: &str) -> Result<BookHead, ReaderError> {
    let doc = Html::parse_document(html);

    let id_sel = parse_selector("#book_id")?;
    let id_el = doc
        .select(&id_sel)
        .next()
        .ok_or_else(|| ReaderError::parse(BOOK_PAGE_CONTEXT, "book_id not found"))?;
    let id_value = id_el
        .value()
        .attr("value")
        .ok_or_else(|| ReaderError::parse(BOOK_PAGE_CONTEXT, "book_id has no value"))?;
    let id = id_value.trim().parse::<u64>().map_err(|e| {
        ReaderError::parse(BOOK_PAGE_CONTEXT, format!("book_id {:?}: {}", id_value, e))
    })?;

    let title_sel = parse_selector(".book-head > h1")?;
    let title = doc
        .select(&title_sel)
        .next()
        .map(|e| e.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            ReaderError::parse(BOOK_PAGE_CONTEXT, "missing book title (.book-head > h1)")
        })?;

    let author_sel = parse_selector(".book-head > p")?;
    let author = doc
        .select(&author_sel)
        .next()
        .map(|e| e.text().collect::<String>().trim().to_string())
        .unwrap_or_default();

    Ok(BookHead { id, title, author })
}

/// Resolve a book page URL into a `Book` with no chapters yet.
pub fn resolve(client: &mut dyn Fetch, page_url: &Url) -> Result<Book, ReaderError> {
    let catalog_number = catalog_number(page_url)?;
    let html = client
        .get_text(page_url.as_str())
        .map_err(|e| ReaderError::fetch("book page", e))?;
    let head = parse_book_page(&html)?;
    Ok(Book {
        title: head.title,
        id: head.id,
        catalog_number,
        author: head.author,
        chapters: Vec::new(),
    })
}
