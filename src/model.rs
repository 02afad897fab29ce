//! Book data threaded through the download pipeline.
//!
//! The resolver creates the `Book`, the manifest extractor fills `chapters` (empty content),
//! the content fetcher fills each `content`, and the asset rewriter rewrites it in place.

/// One book in the web reader.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Book {
    pub title: String,
    /// Site-internal id. Parameterizes the reader and chapter URLs.
    pub id: u64,
    /// Public catalog number (ISBN-like) taken from the `/books/<n>` page path.
    pub catalog_number: u64,
    pub author: String,
    /// Manifest order. Never reordered after extraction.
    pub chapters: Vec<Chapter>,
}

/// One chapter in manifest order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Chapter {
    /// Chapter number from the manifest, not an array index. 0 is the cover chapter.
    pub id: u32,
    pub title: String,
    /// Raw chapter HTML after fetching; package-local asset handles after rewriting.
    pub content: String,
}

impl Chapter {
    pub fn new(id: u32, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            content: String::new(),
        }
    }
}

impl Book {
    /// File name the EPUB is written to: `<title> (<id>).epub`.
    ///
    /// Path separators and control characters in the title are replaced with `_`.
    pub fn file_name(&self) -> String {
        let title: String = self
            .title
            .trim()
            .chars()
            .map(|c| {
                if c == '/' || c == '\\' || c.is_control() {
                    '_'
                } else {
                    c
                }
            })
            .collect();
        let title = if title.is_empty() { "book" } else { &title };
        format!("{} ({}).epub", title, self.id)
    }
}
