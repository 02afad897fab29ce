//! Chapter manifest embedded in the reader page.
//!
//! The reader page boots with an inline script line of the form
//!
//! ```text
//! new Reader(totalChapterBytes, "bookmark", flag, [{"number":0,"Title":"..."}, ...], a, b, c);
//! ```
//!
//! This is a JavaScript call, not JSON. The chapter array is recovered by splitting the line
//! on `", "`, dropping the first three and last three tokens, and joining the rest back with
//! `", "`. A title containing a literal `", "` still round-trips as long as the surrounding
//! arguments do not; a `", "` inside one of the six scalar arguments breaks the split.
//!
//! Only a line that begins with `new Reader(` counts; indented calls are not matched. When
//! several scripts carry such a line, the first one in document order is used and the
//! rest are never decoded, so a malformed later line does not fail the run.

use super::error::ReaderError;
use super::{parse_selector, Fetch};
use crate::model::Chapter;
use reqwest::Url;
use scraper::Html;
use serde::Deserialize;

/// Prefix of the script line carrying the manifest.
pub const READER_MARKER: &str = "new Reader(";

const ARG_SEPARATOR: &str = ", ";
const LEADING_ARGS: usize = 3;
const TRAILING_ARGS: usize = 3;

#[derive(Debug, Deserialize)]
struct ManifestEntry {
    #[serde(alias = "Number")]
    number: u32,
    #[serde(rename = "Title", alias = "title", default)]
    title: String,
}

/// Find the first line beginning with `new Reader(` in the page's `body > script` elements.
pub fn find_manifest_line(html: &str) -> Result<Option<String>, ReaderError> {
    let doc = Html::parse_document(html);
    let script_sel = parse_selector("body > script")?;
    for script in doc.select(&script_sel) {
        let text = script.text().collect::<String>();
        if let Some(line) = text.lines().find(|line| line.starts_with(READER_MARKER)) {
            return Ok(Some(line.to_string()));
        }
    }
    Ok(None)
}

/// Recover the chapter array text from a `new Reader(...)` line.
pub fn manifest_json(line: &str) -> Result<String, ReaderError> {
    let tokens: Vec<&str> = line.split(ARG_SEPARATOR).collect();
    if tokens.len() <= LEADING_ARGS + TRAILING_ARGS {
        return Err(ReaderError::decode(
            "chapter manifest",
            format!(
                "expected more than {} arguments in reader call, found {}",
                LEADING_ARGS + TRAILING_ARGS,
                tokens.len()
            ),
        ));
    }
    Ok(tokens[LEADING_ARGS..tokens.len() - TRAILING_ARGS].join(ARG_SEPARATOR))
}

/// Decode a `new Reader(...)` line into chapters (no content yet), in array order.
pub fn decode_manifest_line(line: &str) -> Result<Vec<Chapter>, ReaderError> {
    let json = manifest_json(line)?;
    let entries: Vec<ManifestEntry> =
        serde_json::from_str(&json).map_err(|e| ReaderError::decode("chapter manifest", e))?;
    Ok(entries
        .into_iter()
        .map(|entry| Chapter::new(entry.number, entry.title))
        .collect())
}

/// Parse the reader landing page into chapters.
pub fn parse_reader_page(html: &str, reader_url: &Url) -> Result<Vec<Chapter>, ReaderError> {
    let line = find_manifest_line(html)?.ok_or_else(|| ReaderError::ManifestNotFound {
        url: reader_url.to_string(),
    })?;
    decode_manifest_line(&line)
}

/// Fetch the reader landing page and extract its chapter manifest.
pub fn extract_chapters(
    client: &mut dyn Fetch,
    reader_url: &Url,
) -> Result<Vec<Chapter>, ReaderError> {
    let html = client
        .get_text(reader_url.as_str())
        .map_err(|e| ReaderError::fetch("reader page", e))?;
    parse_reader_page(&html, reader_url)
}
