//! Chapter bodies. The reader serves each chapter as `{"Chapter": "<html>"}` in response to
//! an empty POST to the reader URL with `chapter_number=<id>` appended.

use super::error::ReaderError;
use super::Fetch;
use crate::model::Chapter;
use reqwest::Url;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct ChapterPayload {
    #[serde(rename = "Chapter", alias = "chapter")]
    chapter: String,
}

/// Reader URL with `chapter_number=<id>` appended to its query.
pub fn chapter_url(reader_url: &Url, chapter_id: u32) -> Url {
    let mut url = reader_url.clone();
    url.query_pairs_mut()
        .append_pair("chapter_number", &chapter_id.to_string());
    url
}

/// Decode the chapter payload and return the HTML body unmodified.
pub fn decode_chapter_payload(body: &[u8], chapter_id: u32) -> Result<String, ReaderError> {
    let payload: ChapterPayload = serde_json::from_slice(body)
        .map_err(|e| ReaderError::decode(format!("chapter {} content", chapter_id), e))?;
    Ok(payload.chapter)
}

/// Fetch every chapter's body in manifest order, stopping at the first failure.
///
/// `progress` is called with (done, total) before each request.
pub fn populate_chapters(
    client: &mut dyn Fetch,
    reader_url: &Url,
    chapters: &mut [Chapter],
    progress: Option<&dyn Fn(u32, u32)>,
) -> Result<(), ReaderError> {
    let total = chapters.len() as u32;
    for (i, chapter) in chapters.iter_mut().enumerate() {
        if let Some(p) = progress {
            p(i as u32 + 1, total);
        }
        let url = chapter_url(reader_url, chapter.id);
        let body = client
            .post_empty(url.as_str())
            .map_err(|e| ReaderError::fetch(format!("chapter {} content", chapter.id), e))?;
        chapter.content = decode_chapter_payload(&body, chapter.id)?;
    }
    Ok(())
}
