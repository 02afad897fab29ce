//! Rewrites `/static/...` references in chapter HTML to package-local image handles and
//! appends the chapters to the document as ordered sections.
//!
//! Every attribute of every element is checked, not only `src`/`href`: the reader also
//! puts asset paths in attributes such as `data-src`.

use super::error::ReaderError;
use crate::epub::{fragment_to_xhtml, DocumentBuilder};
use crate::model::{Book, Chapter};
use reqwest::Url;
use scraper::{Html, Node};

/// Attribute values starting with this prefix are fetchable images.
pub const STATIC_ASSET_PREFIX: &str = "/static/";

/// Chapter whose first image becomes the cover.
pub const COVER_CHAPTER_ID: u32 = 0;

/// Rewrite asset references in one chapter's HTML.
///
/// Returns the fragment re-serialized as XHTML and the handle of the first rewritten
/// reference, in document and attribute order. Handles never start with [STATIC_ASSET_PREFIX], so rewriting
/// already-rewritten HTML registers nothing and leaves the markup unchanged.
pub fn rewrite_chapter_html(
    html: &str,
    chapter_id: u32,
    origin: &Url,
    builder: &mut dyn DocumentBuilder,
) -> Result<(String, Option<String>), ReaderError> {
    let mut fragment = Html::parse_fragment(html);
    let node_ids: Vec<_> = fragment.tree.root().descendants().map(|n| n.id()).collect();

    let mut first_handle: Option<String> = None;
    for node_id in node_ids {
        let Some(mut node) = fragment.tree.get_mut(node_id) else {
            continue;
        };
        let Node::Element(element) = node.value() else {
            continue;
        };
        for (_, value) in element.attrs.iter_mut() {
            if !value.starts_with(STATIC_ASSET_PREFIX) {
                continue;
            }
            let reference = value.to_string();
            let url = origin
                .join(&reference)
                .map_err(|e| ReaderError::InvalidUrl {
                    input: reference.clone(),
                    reason: format!("chapter {}: {}", chapter_id, e),
                })?;
            let handle =
                builder
                    .add_image(url.as_str())
                    .map_err(|e| ReaderError::ResourceFetch {
                        chapter: chapter_id,
                        url: url.to_string(),
                        source: e,
                    })?;
            *value = handle.as_str().into();
            if first_handle.is_none() {
                first_handle = Some(handle);
            }
        }
    }

    Ok((fragment_to_xhtml(&fragment), first_handle))
}

/// Rewrite one chapter in place. Designates the cover when `designate_cover` is set and
/// the chapter references at least one asset; returns whether it did.
pub fn rewrite_chapter(
    chapter: &mut Chapter,
    origin: &Url,
    builder: &mut dyn DocumentBuilder,
    designate_cover: bool,
) -> Result<bool, ReaderError> {
    let (html, first_handle) = rewrite_chapter_html(&chapter.content, chapter.id, origin, builder)?;
    chapter.content = html;
    match first_handle {
        Some(handle) if designate_cover => {
            builder
                .set_cover(&handle)
                .map_err(|e| ReaderError::Assembly {
                    chapter: chapter.id,
                    source: e,
                })?;
            Ok(true)
        }
        _ => Ok(false),
    }
}

/// Rewrite every chapter, then append each as a section in manifest order.
///
/// The first asset of chapter 0 becomes the cover; at most one cover is designated.
pub fn assemble(
    book: &mut Book,
    origin: &Url,
    builder: &mut dyn DocumentBuilder,
) -> Result<(), ReaderError> {
    let mut cover_set = false;
    for chapter in book.chapters.iter_mut() {
        let designate = !cover_set && chapter.id == COVER_CHAPTER_ID;
        if rewrite_chapter(chapter, origin, builder, designate)? {
            cover_set = true;
        }
    }

    for chapter in &book.chapters {
        builder
            .add_section(&chapter.title, &chapter.content)
            .map_err(|e| ReaderError::Assembly {
                chapter: chapter.id,
                source: e,
            })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::epub::EpubError;

    /// Records builder calls; handles are `images/<n>.png`.
    #[derive(Default)]
    struct RecordingBuilder {
        images: Vec<String>,
        covers: Vec<String>,
        sections: Vec<(String, String)>,
        fail_image: Option<String>,
        reject_sections: bool,
    }

    impl DocumentBuilder for RecordingBuilder {
        fn add_image(&mut self, url: &str) -> Result<String, EpubError> {
            if self.fail_image.as_deref() == Some(url) {
                return Err(EpubError::UnknownResource {
                    handle: url.to_string(),
                });
            }
            self.images.push(url.to_string());
            Ok(format!("images/{}.png", self.images.len()))
        }

        fn set_cover(&mut self, handle: &str) -> Result<(), EpubError> {
            self.covers.push(handle.to_string());
            Ok(())
        }

        fn add_section(&mut self, title: &str, body: &str) -> Result<(), EpubError> {
            if self.reject_sections {
                return Err(EpubError::NoSections);
            }
            self.sections.push((title.to_string(), body.to_string()));
            Ok(())
        }
    }

    fn origin() -> Url {
        Url::parse("https://example.com").expect("origin")
    }

    fn chapter(id: u32, title: &str, content: &str) -> Chapter {
        Chapter {
            id,
            title: title.to_string(),
            content: content.to_string(),
        }
    }

    #[test]
    fn rewrites_static_references_in_any_attribute() -> Result<(), ReaderError> {
        let mut builder = RecordingBuilder::default();
        let html = r#"<p>Text</p><img src="/static/img/a.png" alt="/other/x"><div data-bg="/static/b.jpg?v=2"></div><a href="https://elsewhere/static/c.png">c</a>"#;
        let (out, first) = rewrite_chapter_html(html, 4, &origin(), &mut builder)?;
        assert_eq!(
            builder.images,
            vec![
                "https://example.com/static/img/a.png".to_string(),
                "https://example.com/static/b.jpg?v=2".to_string(),
            ]
        );
        assert_eq!(first.as_deref(), Some("images/1.png"));
        assert!(out.contains(r#"src="images/1.png""#));
        assert!(out.contains(r#"data-bg="images/2.png""#));
        assert!(out.contains(r#"alt="/other/x""#));
        assert!(out.contains(r#"href="https://elsewhere/static/c.png""#));
        assert!(!out.contains("<html"));
        assert!(!out.contains("<body"));
        Ok(())
    }

    #[test]
    fn rewriting_is_a_fixed_point() -> Result<(), ReaderError> {
        let mut builder = RecordingBuilder::default();
        let html = r#"<figure><img src="/static/a.png"><figcaption>A</figcaption></figure>"#;
        let (once, _) = rewrite_chapter_html(html, 1, &origin(), &mut builder)?;
        let (twice, first) = rewrite_chapter_html(&once, 1, &origin(), &mut builder)?;
        assert_eq!(once, twice);
        assert_eq!(first, None);
        assert_eq!(builder.images.len(), 1);
        Ok(())
    }

    #[test]
    fn attribute_order_is_stable_across_rewrites() -> Result<(), ReaderError> {
        let mut builder = RecordingBuilder::default();
        let html = r#"<img alt="a" class="c" id="i" title="t" width="1" height="2" data-x="x" src="/static/a.png" data-full="/static/a-full.png">"#;
        let (once, first) = rewrite_chapter_html(html, 0, &origin(), &mut builder)?;
        assert_eq!(
            once,
            r#"<img alt="a" class="c" id="i" title="t" width="1" height="2" data-x="x" src="images/1.png" data-full="images/2.png"/>"#
        );
        assert_eq!(first.as_deref(), Some("images/1.png"));
        assert_eq!(
            builder.images,
            vec![
                "https://example.com/static/a.png".to_string(),
                "https://example.com/static/a-full.png".to_string(),
            ]
        );

        let (twice, again) = rewrite_chapter_html(&once, 0, &origin(), &mut builder)?;
        assert_eq!(twice, once);
        assert!(again.is_none());
        Ok(())
    }

    #[test]
    fn rewritten_body_is_well_formed_xhtml() -> Result<(), ReaderError> {
        let mut builder = RecordingBuilder::default();
        let html = "<p>a<br>b&nbsp;c</p><img src=\"/static/a.png\"><hr><p>x &amp; y<em>open";
        let (out, _) = rewrite_chapter_html(html, 1, &origin(), &mut builder)?;
        assert_eq!(
            out,
            "<p>a<br/>b\u{a0}c</p><img src=\"images/1.png\"/><hr/><p>x &amp; y<em>open</em></p>"
        );
        crate::ellu::testing::assert_well_formed(&out);
        Ok(())
    }

    #[test]
    fn content_without_assets_is_preserved() -> Result<(), ReaderError> {
        let mut builder = RecordingBuilder::default();
        let html = "<h2>Pealkiri</h2><p>Üks <em>kaks</em></p>";
        let (out, first) = rewrite_chapter_html(html, 1, &origin(), &mut builder)?;
        assert_eq!(out, html);
        assert!(first.is_none());
        Ok(())
    }

    #[test]
    fn resource_failure_names_chapter() {
        let mut builder = RecordingBuilder {
            fail_image: Some("https://example.com/static/missing.png".to_string()),
            ..Default::default()
        };
        let result = rewrite_chapter_html(
            r#"<img src="/static/missing.png">"#,
            3,
            &origin(),
            &mut builder,
        );
        match result {
            Err(ReaderError::ResourceFetch { chapter, url, .. }) => {
                assert_eq!(chapter, 3);
                assert_eq!(url, "https://example.com/static/missing.png");
            }
            other => panic!("expected ResourceFetch, got {:?}", other),
        }
    }

    #[test]
    fn cover_is_first_image_of_chapter_zero_only_once() -> Result<(), ReaderError> {
        let mut builder = RecordingBuilder::default();
        let mut book = Book {
            chapters: vec![
                chapter(0, "Kaas", r#"<img src="/static/cover.jpg"><img src="/static/logo.png">"#),
                chapter(1, "Esimene", r#"<p><img src="/static/fig1.png"></p>"#),
            ],
            ..Default::default()
        };
        assemble(&mut book, &origin(), &mut builder)?;
        assert_eq!(builder.covers, vec!["images/1.png".to_string()]);
        assert_eq!(builder.images.len(), 3);
        Ok(())
    }

    #[test]
    fn no_cover_without_chapter_zero() -> Result<(), ReaderError> {
        let mut builder = RecordingBuilder::default();
        let mut book = Book {
            chapters: vec![chapter(1, "One", r#"<img src="/static/a.png">"#)],
            ..Default::default()
        };
        assemble(&mut book, &origin(), &mut builder)?;
        assert!(builder.covers.is_empty());
        Ok(())
    }

    #[test]
    fn chapter_zero_without_assets_sets_no_cover() -> Result<(), ReaderError> {
        let mut builder = RecordingBuilder::default();
        let mut book = Book {
            chapters: vec![
                chapter(0, "Intro", "<p>No images</p>"),
                chapter(1, "One", r#"<img src="/static/a.png">"#),
            ],
            ..Default::default()
        };
        assemble(&mut book, &origin(), &mut builder)?;
        assert!(builder.covers.is_empty());
        Ok(())
    }

    #[test]
    fn sections_follow_manifest_order_with_rewritten_bodies() -> Result<(), ReaderError> {
        let mut builder = RecordingBuilder::default();
        let mut book = Book {
            chapters: vec![
                chapter(2, "Two", r#"<img src="/static/two.png">"#),
                chapter(0, "Zero", "<p>z</p>"),
                chapter(1, "One", "<p>o</p>"),
            ],
            ..Default::default()
        };
        assemble(&mut book, &origin(), &mut builder)?;
        let titles: Vec<&str> = builder.sections.iter().map(|(t, _)| t.as_str()).collect();
        assert_eq!(titles, vec!["Two", "Zero", "One"]);
        assert_eq!(builder.sections[0].1, r#"<img src="images/1.png"/>"#);
        assert_eq!(book.chapters[0].content, r#"<img src="images/1.png"/>"#);
        Ok(())
    }

    #[test]
    fn rejected_section_is_assembly_error() {
        let mut builder = RecordingBuilder {
            reject_sections: true,
            ..Default::default()
        };
        let mut book = Book {
            chapters: vec![chapter(7, "Seven", "<p>x</p>")],
            ..Default::default()
        };
        let result = assemble(&mut book, &origin(), &mut builder);
        assert!(matches!(
            result,
            Err(ReaderError::Assembly { chapter: 7, .. })
        ));
    }
}
