//! EPUB writer. Images and sections are registered incrementally through [DocumentBuilder];
//! [EpubBuilder::write] then emits EPUB 3 or EPUB 2 (mimetype, container, OPF, nav/NCX,
//! cover page, chapters, images).

pub mod xhtml;

pub use xhtml::fragment_to_xhtml;

use crate::ellu::{Fetch, FetchError};
use std::collections::HashMap;
use std::io::{Seek, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

const CONTAINER_XML: &[u8] = b"<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<container version=\"1.0\" xmlns=\"urn:oasis:names:tc:opendocument:xmlns:container\">\n  <rootfiles>\n    <rootfile full-path=\"OEBPS/content.opf\" media-type=\"application/oebps-package+xml\"/>\n  </rootfiles>\n</container>";

const MIMETYPE: &[u8] = b"application/epub+zip";
const OEBPS_PREFIX: &str = "OEBPS/";
const IMAGE_DIR: &str = "images/";
const DEFAULT_IDENTIFIER: &str = "urn:ellu-dl:book";
const DEFAULT_LANGUAGE: &str = "en";

/// What the asset rewriter needs from the output document.
pub trait DocumentBuilder {
    /// Register a remote image and return its package-local handle (a relative href).
    fn add_image(&mut self, url: &str) -> Result<String, EpubError>;

    /// Mark a registered image as the cover.
    fn set_cover(&mut self, handle: &str) -> Result<(), EpubError>;

    /// Append a section (one chapter file) after the existing ones.
    fn add_section(&mut self, title: &str, body: &str) -> Result<(), EpubError>;
}

/// EPUB format version.
///
/// Default is EPUB 3 (OPF 3.0, nav.xhtml, HTML5 chapters). Use `Epub2` for legacy readers (OPF 2.0, NCX, XHTML 1.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpubVersion {
    Epub3,
    Epub2,
}

/// Layout options for [EpubBuilder::write].
#[derive(Debug, Clone, Copy)]
pub struct EpubOptions {
    pub version: EpubVersion,
    /// Include toc.ncx in EPUB 3 for legacy readers. EPUB 2 always has it.
    pub include_ncx: bool,
    /// Insert a visible table-of-contents page before the chapters.
    pub include_toc_page: bool,
}

impl Default for EpubOptions {
    fn default() -> Self {
        Self {
            version: EpubVersion::Epub3,
            include_ncx: false,
            include_toc_page: true,
        }
    }
}

/// Errors from the EPUB builder. Maps to CLI exit code 3 when raised by `write`.
#[derive(Debug, Error)]
pub enum EpubError {
    #[error("Cannot write EPUB: book title is empty.")]
    EmptyTitle,

    #[error("Cannot write EPUB: book has no sections.")]
    NoSections,

    #[error("no registered image with handle {handle}")]
    UnknownResource { handle: String },

    #[error("could not fetch image {url}")]
    ImageFetch {
        url: String,
        #[source]
        source: FetchError,
    },

    #[error("Failed to create EPUB file: {path}")]
    CreateFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write EPUB archive")]
    Zip(#[from] zip::result::ZipError),
}

impl From<std::io::Error> for EpubError {
    fn from(e: std::io::Error) -> Self {
        EpubError::Zip(zip::result::ZipError::Io(e))
    }
}

#[derive(Debug)]
struct Image {
    id: String,
    href: String,
    media_type: &'static str,
    data: Vec<u8>,
}

#[derive(Debug)]
struct Section {
    title: String,
    body: String,
}

/// In-memory EPUB. Images are fetched when registered, so a failed fetch surfaces at
/// the chapter that references it; nothing touches the disk until [write](Self::write).
pub struct EpubBuilder<'a> {
    fetcher: &'a mut dyn Fetch,
    title: String,
    author: String,
    identifier: String,
    language: String,
    images: Vec<Image>,
    image_by_url: HashMap<String, usize>,
    cover: Option<usize>,
    sections: Vec<Section>,
}

impl<'a> EpubBuilder<'a> {
    pub fn new(fetcher: &'a mut dyn Fetch) -> Self {
        Self {
            fetcher,
            title: String::new(),
            author: String::new(),
            identifier: String::new(),
            language: DEFAULT_LANGUAGE.to_string(),
            images: Vec::new(),
            image_by_url: HashMap::new(),
            cover: None,
            sections: Vec::new(),
        }
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
    }

    pub fn set_author(&mut self, author: impl Into<String>) {
        self.author = author.into();
    }

    pub fn set_identifier(&mut self, identifier: impl Into<String>) {
        self.identifier = identifier.into();
    }

    pub fn set_language(&mut self, language: impl Into<String>) {
        self.language = language.into();
    }

    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Write the EPUB to `path`. A failed write removes the partial file.
    pub fn write(&self, path: &Path, options: &EpubOptions) -> Result<(), EpubError> {
        if self.title.trim().is_empty() {
            return Err(EpubError::EmptyTitle);
        }
        if self.sections.is_empty() {
            return Err(EpubError::NoSections);
        }

        let file = std::fs::File::create(path).map_err(|e| EpubError::CreateFile {
            path: path.to_path_buf(),
            source: e,
        })?;
        let result = self.write_archive(file, options);
        if result.is_err() {
            let _ = std::fs::remove_file(path);
        }
        result
    }

    fn write_archive<W: Write + Seek>(
        &self,
        writer: W,
        options: &EpubOptions,
    ) -> Result<(), EpubError> {
        let mut zip = ZipWriter::new(writer);

        let options_stored = SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored)
            .unix_permissions(0o644);
        let options_deflate = SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated)
            .unix_permissions(0o644);

        // Mimetype first, uncompressed
        zip.start_file("mimetype", options_stored)?;
        zip.write_all(MIMETYPE)?;

        zip.start_file("META-INF/container.xml", options_deflate)?;
        zip.write_all(CONTAINER_XML)?;

        let include_ncx = options.version == EpubVersion::Epub2 || options.include_ncx;
        self.write_opf(options, include_ncx, &mut zip, options_deflate)?;
        if options.version == EpubVersion::Epub3 {
            self.write_nav_xhtml(&mut zip, options_deflate)?;
        }
        if include_ncx {
            self.write_ncx(&mut zip, options_deflate)?;
        }
        self.write_cover_xhtml(&mut zip, options_deflate)?;
        if options.include_toc_page {
            self.write_toc_page_xhtml(&mut zip, options_deflate)?;
        }
        self.write_chapters(options.version, &mut zip, options_deflate)?;

        // Images are already compressed
        for image in &self.images {
            zip.start_file(format!("{}{}", OEBPS_PREFIX, image.href), options_stored)?;
            zip.write_all(&image.data)?;
        }

        zip.finish()?;
        Ok(())
    }

    fn cover_image(&self) -> Option<&Image> {
        self.cover.and_then(|i| self.images.get(i))
    }

    fn identifier(&self) -> &str {
        if self.identifier.trim().is_empty() {
            DEFAULT_IDENTIFIER
        } else {
            &self.identifier
        }
    }

    fn write_opf(
        &self,
        options: &EpubOptions,
        include_ncx: bool,
        zip: &mut ZipWriter<impl Write + Seek>,
        file_options: SimpleFileOptions,
    ) -> Result<(), EpubError> {
        let epub3 = options.version == EpubVersion::Epub3;
        let cover = self.cover_image();

        let mut manifest = String::new();
        if epub3 {
            manifest.push_str(
                "    <item id=\"nav\" href=\"nav.xhtml\" media-type=\"application/xhtml+xml\" properties=\"nav\"/>\n",
            );
        }
        if include_ncx {
            manifest.push_str(
                "    <item id=\"ncx\" href=\"toc.ncx\" media-type=\"application/x-dtbncx+xml\"/>\n",
            );
        }
        if cover.is_some() {
            manifest.push_str(
                "    <item id=\"cover\" href=\"cover.xhtml\" media-type=\"application/xhtml+xml\"/>\n",
            );
        }
        if options.include_toc_page {
            manifest.push_str(
                "    <item id=\"toc-page\" href=\"toc.xhtml\" media-type=\"application/xhtml+xml\"/>\n",
            );
        }
        for (i, _) in self.sections.iter().enumerate() {
            manifest.push_str(&format!(
                "    <item id=\"chapter-{n}\" href=\"chapter-{n}.xhtml\" media-type=\"application/xhtml+xml\"/>\n",
                n = i + 1
            ));
        }
        for image in &self.images {
            let is_cover = cover.map(|c| c.id == image.id).unwrap_or(false);
            let properties = if epub3 && is_cover {
                " properties=\"cover-image\""
            } else {
                ""
            };
            manifest.push_str(&format!(
                "    <item id=\"{}\" href=\"{}\" media-type=\"{}\"{}/>\n",
                image.id, image.href, image.media_type, properties
            ));
        }

        // Spine: cover, optional toc page, then chapters. Nav is not in the spine.
        let mut spine = String::new();
        if cover.is_some() {
            spine.push_str("    <itemref idref=\"cover\"/>\n");
        }
        if options.include_toc_page {
            spine.push_str("    <itemref idref=\"toc-page\"/>\n");
        }
        for (i, _) in self.sections.iter().enumerate() {
            spine.push_str(&format!("    <itemref idref=\"chapter-{}\"/>\n", i + 1));
        }

        let mut metadata = format!(
            "    <dc:identifier id=\"book-id\">{}</dc:identifier>\n    <dc:title>{}</dc:title>\n    <dc:language>{}</dc:language>\n",
            xml_escape(self.identifier()),
            xml_escape(&self.title),
            xml_escape(&self.language)
        );
        if !self.author.trim().is_empty() {
            metadata.push_str(&format!(
                "    <dc:creator>{}</dc:creator>\n",
                xml_escape(&self.author)
            ));
        }
        if let Some(c) = cover.filter(|_| !epub3) {
            metadata.push_str(&format!("    <meta name=\"cover\" content=\"{}\"/>\n", c.id));
        }

        let spine_open = if include_ncx {
            "<spine toc=\"ncx\">"
        } else {
            "<spine>"
        };
        let guide = if cover.is_some() {
            "  <guide>\n    <reference type=\"cover\" href=\"cover.xhtml\" title=\"Cover\"/>\n  </guide>\n"
        } else {
            ""
        };

        let opf = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" unique-identifier="book-id" version="{version}">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
{metadata}  </metadata>
  <manifest>
{manifest}  </manifest>
  {spine_open}
{spine}  </spine>
{guide}</package>
"#,
            version = if epub3 { "3.0" } else { "2.0" },
            metadata = metadata,
            manifest = manifest,
            spine_open = spine_open,
            spine = spine,
            guide = guide
        );

        zip.start_file(format!("{}content.opf", OEBPS_PREFIX), file_options)?;
        zip.write_all(opf.as_bytes())?;
        Ok(())
    }

    fn toc_items(&self) -> String {
        let mut items = String::new();
        for (i, section) in self.sections.iter().enumerate() {
            items.push_str(&format!(
                "    <li><a href=\"chapter-{}.xhtml\">{}</a></li>\n",
                i + 1,
                html_escape_attr(&section.title)
            ));
        }
        items
    }

    fn write_nav_xhtml(
        &self,
        zip: &mut ZipWriter<impl Write + Seek>,
        options: SimpleFileOptions,
    ) -> Result<(), EpubError> {
        let nav = format!(
            r#"<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops">
<head>
  <meta charset="UTF-8"/>
  <title>Table of Contents</title>
</head>
<body>
  <nav epub:type="toc">
    <h1>Contents</h1>
    <ol>
{}
    </ol>
  </nav>
</body>
</html>
"#,
            self.toc_items()
        );
        zip.start_file(format!("{}nav.xhtml", OEBPS_PREFIX), options)?;
        zip.write_all(nav.as_bytes())?;
        Ok(())
    }

    /// Visible table-of-contents page (toc.xhtml), placed after the cover.
    fn write_toc_page_xhtml(
        &self,
        zip: &mut ZipWriter<impl Write + Seek>,
        options: SimpleFileOptions,
    ) -> Result<(), EpubError> {
        let toc_xhtml = format!(
            r#"<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml">
<head>
  <meta charset="UTF-8"/>
  <title>Table of Contents</title>
</head>
<body>
  <h1>Table of Contents</h1>
  <ol>
{}
  </ol>
</body>
</html>
"#,
            self.toc_items()
        );
        zip.start_file(format!("{}toc.xhtml", OEBPS_PREFIX), options)?;
        zip.write_all(toc_xhtml.as_bytes())?;
        Ok(())
    }

    fn write_ncx(
        &self,
        zip: &mut ZipWriter<impl Write + Seek>,
        options: SimpleFileOptions,
    ) -> Result<(), EpubError> {
        let mut nav_points = String::new();
        for (i, section) in self.sections.iter().enumerate() {
            nav_points.push_str(&format!(
                r#"    <navPoint id="navpoint-{n}" playOrder="{n}">
      <navLabel><text>{label}</text></navLabel>
      <content src="chapter-{n}.xhtml"/>
    </navPoint>
"#,
                n = i + 1,
                label = xml_escape(&section.title)
            ));
        }
        let ncx = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <head>
    <meta name="dtb:uid" content="{}"/>
  </head>
  <docTitle>
    <text>{}</text>
  </docTitle>
  <navMap>
{}
  </navMap>
</ncx>
"#,
            xml_escape(self.identifier()),
            xml_escape(&self.title),
            nav_points
        );
        zip.start_file(format!("{}toc.ncx", OEBPS_PREFIX), options)?;
        zip.write_all(ncx.as_bytes())?;
        Ok(())
    }

    fn write_cover_xhtml(
        &self,
        zip: &mut ZipWriter<impl Write + Seek>,
        options: SimpleFileOptions,
    ) -> Result<(), EpubError> {
        let Some(image) = self.cover_image() else {
            return Ok(());
        };
        let cover_xhtml = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml">
<head>
  <meta charset="UTF-8"/>
  <title>Cover</title>
</head>
<body>
  <div style="text-align: center;">
    <img src="{}" alt="Cover" style="max-width: 100%; height: auto;"/>
  </div>
</body>
</html>
"#,
            image.href
        );
        zip.start_file(format!("{}cover.xhtml", OEBPS_PREFIX), options)?;
        zip.write_all(cover_xhtml.as_bytes())?;
        Ok(())
    }

    fn write_chapters(
        &self,
        version: EpubVersion,
        zip: &mut ZipWriter<impl Write + Seek>,
        options: SimpleFileOptions,
    ) -> Result<(), EpubError> {
        let preamble = match version {
            EpubVersion::Epub3 => "<!DOCTYPE html>",
            EpubVersion::Epub2 => {
                "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<!DOCTYPE html PUBLIC \"-//W3C//DTD XHTML 1.1//EN\" \"http://www.w3.org/TR/xhtml11/DTD/xhtml11.dtd\">"
            }
        };
        for (i, section) in self.sections.iter().enumerate() {
            let html = format!(
                r#"{}
<html xmlns="http://www.w3.org/1999/xhtml">
<head>
  <meta charset="UTF-8"/>
  <title>{}</title>
</head>
<body>
{}
</body>
</html>
"#,
                preamble,
                xml_escape(&section.title),
                section.body
            );
            zip.start_file(format!("{}chapter-{}.xhtml", OEBPS_PREFIX, i + 1), options)?;
            zip.write_all(html.as_bytes())?;
        }
        Ok(())
    }
}

impl DocumentBuilder for EpubBuilder<'_> {
    fn add_image(&mut self, url: &str) -> Result<String, EpubError> {
        if let Some(&i) = self.image_by_url.get(url) {
            return Ok(self.images[i].href.clone());
        }
        let fetched = self
            .fetcher
            .get_bytes(url)
            .map_err(|e| EpubError::ImageFetch {
                url: url.to_string(),
                source: e,
            })?;
        let (media_type, ext) = image_media_type(fetched.content_type.as_deref(), url);
        let n = self.images.len() + 1;
        let image = Image {
            id: format!("image-{}", n),
            href: format!("{}image-{}.{}", IMAGE_DIR, n, ext),
            media_type,
            data: fetched.data,
        };
        let href = image.href.clone();
        self.image_by_url.insert(url.to_string(), self.images.len());
        self.images.push(image);
        Ok(href)
    }

    fn set_cover(&mut self, handle: &str) -> Result<(), EpubError> {
        let index = self
            .images
            .iter()
            .position(|image| image.href == handle)
            .ok_or_else(|| EpubError::UnknownResource {
                handle: handle.to_string(),
            })?;
        self.cover = Some(index);
        Ok(())
    }

    fn add_section(&mut self, title: &str, body: &str) -> Result<(), EpubError> {
        self.sections.push(Section {
            title: title.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}

/// Media type and file extension from the Content-Type header, else the URL extension.
/// Unknown types are stored as PNG.
fn image_media_type(content_type: Option<&str>, url: &str) -> (&'static str, &'static str) {
    let from_name = |s: &str| -> Option<(&'static str, &'static str)> {
        let s = s.to_ascii_lowercase();
        if s.contains("jpeg") || s.contains("jpg") {
            Some(("image/jpeg", "jpg"))
        } else if s.contains("png") {
            Some(("image/png", "png"))
        } else if s.contains("gif") {
            Some(("image/gif", "gif"))
        } else if s.contains("webp") {
            Some(("image/webp", "webp"))
        } else if s.contains("svg") {
            Some(("image/svg+xml", "svg"))
        } else {
            None
        }
    };
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let ext = path.rsplit('/').next().and_then(|name| name.rsplit_once('.'));
    content_type
        .and_then(from_name)
        .or_else(|| ext.and_then(|(_, e)| from_name(e)))
        .unwrap_or(("image/png", "png"))
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

fn html_escape_attr(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
