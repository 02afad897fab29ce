//! In-memory transport for tests. Unknown URLs answer HTTP 404.
//! Also an XML well-formedness check for serialized chapter bodies.

use super::client::{Fetch, Fetched};
use super::error::FetchError;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub(crate) struct StubFetch {
    pages: HashMap<String, String>,
    posts: HashMap<String, Vec<u8>>,
    assets: HashMap<String, Fetched>,
    /// Every request made, as (method, url).
    pub requests: Vec<(&'static str, String)>,
}

impl StubFetch {
    pub fn page(mut self, url: &str, html: &str) -> Self {
        self.pages.insert(url.to_string(), html.to_string());
        self
    }

    pub fn post(mut self, url: &str, body: &[u8]) -> Self {
        self.posts.insert(url.to_string(), body.to_vec());
        self
    }

    pub fn asset(mut self, url: &str, data: &[u8], content_type: Option<&str>) -> Self {
        self.assets.insert(
            url.to_string(),
            Fetched {
                data: data.to_vec(),
                content_type: content_type.map(String::from),
            },
        );
        self
    }

    pub fn count(&self, method: &str) -> usize {
        self.requests.iter().filter(|(m, _)| *m == method).count()
    }
}

fn not_found(url: &str) -> FetchError {
    FetchError::HttpStatus {
        status: 404,
        url: url.to_string(),
    }
}

impl Fetch for StubFetch {
    fn get_text(&mut self, url: &str) -> Result<String, FetchError> {
        self.requests.push(("GET", url.to_string()));
        self.pages.get(url).cloned().ok_or_else(|| not_found(url))
    }

    fn post_empty(&mut self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.requests.push(("POST", url.to_string()));
        self.posts.get(url).cloned().ok_or_else(|| not_found(url))
    }

    fn get_bytes(&mut self, url: &str) -> Result<Fetched, FetchError> {
        self.requests.push(("GET", url.to_string()));
        self.assets.get(url).cloned().ok_or_else(|| not_found(url))
    }
}

/// Panics unless `body` parses as XML once wrapped in a single root element.
pub fn assert_well_formed(body: &str) {
    use quick_xml::events::Event;

    let wrapped = format!("<body>{}</body>", body);
    let mut reader = quick_xml::Reader::from_str(&wrapped);
    loop {
        match reader.read_event() {
            Ok(Event::Eof) => break,
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                for attr in e.attributes() {
                    if let Err(err) = attr {
                        panic!("bad attribute in {:?}: {}", body, err);
                    }
                }
            }
            Ok(_) => {}
            Err(err) => panic!(
                "not well-formed at {}: {}\n{}",
                reader.buffer_position(),
                err,
                body
            ),
        }
    }
    assert!(!body.contains("&nbsp;"), "HTML entity left in {:?}", body);
}
