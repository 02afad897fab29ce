//! Blocking HTTP client with a session cookie, a per-request timeout, and an optional
//! delay between requests. No retries: the first failure is returned to the caller.

use super::error::FetchError;
use reqwest::cookie::Jar;
use reqwest::Url;
use std::sync::Arc;
use std::time::{Duration, Instant};

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_DELAY_SECS: u64 = 1;
const MAX_REDIRECTS: usize = 10;

/// Name of the reader's session cookie.
pub const SESSION_COOKIE: &str = "sid";

/// Raw response body plus its declared content type.
#[derive(Debug, Clone, Default)]
pub struct Fetched {
    pub data: Vec<u8>,
    pub content_type: Option<String>,
}

/// Transport used by every stage. Implementations return `FetchError::HttpStatus`
/// for non-2xx responses.
pub trait Fetch {
    /// GET a page and return its body as text.
    fn get_text(&mut self, url: &str) -> Result<String, FetchError>;

    /// POST with an empty body and return the raw response body.
    fn post_empty(&mut self, url: &str) -> Result<Vec<u8>, FetchError>;

    /// GET a binary resource (image) with its content type.
    fn get_bytes(&mut self, url: &str) -> Result<Fetched, FetchError>;
}

/// Blocking HTTP client that enforces a delay between requests.
#[derive(Debug)]
pub struct PoliteClient {
    inner: reqwest::blocking::Client,
    delay: Duration,
    last_request: Option<Instant>,
}

impl PoliteClient {
    /// Build a client with default User-Agent, timeout, and delay and no cookie.
    pub fn new() -> Result<Self, FetchError> {
        Self::builder().build()
    }

    pub fn builder() -> PoliteClientBuilder {
        PoliteClientBuilder::default()
    }

    fn send(
        &mut self,
        request: reqwest::blocking::RequestBuilder,
        url: &str,
    ) -> Result<reqwest::blocking::Response, FetchError> {
        self.wait_delay();
        let result = request.send();
        self.last_request = Some(Instant::now());
        let response = result.map_err(|e| FetchError::Network {
            url: url.to_string(),
            source: e,
        })?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response)
    }

    fn wait_delay(&mut self) {
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.delay {
                std::thread::sleep(self.delay - elapsed);
            }
        }
    }
}

impl Fetch for PoliteClient {
    fn get_text(&mut self, url: &str) -> Result<String, FetchError> {
        let request = self.inner.get(url);
        let response = self.send(request, url)?;
        response.text().map_err(|e| FetchError::BodyRead {
            url: url.to_string(),
            source: e,
        })
    }

    fn post_empty(&mut self, url: &str) -> Result<Vec<u8>, FetchError> {
        let request = self.inner.post(url);
        let response = self.send(request, url)?;
        response
            .bytes()
            .map(|b| b.to_vec())
            .map_err(|e| FetchError::BodyRead {
                url: url.to_string(),
                source: e,
            })
    }

    fn get_bytes(&mut self, url: &str) -> Result<Fetched, FetchError> {
        let request = self.inner.get(url);
        let response = self.send(request, url)?;
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let data = response.bytes().map_err(|e| FetchError::BodyRead {
            url: url.to_string(),
            source: e,
        })?;
        Ok(Fetched {
            data: data.to_vec(),
            content_type,
        })
    }
}

/// Builder for PoliteClient with optional User-Agent, delay, timeout, and session cookie.
#[derive(Debug)]
pub struct PoliteClientBuilder {
    user_agent: Option<String>,
    delay_secs: u64,
    timeout_secs: u64,
    cookies: Vec<(String, Url)>,
}

impl Default for PoliteClientBuilder {
    fn default() -> Self {
        Self {
            user_agent: None,
            delay_secs: DEFAULT_DELAY_SECS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            cookies: Vec::new(),
        }
    }
}

impl PoliteClientBuilder {
    /// Set a custom User-Agent. If not set, a browser-like default is used.
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    /// Set delay between requests in seconds. Default 1; 0 disables.
    pub fn delay_secs(mut self, secs: u64) -> Self {
        self.delay_secs = secs;
        self
    }

    /// Set request timeout in seconds. Default 30.
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Inject a cookie scoped to the host of `url`.
    pub fn cookie(mut self, name: &str, value: &str, url: &Url) -> Self {
        let header = match url.host_str() {
            Some(host) => format!("{}={}; Domain={}; Path=/", name, value, host),
            None => format!("{}={}; Path=/", name, value),
        };
        self.cookies.push((header, url.clone()));
        self
    }

    pub fn build(self) -> Result<PoliteClient, FetchError> {
        let user_agent = self
            .user_agent
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());
        let jar = Arc::new(Jar::default());
        for (header, url) in &self.cookies {
            jar.add_cookie_str(header, url);
        }
        let inner = reqwest::blocking::Client::builder()
            .cookie_provider(jar)
            .user_agent(user_agent)
            .timeout(Duration::from_secs(self.timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()
            .map_err(FetchError::Client)?;
        Ok(PoliteClient {
            inner,
            delay: Duration::from_secs(self.delay_secs),
            last_request: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_is_scoped_to_page_host() -> Result<(), Box<dyn std::error::Error>> {
        let url = Url::parse("https://ellu.example/books/123/slug")?;
        let builder = PoliteClient::builder().cookie(SESSION_COOKIE, "abc", &url);
        assert_eq!(builder.cookies.len(), 1);
        assert_eq!(builder.cookies[0].0, "sid=abc; Domain=ellu.example; Path=/");
        Ok(())
    }

    #[test]
    fn builder_defaults() {
        let builder = PoliteClientBuilder::default();
        assert_eq!(builder.timeout_secs, 30);
        assert_eq!(builder.delay_secs, 1);
        assert!(builder.user_agent.is_none());
        assert!(builder.cookies.is_empty());
    }

    #[test]
    fn builder_builds_with_cookie() -> Result<(), Box<dyn std::error::Error>> {
        let url = Url::parse("https://ellu.example/books/1")?;
        let client = PoliteClient::builder()
            .cookie(SESSION_COOKIE, "abc", &url)
            .delay_secs(0)
            .timeout_secs(5)
            .user_agent("test/1.0")
            .build()?;
        assert_eq!(client.delay, Duration::from_secs(0));
        assert!(client.last_request.is_none());
        Ok(())
    }
}
