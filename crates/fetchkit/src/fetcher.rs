//! Fetching bytes by URL.

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Maximum body size for downloads (1 GiB).
const MAX_BODY_SIZE: u64 = 1024 * 1024 * 1024;

/// Something that can fetch the bytes behind a URL.
pub trait Fetcher: Send + Sync {
    /// GET `url` and return the whole body.
    fn get(&self, url: &str) -> Result<Vec<u8>>;
}

/// Blocking HTTP(S) fetcher backed by a ureq agent.
pub struct HttpFetcher {
    agent: ureq::Agent,
    user_agent: String,
}

impl HttpFetcher {
    /// Create a fetcher with ureq's default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self {
            agent: ureq::Agent::new_with_defaults(),
            user_agent: concat!("settle/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }

    /// Create a fetcher whose requests give up after `timeout`.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build();
        Self {
            agent: config.into(),
            ..Self::new()
        }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Fetcher for HttpFetcher {
    fn get(&self, url: &str) -> Result<Vec<u8>> {
        log::debug!("GET {url}");
        let mut response = self
            .agent
            .get(url)
            .header("User-Agent", &self.user_agent)
            .call()
            .map_err(|e| Error::from_ureq(url, e))?;

        response
            .body_mut()
            .with_config()
            .limit(MAX_BODY_SIZE)
            .read_to_vec()
            .map_err(|e| Error::Body {
                url: url.to_string(),
                message: e.to_string(),
            })
    }
}

/// In-memory fetcher for tests.
///
/// Clones share state. Unknown URLs answer 404.
#[derive(Debug, Clone, Default)]
pub struct MockFetcher {
    state: Arc<Mutex<MockState>>,
}

#[derive(Debug, Default)]
struct MockState {
    responses: HashMap<String, Vec<u8>>,
    requests: Vec<String>,
}

impl MockFetcher {
    /// Create an empty mock.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Serve `body` for `url`.
    pub fn with_response(self, url: &str, body: impl Into<Vec<u8>>) -> Self {
        self.set_response(url, body);
        self
    }

    /// Replace the body served for `url`.
    pub fn set_response(&self, url: &str, body: impl Into<Vec<u8>>) {
        self.state().responses.insert(url.to_string(), body.into());
    }

    /// Every URL requested so far, in order.
    pub fn requests(&self) -> Vec<String> {
        self.state().requests.clone()
    }

    /// Number of requests made so far.
    pub fn request_count(&self) -> usize {
        self.state().requests.len()
    }
}

impl Fetcher for MockFetcher {
    fn get(&self, url: &str) -> Result<Vec<u8>> {
        let mut state = self.state();
        state.requests.push(url.to_string());
        state.responses.get(url).cloned().ok_or_else(|| Error::Http {
            url: url.to_string(),
            message: "HTTP 404".to_string(),
            status: Some(404),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_serves_registered_body() {
        let mock = MockFetcher::new().with_response("http://example.com/a", "hello");
        assert_eq!(mock.get("http://example.com/a").unwrap(), b"hello");
        assert_eq!(mock.request_count(), 1);
    }

    #[test]
    fn test_mock_unknown_url_is_404() {
        let mock = MockFetcher::new();
        let err = mock.get("http://example.com/missing").unwrap_err();
        assert_eq!(err.status(), Some(404));
        assert_eq!(mock.requests(), vec!["http://example.com/missing"]);
    }

    #[test]
    fn test_mock_clones_share_state() {
        let mock = MockFetcher::new();
        let handle = mock.clone();
        mock.set_response("u", vec![1, 2, 3]);
        assert_eq!(handle.get("u").unwrap(), vec![1, 2, 3]);
        assert_eq!(mock.request_count(), 1);
    }

    #[test]
    fn test_fetcher_is_object_safe() {
        let fetcher: Box<dyn Fetcher> = Box::new(MockFetcher::new().with_response("u", "x"));
        assert_eq!(fetcher.get("u").unwrap(), b"x");
    }
}
