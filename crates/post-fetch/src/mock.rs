//! Mock HTTP client for testing.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::{FetchError, HttpClient, HttpResponse};

/// In-memory [`HttpClient`] that records every request.
///
/// Unknown URLs answer `404`.
///
/// # Example
///
/// ```ignore
/// use post_fetch::{HttpClient, MockHttpClient};
///
/// let client = MockHttpClient::new()
///     .with_module("https://esm.sh/react@17.0.1", "export default {};");
///
/// let response = client.get("https://esm.sh/react@17.0.1").unwrap();
/// assert_eq!(client.request_count("https://esm.sh/react@17.0.1"), 1);
/// ```
#[derive(Debug, Default)]
pub struct MockHttpClient {
    responses: RwLock<HashMap<String, HttpResponse>>,
    requests: RwLock<Vec<String>>,
}

impl MockHttpClient {
    /// Create a client with no responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` as JavaScript at `url`.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn with_module(self, url: &str, body: &str) -> Self {
        self.set_response(
            url,
            HttpResponse {
                status: 200,
                content_type: Some("application/javascript".to_owned()),
                body: body.as_bytes().to_vec(),
            },
        );
        self
    }

    /// Serve an arbitrary response at `url`.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn with_response(self, url: &str, response: HttpResponse) -> Self {
        self.set_response(url, response);
        self
    }

    /// Replace the response served at `url`.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn set_response(&self, url: &str, response: HttpResponse) {
        self.responses
            .write()
            .unwrap()
            .insert(url.to_owned(), response);
    }

    /// Number of requests issued for `url`.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn request_count(&self, url: &str) -> usize {
        self.requests
            .read()
            .unwrap()
            .iter()
            .filter(|requested| *requested == url)
            .count()
    }

    /// Number of requests issued overall.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn total_requests(&self) -> usize {
        self.requests.read().unwrap().len()
    }
}

impl HttpClient for MockHttpClient {
    fn get(&self, url: &str) -> Result<HttpResponse, FetchError> {
        self.requests.write().unwrap().push(url.to_owned());
        let response = self.responses.read().unwrap().get(url).cloned();
        Ok(response.unwrap_or(HttpResponse {
            status: 404,
            content_type: None,
            body: b"Not Found".to_vec(),
        }))
    }
}
