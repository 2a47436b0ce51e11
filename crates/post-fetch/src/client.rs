//! HTTP client seam.

use std::time::Duration;

use ureq::Agent;

use crate::FetchError;

/// Default HTTP timeout in seconds.
const DEFAULT_TIMEOUT: u64 = 30;

/// Response to a GET request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// `Content-Type` header, if present.
    pub content_type: Option<String>,
    /// Response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Check for a 2xx status.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Blocking HTTP GET.
///
/// Non-success statuses are returned as responses, not errors; only transport
/// failures are errors.
pub trait HttpClient: Send + Sync {
    /// Fetch `url`.
    fn get(&self, url: &str) -> Result<HttpResponse, FetchError>;
}

/// [`HttpClient`] backed by a shared `ureq` agent.
pub struct UreqClient {
    agent: Agent,
    max_body: u64,
}

impl UreqClient {
    /// Create a client with the default 30 second timeout.
    ///
    /// Bodies larger than `max_body` bytes fail with [`FetchError::Transport`].
    #[must_use]
    pub fn new(max_body: u64) -> Self {
        Self::with_timeout(max_body, Duration::from_secs(DEFAULT_TIMEOUT))
    }

    /// Create a client with an explicit global timeout.
    #[must_use]
    pub fn with_timeout(max_body: u64, timeout: Duration) -> Self {
        let agent = Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build()
            .into();
        Self { agent, max_body }
    }
}

impl HttpClient for UreqClient {
    fn get(&self, url: &str) -> Result<HttpResponse, FetchError> {
        let transport = |source| FetchError::Transport {
            url: url.to_owned(),
            source,
        };

        let response = self.agent.get(url).call().map_err(transport)?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let body = response
            .into_body()
            .with_config()
            .limit(self.max_body)
            .read_to_vec()
            .map_err(transport)?;

        Ok(HttpResponse {
            status,
            content_type,
            body,
        })
    }
}
