//! JSON requests against OpenAI-compatible HTTP endpoints.
//!
//! Rate limits are recognised from the status line, so servers that answer
//! 429 without the `OpenAI` error envelope (Mistral among them) are still
//! classified correctly.

use std::net::IpAddr;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

use crate::agent::config::AgentConfig;
use crate::error::{AgentError, EmbeddingError};

/// Why an API call did not produce a response body.
#[derive(Debug, Error)]
pub(crate) enum ApiFailure {
    /// HTTP 429.
    #[error("HTTP 429 Too Many Requests: {0}")]
    RateLimited(String),

    /// Any other non-success status.
    #[error("HTTP {status}: {body}")]
    Status {
        /// Status code.
        status: u16,
        /// Response body, as text.
        body: String,
    },

    /// Connection, timeout or decoding failure.
    #[error("{0}")]
    Transport(String),
}

impl From<ApiFailure> for AgentError {
    fn from(failure: ApiFailure) -> Self {
        let message = failure.to_string();
        match failure {
            ApiFailure::RateLimited(_) => Self::RateLimited { message },
            ApiFailure::Status { status, .. } => Self::ApiRequest {
                message,
                status: Some(status),
            },
            ApiFailure::Transport(_) => Self::ApiRequest {
                message,
                status: None,
            },
        }
    }
}

impl From<ApiFailure> for EmbeddingError {
    fn from(failure: ApiFailure) -> Self {
        let message = failure.to_string();
        match failure {
            ApiFailure::RateLimited(_) => Self::RateLimited { message },
            ApiFailure::Status { .. } | ApiFailure::Transport(_) => Self::Provider { message },
        }
    }
}

/// Authenticated JSON client bound to one API base URL.
#[derive(Debug, Clone)]
pub(crate) struct ApiClient {
    http: Client,
    base_url: String,
}

impl ApiClient {
    /// Builds a client from the key, base URL and timeout in `config`.
    ///
    /// Loopback base URLs bypass any proxy configured in the environment.
    pub(crate) fn new(config: &AgentConfig) -> Result<Self, AgentError> {
        let invalid = |message: String| AgentError::ApiRequest {
            message,
            status: None,
        };

        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", config.api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth).map_err(|e| invalid(format!("invalid API key: {e}")))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let base_url = config.base_url.trim_end_matches('/').to_string();
        let mut builder = Client::builder()
            .timeout(config.timeout)
            .default_headers(headers);
        if is_loopback(&base_url) {
            builder = builder.no_proxy();
        }
        let http = builder
            .build()
            .map_err(|e| invalid(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http, base_url })
    }

    /// POSTs `body` to `{base_url}/{path}` and decodes the JSON reply.
    pub(crate) async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, ApiFailure>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| ApiFailure::Transport(format!("request to {url} failed: {e}")))?;

        let status = response.status();
        debug!(%url, status = status.as_u16(), "api response");
        if status.is_success() {
            return response
                .json()
                .await
                .map_err(|e| ApiFailure::Transport(format!("failed to decode response: {e}")));
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<body unavailable>".to_string());
        if status == StatusCode::TOO_MANY_REQUESTS {
            Err(ApiFailure::RateLimited(body))
        } else {
            Err(ApiFailure::Status {
                status: status.as_u16(),
                body,
            })
        }
    }
}

fn is_loopback(base_url: &str) -> bool {
    let Ok(url) = Url::parse(base_url) else {
        return false;
    };
    match url.host_str() {
        Some("localhost") => true,
        Some(host) => host
            .trim_start_matches('[')
            .trim_end_matches(']')
            .parse::<IpAddr>()
            .is_ok_and(|ip| ip.is_loopback()),
        None => false,
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    /// Body Mistral sends with a 429.
    pub(crate) const RATE_LIMIT_BODY: &str = r#"{"message":"Requests rate limit exceeded"}"#;

    /// Local HTTP server answering one request per connection.
    ///
    /// Replies are served in order; the last one repeats once the list is
    /// exhausted.
    pub(crate) struct MockServer {
        /// Base URL to configure clients with.
        pub(crate) url: String,
        hits: Arc<AtomicUsize>,
    }

    impl MockServer {
        pub(crate) async fn start(replies: Vec<(u16, String)>) -> Self {
            let listener = TcpListener::bind("127.0.0.1:0")
                .await
                .unwrap_or_else(|e| panic!("bind: {e}"));
            let addr = listener
                .local_addr()
                .unwrap_or_else(|e| panic!("local addr: {e}"));
            let hits = Arc::new(AtomicUsize::new(0));
            let counter = Arc::clone(&hits);

            tokio::spawn(async move {
                let mut served = 0usize;
                while let Ok((mut socket, _)) = listener.accept().await {
                    let Some((status, body)) = replies.get(served).or_else(|| replies.last())
                    else {
                        break;
                    };
                    served += 1;
                    read_request(&mut socket).await;
                    counter.fetch_add(1, Ordering::SeqCst);
                    let reason = match *status {
                        200 => "OK",
                        429 => "Too Many Requests",
                        _ => "Error",
                    };
                    let reply = format!(
                        "HTTP/1.1 {status} {reason}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = socket.write_all(reply.as_bytes()).await;
                    let _ = socket.shutdown().await;
                }
            });

            Self {
                url: format!("http://{addr}/v1"),
                hits,
            }
        }

        /// Requests answered so far.
        pub(crate) fn hits(&self) -> usize {
            self.hits.load(Ordering::SeqCst)
        }
    }

    async fn read_request(socket: &mut TcpStream) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = match socket.read(&mut chunk).await {
                Ok(0) | Err(_) => return,
                Ok(n) => n,
            };
            buf.extend_from_slice(&chunk[..n]);
            let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
                continue;
            };
            let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
            let length = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= end + 4 + length {
                return;
            }
        }
    }

    fn config(url: &str) -> AgentConfig {
        AgentConfig::builder()
            .api_key("test")
            .base_url(url)
            .build()
            .unwrap_or_else(|e| panic!("config: {e}"))
    }

    #[test]
    fn test_loopback_detection() {
        assert!(is_loopback("http://127.0.0.1:8080/v1"));
        assert!(is_loopback("http://localhost:11434/v1"));
        assert!(is_loopback("http://[::1]:8080"));
        assert!(!is_loopback("https://api.mistral.ai/v1"));
        assert!(!is_loopback("not a url"));
    }

    #[tokio::test]
    async fn test_status_429_is_rate_limited() {
        let server = MockServer::start(vec![(429, RATE_LIMIT_BODY.to_string())]).await;
        let client = ApiClient::new(&config(&server.url)).unwrap_or_else(|e| panic!("{e}"));

        let result = client
            .post_json::<_, serde_json::Value>("chat/completions", &serde_json::json!({}))
            .await;
        let err = AgentError::from(result.err().unwrap_or_else(|| panic!("expected failure")));
        assert!(err.is_rate_limited(), "{err:?}");
        assert!(err.to_string().contains("Requests rate limit exceeded"), "{err}");
        assert_eq!(server.hits(), 1);
    }

    #[tokio::test]
    async fn test_other_status_keeps_code() {
        let server = MockServer::start(vec![(401, r#"{"message":"Unauthorized"}"#.to_string())]).await;
        let client = ApiClient::new(&config(&server.url)).unwrap_or_else(|e| panic!("{e}"));

        let result = client
            .post_json::<_, serde_json::Value>("embeddings", &serde_json::json!({}))
            .await;
        let failure = result.err().unwrap_or_else(|| panic!("expected failure"));
        assert!(matches!(
            AgentError::from(failure),
            AgentError::ApiRequest {
                status: Some(401),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_success_decodes_body() {
        let server = MockServer::start(vec![(200, r#"{"ok":true}"#.to_string())]).await;
        let client = ApiClient::new(&config(&server.url)).unwrap_or_else(|e| panic!("{e}"));

        let value: serde_json::Value = client
            .post_json("chat/completions", &serde_json::json!({"model": "m"}))
            .await
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(value["ok"], true);
    }
}
