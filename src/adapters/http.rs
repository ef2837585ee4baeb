use crate::domain::ports::HostsFetcher;
use crate::utils::error::{ErrorKind, FetchError, Result};
use async_trait::async_trait;
use reqwest::{redirect::Policy, Client, StatusCode};
use std::time::Duration;

pub const DEFAULT_USER_AGENT: &str = "DNSMasq-Manager/1.0";
const MAX_REDIRECTS: usize = 5;
const BODY_SNIPPET_CHARS: usize = 256;

/// Plain HTTP GET fetcher. No retries; the caller supplies the timeout.
#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    client: Client,
}

impl ReqwestFetcher {
    pub fn new(user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .redirect(Policy::limited(MAX_REDIRECTS))
            .build()?;
        Ok(Self { client })
    }
}

fn kind_for_status(status: StatusCode) -> ErrorKind {
    match status {
        StatusCode::NOT_FOUND | StatusCode::GONE => ErrorKind::NotFound,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ErrorKind::PermissionDenied,
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => ErrorKind::Timeout,
        _ => ErrorKind::Unknown,
    }
}

fn kind_for_transport(error: &reqwest::Error) -> ErrorKind {
    if error.is_timeout() {
        ErrorKind::Timeout
    } else if error.is_connect() || error.is_request() || error.is_body() {
        ErrorKind::NetworkError
    } else {
        ErrorKind::Unknown
    }
}

fn snippet(body: &str) -> String {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(BODY_SNIPPET_CHARS) {
        Some((cut, _)) => format!("{}…", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}

#[async_trait]
impl HostsFetcher for ReqwestFetcher {
    async fn fetch(&self, url: &str, timeout: Duration) -> std::result::Result<String, FetchError> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| FetchError::new(kind_for_transport(&e), e.to_string()))?;

        let status = response.status();
        tracing::debug!("HTTP {} from {}", status, url);

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError {
                kind: kind_for_status(status),
                message: format!("Request failed with status code {}", status.as_u16()),
                status: Some(status.as_u16()),
                body_snippet: Some(snippet(&body)),
            });
        }

        response.text().await.map_err(|e| FetchError {
            kind: kind_for_transport(&e),
            message: e.to_string(),
            status: Some(status.as_u16()),
            body_snippet: None,
        })
    }
}
