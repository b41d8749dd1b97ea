//! Outbound HTTP seam.
//!
//! Certificate endpoints and the attestation authority are reached through
//! [`HttpClient`] so the orchestrator can be driven by scripted responses.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use cvm_attest_core::error::{AttestError, Result};
use parking_lot::Mutex;

/// Status and body of a completed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self::new(200, body)
    }

    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

/// Minimal HTTP surface used by the attestor.
///
/// Implementations return `Err` only when no response was received; any
/// status code is reported through [`HttpResponse`].
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn get(&self, url: &str) -> Result<HttpResponse>;

    async fn post_json(&self, url: &str, body: Vec<u8>) -> Result<HttpResponse>;
}

/// [`HttpClient`] backed by reqwest.
pub struct ReqwestHttpClient {
    http: reqwest::Client,
}

impl ReqwestHttpClient {
    /// Build a client whose requests fail after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AttestError::Transport(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { http })
    }

    async fn finish(url: &str, response: reqwest::Response) -> Result<HttpResponse> {
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(|e| {
            AttestError::Transport(format!("Failed to read response from {}: {}", url, e))
        })?;
        Ok(HttpResponse::new(status, body.to_vec()))
    }
}

fn send_error(url: &str, e: reqwest::Error) -> AttestError {
    if e.is_timeout() {
        AttestError::Timeout(format!("request to {} timed out", url))
    } else {
        AttestError::Transport(format!("Failed to reach {}: {}", url, e))
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn get(&self, url: &str) -> Result<HttpResponse> {
        tracing::debug!(url = %url, "GET");
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| send_error(url, e))?;
        Self::finish(url, response).await
    }

    async fn post_json(&self, url: &str, body: Vec<u8>) -> Result<HttpResponse> {
        tracing::debug!(url = %url, bytes = body.len(), "POST");
        let response = self
            .http
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| send_error(url, e))?;
        Self::finish(url, response).await
    }
}

/// A request seen by [`ScriptedHttpClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub method: &'static str,
    pub url: String,
    pub body: Option<Vec<u8>>,
}

/// Offline [`HttpClient`] that answers from a queue and records every
/// request. Exported for this crate's unit and integration tests; an
/// exhausted queue answers with a `Transport` error.
#[derive(Default)]
pub struct ScriptedHttpClient {
    responses: Mutex<VecDeque<Result<HttpResponse>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the next reply.
    pub fn push(&self, response: Result<HttpResponse>) {
        self.responses.lock().push_back(response);
    }

    pub fn push_ok(&self, body: impl Into<Vec<u8>>) {
        self.push(Ok(HttpResponse::ok(body)));
    }

    /// Requests made so far, in order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }

    pub fn urls(&self) -> Vec<String> {
        self.requests.lock().iter().map(|r| r.url.clone()).collect()
    }

    fn reply(&self, method: &'static str, url: &str, body: Option<Vec<u8>>) -> Result<HttpResponse> {
        self.requests.lock().push(RecordedRequest {
            method,
            url: url.to_string(),
            body,
        });
        self.responses.lock().pop_front().unwrap_or_else(|| {
            Err(AttestError::Transport(format!(
                "no scripted response for {} {}",
                method, url
            )))
        })
    }
}

#[async_trait]
impl HttpClient for ScriptedHttpClient {
    async fn get(&self, url: &str) -> Result<HttpResponse> {
        self.reply("GET", url, None)
    }

    async fn post_json(&self, url: &str, body: Vec<u8>) -> Result<HttpResponse> {
        self.reply("POST", url, Some(body))
    }
}
