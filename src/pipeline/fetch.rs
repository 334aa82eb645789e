//! Network stage: the [`Transport`] seam and the Retrying Fetcher.
//!
//! ## Why a trait?
//!
//! Orchestrators never hold a `reqwest::Client` directly. They talk to an
//! `Arc<dyn Transport>`, which in production is [`HttpTransport`] and in tests
//! is an in-process stub that scripts failures, delays and responses. The
//! retry loop, cancellation and state-machine logic can then be exercised
//! deterministically without a server.
//!
//! ## Retry Strategy
//!
//! A bounded loop, not recursive rescheduling: attempt, and on a transport
//! error or non-2xx status wait [`RetryPolicy::delay_before`] and go again
//! until `max_attempts` is spent. Waits race a [`CancellationToken`], so a
//! superseded sequence stops at the next suspension point instead of firing
//! a stale request later.

use crate::config::{ClientConfig, RetryPolicy};
use crate::error::{DwaniError, FetchError, FetchFailure};
use crate::progress::{FetchObserver, NoopFetchObserver};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Method;
use serde_json::Value;
use std::sync::Arc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

// ── Request / response model ─────────────────────────────────────────────

/// What the caller expects the success body to contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    Json,
    /// Raw bytes, e.g. a returned PDF.
    Binary,
}

/// One field of a multipart form.
#[derive(Debug, Clone)]
pub enum FormField {
    Text {
        name: String,
        value: String,
    },
    File {
        name: String,
        file_name: String,
        mime_type: String,
        bytes: Arc<[u8]>,
    },
}

impl FormField {
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        FormField::Text {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            FormField::Text { name, .. } | FormField::File { name, .. } => name,
        }
    }

    /// Text value, `None` for file parts.
    pub fn text_value(&self) -> Option<&str> {
        match self {
            FormField::Text { value, .. } => Some(value),
            FormField::File { .. } => None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum RequestBody {
    Empty,
    Json(Value),
    Multipart(Vec<FormField>),
}

/// A request as the core sees it: endpoint-relative and transport-agnostic.
#[derive(Debug, Clone)]
pub struct ServiceRequest {
    pub method: Method,
    /// Path relative to the configured base URL, e.g. `/v1/user-captures/`.
    pub endpoint: String,
    pub query: Vec<(String, String)>,
    pub body: RequestBody,
    pub expect: ResponseKind,
}

impl ServiceRequest {
    pub fn get(endpoint: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            endpoint: endpoint.into(),
            query: Vec::new(),
            body: RequestBody::Empty,
            expect: ResponseKind::Json,
        }
    }

    pub fn post_json(endpoint: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::POST,
            endpoint: endpoint.into(),
            query: Vec::new(),
            body: RequestBody::Json(body),
            expect: ResponseKind::Json,
        }
    }

    pub fn post_multipart(endpoint: impl Into<String>, fields: Vec<FormField>, expect: ResponseKind) -> Self {
        Self {
            method: Method::POST,
            endpoint: endpoint.into(),
            query: Vec::new(),
            body: RequestBody::Multipart(fields),
            expect,
        }
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// Look up a text field of a multipart body by name.
    pub fn form_text(&self, name: &str) -> Option<&str> {
        match &self.body {
            RequestBody::Multipart(fields) => fields
                .iter()
                .find(|f| f.name() == name)
                .and_then(FormField::text_value),
            _ => None,
        }
    }
}

/// A fully-read response.
#[derive(Debug, Clone)]
pub struct ServiceResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl ServiceResponse {
    pub fn new(status: u16, content_type: Option<String>, body: Vec<u8>) -> Self {
        Self {
            status,
            content_type,
            body,
        }
    }

    /// Build a JSON response, mostly useful for stub transports.
    pub fn json(status: u16, value: &Value) -> Self {
        Self::new(
            status,
            Some("application/json".to_string()),
            value.to_string().into_bytes(),
        )
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body as UTF-8 text, replacing invalid sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn parse_json(&self) -> Result<Value, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// A failure below HTTP: DNS, TLS, connect, timeout, body read.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct TransportError(pub String);

// ── Transport seam ───────────────────────────────────────────────────────

/// Sends one request and reads the whole response.
///
/// Implementations must not retry internally; that is the fetcher's job.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &ServiceRequest) -> Result<ServiceResponse, TransportError>;
}

/// The production [`Transport`], backed by `reqwest`.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    config: Arc<ClientConfig>,
}

impl HttpTransport {
    pub fn new(config: Arc<ClientConfig>) -> Result<Self, DwaniError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| DwaniError::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &ServiceRequest) -> Result<ServiceResponse, TransportError> {
        let url = self.config.url_for(&request.endpoint);
        debug!("{} {}", request.method, url);

        let mut builder = self.client.request(request.method.clone(), &url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(ref key) = self.config.api_key {
            builder = builder.header(self.config.api_key_header.as_str(), key);
        }
        builder = builder.header(
            ACCEPT,
            match request.expect {
                ResponseKind::Json => "application/json",
                ResponseKind::Binary => "application/pdf",
            },
        );

        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(value),
            RequestBody::Multipart(fields) => builder.multipart(build_form(fields)?),
        };

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError(format!(
                    "timed out after {}s: {e}",
                    self.config.request_timeout_secs
                ))
            } else {
                TransportError(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError(format!("failed to read response body: {e}")))?;

        Ok(ServiceResponse::new(status, content_type, body.to_vec()))
    }
}

fn build_form(fields: &[FormField]) -> Result<reqwest::multipart::Form, TransportError> {
    let mut form = reqwest::multipart::Form::new();
    for field in fields {
        form = match field {
            FormField::Text { name, value } => form.text(name.clone(), value.clone()),
            FormField::File {
                name,
                file_name,
                mime_type,
                bytes,
            } => {
                let part = reqwest::multipart::Part::bytes(bytes.to_vec())
                    .file_name(file_name.clone())
                    .mime_str(mime_type)
                    .map_err(|e| TransportError(format!("invalid MIME type '{mime_type}': {e}")))?;
                form.part(name.clone(), part)
            }
        };
    }
    Ok(form)
}

// ── Retrying Fetcher ─────────────────────────────────────────────────────

/// Perform `request` with bounded retries.
///
/// Transport errors and non-2xx statuses are failed attempts. Between
/// attempts the fetcher waits per `policy`; the wait and the in-flight call
/// both race `cancel`, and a cancelled sequence returns
/// [`FetchError::Cancelled`] without issuing further attempts.
///
/// Every attempt is reported to `observer`; only the final outcome is
/// returned.
pub async fn fetch_with_retry(
    transport: &dyn Transport,
    request: &ServiceRequest,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    observer: Option<&dyn FetchObserver>,
) -> Result<ServiceResponse, FetchError> {
    let observer: &dyn FetchObserver = observer.unwrap_or(&NoopFetchObserver);
    let endpoint = request.endpoint.as_str();
    let max_attempts = policy.max_attempts.max(1);
    let mut last_failure: Option<FetchFailure> = None;

    for attempt in 1..=max_attempts {
        if attempt > 1 {
            let delay = policy.delay_before(attempt);
            warn!(
                "{}: retry {}/{} after {}ms",
                endpoint,
                attempt - 1,
                max_attempts - 1,
                delay.as_millis()
            );
            observer.on_retry_scheduled(endpoint, attempt, delay);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("{}: retry cancelled before attempt {}", endpoint, attempt);
                    return Err(FetchError::Cancelled);
                }
                _ = sleep(delay) => {}
            }
        }

        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }

        observer.on_attempt_start(endpoint, attempt, max_attempts);
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("{}: attempt {} cancelled in flight", endpoint, attempt);
                return Err(FetchError::Cancelled);
            }
            result = transport.send(request) => result,
        };

        let (status, body) = match outcome {
            Ok(response) if response.is_success() => {
                info!(
                    "{}: HTTP {} on attempt {} ({} bytes)",
                    endpoint,
                    response.status,
                    attempt,
                    response.body.len()
                );
                observer.on_complete(endpoint, attempt, true);
                return Ok(response);
            }
            Ok(response) => (Some(response.status), response.text()),
            Err(e) => (None, e.to_string()),
        };

        match status {
            Some(code) => warn!("{}: attempt {} failed with HTTP {}: {}", endpoint, attempt, code, body),
            None => warn!("{}: attempt {} failed: {}", endpoint, attempt, body),
        }
        observer.on_attempt_failed(endpoint, attempt, status, &body);

        last_failure = Some(FetchFailure {
            endpoint: endpoint.to_string(),
            attempts: attempt,
            status,
            body,
        });
    }

    observer.on_complete(endpoint, max_attempts, false);
    Err(FetchError::Exhausted(last_failure.unwrap_or_else(|| FetchFailure {
        endpoint: endpoint.to_string(),
        attempts: 0,
        status: None,
        body: "no attempt was made".to_string(),
    })))
}
