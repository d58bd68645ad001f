//! HTTP transport abstraction for the BV-BRC query engine.
//!
//! This module separates "send one request" from the query semantics built on
//! top of it, so the pagination and batching layers can be driven by a real
//! HTTP client or by an in-process fake.
//!
//! # Implementations
//!
//! - [`HttpTransport`] - `reqwest`-backed transport with a per-call timeout
//!
//! A [`Transport`] performs exactly one attempt. Retries, backoff and
//! telemetry live in [`send_with_retry`].

mod http;
mod retry;
mod telemetry;

pub use http::{DEFAULT_TIMEOUT, HttpTransport};
pub use retry::{RetryPolicy, send_with_retry};
pub use telemetry::{Telemetry, TelemetrySnapshot};

use crate::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;

/// HTTP method subset used by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// A prepared request descriptor.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl ApiRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn post(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            headers: Vec::new(),
            body: Some(body.into()),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Text used to identify the request in error messages.
    pub fn describe(&self) -> &str {
        self.body.as_deref().unwrap_or(&self.url)
    }
}

/// A received response. Header names are stored lowercase.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub reason: String,
    pub headers: HashMap<String, String>,
    pub body: Bytes,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            reason: default_reason(status).to_string(),
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn is_error(&self) -> bool {
        self.status >= 400
    }
}

fn default_reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        206 => "Partial Content",
        400 => "Bad Request",
        403 => "Forbidden",
        404 => "Not Found",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        _ => "",
    }
}

/// One-shot request execution.
///
/// An `Err` means the request never produced an HTTP response (connection
/// failure, timeout). Error statuses are returned as `Ok` responses so the
/// retry layer can classify them.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse> {
        (**self).execute(request).await
    }
}
