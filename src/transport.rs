use std::{fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::{
    header::{self, HeaderMap, HeaderValue},
    Method,
};
use tokio_util::sync::CancellationToken;

use crate::{OverseerError, Result};

/// Header names are case-insensitive on the wire; `HeaderName` wants lowercase.
pub const API_KEY_HEADER: &str = "x-api-key";

/// A single upstream call: method plus path relative to the base URL.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpstreamRequest {
    pub method: Method,
    pub path: String,
}

impl UpstreamRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
        }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            method: Method::DELETE,
            path: path.into(),
        }
    }
}

/// Status and body text of a completed call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpstreamResponse {
    pub status: u16,
    pub body: String,
}

impl UpstreamResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// 5xx responses are retry-eligible; every other status is final.
    pub fn is_transient(&self) -> bool {
        (500..600).contains(&self.status)
    }
}

/// Sends one request. Implemented by the HTTP transport, by every
/// resilience layer wrapping it, and by test fakes.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        request: &UpstreamRequest,
        cancel: &CancellationToken,
    ) -> Result<UpstreamResponse>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(
        &self,
        request: &UpstreamRequest,
        cancel: &CancellationToken,
    ) -> Result<UpstreamResponse> {
        (**self).send(request, cancel).await
    }
}

/// Plain `reqwest` transport with the upstream's default headers.
///
/// It has no request timeout of its own; the pipeline's timeout layer owns
/// that concern.
#[derive(Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    base_url: String,
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl HttpTransport {
    /// Builds a transport sending `Accept: application/json` on every call,
    /// plus `X-Api-Key` when `api_key` is non-blank.
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<&str>,
        connect_timeout: Duration,
    ) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(key) = api_key.map(str::trim).filter(|key| !key.is_empty()) {
            let mut value = HeaderValue::from_str(key)
                .map_err(|_| OverseerError::Config("API key is not a valid header value".to_owned()))?;
            value.set_sensitive(true);
            headers.insert(API_KEY_HEADER, value);
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(connect_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .build()
            .map_err(OverseerError::Transport)?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        request: &UpstreamRequest,
        _cancel: &CancellationToken,
    ) -> Result<UpstreamResponse> {
        let response = self
            .http
            .request(request.method.clone(), self.url(&request.path))
            .send()
            .await
            .map_err(OverseerError::Transport)?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(OverseerError::Transport)?;
        Ok(UpstreamResponse { status, body })
    }
}
