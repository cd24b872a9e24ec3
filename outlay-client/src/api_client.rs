//! HTTP collaborators for the expense API and the external object store.

use crate::config::{AuthConfig, ClientConfig};
use async_trait::async_trait;
use bytes::Bytes;
use outlay_core::{Fetcher, ObjectStore, RequestFailed, Value};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum ApiClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Config error: {0}")]
    Config(String),
}

/// reqwest-backed [`Fetcher`] and [`ObjectStore`].
///
/// API calls carry the configured credentials; object uploads go to the
/// signed absolute URL without them.
#[derive(Clone)]
pub struct RestClient {
    client: reqwest::Client,
    base_url: String,
    auth_header: HeaderMap,
}

impl RestClient {
    pub fn new(config: &ClientConfig) -> Result<Self, ApiClientError> {
        Self::with_timeout(&config.api_base_url, &config.auth, config.request_timeout())
    }

    pub fn with_timeout(
        base_url: &str,
        auth: &AuthConfig,
        timeout: Duration,
    ) -> Result<Self, ApiClientError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let auth_header = build_auth_headers(auth)?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_header,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for an API resource.
    pub fn url(&self, resource: &str) -> String {
        if resource.starts_with('/') {
            format!("{}{}", self.base_url, resource)
        } else {
            format!("{}/{}", self.base_url, resource)
        }
    }

    async fn send_json(
        &self,
        method: Method,
        resource: &str,
        body: Option<&Value>,
    ) -> Result<Value, RequestFailed> {
        let url = self.url(resource);
        debug!(method = method.as_str(), url = url.as_str(), "API request");
        let mut request = self
            .client
            .request(method, url)
            .headers(self.auth_header.clone());
        if let Some(body) = body.filter(|b| !b.is_null()) {
            request = request.json(body);
        }
        let response = request.send().await.map_err(transport_error)?;
        parse_response(response).await
    }
}

#[async_trait]
impl Fetcher for RestClient {
    async fn get(&self, resource: &str) -> Result<Value, RequestFailed> {
        self.send_json(Method::GET, resource, None).await
    }

    async fn post(&self, resource: &str, body: &Value) -> Result<Value, RequestFailed> {
        self.send_json(Method::POST, resource, Some(body)).await
    }

    async fn patch(&self, resource: &str, body: &Value) -> Result<Value, RequestFailed> {
        self.send_json(Method::PATCH, resource, Some(body)).await
    }

    async fn delete(&self, resource: &str, body: &Value) -> Result<Value, RequestFailed> {
        self.send_json(Method::DELETE, resource, Some(body)).await
    }
}

#[async_trait]
impl ObjectStore for RestClient {
    async fn put_object(
        &self,
        destination: &str,
        content_type: &str,
        body: Bytes,
    ) -> Result<(), RequestFailed> {
        debug!(bytes = body.len(), content_type, "Object upload");
        let response = self
            .client
            .put(destination)
            .header(CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await
            .map_err(transport_error)?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let text = response.text().await.unwrap_or_default();
            Err(RequestFailed::status(status.as_u16(), text))
        }
    }
}

async fn parse_response(response: reqwest::Response) -> Result<Value, RequestFailed> {
    let status = response.status();
    let text = response.text().await.map_err(transport_error)?;
    if !status.is_success() {
        return Err(RequestFailed::status(status.as_u16(), text));
    }
    decode_body(status, &text)
}

fn decode_body(status: StatusCode, text: &str) -> Result<Value, RequestFailed> {
    if status == StatusCode::NO_CONTENT || text.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(text).map_err(|e| RequestFailed::malformed(e.to_string()))
}

fn transport_error(err: reqwest::Error) -> RequestFailed {
    RequestFailed::transport(err.to_string())
}

fn build_auth_headers(auth: &AuthConfig) -> Result<HeaderMap, ApiClientError> {
    let mut headers = HeaderMap::new();
    if let Some(cookie) = &auth.session_cookie {
        headers.insert(
            HeaderName::from_static("cookie"),
            HeaderValue::from_str(cookie).map_err(|e| ApiClientError::Config(e.to_string()))?,
        );
    }
    if let Some(token) = &auth.bearer_token {
        let value = format!("Bearer {}", token);
        headers.insert(
            HeaderName::from_static("authorization"),
            HeaderValue::from_str(&value).map_err(|e| ApiClientError::Config(e.to_string()))?,
        );
    }
    Ok(headers)
}
