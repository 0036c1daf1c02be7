//! HTTP plumbing shared by every adapter.
//!
//! Each [`HttpTransport`] owns two clients: one for live calls, whose pool is
//! shared by all calls to the endpoint, and one for detection probes with a
//! short total timeout, so a probe never waits behind a long-running
//! completion.

use crate::error::{ClassifiedError, classify_status};
use crate::llm::types::{ProviderConfig, ProviderEndpoint};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, RequestBuilder, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct HttpTransport {
    endpoint: ProviderEndpoint,
    client: Client,
    probe_client: Client,
    request_timeout: Duration,
    probe_timeout: Duration,
    api_key: Option<String>,
}

impl HttpTransport {
    pub fn new(endpoint: ProviderEndpoint, config: &ProviderConfig) -> Result<Self, ClassifiedError> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()?;
        let probe_client = Client::builder()
            .connect_timeout(config.probe_timeout)
            .timeout(config.probe_timeout)
            .build()?;

        Ok(Self {
            endpoint,
            client,
            probe_client,
            request_timeout: config.request_timeout,
            probe_timeout: config.probe_timeout,
            api_key: config.api_key.clone(),
        })
    }

    pub fn endpoint(&self) -> &ProviderEndpoint {
        &self.endpoint
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    /// GETs `path` with the probe client and returns the JSON body on success.
    ///
    /// Any failure, including a slow server, yields `None`.
    pub async fn probe_json(&self, path: &str) -> Option<serde_json::Value> {
        let url = self.endpoint.url(path);
        let request = self.authorize(self.probe_client.get(&url)).send();
        let response = match tokio::time::timeout(self.probe_timeout, request).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                debug!("Probe {} failed: {}", url, e);
                return None;
            }
            Err(_) => {
                debug!("Probe {} timed out", url);
                return None;
            }
        };
        if !response.status().is_success() {
            debug!("Probe {} returned {}", url, response.status());
            return None;
        }
        match tokio::time::timeout(self.probe_timeout, response.json::<serde_json::Value>()).await {
            Ok(Ok(value)) => Some(value),
            _ => None,
        }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClassifiedError> {
        let builder = self.client.get(self.endpoint.url(path));
        let response = self.send(builder, path).await?;
        self.read_json(response, path).await
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, ClassifiedError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let builder = self.client.post(self.endpoint.url(path)).json(body);
        let response = self.send(builder, path).await?;
        self.read_json(response, path).await
    }

    /// DELETE with a JSON body; the response body is ignored.
    pub async fn delete_json<B>(&self, path: &str, body: &B) -> Result<(), ClassifiedError>
    where
        B: Serialize + ?Sized,
    {
        let builder = self.client.delete(self.endpoint.url(path)).json(body);
        self.send(builder, path).await?;
        Ok(())
    }

    /// POSTs and returns the response once headers arrive, leaving the body
    /// to be consumed incrementally.
    ///
    /// Only the wait for headers is bounded here; the body is watched by the
    /// stream health monitor instead.
    pub async fn post_stream<B>(&self, path: &str, body: &B) -> Result<Response, ClassifiedError>
    where
        B: Serialize + ?Sized,
    {
        let url = self.endpoint.url(path);
        debug!("Opening stream {}", url);
        let request = self.authorize(self.client.post(&url).json(body)).send();
        let response = tokio::time::timeout(self.request_timeout, request)
            .await
            .map_err(|_| {
                ClassifiedError::timeout(format!(
                    "no response headers from {} within {}s",
                    url,
                    self.request_timeout.as_secs()
                ))
            })?
            .map_err(|e| self.annotate(ClassifiedError::from(e), path))?;

        if response.status().is_success() {
            Ok(response)
        } else {
            Err(self.annotate(error_for_response(response).await, path))
        }
    }

    async fn send(&self, builder: RequestBuilder, path: &str) -> Result<Response, ClassifiedError> {
        debug!("Request {}{}", self.endpoint, path);
        let response = self
            .authorize(builder)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| self.annotate(ClassifiedError::from(e), path))?;

        if response.status().is_success() {
            Ok(response)
        } else {
            Err(self.annotate(error_for_response(response).await, path))
        }
    }

    async fn read_json<T: DeserializeOwned>(
        &self,
        response: Response,
        path: &str,
    ) -> Result<T, ClassifiedError> {
        let text = response
            .text()
            .await
            .map_err(|e| self.annotate(ClassifiedError::from(e), path))?;
        serde_json::from_str(&text).map_err(|e| self.annotate(ClassifiedError::from(e), path))
    }

    fn annotate(&self, error: ClassifiedError, path: &str) -> ClassifiedError {
        error
            .with_context("endpoint", self.endpoint.base_url())
            .with_context("path", path)
    }
}

/// Builds the classified error for a non-success response, consuming its body.
pub async fn error_for_response(response: Response) -> ClassifiedError {
    let status = response.status().as_u16();
    let retry_after = retry_after_hint(response.headers());
    let body = response.text().await.unwrap_or_default();
    let error = classify_status(status, &body);
    match retry_after {
        Some(delay) => error.with_context("retry_after_ms", delay.as_millis().to_string()),
        None => error,
    }
}

/// Reads a `Retry-After` header given in seconds.
fn retry_after_hint(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(Duration::from_secs_f64)
}
