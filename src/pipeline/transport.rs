use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::future::BoxFuture;
use reqwest::{Client, Url};
use serde_json::Value;
use tower::{BoxError, Service};
use tracing::{debug, error};

use crate::error::AppError;
use crate::pipeline::request_builder::DetectionRequest;

/// One remote attempt per call. Retries and timeouts belong to the caller.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &DetectionRequest) -> Result<Value, AppError>;
}

/// Posts the request as JSON to the detection endpoint.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    endpoint: Url,
}

impl HttpTransport {
    pub fn new(endpoint: &str) -> Result<Self, AppError> {
        if endpoint.trim().is_empty() {
            return Err(AppError::Config(
                "no detection endpoint configured".to_string(),
            ));
        }
        let endpoint = Url::parse(endpoint)
            .map_err(|e| AppError::Config(format!("invalid endpoint {:?}: {}", endpoint, e)))?;
        let client = Client::builder()
            .build()
            .map_err(|e| AppError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &DetectionRequest) -> Result<Value, AppError> {
        debug!("POST {}", self.endpoint);
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(request)
            .send()
            .await
            .map_err(|e| {
                error!("Request to {} failed: {}", self.endpoint, e);
                AppError::Transport {
                    status: e.status().map(|status| status.as_u16()),
                    message: e.to_string(),
                }
            })?;

        let status = response.status();
        let body = response.bytes().await.map_err(|e| AppError::Transport {
            status: Some(status.as_u16()),
            message: format!("failed to read response body: {}", e),
        })?;
        debug!("Response {} ({} bytes)", status, body.len());

        if !status.is_success() {
            return Err(AppError::Transport {
                status: Some(status.as_u16()),
                message: error_message(&body, status.canonical_reason()),
            });
        }

        serde_json::from_slice(&body).map_err(|e| AppError::Transport {
            status: Some(status.as_u16()),
            message: format!("response body is not JSON: {}", e),
        })
    }
}

/// Pulls a readable message out of an error body: a bare JSON string, an
/// object's `message`/`error` field, or the raw text.
fn error_message(body: &[u8], reason: Option<&str>) -> String {
    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    let message = match serde_json::from_str::<Value>(text) {
        Ok(Value::String(message)) => Some(message),
        Ok(Value::Object(map)) => ["message", "error"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))
            .map(str::to_string),
        _ => None,
    };
    match message {
        Some(message) => message,
        None if !text.is_empty() => text.to_string(),
        None => reason.unwrap_or("unknown error").to_string(),
    }
}

/// Tower adapter so the pipeline can layer a caller-side timeout over any [`Transport`].
#[derive(Clone)]
pub struct TransportService {
    inner: Arc<dyn Transport>,
}

impl TransportService {
    pub fn new(inner: Arc<dyn Transport>) -> Self {
        Self { inner }
    }
}

impl Service<DetectionRequest> for TransportService {
    type Response = Value;
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: DetectionRequest) -> Self::Future {
        let inner = self.inner.clone();
        Box::pin(async move { inner.send(&request).await.map_err(BoxError::from) })
    }
}
