use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tower::timeout::TimeoutLayer;
use tower::timeout::error::Elapsed;
use tower::util::BoxCloneService;
use tower::{BoxError, ServiceBuilder, ServiceExt};
use tracing::{debug, info};

use crate::detection::{Detection, ImageAsset};
use crate::error::AppError;
use crate::pipeline::encoder;
use crate::pipeline::normalizer;
use crate::pipeline::request_builder::{DetectionParameters, DetectionRequest, RequestBuilder};
use crate::pipeline::transport::{Transport, TransportService};

type TransportStage = BoxCloneService<DetectionRequest, Value, BoxError>;

pub struct DetectionPipelineBuilder {
    transport: Arc<dyn Transport>,
    request_builder: RequestBuilder,
    request_timeout: Option<Duration>,
}

impl DetectionPipelineBuilder {
    pub fn request_builder(mut self, request_builder: RequestBuilder) -> Self {
        self.request_builder = request_builder;
        self
    }

    // Ceiling on the remote call; the transport itself never times out.
    pub fn request_timeout(mut self, request_timeout: Option<Duration>) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    pub fn build(self) -> DetectionPipeline {
        let transport = ServiceBuilder::new()
            .option_layer(self.request_timeout.map(TimeoutLayer::new))
            .service(TransportService::new(self.transport));

        DetectionPipeline {
            request_builder: self.request_builder,
            request_timeout: self.request_timeout,
            transport: BoxCloneService::new(transport),
        }
    }
}

/// Encoder -> RequestBuilder -> Transport -> ResponseNormalizer for a single submission.
#[derive(Clone)]
pub struct DetectionPipeline {
    request_builder: RequestBuilder,
    request_timeout: Option<Duration>,
    transport: TransportStage,
}

impl DetectionPipeline {
    pub fn builder(transport: Arc<dyn Transport>) -> DetectionPipelineBuilder {
        DetectionPipelineBuilder {
            transport,
            request_builder: RequestBuilder::default(),
            request_timeout: None,
        }
    }

    /// Consumes a clone of the pipeline so the returned future is `Send + 'static`.
    pub async fn run(
        self,
        asset: &ImageAsset,
        parameters: &DetectionParameters,
    ) -> Result<Detection, AppError> {
        let encoded = encoder::encode(asset).await?;
        let request = self.request_builder.build(encoded, parameters)?;

        info!(
            "Submitting {} (max_labels={}, confidence={})",
            asset.name(),
            request.max_labels(),
            request.confidence()
        );
        let request_timeout = self.request_timeout;
        let body = self
            .transport
            .oneshot(request)
            .await
            .map_err(|e| transport_error(e, request_timeout))?;

        let detection = normalizer::normalize(&body)?;
        debug!("Pipeline finished for {}", asset.name());
        Ok(detection)
    }
}

fn transport_error(error: BoxError, request_timeout: Option<Duration>) -> AppError {
    match error.downcast::<AppError>() {
        Ok(error) => *error,
        Err(error) if error.is::<Elapsed>() => AppError::Transport {
            status: None,
            message: match request_timeout {
                Some(timeout) => format!("no response within {:?}", timeout),
                None => "request timed out".to_string(),
            },
        },
        Err(error) => AppError::Transport {
            status: None,
            message: error.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::request_builder::Parameter;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    struct CannedTransport {
        response: Value,
        seen: Mutex<Vec<DetectionRequest>>,
    }

    #[async_trait]
    impl Transport for CannedTransport {
        async fn send(&self, request: &DetectionRequest) -> Result<Value, AppError> {
            self.seen.lock().unwrap().push(request.clone());
            Ok(self.response.clone())
        }
    }

    struct SlowTransport;

    #[async_trait]
    impl Transport for SlowTransport {
        async fn send(&self, _request: &DetectionRequest) -> Result<Value, AppError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(json!([]))
        }
    }

    struct FailingTransport;

    #[async_trait]
    impl Transport for FailingTransport {
        async fn send(&self, _request: &DetectionRequest) -> Result<Value, AppError> {
            Err(AppError::Transport {
                status: Some(503),
                message: "Service Unavailable".to_string(),
            })
        }
    }

    fn asset() -> ImageAsset {
        ImageAsset::from_bytes(b"img".to_vec(), Some("image/jpeg"))
    }

    #[tokio::test]
    async fn test_pipeline_runs_all_stages() {
        let transport = Arc::new(CannedTransport {
            response: json!({"statusCode": 200, "body": "[{\"Label\":\"Person\",\"Confidence\":99.23,\"Instances\":[{}]}]"}),
            seen: Mutex::new(Vec::new()),
        });
        let pipeline = DetectionPipeline::builder(transport.clone())
            .request_builder(RequestBuilder::new(10, 80).unwrap())
            .build();

        let detection = pipeline
            .run(&asset(), &DetectionParameters::new(Parameter::Absent, "250"))
            .await
            .unwrap();
        assert!(detection.person.present);
        assert_eq!(detection.person.count, Some(1));

        let seen = transport.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].payload(), "aW1n");
        assert_eq!((seen[0].max_labels(), seen[0].confidence()), (10, 100));
    }

    #[tokio::test]
    async fn test_transport_errors_keep_their_status() {
        let pipeline = DetectionPipeline::builder(Arc::new(FailingTransport)).build();
        let result = pipeline.run(&asset(), &DetectionParameters::default()).await;
        assert!(matches!(
            result,
            Err(AppError::Transport { status: Some(503), .. })
        ));
    }

    #[tokio::test]
    async fn test_request_timeout_is_a_transport_error() {
        let pipeline = DetectionPipeline::builder(Arc::new(SlowTransport))
            .request_timeout(Some(Duration::from_millis(50)))
            .build();
        let result = pipeline.run(&asset(), &DetectionParameters::default()).await;
        assert!(matches!(result, Err(AppError::Transport { status: None, .. })));
    }

    #[tokio::test]
    async fn test_empty_asset_never_reaches_transport() {
        let transport = Arc::new(CannedTransport {
            response: json!([]),
            seen: Mutex::new(Vec::new()),
        });
        let pipeline = DetectionPipeline::builder(transport.clone()).build();
        let result = pipeline
            .run(&ImageAsset::from_bytes(Vec::new(), None), &DetectionParameters::default())
            .await;
        assert!(matches!(result, Err(AppError::EmptyAsset)));
        assert!(transport.seen.lock().unwrap().is_empty());
    }
}
