pub mod detection_pipeline;
pub mod encoder;
pub mod normalizer;
pub mod request_builder;
pub mod transport;

pub use detection_pipeline::{DetectionPipeline, DetectionPipelineBuilder};
pub use encoder::EncodedImage;
pub use normalizer::normalize;
pub use request_builder::{DetectionParameters, DetectionRequest, Parameter, RequestBuilder};
pub use transport::{HttpTransport, Transport, TransportService};
