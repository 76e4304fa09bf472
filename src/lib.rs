//! Client for a remote image label-detection service.
//!
//! An image is encoded, posted to the service, and the reply is normalized
//! into a [`Detection`]: the ordered label list plus a person-presence
//! inference. A [`session`] sequences these steps behind an
//! Idle / Loading / Success / Failed state machine for a rendering layer.

pub mod config;
pub mod detection;
pub mod error;
pub mod pipeline;
pub mod render;
pub mod session;

pub use config::Configuration;
pub use detection::{Detection, DetectionResult, ImageAsset, LabelEntry, PersonInference};
pub use error::{AppError, ErrorInfo, ErrorKind};
pub use pipeline::{DetectionParameters, Parameter, Transport};
pub use session::{SessionBuilder, SessionHandle, SessionManager, SessionState, SubmitOutcome};
