use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::Configuration;
use crate::detection::ImageAsset;
use crate::error::AppError;
use crate::pipeline::{
    DetectionParameters, DetectionPipeline, HttpTransport, RequestBuilder, Transport,
};
use crate::session::state::{SessionState, SessionStats, SubmitOutcome};
use crate::session::supervisor::{Completion, SessionCommand, SessionSupervisor};

/// Cloneable front door to a running session.
#[derive(Clone)]
pub struct SessionHandle {
    session_id: Uuid,
    command_tx: mpsc::Sender<SessionCommand>,
    state_rx: watch::Receiver<SessionState>,
}

impl SessionHandle {
    pub fn id(&self) -> Uuid {
        self.session_id
    }

    pub async fn select_asset(&self, asset: ImageAsset) -> Result<(), AppError> {
        self.request(|responder| SessionCommand::SelectAsset { asset, responder })
            .await
    }

    /// Starts a submission unless one is already loading. Rejections leave
    /// the state untouched and issue no request.
    pub async fn submit(&self, parameters: DetectionParameters) -> Result<SubmitOutcome, AppError> {
        self.request(|responder| SessionCommand::Submit {
            parameters,
            responder,
        })
        .await
    }

    pub async fn clear(&self) -> Result<(), AppError> {
        self.request(|responder| SessionCommand::Clear { responder })
            .await
    }

    pub async fn selected(&self) -> Result<Option<ImageAsset>, AppError> {
        self.request(|responder| SessionCommand::Selected { responder })
            .await
    }

    pub async fn stats(&self) -> Result<SessionStats, AppError> {
        self.request(|responder| SessionCommand::Stats { responder })
            .await
    }

    pub fn state(&self) -> SessionState {
        self.state_rx.borrow().clone()
    }

    /// Receiver for the rendering layer; every transition is published here.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }

    /// Waits until the session is no longer loading and returns that state.
    pub async fn wait_until_settled(&self) -> Result<SessionState, AppError> {
        let mut state_rx = self.state_rx.clone();
        let state = state_rx
            .wait_for(|state| !state.is_loading())
            .await
            .map_err(|_| AppError::SessionClosed)?;
        Ok(state.clone())
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> SessionCommand,
    ) -> Result<T, AppError> {
        let (responder, response_rx) = oneshot::channel();
        self.command_tx
            .send(command(responder))
            .await
            .map_err(|_| AppError::SessionClosed)?;
        response_rx.await.map_err(|_| AppError::SessionClosed)
    }
}

/// Owns the supervisor task. Dropping the manager stops the session.
pub struct SessionManager {
    session_id: Uuid,
    supervisor_task: JoinHandle<()>,
}

impl SessionManager {
    pub fn new(pipeline: DetectionPipeline, command_buffer_size: usize) -> (Self, SessionHandle) {
        let session_id = Uuid::new_v4();
        let (command_tx, mut command_rx) = mpsc::channel::<SessionCommand>(command_buffer_size);
        let (completion_tx, mut completion_rx) = mpsc::channel::<Completion>(command_buffer_size);
        let (state_tx, state_rx) = watch::channel(SessionState::Idle);

        let mut supervisor = SessionSupervisor::new(session_id, pipeline, state_tx, completion_tx);
        let supervisor_task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    command = command_rx.recv() => match command {
                        Some(command) => supervisor.handle_command(command),
                        None => {
                            debug!("Session {}: all handles dropped", session_id);
                            break;
                        }
                    },
                    Some(completion) = completion_rx.recv() => {
                        supervisor.handle_completion(completion);
                    }
                }
            }
        });
        info!("Session {} started", session_id);

        (
            Self {
                session_id,
                supervisor_task,
            },
            SessionHandle {
                session_id,
                command_tx,
                state_rx,
            },
        )
    }

    pub fn id(&self) -> Uuid {
        self.session_id
    }

    pub fn stop(&self) {
        self.supervisor_task.abort();
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.stop();
    }
}

pub struct SessionBuilder {
    configuration: Configuration,
    request_timeout: Option<Duration>,
    transport: Option<Arc<dyn Transport>>,
}

impl SessionBuilder {
    pub fn new(configuration: Configuration) -> Self {
        Self {
            request_timeout: configuration.request_timeout(),
            configuration,
            transport: None,
        }
    }

    // Sets the detection endpoint, this will override the configuration.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.configuration.endpoint = endpoint.into();
        self
    }

    // Default used when the user leaves max labels blank or unparseable.
    pub fn max_labels(mut self, max_labels: u32) -> Self {
        self.configuration.max_labels = max_labels;
        self
    }

    // Default used when the user leaves confidence blank or unparseable.
    pub fn confidence(mut self, confidence: u32) -> Self {
        self.configuration.confidence = confidence;
        self
    }

    pub fn remove_people(mut self, remove_people: bool) -> Self {
        self.configuration.remove_people = remove_people;
        self
    }

    pub fn request_timeout(mut self, request_timeout: Option<Duration>) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    pub fn command_buffer_size(mut self, command_buffer_size: usize) -> Self {
        self.configuration.command_buffer_size = command_buffer_size;
        self
    }

    /// Replaces the HTTP transport, e.g. with a scripted one in tests.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn build(self) -> Result<(SessionManager, SessionHandle), AppError> {
        self.configuration.validate()?;
        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new(&self.configuration.endpoint)?),
        };
        let pipeline = DetectionPipeline::builder(transport)
            .request_builder(RequestBuilder::from_configuration(&self.configuration)?)
            .request_timeout(self.request_timeout)
            .build();
        Ok(SessionManager::new(
            pipeline,
            self.configuration.command_buffer_size,
        ))
    }
}
