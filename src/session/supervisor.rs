use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::detection::{Detection, ImageAsset};
use crate::error::{AppError, ErrorInfo};
use crate::pipeline::{DetectionParameters, DetectionPipeline};
use crate::session::state::{SessionState, SessionStats, SubmitOutcome};

pub enum SessionCommand {
    SelectAsset {
        asset: ImageAsset,
        responder: oneshot::Sender<()>,
    },
    Submit {
        parameters: DetectionParameters,
        responder: oneshot::Sender<SubmitOutcome>,
    },
    Clear {
        responder: oneshot::Sender<()>,
    },
    Selected {
        responder: oneshot::Sender<Option<ImageAsset>>,
    },
    Stats {
        responder: oneshot::Sender<SessionStats>,
    },
}

/// Result of one pipeline run, tagged with the submission that issued it.
#[derive(Debug)]
pub struct Completion {
    pub sequence: u64,
    pub outcome: Result<Detection, ErrorInfo>,
}

/// Owns the session state. Commands and completions are handled one at a
/// time on the supervisor task, so no locking is needed.
///
/// `in_flight` holds the sequence number of the submission that owns the
/// current Loading state. A completion whose sequence differs is stale and
/// is dropped without touching the state.
pub struct SessionSupervisor {
    session_id: Uuid,
    pipeline: DetectionPipeline,
    state_tx: watch::Sender<SessionState>,
    completion_tx: mpsc::Sender<Completion>,
    selected: Option<ImageAsset>,
    last_sequence: u64,
    in_flight: Option<u64>,
    stats: SessionStats,
}

impl SessionSupervisor {
    pub fn new(
        session_id: Uuid,
        pipeline: DetectionPipeline,
        state_tx: watch::Sender<SessionState>,
        completion_tx: mpsc::Sender<Completion>,
    ) -> Self {
        Self {
            session_id,
            pipeline,
            state_tx,
            completion_tx,
            selected: None,
            last_sequence: 0,
            in_flight: None,
            stats: SessionStats::default(),
        }
    }

    pub fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::SelectAsset { asset, responder } => {
                self.select_asset(asset);
                let _ = responder.send(());
            }
            SessionCommand::Submit {
                parameters,
                responder,
            } => {
                let outcome = self.submit(parameters);
                let _ = responder.send(outcome);
            }
            SessionCommand::Clear { responder } => {
                self.clear();
                let _ = responder.send(());
            }
            SessionCommand::Selected { responder } => {
                let _ = responder.send(self.selected.clone());
            }
            SessionCommand::Stats { responder } => {
                let _ = responder.send(self.stats);
            }
        }
    }

    pub fn handle_completion(&mut self, completion: Completion) {
        if self.in_flight != Some(completion.sequence) {
            self.stats.stale_results_discarded += 1;
            debug!(
                "Session {}: discarding stale result of submission {} (current: {:?})",
                self.session_id, completion.sequence, self.in_flight
            );
            return;
        }

        self.in_flight = None;
        self.stats.outcomes_published += 1;
        let state = match completion.outcome {
            Ok(detection) => {
                info!(
                    "Session {}: submission {} found {} labels",
                    self.session_id,
                    completion.sequence,
                    detection.result.len()
                );
                SessionState::Success(detection)
            }
            Err(error) => {
                warn!(
                    "Session {}: submission {} failed: {}",
                    self.session_id, completion.sequence, error.message
                );
                SessionState::Failed(error)
            }
        };
        self.publish(state);
    }

    fn select_asset(&mut self, asset: ImageAsset) {
        if let Some(sequence) = self.in_flight.take() {
            info!(
                "Session {}: new selection supersedes submission {}",
                self.session_id, sequence
            );
        }
        debug!("Session {}: selected {}", self.session_id, asset.name());
        self.selected = Some(asset);
        self.publish(SessionState::Idle);
    }

    fn submit(&mut self, parameters: DetectionParameters) -> SubmitOutcome {
        if let Some(sequence) = self.in_flight {
            debug!(
                "Session {}: submission {} still loading, ignoring submit",
                self.session_id, sequence
            );
            self.stats.submissions_rejected += 1;
            return SubmitOutcome::AlreadyLoading;
        }
        let Some(asset) = self.selected.clone() else {
            debug!("Session {}: submit without a selected asset", self.session_id);
            self.stats.submissions_rejected += 1;
            return SubmitOutcome::NoAssetSelected;
        };
        if asset.is_known_empty() {
            self.stats.submissions_rejected += 1;
            self.publish(SessionState::Failed(ErrorInfo::from(AppError::EmptyAsset)));
            return SubmitOutcome::EmptyAsset;
        }

        self.last_sequence += 1;
        let sequence = self.last_sequence;
        self.in_flight = Some(sequence);
        self.stats.submissions_started += 1;
        self.publish(SessionState::Loading(asset.clone()));

        let pipeline = self.pipeline.clone();
        let completion_tx = self.completion_tx.clone();
        let session_id = self.session_id;
        tokio::spawn(async move {
            let outcome = pipeline
                .run(&asset, &parameters)
                .await
                .map_err(|e| ErrorInfo::from(&e));
            if completion_tx
                .send(Completion { sequence, outcome })
                .await
                .is_err()
            {
                debug!(
                    "Session {} stopped before submission {} completed",
                    session_id, sequence
                );
            }
        });

        SubmitOutcome::Started(sequence)
    }

    fn clear(&mut self) {
        if self.in_flight.is_none() && *self.state_tx.borrow() == SessionState::Idle {
            debug!("Session {}: already idle, nothing to clear", self.session_id);
            return;
        }
        if let Some(sequence) = self.in_flight.take() {
            info!(
                "Session {}: clear discards submission {}",
                self.session_id, sequence
            );
        }
        self.selected = None;
        self.publish(SessionState::Idle);
    }

    fn publish(&self, state: SessionState) {
        let previous = self.state_tx.send_replace(state);
        debug!(
            "Session {}: {} -> {}",
            self.session_id,
            previous.name(),
            self.state_tx.borrow().name()
        );
    }
}
