use crate::detection::{Detection, ImageAsset};
use crate::error::ErrorInfo;

/// Observable session state. Only the session supervisor moves between variants.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum SessionState {
    #[default]
    Idle,
    Loading(ImageAsset),
    Success(Detection),
    Failed(ErrorInfo),
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Idle => "Idle",
            SessionState::Loading(_) => "Loading",
            SessionState::Success(_) => "Success",
            SessionState::Failed(_) => "Failed",
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, SessionState::Loading(_))
    }

    pub fn is_settled(&self) -> bool {
        matches!(self, SessionState::Success(_) | SessionState::Failed(_))
    }

    pub fn detection(&self) -> Option<&Detection> {
        match self {
            SessionState::Success(detection) => Some(detection),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&ErrorInfo> {
        match self {
            SessionState::Failed(error) => Some(error),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Moved to Loading; the value is the submission's sequence number.
    Started(u64),
    AlreadyLoading,
    NoAssetSelected,
    /// The selected asset is empty; the session moved straight to Failed.
    EmptyAsset,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub submissions_started: u64,
    pub submissions_rejected: u64,
    pub outcomes_published: u64,
    pub stale_results_discarded: u64,
}
