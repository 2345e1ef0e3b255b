// crates/core/src/lifecycle.rs
//! Session lifecycle: idle → uploading → processing → completed/failed.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::LifecycleError;
use crate::session::{FinalAnalysis, UploadAccepted};
use crate::types::JobId;

/// The job the monitor is currently tracking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveJob {
    pub job_id: JobId,
    pub filename: String,
}

/// High-level monitor state.
///
/// Failure is transient: it is surfaced to the user and the state returns to
/// `Idle`, so there is no `Failed` variant to get stuck in.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LifecycleState {
    #[default]
    Idle,
    Uploading {
        filename: String,
    },
    Processing,
    Completed {
        #[serde(skip_serializing_if = "Option::is_none")]
        analysis: Option<FinalAnalysis>,
        #[serde(skip_serializing_if = "Option::is_none")]
        output_url_base: Option<String>,
    },
}

impl LifecycleState {
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleState::Idle => "idle",
            LifecycleState::Uploading { .. } => "uploading",
            LifecycleState::Processing => "processing",
            LifecycleState::Completed { .. } => "completed",
        }
    }
}

/// Result of feeding a backend signal into the lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// The state changed.
    Moved { from: &'static str, to: &'static str },
    /// The signal does not apply in the current state.
    Ignored { state: &'static str },
}

impl Transition {
    pub fn moved(&self) -> bool {
        matches!(self, Transition::Moved { .. })
    }
}

/// Owns the lifecycle state and the active job id.
///
/// Single writer of the active id; the router only reads it.
#[derive(Debug)]
pub struct SessionLifecycle {
    state: LifecycleState,
    active: Option<ActiveJob>,
    /// An upload request is in flight and has not been answered yet.
    awaiting_accept: bool,
    /// A completion or failure arrived while no job id could be matched.
    unmatched_terminal: bool,
}

impl Default for SessionLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionLifecycle {
    pub fn new() -> Self {
        Self {
            state: LifecycleState::Idle,
            active: None,
            awaiting_accept: false,
            unmatched_terminal: false,
        }
    }

    pub fn state(&self) -> &LifecycleState {
        &self.state
    }

    pub fn active_job(&self) -> Option<&ActiveJob> {
        self.active.as_ref()
    }

    /// The router's filter id.
    pub fn active_job_id(&self) -> Option<&JobId> {
        self.active.as_ref().map(|a| &a.job_id)
    }

    pub fn is_processing(&self) -> bool {
        matches!(self.state, LifecycleState::Processing)
    }

    /// Idle/Completed → Uploading.
    ///
    /// The previous active id stays in place as the router filter until the
    /// backend names the new job.
    pub fn begin_upload(&mut self, filename: impl Into<String>) -> Result<Transition, LifecycleError> {
        match self.state {
            LifecycleState::Idle | LifecycleState::Completed { .. } => {
                let filename = filename.into();
                info!(%filename, "upload started");
                self.awaiting_accept = true;
                self.unmatched_terminal = false;
                Ok(self.move_to(LifecycleState::Uploading { filename }))
            }
            LifecycleState::Uploading { .. } | LifecycleState::Processing => {
                Err(LifecycleError::Busy {
                    state: self.state.name(),
                })
            }
        }
    }

    /// Uploading → Processing, recording the job id as the active filter.
    /// Stream signals seen while uploading never block this.
    pub fn upload_accepted(&mut self, accepted: UploadAccepted) -> Transition {
        if !std::mem::take(&mut self.awaiting_accept) {
            return self.ignore("upload_accepted");
        }
        match self.state {
            LifecycleState::Uploading { .. } => {
                info!(job_id = %accepted.job_id, "upload accepted");
                self.active = Some(ActiveJob {
                    job_id: accepted.job_id,
                    filename: accepted.filename,
                });
                self.move_to(LifecycleState::Processing)
            }
            _ => self.ignore("upload_accepted"),
        }
    }

    /// Whether a terminal signal was seen during the upload, clearing the mark.
    ///
    /// Such a signal may have belonged to any job, so the caller asks the
    /// backend about the accepted one instead of trusting it.
    pub fn take_unmatched_terminal(&mut self) -> bool {
        std::mem::take(&mut self.unmatched_terminal)
    }

    /// Uploading → Idle. No job id is recorded.
    pub fn upload_rejected(&mut self, reason: &str) -> Transition {
        self.awaiting_accept = false;
        match self.state {
            LifecycleState::Uploading { .. } => {
                warn!(%reason, "upload rejected");
                self.move_to(LifecycleState::Idle)
            }
            _ => self.ignore("upload_rejected"),
        }
    }

    /// Processing → Completed.
    pub fn completed(
        &mut self,
        analysis: Option<FinalAnalysis>,
        output_url_base: Option<String>,
    ) -> Transition {
        match self.state {
            LifecycleState::Processing => {
                info!(job_id = ?self.active_job_id(), "processing completed");
                self.move_to(LifecycleState::Completed {
                    analysis,
                    output_url_base,
                })
            }
            LifecycleState::Uploading { .. } => self.unmatched("completed"),
            _ => self.ignore("completed"),
        }
    }

    /// Processing → Idle.
    pub fn failed(&mut self, error: &str) -> Transition {
        match self.state {
            LifecycleState::Processing => {
                warn!(job_id = ?self.active_job_id(), %error, "processing failed");
                self.move_to(LifecycleState::Idle)
            }
            LifecycleState::Uploading { .. } => self.unmatched("failed"),
            _ => self.ignore("failed"),
        }
    }

    fn unmatched(&mut self, signal: &'static str) -> Transition {
        debug!(signal, "terminal signal before the upload response");
        self.unmatched_terminal = true;
        Transition::Ignored {
            state: self.state.name(),
        }
    }

    fn move_to(&mut self, next: LifecycleState) -> Transition {
        let from = self.state.name();
        let to = next.name();
        self.state = next;
        Transition::Moved { from, to }
    }

    fn ignore(&self, signal: &'static str) -> Transition {
        debug!(signal, state = self.state.name(), "lifecycle signal ignored");
        Transition::Ignored {
            state: self.state.name(),
        }
    }
}
