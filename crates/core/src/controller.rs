// crates/core/src/controller.rs
//! The monitor engine.
//!
//! [`MonitorController`] owns the router, the aggregator, the lifecycle and
//! the directory state. It performs no IO: every input is a method call, and
//! any IO the input requires comes back as an [`Effect`] for the caller to
//! execute. Outcomes of that IO are fed back through the matching
//! `*_loaded` / `*_failed` methods.
//!
//! Each method runs to completion before the next one is called, which is
//! what makes telemetry application atomic without locks.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::aggregator::RealtimeAggregator;
use crate::connection::{ConnectionState, ConnectionStatus};
use crate::directory::{DirectoryState, RefreshTicket};
use crate::error::LifecycleError;
use crate::lifecycle::{ActiveJob, LifecycleState, SessionLifecycle};
use crate::message::UNKNOWN_FAILURE;
use crate::router::{EventRouter, Route, RouterStats};
use crate::session::{
    FinalAnalysis, JobPhase, JobStatusReport, SessionDetail, SessionSummary, UploadAccepted,
};
use crate::types::{AnomalyEvidence, FrameSnapshot, JobId, SessionId, TimeSeriesPoint};

/// IO the caller must perform on the controller's behalf.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// `GET /sessions`; report back with the same ticket.
    RefreshDirectory(RefreshTicket),
    /// `GET /sessions/{id}`.
    FetchDetail(SessionId),
    /// `DELETE /sessions/{id}`.
    DeleteSession(SessionId),
    /// `GET /status/{job_id}`.
    ProbeJob(JobId),
    /// Tell the user.
    Notify(Notice),
}

/// Something the user should see once.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "notice", rename_all = "snake_case")]
pub enum Notice {
    UploadFailed {
        message: String,
    },
    JobCompleted {
        job_id: Option<JobId>,
    },
    JobFailed {
        job_id: Option<JobId>,
        error: String,
    },
    SessionDeleted {
        session_id: SessionId,
    },
    RequestFailed {
        operation: &'static str,
        message: String,
    },
}

impl std::fmt::Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Notice::UploadFailed { message } => write!(f, "Upload failed: {message}"),
            Notice::JobCompleted { job_id: Some(id) } => write!(f, "Processing of {id} completed"),
            Notice::JobCompleted { job_id: None } => write!(f, "Processing completed"),
            Notice::JobFailed { error, .. } => write!(f, "Processing failed: {error}"),
            Notice::SessionDeleted { session_id } => write!(f, "Session {session_id} deleted"),
            Notice::RequestFailed { operation, message } => {
                write!(f, "Could not {operation}: {message}")
            }
        }
    }
}

/// Read-only snapshot of everything the presentation layer needs.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardView {
    pub connection: ConnectionState,
    pub lifecycle: LifecycleState,
    pub active_job: Option<ActiveJob>,
    pub snapshot: FrameSnapshot,
    pub series: Vec<TimeSeriesPoint>,
    pub evidence: Vec<AnomalyEvidence>,
    pub sessions: Vec<SessionSummary>,
    pub selected: Option<SessionId>,
    pub detail: Option<SessionDetail>,
    /// A session is selected and its detail has not arrived yet.
    pub detail_loading: bool,
    pub router: RouterStats,
}

#[derive(Debug, Default)]
pub struct MonitorController {
    router: EventRouter,
    aggregator: RealtimeAggregator,
    lifecycle: SessionLifecycle,
    directory: DirectoryState,
    connection: ConnectionStatus,
}

impl MonitorController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Initial directory load.
    pub fn start(&mut self) -> Vec<Effect> {
        self.refresh()
    }

    /// Poll tick or explicit user refresh.
    pub fn refresh(&mut self) -> Vec<Effect> {
        vec![Effect::RefreshDirectory(self.directory.issue_refresh())]
    }

    // ── Stream ────────────────────────────────────────────────────────

    pub fn connection_changed(&mut self, status: ConnectionStatus) -> Vec<Effect> {
        if status == self.connection {
            return Vec::new();
        }
        let previous = std::mem::replace(&mut self.connection, status);
        info!(
            from = %previous.state,
            to = %status.state,
            generation = status.generation,
            "stream connection changed"
        );
        let reopened =
            status.state == ConnectionState::Open && status.generation != previous.generation;

        // Terminal messages sent while we were disconnected are lost; ask the
        // backend where the job stands.
        match (reopened, self.lifecycle.is_processing(), self.lifecycle.active_job_id()) {
            (true, true, Some(job_id)) => {
                debug!(%job_id, "probing job status after reconnect");
                vec![Effect::ProbeJob(job_id.clone())]
            }
            _ => Vec::new(),
        }
    }

    pub fn handle_stream_text(&mut self, text: &str, now: DateTime<Utc>) -> Vec<Effect> {
        let route = self.router.route_text(text, self.lifecycle.active_job_id());
        self.apply_route(route, now)
    }

    pub fn handle_stream_bytes(&mut self, bytes: &[u8], now: DateTime<Utc>) -> Vec<Effect> {
        let route = self.router.route_bytes(bytes, self.lifecycle.active_job_id());
        self.apply_route(route, now)
    }

    fn apply_route(&mut self, route: Route, now: DateTime<Utc>) -> Vec<Effect> {
        match route {
            Route::Telemetry(telemetry) => {
                let outcome = self.aggregator.apply_telemetry(&telemetry, now);
                if outcome.evidence_inserted {
                    info!(
                        frame = telemetry.frame,
                        total = self.aggregator.evidence_len(),
                        "anomaly evidence recorded"
                    );
                }
                if outcome.evicted {
                    debug!(frame = telemetry.frame, "chart window full, oldest point evicted");
                }
                Vec::new()
            }
            Route::Completed {
                job_id,
                analysis,
                output_url_base,
            } => self.complete(job_id, analysis, output_url_base),
            Route::Failed { job_id, error } => self.fail(job_id, error),
            Route::Dropped(_) => Vec::new(),
        }
    }

    fn complete(
        &mut self,
        job_id: Option<JobId>,
        analysis: Option<FinalAnalysis>,
        output_url_base: Option<String>,
    ) -> Vec<Effect> {
        if !self.lifecycle.completed(analysis, output_url_base).moved() {
            return Vec::new();
        }
        let job_id = job_id.or_else(|| self.lifecycle.active_job_id().cloned());
        vec![
            Effect::RefreshDirectory(self.directory.issue_refresh()),
            Effect::Notify(Notice::JobCompleted { job_id }),
        ]
    }

    fn fail(&mut self, job_id: Option<JobId>, error: String) -> Vec<Effect> {
        if !self.lifecycle.failed(&error).moved() {
            return Vec::new();
        }
        let job_id = job_id.or_else(|| self.lifecycle.active_job_id().cloned());
        vec![Effect::Notify(Notice::JobFailed { job_id, error })]
    }

    // ── Upload ────────────────────────────────────────────────────────

    /// Start an upload: clears all realtime state. The caller submits the
    /// payload only when this returns `Ok`.
    pub fn begin_upload(&mut self, filename: &str) -> Result<(), LifecycleError> {
        self.lifecycle.begin_upload(filename)?;
        self.aggregator.reset();
        Ok(())
    }

    pub fn upload_accepted(&mut self, accepted: UploadAccepted) -> Vec<Effect> {
        let job_id = accepted.job_id.clone();
        if !self.lifecycle.upload_accepted(accepted).moved() {
            return Vec::new();
        }
        // A terminal message during the upload may have been this job's.
        if self.lifecycle.take_unmatched_terminal() {
            debug!(%job_id, "probing job status after early terminal message");
            return vec![Effect::ProbeJob(job_id)];
        }
        Vec::new()
    }

    pub fn upload_failed(&mut self, message: impl Into<String>) -> Vec<Effect> {
        let message = message.into();
        if !self.lifecycle.upload_rejected(&message).moved() {
            return Vec::new();
        }
        vec![Effect::Notify(Notice::UploadFailed { message })]
    }

    // ── Job status probe ──────────────────────────────────────────────

    pub fn job_status_loaded(&mut self, job_id: &JobId, report: JobStatusReport) -> Vec<Effect> {
        if self.lifecycle.active_job_id() != Some(job_id) {
            debug!(%job_id, "discarding status report for inactive job");
            return Vec::new();
        }
        match report.status {
            JobPhase::Completed => {
                self.complete(Some(job_id.clone()), report.analysis, report.output_url_base)
            }
            JobPhase::Failed => {
                let error = report
                    .error
                    .filter(|e| !e.is_empty())
                    .unwrap_or_else(|| UNKNOWN_FAILURE.to_string());
                self.fail(Some(job_id.clone()), error)
            }
            phase => {
                debug!(%job_id, ?phase, "job still in flight");
                Vec::new()
            }
        }
    }

    pub fn job_status_failed(&mut self, job_id: &JobId, message: impl Into<String>) -> Vec<Effect> {
        let message = message.into();
        warn!(%job_id, %message, "job status probe failed");
        vec![Effect::Notify(Notice::RequestFailed {
            operation: "check job status",
            message,
        })]
    }

    // ── Directory ─────────────────────────────────────────────────────

    pub fn sessions_loaded(
        &mut self,
        ticket: RefreshTicket,
        sessions: Vec<SessionSummary>,
    ) -> Vec<Effect> {
        if self.directory.apply_list(ticket, sessions) {
            debug!(count = self.directory.sessions().len(), "session list updated");
        }
        Vec::new()
    }

    pub fn sessions_failed(&mut self, ticket: RefreshTicket, message: impl Into<String>) -> Vec<Effect> {
        let message = message.into();
        warn!(ticket = ticket.get(), %message, "session list refresh failed");
        vec![Effect::Notify(Notice::RequestFailed {
            operation: "load sessions",
            message,
        })]
    }

    /// Switch to the detail view of `id`. The previous detail disappears at
    /// once; the new one shows when its fetch lands.
    pub fn open_session(&mut self, id: SessionId) -> Vec<Effect> {
        self.directory.select(id.clone());
        vec![Effect::FetchDetail(id)]
    }

    /// Back to the live dashboard. In-flight detail fetches are not
    /// cancelled; their responses are discarded on arrival.
    pub fn close_session(&mut self) -> Vec<Effect> {
        self.directory.deselect();
        Vec::new()
    }

    pub fn detail_loaded(&mut self, id: &SessionId, detail: SessionDetail) -> Vec<Effect> {
        self.directory.apply_detail(id, detail);
        Vec::new()
    }

    pub fn detail_failed(&mut self, id: &SessionId, message: impl Into<String>) -> Vec<Effect> {
        let message = message.into();
        if !self.directory.detail_failed(id) {
            debug!(session_id = %id, %message, "ignoring failure for abandoned selection");
            return Vec::new();
        }
        warn!(session_id = %id, %message, "session detail fetch failed");
        vec![Effect::Notify(Notice::RequestFailed {
            operation: "load session",
            message,
        })]
    }

    pub fn delete_session(&mut self, id: SessionId) -> Vec<Effect> {
        vec![Effect::DeleteSession(id)]
    }

    pub fn session_deleted(&mut self, id: &SessionId) -> Vec<Effect> {
        if self.directory.session_deleted(id) {
            info!(session_id = %id, "deleted session was on screen; back to dashboard");
        }
        vec![
            Effect::RefreshDirectory(self.directory.issue_refresh()),
            Effect::Notify(Notice::SessionDeleted {
                session_id: id.clone(),
            }),
        ]
    }

    pub fn delete_failed(&mut self, id: &SessionId, message: impl Into<String>) -> Vec<Effect> {
        let message = message.into();
        warn!(session_id = %id, %message, "session delete failed");
        vec![Effect::Notify(Notice::RequestFailed {
            operation: "delete session",
            message,
        })]
    }

    // ── Read side ─────────────────────────────────────────────────────

    pub fn lifecycle(&self) -> &LifecycleState {
        self.lifecycle.state()
    }

    pub fn active_job_id(&self) -> Option<&JobId> {
        self.lifecycle.active_job_id()
    }

    pub fn connection(&self) -> ConnectionState {
        self.connection.state
    }

    pub fn aggregator(&self) -> &RealtimeAggregator {
        &self.aggregator
    }

    pub fn directory(&self) -> &DirectoryState {
        &self.directory
    }

    pub fn router_stats(&self) -> RouterStats {
        self.router.stats()
    }

    pub fn view(&self) -> DashboardView {
        DashboardView {
            connection: self.connection.state,
            lifecycle: self.lifecycle.state().clone(),
            active_job: self.lifecycle.active_job().cloned(),
            snapshot: self.aggregator.snapshot().clone(),
            series: self.aggregator.series().copied().collect(),
            evidence: self.aggregator.evidence().cloned().collect(),
            sessions: self.directory.sessions().to_vec(),
            selected: self.directory.selected().cloned(),
            detail: self.directory.detail().cloned(),
            detail_loading: self.directory.detail_pending(),
            router: self.router.stats(),
        }
    }
}
