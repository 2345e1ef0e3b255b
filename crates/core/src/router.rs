// crates/core/src/router.rs
//! Event routing: decide what each inbound frame means for the tracked job.

use serde::Serialize;
use tracing::debug;

use crate::error::MessageError;
use crate::message::{InboundMessage, MessageBody, RealtimeTelemetry};
use crate::session::FinalAnalysis;
use crate::types::JobId;

/// Where a message goes after routing.
#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    /// Realtime telemetry for the aggregator.
    Telemetry(RealtimeTelemetry),
    /// Completion signal for the lifecycle controller.
    Completed {
        job_id: Option<JobId>,
        analysis: Option<FinalAnalysis>,
        output_url_base: Option<String>,
    },
    /// Failure signal for the lifecycle controller.
    Failed { job_id: Option<JobId>, error: String },
    /// Not for us, or not understood.
    Dropped(DropReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    ForeignJob { job_id: Option<JobId> },
    Malformed(String),
}

/// Running counters of what the router has seen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouterStats {
    pub routed: u64,
    pub foreign: u64,
    pub malformed: u64,
}

/// Classifies inbound frames against the active job.
///
/// Matching is deliberately loose: with no active job every message is
/// accepted, because the first realtime frames of a new job can arrive before
/// the upload response that names it.
#[derive(Debug, Default)]
pub struct EventRouter {
    stats: RouterStats,
}

impl EventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> RouterStats {
        self.stats
    }

    /// Route a raw text frame. Never fails: protocol errors become drops.
    pub fn route_text(&mut self, text: &str, active: Option<&JobId>) -> Route {
        self.route_decoded(InboundMessage::parse(text), active)
    }

    /// Route a raw binary frame.
    pub fn route_bytes(&mut self, bytes: &[u8], active: Option<&JobId>) -> Route {
        self.route_decoded(InboundMessage::parse_bytes(bytes), active)
    }

    fn route_decoded(
        &mut self,
        decoded: Result<InboundMessage, MessageError>,
        active: Option<&JobId>,
    ) -> Route {
        match decoded {
            Ok(msg) => self.route(msg, active),
            Err(e) => {
                self.stats.malformed += 1;
                debug!(error = %e, "dropping malformed stream message");
                Route::Dropped(DropReason::Malformed(e.to_string()))
            }
        }
    }

    /// Route an already-decoded message.
    pub fn route(&mut self, msg: InboundMessage, active: Option<&JobId>) -> Route {
        if !matches_active(msg.job_id.as_ref(), active) {
            self.stats.foreign += 1;
            debug!(
                job_id = ?msg.job_id,
                active = ?active,
                kind = msg.body.kind(),
                "dropping message for another job"
            );
            return Route::Dropped(DropReason::ForeignJob { job_id: msg.job_id });
        }

        self.stats.routed += 1;
        match msg.body {
            MessageBody::Realtime(telemetry) => Route::Telemetry(telemetry),
            MessageBody::Completed {
                analysis,
                output_url_base,
            } => Route::Completed {
                job_id: msg.job_id,
                analysis,
                output_url_base,
            },
            MessageBody::Failed { error } => Route::Failed {
                job_id: msg.job_id,
                error,
            },
        }
    }
}

/// "Active id unset OR equal".
fn matches_active(job_id: Option<&JobId>, active: Option<&JobId>) -> bool {
    match active {
        None => true,
        Some(active) => job_id == Some(active),
    }
}
