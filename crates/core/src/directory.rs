// crates/core/src/directory.rs
//! Client-side view of the backend session directory.
//!
//! Holds the last applied session list and the currently selected detail
//! bundle. Responses arrive out of band, so every apply is guarded: list
//! responses by refresh ticket, detail responses by the selected id.

use serde::Serialize;
use tracing::debug;

use crate::session::{SessionDetail, SessionSummary};
use crate::types::SessionId;

/// Identifies one directory refresh. Later tickets compare greater.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct RefreshTicket(u64);

impl RefreshTicket {
    pub fn get(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Default)]
pub struct DirectoryState {
    sessions: Vec<SessionSummary>,
    issued: u64,
    applied: Option<RefreshTicket>,
    selected: Option<SessionId>,
    detail: Option<SessionDetail>,
}

impl DirectoryState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a refresh and hand back the ticket its response must carry.
    pub fn issue_refresh(&mut self) -> RefreshTicket {
        self.issued += 1;
        RefreshTicket(self.issued)
    }

    /// Apply a list response. Returns false when a newer list is already in
    /// place. Backend order is kept as-is.
    pub fn apply_list(&mut self, ticket: RefreshTicket, sessions: Vec<SessionSummary>) -> bool {
        if self.applied.is_some_and(|applied| ticket <= applied) {
            debug!(
                ticket = ticket.0,
                applied = ?self.applied.map(RefreshTicket::get),
                "discarding stale session list"
            );
            return false;
        }
        self.applied = Some(ticket);
        self.sessions = sessions;
        true
    }

    /// Select a session for the detail view. Any detail for a previous
    /// selection is dropped immediately.
    pub fn select(&mut self, id: SessionId) {
        self.detail = None;
        self.selected = Some(id);
    }

    /// Back to the dashboard view.
    pub fn deselect(&mut self) {
        self.selected = None;
        self.detail = None;
    }

    /// Apply a detail response fetched for `id`. Ignored unless `id` is still
    /// the selected session.
    pub fn apply_detail(&mut self, id: &SessionId, detail: SessionDetail) -> bool {
        if self.selected.as_ref() != Some(id) {
            debug!(session_id = %id, selected = ?self.selected, "discarding detail for abandoned selection");
            return false;
        }
        self.detail = Some(detail);
        true
    }

    /// A detail fetch for `id` failed. Returns true when that was the
    /// selected session, which is then deselected.
    pub fn detail_failed(&mut self, id: &SessionId) -> bool {
        if self.selected.as_ref() != Some(id) {
            return false;
        }
        self.deselect();
        true
    }

    /// A session was deleted on the backend. Returns true when it was the
    /// selected one, which is then deselected.
    pub fn session_deleted(&mut self, id: &SessionId) -> bool {
        if self.selected.as_ref() == Some(id) {
            self.deselect();
            true
        } else {
            false
        }
    }

    pub fn sessions(&self) -> &[SessionSummary] {
        &self.sessions
    }

    pub fn selected(&self) -> Option<&SessionId> {
        self.selected.as_ref()
    }

    pub fn detail(&self) -> Option<&SessionDetail> {
        self.detail.as_ref()
    }

    /// True while a selection is waiting for its detail response.
    pub fn detail_pending(&self) -> bool {
        self.selected.is_some() && self.detail.is_none()
    }
}
