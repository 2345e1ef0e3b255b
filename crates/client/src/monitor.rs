// crates/client/src/monitor.rs
//! The monitor event loop.
//!
//! One task owns the [`MonitorController`] and feeds it, one event at a time,
//! from the stream, the connection-state watch, the poll interval, user
//! commands, and finished requests. Requests run as spawned tasks and report
//! back through the outcome channel; the loop never awaits one inline.

use std::future::Future;
use std::path::PathBuf;

use chrono::Utc;
use crowdwatch_core::{
    DashboardView, Effect, JobId, JobStatusReport, MonitorConfig, MonitorController, Notice,
    RefreshTicket, SessionDetail, SessionId, SessionSummary, UploadAccepted,
};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::backend::BackendClient;
use crate::error::ClientError;
use crate::stream::{spawn_stream, StreamFrame, StreamHandle};

const COMMAND_CAPACITY: usize = 32;
const OUTCOME_CAPACITY: usize = 64;
const NOTICE_CAPACITY: usize = 64;

/// Things a user can ask the monitor to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorCommand {
    Upload { path: PathBuf },
    Refresh,
    OpenSession(SessionId),
    CloseSession,
    DeleteSession(SessionId),
}

/// A finished request, on its way back into the loop.
#[derive(Debug)]
enum Outcome {
    Upload(Result<UploadAccepted, ClientError>),
    Sessions {
        ticket: RefreshTicket,
        result: Result<Vec<SessionSummary>, ClientError>,
    },
    Detail {
        id: SessionId,
        result: Result<SessionDetail, ClientError>,
    },
    Deleted {
        id: SessionId,
        result: Result<(), ClientError>,
    },
    JobStatus {
        job_id: JobId,
        result: Result<JobStatusReport, ClientError>,
    },
}

#[derive(Debug, thiserror::Error)]
#[error("monitor task has stopped")]
pub struct MonitorStopped;

/// Caller's side of a running monitor.
pub struct MonitorHandle {
    commands: mpsc::Sender<MonitorCommand>,
    view: watch::Receiver<DashboardView>,
    notices: broadcast::Sender<Notice>,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    pub async fn send(&self, command: MonitorCommand) -> Result<(), MonitorStopped> {
        self.commands.send(command).await.map_err(|_| MonitorStopped)
    }

    pub async fn upload(&self, path: impl Into<PathBuf>) -> Result<(), MonitorStopped> {
        self.send(MonitorCommand::Upload { path: path.into() }).await
    }

    pub async fn refresh(&self) -> Result<(), MonitorStopped> {
        self.send(MonitorCommand::Refresh).await
    }

    pub async fn open_session(&self, id: SessionId) -> Result<(), MonitorStopped> {
        self.send(MonitorCommand::OpenSession(id)).await
    }

    pub async fn close_session(&self) -> Result<(), MonitorStopped> {
        self.send(MonitorCommand::CloseSession).await
    }

    pub async fn delete_session(&self, id: SessionId) -> Result<(), MonitorStopped> {
        self.send(MonitorCommand::DeleteSession(id)).await
    }

    /// Latest dashboard state. Each receiver tracks its own "seen" marker.
    pub fn view(&self) -> watch::Receiver<DashboardView> {
        self.view.clone()
    }

    /// Notices published from now on.
    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    /// Stop the loop and the stream connection.
    pub fn shutdown(self) {
        self.task.abort();
    }
}

/// Start the monitor on the current runtime.
pub fn spawn_monitor(config: MonitorConfig) -> Result<MonitorHandle, ClientError> {
    let backend = BackendClient::new(&config)?;
    let stream = spawn_stream(config.stream_url.clone(), config.reconnect_delay);

    let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);
    let (outcome_tx, outcome_rx) = mpsc::channel(OUTCOME_CAPACITY);
    let (view_tx, view_rx) = watch::channel(DashboardView::default());
    let (notice_tx, _) = broadcast::channel(NOTICE_CAPACITY);

    let monitor = Monitor {
        controller: MonitorController::new(),
        backend,
        outcome_tx,
        view_tx,
        notice_tx: notice_tx.clone(),
    };
    let task = tokio::spawn(monitor.run(config, stream, command_rx, outcome_rx));

    Ok(MonitorHandle {
        commands: command_tx,
        view: view_rx,
        notices: notice_tx,
        task,
    })
}

struct Monitor {
    controller: MonitorController,
    backend: BackendClient,
    outcome_tx: mpsc::Sender<Outcome>,
    view_tx: watch::Sender<DashboardView>,
    notice_tx: broadcast::Sender<Notice>,
}

impl Monitor {
    async fn run(
        mut self,
        config: MonitorConfig,
        mut stream: StreamHandle,
        mut commands: mpsc::Receiver<MonitorCommand>,
        mut outcomes: mpsc::Receiver<Outcome>,
    ) {
        info!(
            backend = %config.backend,
            stream = %config.stream_url,
            poll_secs = config.poll_interval.as_secs_f64(),
            "monitor starting"
        );

        let mut poll = tokio::time::interval(config.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately; `start` covers the initial load.
        poll.tick().await;

        let effects = self.controller.start();
        self.execute(effects);
        self.publish();

        loop {
            let effects = tokio::select! {
                Some(frame) = stream.frames.recv() => match frame {
                    StreamFrame::Text(text) => self.controller.handle_stream_text(&text, Utc::now()),
                    StreamFrame::Binary(bytes) => self.controller.handle_stream_bytes(&bytes, Utc::now()),
                },
                Ok(()) = stream.state.changed() => {
                    let status = *stream.state.borrow_and_update();
                    self.controller.connection_changed(status)
                }
                _ = poll.tick() => {
                    debug!("directory poll");
                    self.controller.refresh()
                }
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => {
                        info!("all monitor handles dropped, stopping");
                        break;
                    }
                },
                Some(outcome) = outcomes.recv() => self.handle_outcome(outcome),
            };
            self.execute(effects);
            self.publish();
        }
    }

    fn handle_command(&mut self, command: MonitorCommand) -> Vec<Effect> {
        match command {
            MonitorCommand::Upload { path } => {
                let filename = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string());
                if let Err(e) = self.controller.begin_upload(&filename) {
                    warn!(%filename, "upload refused: {e}");
                    return vec![Effect::Notify(Notice::UploadFailed {
                        message: e.to_string(),
                    })];
                }
                let backend = self.backend.clone();
                self.spawn_request(async move { Outcome::Upload(backend.upload(&path).await) });
                Vec::new()
            }
            MonitorCommand::Refresh => self.controller.refresh(),
            MonitorCommand::OpenSession(id) => self.controller.open_session(id),
            MonitorCommand::CloseSession => self.controller.close_session(),
            MonitorCommand::DeleteSession(id) => self.controller.delete_session(id),
        }
    }

    fn handle_outcome(&mut self, outcome: Outcome) -> Vec<Effect> {
        match outcome {
            Outcome::Upload(Ok(accepted)) => self.controller.upload_accepted(accepted),
            Outcome::Upload(Err(e)) => self.controller.upload_failed(e.to_string()),
            Outcome::Sessions {
                ticket,
                result: Ok(sessions),
            } => self.controller.sessions_loaded(ticket, sessions),
            Outcome::Sessions {
                ticket,
                result: Err(e),
            } => self.controller.sessions_failed(ticket, e.to_string()),
            Outcome::Detail { id, result: Ok(detail) } => self.controller.detail_loaded(&id, detail),
            Outcome::Detail { id, result: Err(e) } => self.controller.detail_failed(&id, e.to_string()),
            Outcome::Deleted { id, result: Ok(()) } => self.controller.session_deleted(&id),
            Outcome::Deleted { id, result: Err(e) } => self.controller.delete_failed(&id, e.to_string()),
            Outcome::JobStatus {
                job_id,
                result: Ok(report),
            } => self.controller.job_status_loaded(&job_id, report),
            Outcome::JobStatus {
                job_id,
                result: Err(e),
            } => self.controller.job_status_failed(&job_id, e.to_string()),
        }
    }

    fn execute(&self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::RefreshDirectory(ticket) => {
                    let backend = self.backend.clone();
                    self.spawn_request(async move {
                        Outcome::Sessions {
                            ticket,
                            result: backend.list_sessions().await,
                        }
                    });
                }
                Effect::FetchDetail(id) => {
                    let backend = self.backend.clone();
                    self.spawn_request(async move {
                        let result = backend.get_detail(&id).await;
                        Outcome::Detail { id, result }
                    });
                }
                Effect::DeleteSession(id) => {
                    let backend = self.backend.clone();
                    self.spawn_request(async move {
                        let result = backend.delete_session(&id).await;
                        Outcome::Deleted { id, result }
                    });
                }
                Effect::ProbeJob(job_id) => {
                    let backend = self.backend.clone();
                    self.spawn_request(async move {
                        let result = backend.job_status(&job_id).await;
                        Outcome::JobStatus { job_id, result }
                    });
                }
                Effect::Notify(notice) => {
                    info!(%notice, "notice");
                    // No subscribers is fine.
                    let _ = self.notice_tx.send(notice);
                }
            }
        }
    }

    fn spawn_request<F>(&self, request: F)
    where
        F: Future<Output = Outcome> + Send + 'static,
    {
        let tx = self.outcome_tx.clone();
        tokio::spawn(async move {
            // The loop only goes away on shutdown; a lost outcome is moot then.
            let _ = tx.send(request.await).await;
        });
    }

    fn publish(&self) {
        let view = self.controller.view();
        self.view_tx.send_if_modified(|current| {
            if *current == view {
                false
            } else {
                *current = view;
                true
            }
        });
    }
}
