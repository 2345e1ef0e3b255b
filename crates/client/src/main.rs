// crates/client/src/main.rs
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crowdwatch_client::{spawn_monitor, BackendClient};
use crowdwatch_core::{DashboardView, JobId, MonitorConfig, SessionId, SessionSummary};
use crowdwatch_observability::{init_tracing, LogConfig, LogFormat};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

#[derive(Parser)]
#[command(name = "crowdwatch", author, version, about = "Live crowd-analysis monitor", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Backend origin; overrides CROWDWATCH_BACKEND
    #[arg(long, global = true, value_name = "URL")]
    backend: Option<String>,

    /// JSON output and JSON logs
    #[arg(long, global = true)]
    json: bool,

    /// Also write logs to a daily-rolling file in DIR
    #[arg(long, global = true, value_name = "DIR")]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Follow the live stream until Ctrl-C
    Watch {
        /// Upload this video as soon as the monitor starts
        #[arg(long, value_name = "FILE")]
        upload: Option<PathBuf>,
        /// Keep the latest live frame preview in this image file
        #[arg(long, value_name = "FILE")]
        preview: Option<PathBuf>,
    },
    /// Session history
    #[command(subcommand)]
    Sessions(SessionsCommand),
    /// Ask the backend where a job stands
    Status { job_id: String },
}

#[derive(Subcommand)]
enum SessionsCommand {
    List,
    Show { id: String },
    Delete { id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    // reqwest and tokio-tungstenite can pull different rustls providers.
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let cli = Cli::parse();
    let _log_guard = init_tracing(&LogConfig {
        format: if cli.json { LogFormat::Json } else { LogFormat::Compact },
        directory: cli.log_file.clone(),
    })?;

    let mut config = MonitorConfig::from_env()?;
    if let Some(origin) = &cli.backend {
        config = config.with_backend(origin)?;
    }

    match cli.command {
        Command::Watch { upload, preview } => watch(config, upload, preview, cli.json).await,
        Command::Sessions(cmd) => sessions(config, cmd, cli.json).await,
        Command::Status { job_id } => {
            let backend = BackendClient::new(&config)?;
            let report = backend.job_status(&JobId::new(job_id)).await?;
            if cli.json {
                print_json(&report)
            } else {
                println!("{:?}", report.status);
                if let Some(error) = report.error {
                    println!("error: {error}");
                }
                if let Some(frame) = report.frame {
                    println!("frame: {frame}");
                }
                Ok(())
            }
        }
    }
}

async fn sessions(config: MonitorConfig, cmd: SessionsCommand, json: bool) -> Result<()> {
    let backend = BackendClient::new(&config)?;
    match cmd {
        SessionsCommand::List => {
            let sessions = backend.list_sessions().await?;
            if json {
                return print_json(&sessions);
            }
            if sessions.is_empty() {
                println!("no sessions");
            }
            for s in &sessions {
                println!("{}", summary_line(s));
            }
        }
        SessionsCommand::Show { id } => {
            let detail = backend.get_detail(&SessionId::new(id)).await?;
            if json {
                return print_json(&detail);
            }
            println!("{}", summary_line(&detail.session));
            println!(
                "  {} trend points, {} abnormal frames",
                detail.trends.len(),
                detail.abnormal_frames.len()
            );
            for e in &detail.abnormal_frames {
                println!(
                    "  frame {:>6}  people {:>3}  violations {:>3}  {}",
                    e.frame_index, e.people_count, e.violation_count, e.evidence_image_ref
                );
            }
        }
        SessionsCommand::Delete { id } => {
            let id = SessionId::new(id);
            backend.delete_session(&id).await?;
            println!("deleted {id}");
        }
    }
    Ok(())
}

async fn watch(
    config: MonitorConfig,
    upload: Option<PathBuf>,
    preview: Option<PathBuf>,
    json: bool,
) -> Result<()> {
    let monitor = spawn_monitor(config)?;
    let mut view = monitor.view();
    let mut notices = monitor.notices();

    if let Some(path) = upload {
        monitor.upload(path).await.context("monitor stopped before upload")?;
    }

    let mut last = Printed::default();
    loop {
        tokio::select! {
            changed = view.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = view.borrow_and_update().clone();
                last.print_changes(&current, json)?;
                if let Some(path) = &preview {
                    last.write_preview(&current, path).await;
                }
            }
            notice = notices.recv() => match notice {
                Ok(notice) if json => print_json(&notice)?,
                Ok(notice) => println!("! {notice}"),
                Err(RecvError::Lagged(n)) => eprintln!("({n} notices skipped)"),
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    monitor.shutdown();
    Ok(())
}

/// What the watch loop last emitted, so it only emits changes.
#[derive(Default)]
struct Printed {
    connection: Option<String>,
    lifecycle: Option<&'static str>,
    evidence: usize,
    sessions: Option<usize>,
    preview_frame: Option<u64>,
}

impl Printed {
    fn print_changes(&mut self, view: &DashboardView, json: bool) -> Result<()> {
        let connection = view.connection.to_string();
        let lifecycle = view.lifecycle.name();
        let changed = self.connection.as_deref() != Some(connection.as_str())
            || self.lifecycle != Some(lifecycle)
            || self.evidence != view.evidence.len()
            || self.sessions != Some(view.sessions.len());
        if !changed {
            return Ok(());
        }

        if json {
            print_json(view)?;
        } else {
            if self.connection.as_deref() != Some(connection.as_str()) {
                println!("stream {connection}");
            }
            if self.lifecycle != Some(lifecycle) {
                match &view.active_job {
                    Some(job) => println!("{lifecycle} ({} {})", job.job_id, job.filename),
                    None => println!("{lifecycle}"),
                }
            }
            for e in view.evidence.iter().skip(self.evidence) {
                println!(
                    "anomaly at frame {} (people {}, violations {}) {}",
                    e.frame_index, e.people_count, e.violation_count, e.evidence_image_ref
                );
            }
            if self.sessions != Some(view.sessions.len()) {
                println!("{} sessions on the backend", view.sessions.len());
            }
        }

        self.connection = Some(connection);
        self.lifecycle = Some(lifecycle);
        self.evidence = view.evidence.len();
        self.sessions = Some(view.sessions.len());
        Ok(())
    }

    async fn write_preview(&mut self, view: &DashboardView, path: &Path) {
        let Some(image) = &view.snapshot.preview_image else {
            return;
        };
        if self.preview_frame == Some(view.snapshot.frame_index) {
            return;
        }
        self.preview_frame = Some(view.snapshot.frame_index);
        let bytes = match image.to_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(frame = view.snapshot.frame_index, "undecodable preview: {e}");
                return;
            }
        };
        if let Err(e) = tokio::fs::write(path, bytes).await {
            warn!(path = %path.display(), "failed to write preview: {e}");
        }
    }
}

fn summary_line(s: &SessionSummary) -> String {
    format!(
        "{:<24} {:<11} {:<28} peak {:>3}  abnormal {:>4}  violations {:>4}  {:.1} fps",
        s.session_id.as_str(),
        format!("{:?}", s.status).to_lowercase(),
        s.display_name(),
        s.metrics.peak_count,
        s.metrics.total_abnormal_frames,
        s.metrics.total_violations,
        s.frame_rate(),
    )
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}
