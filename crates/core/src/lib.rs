// crates/core/src/lib.rs
//! Sans-IO engine of the crowd monitor: wire model, routing, aggregation,
//! lifecycle and directory state, tied together by [`MonitorController`].
pub mod aggregator;
pub mod config;
pub mod connection;
pub mod controller;
pub mod directory;
pub mod error;
pub mod lenient;
pub mod lifecycle;
pub mod message;
pub mod router;
pub mod session;
pub mod types;

pub use aggregator::{RealtimeAggregator, SERIES_CAPACITY};
pub use config::MonitorConfig;
pub use connection::{ConnectionState, ConnectionStatus, ReconnectMachine};
pub use controller::{DashboardView, Effect, MonitorController, Notice};
pub use directory::{DirectoryState, RefreshTicket};
pub use error::*;
pub use lifecycle::{ActiveJob, LifecycleState, SessionLifecycle};
pub use message::{InboundMessage, MessageBody, RealtimeTelemetry};
pub use router::{DropReason, EventRouter, Route, RouterStats};
pub use session::*;
pub use types::*;
