// crates/client/src/lib.rs
//! IO shell around `crowdwatch-core`: the WebSocket stream manager, the REST
//! backend client, and the monitor loop that executes controller effects.
pub mod backend;
pub mod error;
pub mod monitor;
pub mod stream;

pub use backend::BackendClient;
pub use error::ClientError;
pub use monitor::{spawn_monitor, MonitorCommand, MonitorHandle, MonitorStopped};
pub use stream::{spawn_stream, StreamFrame, StreamHandle};
