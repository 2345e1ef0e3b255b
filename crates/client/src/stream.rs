// crates/client/src/stream.rs
//! Stream Connection Manager: one persistent WebSocket to the backend,
//! reconnected forever with a fixed delay.
//!
//! Consumers hold a single [`StreamHandle`] for the life of the monitor. The
//! inbound channel and the state watch survive reconnects, so nobody has to
//! re-subscribe after a drop.

use std::time::Duration;

use crowdwatch_core::{ConnectionStatus, ReconnectMachine};
use futures_util::StreamExt;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use url::Url;

const INBOUND_CAPACITY: usize = 256;

/// A raw inbound data frame. Control frames never leave the task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamFrame {
    Text(String),
    Binary(Vec<u8>),
}

/// Dropping the handle tears the connection down.
pub struct StreamHandle {
    pub state: watch::Receiver<ConnectionStatus>,
    pub frames: mpsc::Receiver<StreamFrame>,
    task: JoinHandle<()>,
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Spawn the connection task on the current runtime.
pub fn spawn_stream(url: Url, reconnect_delay: Duration) -> StreamHandle {
    let machine = ReconnectMachine::new(reconnect_delay);
    let (state_tx, state_rx) = watch::channel(machine.status());
    let (frame_tx, frame_rx) = mpsc::channel(INBOUND_CAPACITY);
    let task = tokio::spawn(run(url, machine, state_tx, frame_tx));
    StreamHandle {
        state: state_rx,
        frames: frame_rx,
        task,
    }
}

async fn run(
    url: Url,
    mut machine: ReconnectMachine,
    state_tx: watch::Sender<ConnectionStatus>,
    frame_tx: mpsc::Sender<StreamFrame>,
) {
    info!(%url, delay_ms = machine.delay().as_millis() as u64, "stream manager starting");
    loop {
        state_tx.send_replace(machine.status());

        match connect_async(url.as_str()).await {
            Ok((mut ws, _response)) => {
                machine.on_open();
                state_tx.send_replace(machine.status());
                info!(%url, connections = machine.opened_count(), "stream connected");

                if !pump(&mut ws, &frame_tx).await {
                    debug!("stream consumer gone, stopping");
                    return;
                }
            }
            Err(e) => {
                warn!(%url, attempt = machine.attempt(), "stream connect failed: {e}");
            }
        }

        let delay = machine.on_close();
        state_tx.send_replace(machine.status());
        if frame_tx.is_closed() {
            debug!("stream consumer gone, stopping");
            return;
        }
        info!(delay_ms = delay.as_millis() as u64, "stream closed, reconnecting");
        tokio::time::sleep(delay).await;
        machine.retry();
    }
}

/// Forward data frames until the socket ends. Returns false when the
/// consumer has gone away.
async fn pump<S>(ws: &mut S, frame_tx: &mpsc::Sender<StreamFrame>) -> bool
where
    S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    while let Some(next) = ws.next().await {
        let frame = match next {
            Ok(Message::Text(text)) => StreamFrame::Text(text.to_string()),
            Ok(Message::Binary(bytes)) => StreamFrame::Binary(bytes.to_vec()),
            Ok(Message::Close(close)) => {
                info!(?close, "stream closed by backend");
                return true;
            }
            Ok(_) => continue,
            Err(e) => {
                warn!("stream read error: {e}");
                return true;
            }
        };
        if frame_tx.send(frame).await.is_err() {
            return false;
        }
    }
    info!("stream ended");
    true
}
