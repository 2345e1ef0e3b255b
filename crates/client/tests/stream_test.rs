//! Reconnect behaviour of the stream manager against a raw WebSocket server.

use std::time::Duration;

use crowdwatch_client::{spawn_stream, StreamFrame, StreamHandle};
use crowdwatch_core::ConnectionState;
use futures_util::SinkExt;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

const DELAY: Duration = Duration::from_millis(50);

fn ws_url(addr: std::net::SocketAddr) -> Url {
    Url::parse(&format!("ws://{addr}/ws")).unwrap()
}

/// Helper: accept one WebSocket client, send `texts`, then close.
async fn serve_once(listener: &TcpListener, texts: &[&str]) {
    let (tcp, _) = listener.accept().await.unwrap();
    let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
    for text in texts {
        ws.send(Message::Text((*text).into())).await.unwrap();
    }
    ws.close(None).await.unwrap();
}

/// Helper: next frame with a timeout.
async fn recv_frame(handle: &mut StreamHandle) -> Option<StreamFrame> {
    tokio::time::timeout(Duration::from_secs(5), handle.frames.recv())
        .await
        .ok()
        .flatten()
}

async fn wait_for_state(handle: &mut StreamHandle, wanted: ConnectionState) {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if handle.state.borrow_and_update().state == wanted {
                return;
            }
            handle.state.changed().await.unwrap();
        }
    })
    .await
    .unwrap_or_else(|_| panic!("stream never reached {wanted}"));
}

#[tokio::test]
async fn frames_keep_flowing_across_reconnects() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let mut handle = spawn_stream(ws_url(listener.local_addr().unwrap()), DELAY);

    serve_once(&listener, &["first"]).await;
    assert_eq!(recv_frame(&mut handle).await, Some(StreamFrame::Text("first".into())));

    // Same receiver, second connection.
    serve_once(&listener, &["second", "third"]).await;
    assert_eq!(recv_frame(&mut handle).await, Some(StreamFrame::Text("second".into())));
    assert_eq!(recv_frame(&mut handle).await, Some(StreamFrame::Text("third".into())));
}

#[tokio::test]
async fn state_goes_closed_then_open_again() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let mut handle = spawn_stream(ws_url(listener.local_addr().unwrap()), DELAY);

    let (tcp, _) = listener.accept().await.unwrap();
    let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
    wait_for_state(&mut handle, ConnectionState::Open).await;

    ws.close(None).await.unwrap();
    drop(ws);
    wait_for_state(&mut handle, ConnectionState::Closed).await;

    let (tcp, _) = listener.accept().await.unwrap();
    let _ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
    wait_for_state(&mut handle, ConnectionState::Open).await;
    assert_eq!(handle.state.borrow().generation, 2);
}

#[tokio::test]
async fn unreachable_endpoint_is_retried_until_it_comes_up() {
    // Reserve a port, then free it so the first attempts are refused.
    let probe = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = probe.local_addr().unwrap();
    drop(probe);

    let mut handle = spawn_stream(ws_url(addr), DELAY);
    wait_for_state(&mut handle, ConnectionState::Closed).await;
    tokio::time::sleep(DELAY * 4).await;
    assert_ne!(handle.state.borrow().state, ConnectionState::Open);

    let listener = TcpListener::bind(addr).await.unwrap();
    serve_once(&listener, &["finally"]).await;
    assert_eq!(recv_frame(&mut handle).await, Some(StreamFrame::Text("finally".into())));
}

#[tokio::test]
async fn binary_frames_are_forwarded_and_control_frames_are_not() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let mut handle = spawn_stream(ws_url(listener.local_addr().unwrap()), DELAY);

    let (tcp, _) = listener.accept().await.unwrap();
    let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
    ws.send(Message::Ping(vec![1, 2].into())).await.unwrap();
    ws.send(Message::Binary(br#"{"type":"failed"}"#.to_vec().into()))
        .await
        .unwrap();

    assert_eq!(
        recv_frame(&mut handle).await,
        Some(StreamFrame::Binary(br#"{"type":"failed"}"#.to_vec()))
    );
}
