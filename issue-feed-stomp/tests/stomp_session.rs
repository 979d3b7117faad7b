/********************************************************************************
 * Copyright (c) 2026 Contributors to the Eclipse Foundation
 *
 * See the NOTICE file(s) distributed with this work for additional
 * information regarding copyright ownership.
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use integration_test_utils::init_logging;
use issue_feed::{CloseReason, ConnectionListener, FeedTransport, FrameListener, TransportError};
use issue_feed_stomp::{StompConfig, StompFrame, StompTransport};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};

type BrokerSocket = WebSocketStream<TcpStream>;

const WAIT: Duration = Duration::from_secs(5);

struct RecordingConnection {
    reasons: mpsc::UnboundedSender<CloseReason>,
}

#[async_trait]
impl ConnectionListener for RecordingConnection {
    async fn on_close(&self, reason: CloseReason) {
        let _ = self.reasons.send(reason);
    }

    async fn on_error(&self, err: TransportError) {
        let _ = self.reasons.send(CloseReason::Failure(err));
    }
}

struct RecordingFrames {
    frames: mpsc::UnboundedSender<(String, String)>,
}

#[async_trait]
impl FrameListener for RecordingFrames {
    async fn on_frame(&self, topic: &str, body: &str) {
        let _ = self.frames.send((topic.to_string(), body.to_string()));
    }
}

fn connection_listener() -> (Arc<RecordingConnection>, mpsc::UnboundedReceiver<CloseReason>) {
    let (reasons, rx) = mpsc::unbounded_channel();
    (Arc::new(RecordingConnection { reasons }), rx)
}

/// Accepts one WebSocket client on a free port and hands it to `script`.
async fn start_broker<F, Fut>(script: F) -> String
where
    F: FnOnce(BrokerSocket) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = accept_async(stream).await.unwrap();
        script(ws).await;
    });
    format!("ws://{addr}/ws")
}

async fn next_frame(ws: &mut BrokerSocket) -> Option<StompFrame> {
    while let Some(Ok(message)) = ws.next().await {
        if let Message::Text(text) = message {
            if let Ok(Some(frame)) = StompFrame::decode(&text) {
                return Some(frame);
            }
        }
    }
    None
}

async fn send_frame(ws: &mut BrokerSocket, frame: StompFrame) {
    ws.send(Message::Text(frame.encode())).await.unwrap();
}

async fn accept_connect(ws: &mut BrokerSocket, heart_beat: &str) -> StompFrame {
    let connect = next_frame(ws).await.expect("CONNECT frame");
    send_frame(
        ws,
        StompFrame::new("CONNECTED")
            .with_header("version", "1.2")
            .with_header("heart-beat", heart_beat),
    )
    .await;
    connect
}

#[tokio::test]
async fn session_subscribes_dispatches_and_disconnects() {
    init_logging();
    let (seen_tx, mut seen) = mpsc::unbounded_channel::<StompFrame>();
    let endpoint = start_broker(move |mut ws| async move {
        let connect = accept_connect(&mut ws, "0,0").await;
        let _ = seen_tx.send(connect);

        let subscribe = next_frame(&mut ws).await.expect("SUBSCRIBE frame");
        let id = subscribe.header("id").unwrap_or_default().to_string();
        let _ = seen_tx.send(subscribe);
        send_frame(
            &mut ws,
            StompFrame::new("MESSAGE")
                .with_header("subscription", id)
                .with_header("destination", "/topic/issues/42/comments")
                .with_header("message-id", "m-1")
                .with_body(r#"{"eventType":"CREATED","issueId":42,"commentId":1}"#),
        )
        .await;
        send_frame(
            &mut ws,
            StompFrame::new("MESSAGE")
                .with_header("subscription", "sub-unknown")
                .with_body("{}"),
        )
        .await;

        while let Some(frame) = next_frame(&mut ws).await {
            let _ = seen_tx.send(frame);
        }
    })
    .await;

    let transport = StompTransport::default();
    let (listener, mut reasons) = connection_listener();
    transport
        .open(&endpoint, Duration::ZERO, listener)
        .await
        .expect("handshake succeeds");

    let connect = tokio::time::timeout(WAIT, seen.recv()).await.unwrap().unwrap();
    assert_eq!(connect.command, "CONNECT");
    assert_eq!(connect.header("accept-version"), Some("1.2"));
    assert_eq!(connect.header("host"), Some("127.0.0.1"));
    assert_eq!(connect.header("heart-beat"), Some("0,0"));

    let (frames_tx, mut frames) = mpsc::unbounded_channel();
    let wire_id = transport
        .subscribe(
            "/topic/issues/42/comments",
            Arc::new(RecordingFrames { frames: frames_tx }),
        )
        .await
        .expect("subscribe while open");
    assert_eq!(wire_id.as_str(), "sub-0");

    let subscribe = tokio::time::timeout(WAIT, seen.recv()).await.unwrap().unwrap();
    assert_eq!(subscribe.command, "SUBSCRIBE");
    assert_eq!(subscribe.header("destination"), Some("/topic/issues/42/comments"));

    let (topic, body) = tokio::time::timeout(WAIT, frames.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(topic, "/topic/issues/42/comments");
    assert!(body.contains("\"commentId\":1"));

    transport
        .send("/app/issues/42/typing", r#"{"userId":3}"#)
        .await
        .expect("send while open");
    let sent = tokio::time::timeout(WAIT, seen.recv()).await.unwrap().unwrap();
    assert_eq!(sent.command, "SEND");
    assert_eq!(sent.header("destination"), Some("/app/issues/42/typing"));
    assert_eq!(sent.header("content-type"), Some("application/json"));
    assert_eq!(sent.body, r#"{"userId":3}"#);

    transport.unsubscribe(&wire_id).await.expect("unsubscribe");
    let unsubscribe = tokio::time::timeout(WAIT, seen.recv()).await.unwrap().unwrap();
    assert_eq!(unsubscribe.command, "UNSUBSCRIBE");
    assert_eq!(unsubscribe.header("id"), Some("sub-0"));
    assert!(matches!(
        transport.unsubscribe(&wire_id).await,
        Err(TransportError::Protocol(_))
    ));

    transport.close().await.expect("close open session");
    let disconnect = tokio::time::timeout(WAIT, seen.recv()).await.unwrap().unwrap();
    assert_eq!(disconnect.command, "DISCONNECT");

    // A local close is never reported as a connection loss.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(reasons.try_recv().is_err());
    assert_eq!(transport.close().await, Err(TransportError::NotConnected));
}

#[tokio::test]
async fn error_frame_during_handshake_refuses_the_connection() {
    init_logging();
    let endpoint = start_broker(|mut ws| async move {
        let _connect = next_frame(&mut ws).await;
        send_frame(
            &mut ws,
            StompFrame::new("ERROR").with_header("message", "bad credentials"),
        )
        .await;
    })
    .await;

    let transport = StompTransport::new(StompConfig {
        login: Some("dana".to_string()),
        passcode: Some("wrong".to_string()),
        ..StompConfig::default()
    });
    let (listener, _reasons) = connection_listener();

    let result = transport.open(&endpoint, Duration::ZERO, listener).await;

    assert_eq!(
        result,
        Err(TransportError::ConnectionRefused("bad credentials".to_string()))
    );
}

#[tokio::test]
async fn unreachable_endpoint_is_refused() {
    init_logging();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let transport = StompTransport::new(StompConfig {
        connect_timeout: Duration::from_secs(2),
        ..StompConfig::default()
    });
    let (connection, _reasons) = connection_listener();

    let result = transport
        .open(&format!("ws://{addr}/ws"), Duration::ZERO, connection)
        .await;

    assert!(matches!(result, Err(TransportError::ConnectionRefused(_))));
}

#[tokio::test]
async fn server_close_is_reported_once() {
    init_logging();
    let endpoint = start_broker(|mut ws| async move {
        accept_connect(&mut ws, "0,0").await;
        let _ = ws.close(None).await;
    })
    .await;

    let transport = StompTransport::default();
    let (listener, mut reasons) = connection_listener();
    transport
        .open(&endpoint, Duration::ZERO, listener)
        .await
        .unwrap();

    let reason = tokio::time::timeout(WAIT, reasons.recv()).await.unwrap();
    assert_eq!(reason, Some(CloseReason::ServerClosed));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(reasons.try_recv().is_err());
    assert!(transport.send("/app/x", "{}").await.is_err());
}

#[tokio::test]
async fn silent_broker_trips_the_heartbeat_watchdog() {
    init_logging();
    let endpoint = start_broker(|mut ws| async move {
        accept_connect(&mut ws, "50,50").await;
        // Keep reading client heart-beats but never answer.
        while let Some(Ok(_)) = ws.next().await {}
    })
    .await;

    let transport = StompTransport::default();
    let (listener, mut reasons) = connection_listener();
    transport
        .open(&endpoint, Duration::from_millis(50), listener)
        .await
        .unwrap();

    let reason = tokio::time::timeout(WAIT, reasons.recv()).await.unwrap();
    assert_eq!(
        reason,
        Some(CloseReason::Failure(TransportError::HeartbeatTimeout))
    );
    transport.close().await.expect("session still held until closed");
}

#[tokio::test]
async fn error_frame_after_connect_ends_the_session() {
    init_logging();
    let endpoint = start_broker(|mut ws| async move {
        accept_connect(&mut ws, "0,0").await;
        send_frame(
            &mut ws,
            StompFrame::new("ERROR").with_header("message", "destination forbidden"),
        )
        .await;
        while let Some(Ok(_)) = ws.next().await {}
    })
    .await;

    let transport = StompTransport::default();
    let (listener, mut reasons) = connection_listener();
    transport
        .open(&endpoint, Duration::ZERO, listener)
        .await
        .unwrap();

    let reason = tokio::time::timeout(WAIT, reasons.recv()).await.unwrap();
    assert_eq!(
        reason,
        Some(CloseReason::Failure(TransportError::Protocol(
            "destination forbidden".to_string()
        )))
    );
}
