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

use crate::frame::{
    StompFrame, CONNECT, CONNECTED, DISCONNECT, ERROR, HEARTBEAT, MESSAGE, RECEIPT, SEND,
    SUBSCRIBE, UNSUBSCRIBE,
};
use crate::observability::{self as events, COMPONENT};
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use issue_feed::{
    CloseReason, ConnectionListener, FeedTransport, FrameListener, TransportError,
    WireSubscriptionId,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const CLOSE_GRACE: Duration = Duration::from_millis(500);

/// Handshake settings for [`StompTransport`].
#[derive(Clone, Debug)]
pub struct StompConfig {
    pub connect_timeout: Duration,
    pub login: Option<String>,
    pub passcode: Option<String>,
}

impl Default for StompConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            login: None,
            passcode: None,
        }
    }
}

struct Route {
    topic: String,
    listener: Arc<dyn FrameListener>,
}

type RouteTable = Mutex<HashMap<String, Route>>;

/// Reports the end of one session to its connection listener at most once.
struct SessionEnd {
    ended: AtomicBool,
    listener: Arc<dyn ConnectionListener>,
}

impl SessionEnd {
    fn is_ended(&self) -> bool {
        self.ended.load(Ordering::SeqCst)
    }

    // Marks the session ended without telling the listener; used for local closes.
    fn silence(&self) {
        self.ended.store(true, Ordering::SeqCst);
    }

    async fn report(&self, reason: CloseReason) {
        if self.ended.swap(true, Ordering::SeqCst) {
            return;
        }
        warn!(
            event = events::SESSION_ENDED,
            component = COMPONENT,
            reason = %reason,
            "stomp session ended"
        );
        self.listener.on_close(reason).await;
    }
}

struct Session {
    outbound: mpsc::UnboundedSender<Message>,
    routes: Arc<RouteTable>,
    end: Arc<SessionEnd>,
    writer: JoinHandle<()>,
    reader: JoinHandle<()>,
    heartbeat: Option<JoinHandle<()>>,
}

impl Session {
    fn push(&self, frame: &StompFrame) -> Result<(), TransportError> {
        if self.end.is_ended() {
            return Err(TransportError::NotConnected);
        }
        self.outbound
            .send(Message::Text(frame.encode()))
            .map_err(|_| TransportError::ConnectionLost("writer stopped".to_string()))
    }

    async fn teardown(mut self) {
        self.end.silence();
        let _ = self
            .outbound
            .send(Message::Text(StompFrame::new(DISCONNECT).encode()));
        let _ = self.outbound.send(Message::Close(None));
        if timeout(CLOSE_GRACE, &mut self.writer).await.is_err() {
            debug!(
                component = COMPONENT,
                "writer did not drain before close grace expired"
            );
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.writer.abort();
        self.reader.abort();
        if let Some(heartbeat) = &self.heartbeat {
            heartbeat.abort();
        }
    }
}

/// [`FeedTransport`] speaking STOMP 1.2 over a WebSocket.
///
/// One `open` creates one session with three tasks: a reader that dispatches
/// `MESSAGE` frames by their `subscription` header and watches for silence, a
/// writer that owns the socket sink, and a heart-beat sender when the broker
/// agreed to one.
pub struct StompTransport {
    config: StompConfig,
    session: Mutex<Option<Session>>,
    next_subscription: AtomicU64,
}

impl Default for StompTransport {
    fn default() -> Self {
        Self::new(StompConfig::default())
    }
}

impl StompTransport {
    pub fn new(config: StompConfig) -> Self {
        Self {
            config,
            session: Mutex::new(None),
            next_subscription: AtomicU64::new(0),
        }
    }

    fn connect_frame(&self, endpoint: &str, heartbeat: Duration) -> StompFrame {
        let millis = heartbeat.as_millis();
        let mut frame = StompFrame::new(CONNECT)
            .with_header("accept-version", "1.2")
            .with_header("host", host_of(endpoint))
            .with_header("heart-beat", format!("{millis},{millis}"));
        if let Some(login) = &self.config.login {
            frame = frame.with_header("login", login.clone());
        }
        if let Some(passcode) = &self.config.passcode {
            frame = frame.with_header("passcode", passcode.clone());
        }
        frame
    }

    async fn handshake(
        &self,
        endpoint: &str,
        heartbeat: Duration,
    ) -> Result<(WsStream, StompFrame), TransportError> {
        let (mut ws, _response) = match timeout(self.config.connect_timeout, connect_async(endpoint))
            .await
        {
            Ok(Ok(pair)) => pair,
            Ok(Err(err)) => return Err(TransportError::ConnectionRefused(err.to_string())),
            Err(_) => {
                return Err(TransportError::ConnectionRefused(format!(
                    "websocket connect timed out after {:?}",
                    self.config.connect_timeout
                )))
            }
        };

        ws.send(Message::Text(self.connect_frame(endpoint, heartbeat).encode()))
            .await
            .map_err(|err| TransportError::ConnectionRefused(err.to_string()))?;

        let connected = timeout(self.config.connect_timeout, await_connected(&mut ws))
            .await
            .map_err(|_| {
                TransportError::ConnectionRefused("no CONNECTED frame before timeout".to_string())
            })??;
        Ok((ws, connected))
    }
}

#[async_trait]
impl FeedTransport for StompTransport {
    async fn open(
        &self,
        endpoint: &str,
        heartbeat: Duration,
        listener: Arc<dyn ConnectionListener>,
    ) -> Result<(), TransportError> {
        let mut slot = self.session.lock().await;
        if let Some(previous) = slot.take() {
            previous.teardown().await;
        }

        let (ws, connected) = match self.handshake(endpoint, heartbeat).await {
            Ok(pair) => pair,
            Err(err) => {
                warn!(
                    event = events::SESSION_REFUSED,
                    component = COMPONENT,
                    endpoint,
                    err = %err,
                    "stomp handshake failed"
                );
                return Err(err);
            }
        };
        let (send_every, expect_within) =
            negotiate_heartbeat(heartbeat, connected.header("heart-beat"));

        let (sink, stream) = ws.split();
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let routes: Arc<RouteTable> = Arc::new(Mutex::new(HashMap::new()));
        let end = Arc::new(SessionEnd {
            ended: AtomicBool::new(false),
            listener,
        });

        let writer = tokio::spawn(write_loop(sink, outbound_rx, end.clone()));
        let reader = tokio::spawn(read_loop(
            stream,
            routes.clone(),
            end.clone(),
            expect_within,
        ));
        let heartbeat_task =
            send_every.map(|interval| tokio::spawn(heartbeat_loop(outbound.clone(), interval)));

        info!(
            event = events::SESSION_OPEN,
            component = COMPONENT,
            endpoint,
            version = connected.header("version").unwrap_or("1.2"),
            send_heartbeat_ms = send_every.map(|d| d.as_millis() as u64).unwrap_or(0),
            expect_heartbeat_ms = expect_within.map(|d| d.as_millis() as u64).unwrap_or(0),
            "stomp session established"
        );

        *slot = Some(Session {
            outbound,
            routes,
            end,
            writer,
            reader,
            heartbeat: heartbeat_task,
        });
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        let session = self.session.lock().await.take();
        let Some(session) = session else {
            return Err(TransportError::NotConnected);
        };
        session.teardown().await;
        info!(
            event = events::SESSION_CLOSE,
            component = COMPONENT,
            "stomp session closed"
        );
        Ok(())
    }

    async fn send(&self, destination: &str, body: &str) -> Result<(), TransportError> {
        let slot = self.session.lock().await;
        let session = slot.as_ref().ok_or(TransportError::NotConnected)?;
        let frame = StompFrame::new(SEND)
            .with_header("destination", destination)
            .with_header("content-type", "application/json")
            .with_header("content-length", body.len().to_string())
            .with_body(body);
        session.push(&frame)
    }

    async fn subscribe(
        &self,
        topic: &str,
        listener: Arc<dyn FrameListener>,
    ) -> Result<WireSubscriptionId, TransportError> {
        let slot = self.session.lock().await;
        let session = slot.as_ref().ok_or(TransportError::NotConnected)?;
        if session.end.is_ended() {
            return Err(TransportError::NotConnected);
        }

        let id = format!(
            "sub-{}",
            self.next_subscription.fetch_add(1, Ordering::SeqCst)
        );
        session.routes.lock().await.insert(
            id.clone(),
            Route {
                topic: topic.to_string(),
                listener,
            },
        );

        let frame = StompFrame::new(SUBSCRIBE)
            .with_header("id", id.clone())
            .with_header("destination", topic)
            .with_header("ack", "auto");
        if let Err(err) = session.push(&frame) {
            session.routes.lock().await.remove(&id);
            return Err(err);
        }
        Ok(WireSubscriptionId::new(id))
    }

    async fn unsubscribe(&self, subscription: &WireSubscriptionId) -> Result<(), TransportError> {
        let slot = self.session.lock().await;
        let session = slot.as_ref().ok_or(TransportError::NotConnected)?;
        if session
            .routes
            .lock()
            .await
            .remove(subscription.as_str())
            .is_none()
        {
            return Err(TransportError::Protocol(format!(
                "unknown subscription {subscription}"
            )));
        }
        session.push(&StompFrame::new(UNSUBSCRIBE).with_header("id", subscription.as_str()))
    }
}

async fn await_connected(ws: &mut WsStream) -> Result<StompFrame, TransportError> {
    while let Some(message) = ws.next().await {
        let text = match message {
            Ok(Message::Text(text)) => text,
            Ok(Message::Binary(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(err) => return Err(TransportError::ConnectionRefused(err.to_string())),
        };
        match StompFrame::decode(&text) {
            Ok(Some(frame)) if frame.command == CONNECTED => return Ok(frame),
            Ok(Some(frame)) if frame.command == ERROR => {
                let detail = frame
                    .header("message")
                    .map(str::to_string)
                    .unwrap_or(frame.body);
                return Err(TransportError::ConnectionRefused(detail));
            }
            Ok(_) => continue,
            Err(err) => return Err(TransportError::Protocol(err.to_string())),
        }
    }
    Err(TransportError::ConnectionRefused(
        "socket closed during stomp handshake".to_string(),
    ))
}

async fn write_loop(
    mut sink: SplitSink<WsStream, Message>,
    mut outbound: mpsc::UnboundedReceiver<Message>,
    end: Arc<SessionEnd>,
) {
    while let Some(message) = outbound.recv().await {
        let closing = matches!(message, Message::Close(_));
        if let Err(err) = sink.send(message).await {
            end.report(CloseReason::Failure(TransportError::ConnectionLost(
                err.to_string(),
            )))
            .await;
            return;
        }
        if closing {
            return;
        }
    }
}

async fn heartbeat_loop(outbound: mpsc::UnboundedSender<Message>, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        if outbound
            .send(Message::Text(HEARTBEAT.to_string()))
            .is_err()
        {
            return;
        }
    }
}

async fn read_loop(
    mut stream: SplitStream<WsStream>,
    routes: Arc<RouteTable>,
    end: Arc<SessionEnd>,
    expect_within: Option<Duration>,
) {
    loop {
        let next = match expect_within {
            // Allow one missed beat before declaring the broker gone.
            Some(interval) => match timeout(interval * 2, stream.next()).await {
                Ok(next) => next,
                Err(_) => {
                    end.report(CloseReason::Failure(TransportError::HeartbeatTimeout))
                        .await;
                    return;
                }
            },
            None => stream.next().await,
        };

        let text = match next {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Binary(bytes))) => String::from_utf8_lossy(&bytes).into_owned(),
            Some(Ok(Message::Close(_))) | None => {
                end.report(CloseReason::ServerClosed).await;
                return;
            }
            Some(Ok(_)) => continue,
            Some(Err(err)) => {
                end.report(CloseReason::Failure(TransportError::ConnectionLost(
                    err.to_string(),
                )))
                .await;
                return;
            }
        };

        if let Err(reason) = dispatch(&text, &routes).await {
            end.report(reason).await;
            return;
        }
    }
}

async fn dispatch(text: &str, routes: &RouteTable) -> Result<(), CloseReason> {
    let frame = match StompFrame::decode(text) {
        Ok(Some(frame)) => frame,
        Ok(None) => return Ok(()),
        Err(err) => {
            warn!(
                event = events::FRAME_UNDECODABLE,
                component = COMPONENT,
                err = %err,
                "dropping undecodable stomp frame"
            );
            return Ok(());
        }
    };

    match frame.command.as_str() {
        MESSAGE => {
            let subscription = frame.header("subscription").unwrap_or_default();
            let target = routes.lock().await.get(subscription).map(|route| {
                let topic = frame
                    .header("destination")
                    .map(str::to_string)
                    .unwrap_or_else(|| route.topic.clone());
                (topic, route.listener.clone())
            });
            match target {
                Some((topic, listener)) => listener.on_frame(&topic, &frame.body).await,
                None => debug!(
                    event = events::FRAME_UNROUTED,
                    component = COMPONENT,
                    subscription,
                    "message for unknown subscription"
                ),
            }
            Ok(())
        }
        ERROR => {
            let detail = frame
                .header("message")
                .map(str::to_string)
                .unwrap_or_else(|| frame.body.clone());
            Err(CloseReason::Failure(TransportError::Protocol(detail)))
        }
        RECEIPT => Ok(()),
        other => {
            debug!(
                event = events::FRAME_IGNORED,
                component = COMPONENT,
                command = other,
                "ignoring stomp frame"
            );
            Ok(())
        }
    }
}

/// Applies the STOMP heart-beat rule to our offer and the broker's `heart-beat` header.
///
/// Returns `(send_every, expect_within)`; `None` disables that direction.
fn negotiate_heartbeat(
    offered: Duration,
    server: Option<&str>,
) -> (Option<Duration>, Option<Duration>) {
    let (server_sends, server_wants) = server
        .and_then(|value| value.split_once(','))
        .and_then(|(sx, sy)| Some((sx.trim().parse::<u64>().ok()?, sy.trim().parse::<u64>().ok()?)))
        .unwrap_or((0, 0));
    let ours = offered.as_millis() as u64;

    let pick = |ours: u64, theirs: u64| {
        (ours != 0 && theirs != 0).then(|| Duration::from_millis(ours.max(theirs)))
    };
    (pick(ours, server_wants), pick(ours, server_sends))
}

/// Virtual host named in the CONNECT frame.
fn host_of(endpoint: &str) -> String {
    let authority = endpoint
        .split_once("://")
        .map_or(endpoint, |(_, rest)| rest)
        .split(['/', '?'])
        .next()
        .unwrap_or_default();
    let host = match authority.strip_prefix('[') {
        Some(v6) => v6.split(']').next().unwrap_or_default(),
        None => authority.split(':').next().unwrap_or_default(),
    };
    if host.is_empty() {
        "localhost".to_string()
    } else {
        host.to_string()
    }
}
