/********************************************************************************
 * Copyright (c) 2024 Contributors to the Eclipse Foundation
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

//! Transport adapter seam: the single underlying bidirectional connection.

use async_trait::async_trait;
use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::sync::Arc;
use std::time::Duration;

/// Failures reported by a [`FeedTransport`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TransportError {
    ConnectionRefused(String),
    ConnectionLost(String),
    HeartbeatTimeout,
    Protocol(String),
    NotConnected,
    Closed,
}

impl Display for TransportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::ConnectionRefused(detail) => {
                write!(f, "connection refused: {detail}")
            }
            TransportError::ConnectionLost(detail) => write!(f, "connection lost: {detail}"),
            TransportError::HeartbeatTimeout => write!(f, "heartbeat timeout"),
            TransportError::Protocol(detail) => write!(f, "protocol error: {detail}"),
            TransportError::NotConnected => write!(f, "transport is not connected"),
            TransportError::Closed => write!(f, "transport is closed"),
        }
    }
}

impl Error for TransportError {}

/// Why an open connection ended without the client asking for it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CloseReason {
    ServerClosed,
    Failure(TransportError),
}

impl Display for CloseReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::ServerClosed => write!(f, "server closed the connection"),
            CloseReason::Failure(err) => write!(f, "{err}"),
        }
    }
}

/// Transport-assigned identity of one armed wire subscription.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct WireSubscriptionId(String);

impl WireSubscriptionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for WireSubscriptionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Receives connection-level callbacks for one opened connection.
///
/// Implementations are invoked from transport tasks and must only enqueue work;
/// they may be called while other transport calls are still in flight.
#[async_trait]
pub trait ConnectionListener: Send + Sync {
    async fn on_close(&self, reason: CloseReason);

    async fn on_error(&self, err: TransportError);
}

/// Receives raw frames delivered on one wire subscription.
#[async_trait]
pub trait FrameListener: Send + Sync {
    async fn on_frame(&self, topic: &str, body: &str);
}

/// The single bidirectional connection shared by every registration.
///
/// `open` resolving `Ok` marks the completed handshake. After that, any failure
/// (network error, server close, missing heartbeat) is reported once through the
/// [`ConnectionListener`] passed to `open`. A close reported before `open`
/// returns fails that attempt.
#[async_trait]
pub trait FeedTransport: Send + Sync {
    /// Implementations hold one session: `open` replaces any session an earlier
    /// `open` left behind without reporting it to that session's listener.
    async fn open(
        &self,
        endpoint: &str,
        heartbeat: Duration,
        listener: Arc<dyn ConnectionListener>,
    ) -> Result<(), TransportError>;

    async fn close(&self) -> Result<(), TransportError>;

    async fn send(&self, destination: &str, body: &str) -> Result<(), TransportError>;

    async fn subscribe(
        &self,
        topic: &str,
        listener: Arc<dyn FrameListener>,
    ) -> Result<WireSubscriptionId, TransportError>;

    async fn unsubscribe(&self, subscription: &WireSubscriptionId) -> Result<(), TransportError>;
}
