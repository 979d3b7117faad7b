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

//! Connection lifecycle state machine and reconnection scheduling.

use crate::connection::reconnect::{ReconnectPolicy, RetryDecision};
use crate::connection::state::{ConnectionState, StatusChannel};
use crate::observability::{events, fields};
use crate::registry::subscription_registry::SubscriptionRegistry;
use crate::transport::{CloseReason, ConnectionListener, FeedTransport, TransportError};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const COMPONENT: &str = "connection_manager";

/// Work items serialized through the feed's driver task.
#[derive(Debug)]
pub(crate) enum DriverCommand {
    ConnectionLost {
        generation: u64,
        reason: CloseReason,
    },
    Retry {
        generation: u64,
    },
    Shutdown,
}

/// Who asked for a connection attempt.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum ConnectTrigger {
    Manual,
    Retry(u64),
}

#[derive(Debug)]
pub(crate) enum AttemptOutcome {
    Connected,
    Failed(TransportError),
    Superseded,
}

/// Forwards transport callbacks for one connection generation to the driver.
///
/// Only enqueues; never touches connection or registry state directly.
pub(crate) struct LinkListener {
    generation: u64,
    commands: UnboundedSender<DriverCommand>,
}

impl LinkListener {
    pub(crate) fn new(generation: u64, commands: UnboundedSender<DriverCommand>) -> Self {
        Self {
            generation,
            commands,
        }
    }
}

#[async_trait]
impl ConnectionListener for LinkListener {
    async fn on_close(&self, reason: CloseReason) {
        let _ = self.commands.send(DriverCommand::ConnectionLost {
            generation: self.generation,
            reason,
        });
    }

    async fn on_error(&self, err: TransportError) {
        let _ = self.commands.send(DriverCommand::ConnectionLost {
            generation: self.generation,
            reason: CloseReason::Failure(err),
        });
    }
}

struct ConnectionCycle {
    policy: ReconnectPolicy,
    generation: u64,
    retry: Option<JoinHandle<()>>,
    /// Generation whose transport reported a close before its handshake returned.
    lost_during_handshake: Option<u64>,
    shut_down: bool,
}

impl ConnectionCycle {
    fn cancel_retry(&mut self) {
        if let Some(retry) = self.retry.take() {
            retry.abort();
            debug!(
                event = events::RECONNECT_CANCELLED,
                component = COMPONENT,
                generation = self.generation,
                "cancelled scheduled reconnect"
            );
        }
    }
}

/// Sole owner of the shared transport's open/close lifecycle.
///
/// Every attempt gets a generation number; callbacks and retries carrying an older
/// generation are ignored, so a late close from a replaced connection cannot tear
/// down the current one. Registry flushes and teardowns run while the cycle lock is
/// held, so no new attempt can interleave with them.
pub(crate) struct ConnectionManager {
    endpoint: String,
    heartbeat: Duration,
    transport: Arc<dyn FeedTransport>,
    status: Arc<StatusChannel>,
    registry: Arc<SubscriptionRegistry>,
    cycle: Mutex<ConnectionCycle>,
}

impl ConnectionManager {
    pub(crate) fn new(
        endpoint: &str,
        heartbeat: Duration,
        policy: ReconnectPolicy,
        transport: Arc<dyn FeedTransport>,
        status: Arc<StatusChannel>,
        registry: Arc<SubscriptionRegistry>,
    ) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            heartbeat,
            transport,
            status,
            registry,
            cycle: Mutex::new(ConnectionCycle {
                policy,
                generation: 0,
                retry: None,
                lost_during_handshake: None,
                shut_down: false,
            }),
        }
    }

    /// Moves DISCONNECTED -> CONNECTING. Returns the new generation, or `None`
    /// when an attempt is not warranted (already connecting/connected, stale retry,
    /// shut down).
    pub(crate) async fn begin_attempt(&self, trigger: ConnectTrigger) -> Option<u64> {
        let mut cycle = self.cycle.lock().await;
        if cycle.shut_down {
            return None;
        }

        match trigger {
            ConnectTrigger::Retry(generation) => {
                if generation != cycle.generation {
                    return None;
                }
                cycle.retry = None;
            }
            ConnectTrigger::Manual => {
                if self.status.current() != ConnectionState::Disconnected {
                    return None;
                }
                cycle.cancel_retry();
                if cycle.policy.is_exhausted() {
                    cycle.policy.reset();
                }
            }
        }

        if self.status.current() != ConnectionState::Disconnected {
            return None;
        }

        cycle.generation += 1;
        cycle.lost_during_handshake = None;
        self.status.publish(ConnectionState::Connecting);
        info!(
            event = events::CONNECT_START,
            component = COMPONENT,
            endpoint = self.endpoint.as_str(),
            generation = cycle.generation,
            attempt = cycle.policy.attempt(),
            "opening connection"
        );
        Some(cycle.generation)
    }

    /// Runs the transport handshake without holding the cycle lock.
    pub(crate) async fn open(
        &self,
        listener: Arc<dyn ConnectionListener>,
    ) -> Result<(), TransportError> {
        self.transport
            .open(&self.endpoint, self.heartbeat, listener)
            .await
    }

    pub(crate) async fn complete_attempt(
        &self,
        generation: u64,
        result: Result<(), TransportError>,
    ) -> AttemptOutcome {
        let mut cycle = self.cycle.lock().await;

        if cycle.shut_down || generation != cycle.generation {
            debug!(
                event = events::CONNECT_SUPERSEDED,
                component = COMPONENT,
                generation,
                current_generation = cycle.generation,
                "connection attempt superseded"
            );
            // Statuses only change under this lock: anything but DISCONNECTED means a
            // newer attempt owns the transport, which replaces this session itself.
            if result.is_ok() && self.status.current() == ConnectionState::Disconnected {
                self.close_quietly(fields::REASON_DISCONNECT).await;
            }
            return AttemptOutcome::Superseded;
        }

        let lost_during_handshake = cycle.lost_during_handshake.take() == Some(generation);
        match result {
            Ok(()) if lost_during_handshake => {
                self.status.publish(ConnectionState::Disconnected);
                warn!(
                    event = events::CONNECT_LOST_IN_HANDSHAKE,
                    component = COMPONENT,
                    endpoint = self.endpoint.as_str(),
                    generation,
                    attempt = cycle.policy.attempt(),
                    "connection closed before the handshake completed"
                );
                self.close_quietly(fields::REASON_CONNECTION_LOST).await;
                AttemptOutcome::Failed(TransportError::ConnectionLost(
                    "closed during handshake".to_string(),
                ))
            }
            Ok(()) => {
                cycle.policy.reset();
                self.status.publish(ConnectionState::Connected);
                info!(
                    event = events::CONNECT_OK,
                    component = COMPONENT,
                    endpoint = self.endpoint.as_str(),
                    generation,
                    "connection established"
                );
                self.registry.flush_pending().await;
                AttemptOutcome::Connected
            }
            Err(err) => {
                self.status.publish(ConnectionState::Disconnected);
                warn!(
                    event = events::CONNECT_FAILED,
                    component = COMPONENT,
                    endpoint = self.endpoint.as_str(),
                    generation,
                    attempt = cycle.policy.attempt(),
                    err = %err,
                    "connection attempt failed"
                );
                AttemptOutcome::Failed(err)
            }
        }
    }

    /// CONNECTED -> DISCONNECTED after an unexpected failure: wire subscriptions
    /// go back to pending and the broken transport is closed. Returns `false` for
    /// stale or irrelevant notifications.
    ///
    /// A loss reported while the same generation is still CONNECTING is recorded
    /// and turned into a failed attempt by [`complete_attempt`](Self::complete_attempt).
    pub(crate) async fn connection_lost(&self, generation: u64, reason: &CloseReason) -> bool {
        let mut cycle = self.cycle.lock().await;

        if !cycle.shut_down
            && generation == cycle.generation
            && self.status.current() == ConnectionState::Connecting
        {
            cycle.lost_during_handshake = Some(generation);
            debug!(
                event = events::CONNECT_LOST_IN_HANDSHAKE,
                component = COMPONENT,
                generation,
                reason = %reason,
                "connection closed while handshake is in flight"
            );
            return false;
        }

        if cycle.shut_down
            || generation != cycle.generation
            || self.status.current() != ConnectionState::Connected
        {
            debug!(
                event = events::CONNECTION_LOST_STALE,
                component = COMPONENT,
                generation,
                current_generation = cycle.generation,
                reason = %reason,
                "ignoring connection loss for inactive connection"
            );
            return false;
        }

        self.status.publish(ConnectionState::Disconnected);
        warn!(
            event = events::CONNECTION_LOST,
            component = COMPONENT,
            endpoint = self.endpoint.as_str(),
            generation,
            reason = %reason,
            "connection lost"
        );
        self.registry.disarm_all(false).await;
        self.close_quietly(fields::REASON_CONNECTION_LOST).await;
        true
    }

    /// Consumes one reconnect attempt and schedules the retry on the driver.
    pub(crate) async fn schedule_retry(
        &self,
        generation: u64,
        commands: &UnboundedSender<DriverCommand>,
    ) -> Option<RetryDecision> {
        let mut cycle = self.cycle.lock().await;
        if cycle.shut_down || generation != cycle.generation {
            return None;
        }

        let decision = cycle.policy.next_retry();
        match decision {
            RetryDecision::RetryAfter { delay, attempt } => {
                info!(
                    event = events::RECONNECT_SCHEDULED,
                    component = COMPONENT,
                    generation,
                    attempt,
                    max_attempts = cycle.policy.max_attempts(),
                    delay_ms = delay.as_millis() as u64,
                    "scheduling reconnect"
                );
                let commands = commands.clone();
                cycle.cancel_retry();
                cycle.retry = Some(tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = commands.send(DriverCommand::Retry { generation });
                }));
            }
            RetryDecision::Exhausted => {
                warn!(
                    event = events::RECONNECT_EXHAUSTED,
                    component = COMPONENT,
                    endpoint = self.endpoint.as_str(),
                    max_attempts = cycle.policy.max_attempts(),
                    "reconnect attempts exhausted; waiting for manual connect"
                );
            }
        }
        Some(decision)
    }

    /// Explicit teardown: cancels any scheduled retry, releases the wire
    /// subscriptions while keeping their registrations pending, then closes the
    /// transport. Returns `false` if already disconnected.
    pub(crate) async fn disconnect(&self) -> bool {
        let mut cycle = self.cycle.lock().await;
        cycle.generation += 1;
        cycle.cancel_retry();

        let was_connected = self.status.is_connected();
        if !self.status.publish(ConnectionState::Disconnected) {
            return false;
        }
        self.registry.disarm_all(was_connected).await;
        self.close_quietly(fields::REASON_DISCONNECT).await;
        true
    }

    /// Like [`disconnect`](Self::disconnect) but forgets every registration and
    /// refuses all later attempts.
    pub(crate) async fn shutdown(&self) -> bool {
        let mut cycle = self.cycle.lock().await;
        if cycle.shut_down {
            return false;
        }
        cycle.shut_down = true;
        cycle.generation += 1;
        cycle.cancel_retry();

        let was_connected = self.status.is_connected();
        let was_disconnected = !self.status.publish(ConnectionState::Disconnected);
        self.registry.clear(was_connected).await;
        if !was_disconnected {
            self.close_quietly(fields::REASON_SHUTDOWN).await;
        }
        true
    }

    pub(crate) async fn is_reconnect_exhausted(&self) -> bool {
        self.cycle.lock().await.policy.is_exhausted()
    }

    pub(crate) async fn policy(&self) -> ReconnectPolicy {
        self.cycle.lock().await.policy.clone()
    }

    async fn close_quietly(&self, reason: &'static str) {
        match self.transport.close().await {
            Ok(()) => debug!(
                event = events::DISCONNECT_OK,
                component = COMPONENT,
                endpoint = self.endpoint.as_str(),
                reason,
                "transport closed"
            ),
            Err(err) => debug!(
                event = events::DISCONNECT_FAILED,
                component = COMPONENT,
                endpoint = self.endpoint.as_str(),
                reason,
                err = %err,
                "transport close reported an error"
            ),
        }
    }
}
