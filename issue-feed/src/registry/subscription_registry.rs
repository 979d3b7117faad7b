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

//! Refcounted interest registry and the pending-arm queue.

use crate::connection::state::StatusChannel;
use crate::observability::{events, fields};
use crate::registry::wire_listener::WireListener;
use crate::registry::{InterestHandle, InterestKey};
use crate::routing::EventRouter;
use crate::transport::{FeedTransport, TransportError, WireSubscriptionId};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, info, warn};

const COMPONENT: &str = "subscription_registry";

struct WireSubscription {
    id: WireSubscriptionId,
    listener: Arc<WireListener>,
}

/// One distinct interest key. Exists while at least one ticket is outstanding.
///
/// `wire` is `None` exactly when the key sits in the pending queue.
struct Registration {
    sequence: u64,
    tickets: HashSet<u64>,
    wire: Option<WireSubscription>,
}

#[derive(Default)]
struct RegistryState {
    registrations: HashMap<InterestKey, Registration>,
    pending: VecDeque<InterestKey>,
    next_ticket: u64,
    next_sequence: u64,
}

impl RegistryState {
    fn rebuild_pending(&mut self) {
        let mut pending: Vec<(u64, InterestKey)> = self
            .registrations
            .iter()
            .filter(|(_, registration)| registration.wire.is_none())
            .map(|(key, registration)| (registration.sequence, *key))
            .collect();
        pending.sort_by_key(|(sequence, _)| *sequence);
        self.pending = pending.into_iter().map(|(_, key)| key).collect();
    }
}

/// Maps interest keys to at most one wire subscription each.
///
/// The state lock is held across transport calls so arming, disarming and flushing
/// are serialized; this is what keeps one wire subscription per key.
pub(crate) struct SubscriptionRegistry {
    transport: Arc<dyn FeedTransport>,
    router: Arc<EventRouter>,
    status: Arc<StatusChannel>,
    state: tokio::sync::Mutex<RegistryState>,
}

impl SubscriptionRegistry {
    pub(crate) fn new(
        transport: Arc<dyn FeedTransport>,
        router: Arc<EventRouter>,
        status: Arc<StatusChannel>,
    ) -> Self {
        Self {
            transport,
            router,
            status,
            state: tokio::sync::Mutex::new(RegistryState::default()),
        }
    }

    async fn arm(&self, key: &InterestKey) -> Result<WireSubscription, TransportError> {
        let topic = key.topic();
        let listener = Arc::new(WireListener::new(*key, self.router.clone()));

        match self.transport.subscribe(&topic, listener.clone()).await {
            Ok(id) => {
                debug!(
                    event = events::WIRE_ARM_OK,
                    component = COMPONENT,
                    interest = %key,
                    topic = topic.as_str(),
                    wire_id = id.as_str(),
                    "armed wire subscription"
                );
                Ok(WireSubscription { id, listener })
            }
            Err(err) => {
                listener.disarm();
                warn!(
                    event = events::WIRE_ARM_FAILED,
                    component = COMPONENT,
                    interest = %key,
                    topic = topic.as_str(),
                    err = %err,
                    "unable to arm wire subscription; keeping interest pending"
                );
                Err(err)
            }
        }
    }

    async fn disarm(&self, key: &InterestKey, wire: WireSubscription, unsubscribe: bool) {
        wire.listener.disarm();
        if !unsubscribe {
            debug!(
                event = events::WIRE_DISARM_OK,
                component = COMPONENT,
                interest = %key,
                wire_id = wire.id.as_str(),
                reason = fields::REASON_NOT_CONNECTED,
                "dropped wire subscription of closed connection"
            );
            return;
        }

        match self.transport.unsubscribe(&wire.id).await {
            Ok(()) => debug!(
                event = events::WIRE_DISARM_OK,
                component = COMPONENT,
                interest = %key,
                wire_id = wire.id.as_str(),
                "released wire subscription"
            ),
            Err(err) => warn!(
                event = events::WIRE_DISARM_FAILED,
                component = COMPONENT,
                interest = %key,
                wire_id = wire.id.as_str(),
                err = %err,
                "unable to release wire subscription"
            ),
        }
    }

    /// Attaches to the existing registration for `key` or creates one, arming it
    /// right away when the connection is up.
    pub(crate) async fn request_interest(&self, key: InterestKey) -> InterestHandle {
        let mut state = self.state.lock().await;
        let ticket = state.next_ticket;
        state.next_ticket += 1;

        if let Some(registration) = state.registrations.get_mut(&key) {
            registration.tickets.insert(ticket);
            debug!(
                event = events::INTEREST_ATTACH,
                component = COMPONENT,
                interest = %key,
                ref_count = registration.tickets.len(),
                "attached to existing interest"
            );
            return InterestHandle::new(key, ticket);
        }

        let sequence = state.next_sequence;
        state.next_sequence += 1;

        let wire = if self.status.is_connected() {
            self.arm(&key).await.ok()
        } else {
            debug!(
                event = events::INTEREST_PENDING,
                component = COMPONENT,
                interest = %key,
                reason = fields::REASON_NOT_CONNECTED,
                "deferring wire subscription until connected"
            );
            None
        };

        if wire.is_none() {
            state.pending.push_back(key);
        }
        state.registrations.insert(
            key,
            Registration {
                sequence,
                tickets: HashSet::from([ticket]),
                wire,
            },
        );
        info!(
            event = events::INTEREST_CREATE,
            component = COMPONENT,
            interest = %key,
            ref_count = 1usize,
            "created interest registration"
        );
        InterestHandle::new(key, ticket)
    }

    /// Returns `false` for a handle that is no longer outstanding.
    pub(crate) async fn release_interest(&self, handle: InterestHandle) -> bool {
        let key = handle.key();
        let mut state = self.state.lock().await;

        let released = state
            .registrations
            .get_mut(&key)
            .filter(|registration| registration.tickets.contains(&handle.ticket()))
            .map(|registration| {
                registration.tickets.remove(&handle.ticket());
                registration.tickets.len()
            });
        let remaining = match released {
            Some(remaining) => remaining,
            None => {
                debug!(
                    event = events::INTEREST_RELEASE_UNKNOWN,
                    component = COMPONENT,
                    interest = %key,
                    "ignoring release of unknown interest handle"
                );
                return false;
            }
        };

        if remaining > 0 {
            debug!(
                event = events::INTEREST_RELEASE,
                component = COMPONENT,
                interest = %key,
                ref_count = remaining,
                "released interest; registration still referenced"
            );
            return true;
        }

        let Some(registration) = state.registrations.remove(&key) else {
            return true;
        };
        state.pending.retain(|pending_key| *pending_key != key);
        let wire_id = registration.wire.as_ref().map(|wire| wire.id.clone());
        if let Some(wire) = registration.wire {
            let connected = self.status.is_connected();
            self.disarm(&key, wire, connected).await;
        }
        info!(
            event = events::INTEREST_RELEASE,
            component = COMPONENT,
            interest = %key,
            wire_id = %fields::format_wire_id(wire_id.as_ref()),
            ref_count = 0usize,
            reason = fields::REASON_LAST_INTEREST_RELEASED,
            "removed interest registration"
        );
        true
    }

    /// Arms every pending registration in request order. Registrations whose arm
    /// fails stay queued in their original position. Returns how many were armed.
    pub(crate) async fn flush_pending(&self) -> usize {
        let mut state = self.state.lock().await;
        let queued = state.pending.len();
        if queued == 0 {
            return 0;
        }
        debug!(
            event = events::PENDING_FLUSH_START,
            component = COMPONENT,
            pending = queued,
            "flushing pending interests"
        );

        let mut still_pending = VecDeque::new();
        let mut armed = 0usize;
        while let Some(key) = state.pending.pop_front() {
            if !self.status.is_connected() {
                still_pending.push_back(key);
                still_pending.extend(state.pending.drain(..));
                break;
            }
            if !state.registrations.contains_key(&key) {
                continue;
            }
            match self.arm(&key).await {
                Ok(wire) => {
                    if let Some(registration) = state.registrations.get_mut(&key) {
                        registration.wire = Some(wire);
                        armed += 1;
                    }
                }
                Err(_) => still_pending.push_back(key),
            }
        }
        state.pending = still_pending;

        info!(
            event = events::PENDING_FLUSH_DONE,
            component = COMPONENT,
            armed,
            pending = state.pending.len(),
            "pending interest flush finished"
        );
        armed
    }

    /// Drops every wire subscription while keeping the registrations, which all
    /// return to the pending queue in original request order.
    pub(crate) async fn disarm_all(&self, unsubscribe: bool) -> usize {
        let mut state = self.state.lock().await;
        let mut released = Vec::new();
        for (key, registration) in state.registrations.iter_mut() {
            if let Some(wire) = registration.wire.take() {
                released.push((registration.sequence, *key, wire));
            }
        }
        released.sort_by_key(|(sequence, _, _)| *sequence);
        let count = released.len();
        for (_, key, wire) in released {
            self.disarm(&key, wire, unsubscribe).await;
        }
        state.rebuild_pending();
        count
    }

    /// Releases every wire subscription and forgets all registrations.
    pub(crate) async fn clear(&self, unsubscribe: bool) -> usize {
        let mut state = self.state.lock().await;
        let mut registrations: Vec<(InterestKey, Registration)> =
            state.registrations.drain().collect();
        registrations.sort_by_key(|(_, registration)| registration.sequence);
        state.pending.clear();
        let count = registrations.len();
        for (key, registration) in registrations {
            if let Some(wire) = registration.wire {
                self.disarm(&key, wire, unsubscribe).await;
            }
        }
        count
    }

    pub(crate) async fn active_wire_subscriptions(&self) -> usize {
        self.state
            .lock()
            .await
            .registrations
            .values()
            .filter(|registration| registration.wire.is_some())
            .count()
    }

    pub(crate) async fn interest_count(&self, key: &InterestKey) -> usize {
        self.state
            .lock()
            .await
            .registrations
            .get(key)
            .map(|registration| registration.tickets.len())
            .unwrap_or(0)
    }

    pub(crate) async fn pending_keys(&self) -> Vec<InterestKey> {
        self.state.lock().await.pending.iter().copied().collect()
    }

    #[cfg(test)]
    pub(crate) async fn wire_id(&self, key: &InterestKey) -> Option<WireSubscriptionId> {
        self.state
            .lock()
            .await
            .registrations
            .get(key)
            .and_then(|registration| registration.wire.as_ref())
            .map(|wire| wire.id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::SubscriptionRegistry;
    use crate::connection::state::{ConnectionState, StatusChannel};
    use crate::registry::InterestKey;
    use crate::routing::EventRouter;
    use crate::transport::{
        ConnectionListener, FeedTransport, FrameListener, TransportError, WireSubscriptionId,
    };
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingTransport {
        subscribed: Mutex<Vec<String>>,
        unsubscribed: Mutex<Vec<String>>,
        failing_topics: Mutex<HashSet<String>>,
    }

    impl RecordingTransport {
        fn subscribed(&self) -> Vec<String> {
            self.subscribed.lock().unwrap().clone()
        }

        fn unsubscribed(&self) -> Vec<String> {
            self.unsubscribed.lock().unwrap().clone()
        }

        fn fail_topic(&self, topic: &str, fail: bool) {
            let mut failing = self.failing_topics.lock().unwrap();
            if fail {
                failing.insert(topic.to_string());
            } else {
                failing.remove(topic);
            }
        }
    }

    #[async_trait]
    impl FeedTransport for RecordingTransport {
        async fn open(
            &self,
            _endpoint: &str,
            _heartbeat: Duration,
            _listener: Arc<dyn ConnectionListener>,
        ) -> Result<(), TransportError> {
            Ok(())
        }

        async fn close(&self) -> Result<(), TransportError> {
            Ok(())
        }

        async fn send(&self, _destination: &str, _body: &str) -> Result<(), TransportError> {
            Ok(())
        }

        async fn subscribe(
            &self,
            topic: &str,
            _listener: Arc<dyn FrameListener>,
        ) -> Result<WireSubscriptionId, TransportError> {
            if self.failing_topics.lock().unwrap().contains(topic) {
                return Err(TransportError::Protocol("subscribe rejected".to_string()));
            }
            self.subscribed.lock().unwrap().push(topic.to_string());
            Ok(WireSubscriptionId::new(topic))
        }

        async fn unsubscribe(
            &self,
            subscription: &WireSubscriptionId,
        ) -> Result<(), TransportError> {
            self.unsubscribed
                .lock()
                .unwrap()
                .push(subscription.as_str().to_string());
            Ok(())
        }
    }

    fn make_registry() -> (
        SubscriptionRegistry,
        Arc<RecordingTransport>,
        Arc<StatusChannel>,
    ) {
        let transport = Arc::new(RecordingTransport::default());
        let status = Arc::new(StatusChannel::new(8));
        let registry = SubscriptionRegistry::new(
            transport.clone(),
            Arc::new(EventRouter::new(8)),
            status.clone(),
        );
        (registry, transport, status)
    }

    fn connect(status: &StatusChannel) {
        status.publish(ConnectionState::Connecting);
        status.publish(ConnectionState::Connected);
    }

    #[tokio::test]
    async fn repeated_interest_shares_one_wire_subscription() {
        let (registry, transport, status) = make_registry();
        connect(&status);
        let key = InterestKey::comments(7);

        let first = registry.request_interest(key).await;
        let second = registry.request_interest(key).await;
        let third = registry.request_interest(key).await;

        assert_eq!(transport.subscribed(), vec!["/topic/issues/7/comments"]);
        assert_eq!(registry.interest_count(&key).await, 3);

        assert!(registry.release_interest(first).await);
        assert!(registry.release_interest(third).await);
        assert_eq!(registry.active_wire_subscriptions().await, 1);
        assert!(transport.unsubscribed().is_empty());

        assert!(registry.release_interest(second).await);
        assert_eq!(registry.active_wire_subscriptions().await, 0);
        assert_eq!(transport.unsubscribed(), vec!["/topic/issues/7/comments"]);
    }

    #[tokio::test]
    async fn stale_handle_release_is_a_no_op() {
        let (registry, _, status) = make_registry();
        connect(&status);
        let key = InterestKey::issues();
        let handle = registry.request_interest(key).await;
        let stale = crate::registry::InterestHandle::new(key, handle.ticket());

        assert!(registry.release_interest(handle).await);
        assert!(!registry.release_interest(stale).await);
    }

    #[tokio::test]
    async fn disconnected_interests_flush_in_request_order() {
        let (registry, transport, status) = make_registry();
        let _a = registry.request_interest(InterestKey::comments(1)).await;
        let _b = registry.request_interest(InterestKey::issues()).await;
        let _c = registry.request_interest(InterestKey::activities(1)).await;
        assert!(transport.subscribed().is_empty());

        connect(&status);
        let armed = registry.flush_pending().await;

        assert_eq!(armed, 3);
        assert_eq!(
            transport.subscribed(),
            vec![
                "/topic/issues/1/comments",
                "/topic/issues",
                "/topic/issues/1/activities"
            ]
        );
        assert!(registry.pending_keys().await.is_empty());
    }

    #[tokio::test]
    async fn released_pending_interest_is_never_armed() {
        let (registry, transport, status) = make_registry();
        let a = registry.request_interest(InterestKey::comments(1)).await;
        let _b = registry.request_interest(InterestKey::comments(2)).await;

        registry.release_interest(a).await;
        connect(&status);
        registry.flush_pending().await;

        assert_eq!(transport.subscribed(), vec!["/topic/issues/2/comments"]);
    }

    #[tokio::test]
    async fn failed_arm_stays_pending_for_next_flush() {
        let (registry, transport, status) = make_registry();
        transport.fail_topic("/topic/issues", true);
        connect(&status);

        let _issues = registry.request_interest(InterestKey::issues()).await;
        assert_eq!(registry.pending_keys().await, vec![InterestKey::issues()]);

        transport.fail_topic("/topic/issues", false);
        assert_eq!(registry.flush_pending().await, 1);
        assert!(registry.wire_id(&InterestKey::issues()).await.is_some());
    }

    #[tokio::test]
    async fn disarm_all_requeues_in_original_order() {
        let (registry, transport, status) = make_registry();
        connect(&status);
        let _c = registry.request_interest(InterestKey::comments(3)).await;
        let _a = registry.request_interest(InterestKey::activities(3)).await;
        let _i = registry.request_interest(InterestKey::issues()).await;

        status.publish(ConnectionState::Disconnected);
        assert_eq!(registry.disarm_all(false).await, 3);

        assert_eq!(
            registry.pending_keys().await,
            vec![
                InterestKey::comments(3),
                InterestKey::activities(3),
                InterestKey::issues()
            ]
        );
        assert_eq!(registry.active_wire_subscriptions().await, 0);
        assert!(transport.unsubscribed().is_empty());
    }

    #[tokio::test]
    async fn clear_forgets_everything() {
        let (registry, transport, status) = make_registry();
        connect(&status);
        let handle = registry.request_interest(InterestKey::comments(9)).await;

        assert_eq!(registry.clear(true).await, 1);

        assert_eq!(transport.unsubscribed(), vec!["/topic/issues/9/comments"]);
        assert_eq!(registry.interest_count(&InterestKey::comments(9)).await, 0);
        assert!(!registry.release_interest(handle).await);
    }
}
