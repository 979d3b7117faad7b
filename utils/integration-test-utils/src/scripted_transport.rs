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

use async_trait::async_trait;
use issue_feed::{
    CloseReason, ConnectionListener, FeedTransport, FrameListener, TransportError,
    WireSubscriptionId,
};
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

#[derive(Clone)]
struct WireSubscription {
    id: WireSubscriptionId,
    topic: String,
    listener: Arc<dyn FrameListener>,
}

#[derive(Default)]
struct ScriptState {
    refuse_next_opens: usize,
    refuse_all_opens: bool,
    open_delays: VecDeque<Duration>,
    close_during_next_open: Option<CloseReason>,
    open_calls: usize,
    close_calls: usize,
    connection: Option<Arc<dyn ConnectionListener>>,
    active: Vec<WireSubscription>,
    retired: Vec<WireSubscription>,
    subscribed_topics: Vec<String>,
    unsubscribed_topics: Vec<String>,
    failing_topics: HashSet<String>,
    sent: Vec<(String, String)>,
    next_id: u64,
}

impl ScriptState {
    fn retire_active(&mut self) {
        let active = std::mem::take(&mut self.active);
        self.retired.extend(active);
    }
}

/// In-memory [`FeedTransport`] whose behavior is scripted by the test.
///
/// Subscriptions dropped by a close or a simulated failure are kept as "retired"
/// so tests can replay late frames through listeners the feed already gave up.
/// There is a single session slot: a completing `open` replaces whatever session
/// is there, and `close` ends whichever session currently holds it.
#[derive(Default)]
pub struct ScriptedTransport {
    name: String,
    state: Mutex<ScriptState>,
}

impl ScriptedTransport {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: Mutex::new(ScriptState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, ScriptState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The next `count` calls to `open` are refused.
    pub fn refuse_next_opens(&self, count: usize) {
        self.state().refuse_next_opens = count;
    }

    pub fn refuse_all_opens(&self, refuse: bool) {
        self.state().refuse_all_opens = refuse;
    }

    /// Each accepted `open` takes the next delay before its handshake completes.
    pub fn delay_opens(&self, delays: &[Duration]) {
        self.state().open_delays.extend(delays.iter().copied());
    }

    /// The next accepted `open` reports the session closed with `reason` before
    /// it returns `Ok`, as a server hanging up right after CONNECTED would.
    pub fn close_during_next_open(&self, reason: CloseReason) {
        self.state().close_during_next_open = Some(reason);
    }

    pub fn fail_subscribe_for(&self, topic: &str, fail: bool) {
        let mut state = self.state();
        if fail {
            state.failing_topics.insert(topic.to_string());
        } else {
            state.failing_topics.remove(topic);
        }
    }

    pub fn open_calls(&self) -> usize {
        self.state().open_calls
    }

    pub fn close_calls(&self) -> usize {
        self.state().close_calls
    }

    pub fn is_open(&self) -> bool {
        self.state().connection.is_some()
    }

    /// Topics in the order they were armed, including ones since released.
    pub fn subscribed_topics(&self) -> Vec<String> {
        self.state().subscribed_topics.clone()
    }

    pub fn unsubscribed_topics(&self) -> Vec<String> {
        self.state().unsubscribed_topics.clone()
    }

    pub fn active_topics(&self) -> Vec<String> {
        self.state()
            .active
            .iter()
            .map(|subscription| subscription.topic.clone())
            .collect()
    }

    pub fn active_count_for(&self, topic: &str) -> usize {
        self.state()
            .active
            .iter()
            .filter(|subscription| subscription.topic == topic)
            .count()
    }

    pub fn sent_messages(&self) -> Vec<(String, String)> {
        self.state().sent.clone()
    }

    /// Delivers `body` to every live subscription on `topic`. Returns how many
    /// listeners received it.
    pub async fn deliver(&self, topic: &str, body: &str) -> usize {
        let listeners: Vec<Arc<dyn FrameListener>> = self
            .state()
            .active
            .iter()
            .filter(|subscription| subscription.topic == topic)
            .map(|subscription| subscription.listener.clone())
            .collect();
        for listener in &listeners {
            listener.on_frame(topic, body).await;
        }
        listeners.len()
    }

    /// Replays `body` through listeners of subscriptions that were already
    /// unsubscribed or dropped, as a late frame from the server would arrive.
    pub async fn deliver_to_retired(&self, topic: &str, body: &str) -> usize {
        let listeners: Vec<Arc<dyn FrameListener>> = self
            .state()
            .retired
            .iter()
            .filter(|subscription| subscription.topic == topic)
            .map(|subscription| subscription.listener.clone())
            .collect();
        for listener in &listeners {
            listener.on_frame(topic, body).await;
        }
        listeners.len()
    }

    /// Simulates the server or network ending the session.
    pub async fn drop_connection(&self, reason: CloseReason) -> bool {
        let listener = {
            let mut state = self.state();
            state.retire_active();
            state.connection.take()
        };
        match listener {
            Some(listener) => {
                debug!("{}: dropping connection: {reason}", self.name);
                listener.on_close(reason).await;
                true
            }
            None => false,
        }
    }

    /// Simulates a missed heart-beat on the open session.
    pub async fn fail_heartbeat(&self) -> bool {
        let listener = {
            let mut state = self.state();
            state.retire_active();
            state.connection.take()
        };
        match listener {
            Some(listener) => {
                listener.on_error(TransportError::HeartbeatTimeout).await;
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl FeedTransport for ScriptedTransport {
    async fn open(
        &self,
        endpoint: &str,
        _heartbeat: Duration,
        listener: Arc<dyn ConnectionListener>,
    ) -> Result<(), TransportError> {
        let (delay, close_reason) = {
            let mut state = self.state();
            state.open_calls += 1;
            debug!("{}: open #{} to {endpoint}", self.name, state.open_calls);

            if state.refuse_all_opens {
                return Err(TransportError::ConnectionRefused(endpoint.to_string()));
            }
            if state.refuse_next_opens > 0 {
                state.refuse_next_opens -= 1;
                return Err(TransportError::ConnectionRefused(endpoint.to_string()));
            }
            (
                state.open_delays.pop_front(),
                state.close_during_next_open.take(),
            )
        };

        let closed = close_reason.is_some();
        if let Some(reason) = close_reason {
            debug!("{}: closing session during open: {reason}", self.name);
            listener.on_close(reason).await;
        }
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state();
        state.retire_active();
        state.connection = if closed { None } else { Some(listener) };
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        let mut state = self.state();
        state.close_calls += 1;
        state.retire_active();
        match state.connection.take() {
            Some(_) => Ok(()),
            None => Err(TransportError::NotConnected),
        }
    }

    async fn send(&self, destination: &str, body: &str) -> Result<(), TransportError> {
        let mut state = self.state();
        if state.connection.is_none() {
            return Err(TransportError::NotConnected);
        }
        state.sent.push((destination.to_string(), body.to_string()));
        Ok(())
    }

    async fn subscribe(
        &self,
        topic: &str,
        listener: Arc<dyn FrameListener>,
    ) -> Result<WireSubscriptionId, TransportError> {
        let mut state = self.state();
        if state.connection.is_none() {
            return Err(TransportError::NotConnected);
        }
        if state.failing_topics.contains(topic) {
            return Err(TransportError::Protocol(format!(
                "subscribe to {topic} rejected"
            )));
        }

        state.next_id += 1;
        let id = WireSubscriptionId::new(format!("sub-{}", state.next_id));
        state.subscribed_topics.push(topic.to_string());
        state.active.push(WireSubscription {
            id: id.clone(),
            topic: topic.to_string(),
            listener,
        });
        debug!("{}: subscribed {id} to {topic}", self.name);
        Ok(id)
    }

    async fn unsubscribe(&self, subscription: &WireSubscriptionId) -> Result<(), TransportError> {
        let mut state = self.state();
        let Some(index) = state
            .active
            .iter()
            .position(|active| &active.id == subscription)
        else {
            return Err(TransportError::Protocol(format!(
                "unknown subscription {subscription}"
            )));
        };
        let removed = state.active.remove(index);
        state.unsubscribed_topics.push(removed.topic.clone());
        state.retired.push(removed);
        Ok(())
    }
}
