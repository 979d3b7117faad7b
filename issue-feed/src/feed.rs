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

//! Public facade tying the connection, registry and routing layers together.

use crate::config::FeedConfig;
use crate::connection::manager::{
    AttemptOutcome, ConnectTrigger, ConnectionManager, DriverCommand, LinkListener,
};
use crate::connection::state::StatusChannel;
use crate::connection::{ReconnectPolicy, StateStream, StatusStream};
use crate::error::FeedError;
use crate::observability::events;
use crate::registry::subscription_registry::SubscriptionRegistry;
use crate::registry::{InterestHandle, InterestKey};
use crate::routing::{
    ActivityEvent, CommentEvent, EventRouter, EventStream, IssueEvent, RouterStats,
};
use crate::transport::{CloseReason, FeedTransport, TransportError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;
use tracing::{debug, info};

const COMPONENT: &str = "issue_feed";

/// Interests the facade holds on behalf of its `observe_*` callers.
#[derive(Default)]
struct HeldInterests {
    issues: Option<InterestHandle>,
    scoped: HashMap<InterestKey, Vec<InterestHandle>>,
}

struct FeedInner {
    endpoint: String,
    transport: Arc<dyn FeedTransport>,
    status: Arc<StatusChannel>,
    connection: ConnectionManager,
    registry: Arc<SubscriptionRegistry>,
    router: Arc<EventRouter>,
    commands: UnboundedSender<DriverCommand>,
    held: Mutex<HeldInterests>,
    shut_down: AtomicBool,
}

impl FeedInner {
    fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    async fn establish(&self, trigger: ConnectTrigger) {
        let Some(generation) = self.connection.begin_attempt(trigger).await else {
            return;
        };
        let listener = Arc::new(LinkListener::new(generation, self.commands.clone()));
        let result = self.connection.open(listener).await;

        if let AttemptOutcome::Failed(_) = self.connection.complete_attempt(generation, result).await
        {
            self.connection
                .schedule_retry(generation, &self.commands)
                .await;
        }
    }

    async fn handle_connection_lost(&self, generation: u64, reason: CloseReason) {
        if self.connection.connection_lost(generation, &reason).await {
            self.connection
                .schedule_retry(generation, &self.commands)
                .await;
        }
    }

    async fn hold(&self, key: InterestKey) {
        let handle = self.registry.request_interest(key).await;
        self.held
            .lock()
            .await
            .scoped
            .entry(key)
            .or_default()
            .push(handle);
    }

    async fn unhold(&self, key: InterestKey) -> bool {
        let handle = {
            let mut held = self.held.lock().await;
            let handle = held.scoped.get_mut(&key).and_then(Vec::pop);
            if held.scoped.get(&key).is_some_and(Vec::is_empty) {
                held.scoped.remove(&key);
            }
            handle
        };
        match handle {
            Some(handle) => self.registry.release_interest(handle).await,
            None => false,
        }
    }
}

impl Drop for FeedInner {
    fn drop(&mut self) {
        let _ = self.commands.send(DriverCommand::Shutdown);
    }
}

async fn run_driver(feed: Weak<FeedInner>, mut commands: UnboundedReceiver<DriverCommand>) {
    while let Some(command) = commands.recv().await {
        let Some(inner) = feed.upgrade() else {
            break;
        };
        match command {
            DriverCommand::ConnectionLost { generation, reason } => {
                inner.handle_connection_lost(generation, reason).await
            }
            DriverCommand::Retry { generation } => {
                inner.establish(ConnectTrigger::Retry(generation)).await
            }
            DriverCommand::Shutdown => break,
        }
    }
    debug!(
        event = events::DRIVER_STOPPED,
        component = COMPONENT,
        "feed driver stopped"
    );
}

/// Multiplexed real-time issue tracker updates over one shared connection.
///
/// Cheap to clone; all clones drive the same connection and registry. Must be
/// created inside a tokio runtime, which runs the task that serializes connection
/// failures and scheduled reconnects.
#[derive(Clone)]
pub struct IssueFeed {
    inner: Arc<FeedInner>,
}

impl IssueFeed {
    pub fn new(config: FeedConfig, transport: Arc<dyn FeedTransport>) -> Result<Self, FeedError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| FeedError::NoRuntime)?;

        let capacity = config.channel_capacity();
        let status = Arc::new(StatusChannel::new(capacity));
        let router = Arc::new(EventRouter::new(capacity));
        let registry = Arc::new(SubscriptionRegistry::new(
            transport.clone(),
            router.clone(),
            status.clone(),
        ));
        let connection = ConnectionManager::new(
            &config.endpoint,
            config.heartbeat(),
            ReconnectPolicy::new(config.reconnect.max_attempts, config.reconnect.delay()),
            transport.clone(),
            status.clone(),
            registry.clone(),
        );
        let (commands, receiver) = mpsc::unbounded_channel();

        let inner = Arc::new(FeedInner {
            endpoint: config.endpoint.clone(),
            transport,
            status,
            connection,
            registry,
            router,
            commands,
            held: Mutex::new(HeldInterests::default()),
            shut_down: AtomicBool::new(false),
        });
        runtime.spawn(run_driver(Arc::downgrade(&inner), receiver));

        Ok(Self { inner })
    }

    /// Starts a connection attempt and waits for its handshake to settle.
    ///
    /// No-op while connecting or connected. After automatic reconnection gave up,
    /// this resets the attempt counter.
    pub async fn connect(&self) {
        if self.inner.is_shut_down() {
            return;
        }
        self.inner.establish(ConnectTrigger::Manual).await;
    }

    /// Closes the connection. Interests survive and are re-armed on the next
    /// successful connect.
    pub async fn disconnect(&self) {
        if self.inner.is_shut_down() {
            return;
        }
        self.inner.connection.disconnect().await;
    }

    /// Releases every interest, closes the transport and ends all event streams.
    pub async fn shutdown(&self) {
        if self.inner.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.connection.shutdown().await;
        *self.inner.held.lock().await = HeldInterests::default();
        self.inner.router.close();
        let _ = self.inner.commands.send(DriverCommand::Shutdown);
        info!(
            event = events::FEED_SHUTDOWN,
            component = COMPONENT,
            endpoint = self.inner.endpoint.as_str(),
            "issue feed shut down"
        );
    }

    /// Global issue changes. The feed's single issue-feed interest is requested on
    /// first use and shared by every observer.
    pub async fn observe_issue_updates(&self) -> Result<EventStream<IssueEvent>, FeedError> {
        if self.inner.is_shut_down() {
            return Err(FeedError::ShutDown);
        }
        let stream = self
            .inner
            .router
            .subscribe_issues()
            .ok_or(FeedError::ShutDown)?;

        let mut held = self.inner.held.lock().await;
        if held.issues.is_none() {
            held.issues = Some(
                self.inner
                    .registry
                    .request_interest(InterestKey::issues())
                    .await,
            );
        }
        Ok(stream)
    }

    /// Comments of one issue. Pair every call with
    /// [`stop_observing_comments`](Self::stop_observing_comments).
    pub async fn observe_comment_updates(
        &self,
        issue_id: i64,
    ) -> Result<EventStream<CommentEvent>, FeedError> {
        if self.inner.is_shut_down() {
            return Err(FeedError::ShutDown);
        }
        let stream = self
            .inner
            .router
            .subscribe_comments(issue_id)
            .ok_or(FeedError::ShutDown)?;
        self.inner.hold(InterestKey::comments(issue_id)).await;
        Ok(stream)
    }

    /// Gives back one comment interest for `issue_id`. Returns `false` when none
    /// was held.
    ///
    /// Streams are not tied to a particular interest: a stream already handed out
    /// keeps receiving while any other observer holds the same issue, and goes
    /// quiet once the last interest is released. Drop it to stop listening.
    pub async fn stop_observing_comments(&self, issue_id: i64) -> bool {
        self.inner.unhold(InterestKey::comments(issue_id)).await
    }

    pub async fn observe_activity_updates(
        &self,
        issue_id: i64,
    ) -> Result<EventStream<ActivityEvent>, FeedError> {
        if self.inner.is_shut_down() {
            return Err(FeedError::ShutDown);
        }
        let stream = self
            .inner
            .router
            .subscribe_activities(issue_id)
            .ok_or(FeedError::ShutDown)?;
        self.inner.hold(InterestKey::activities(issue_id)).await;
        Ok(stream)
    }

    /// Activity counterpart of
    /// [`stop_observing_comments`](Self::stop_observing_comments), with the same
    /// stream semantics.
    pub async fn stop_observing_activity(&self, issue_id: i64) -> bool {
        self.inner.unhold(InterestKey::activities(issue_id)).await
    }

    /// Registers interest in `key` without opening an event stream. The caller
    /// owns the handle and must give it back through
    /// [`release_interest`](Self::release_interest).
    pub async fn request_interest(&self, key: InterestKey) -> Result<InterestHandle, FeedError> {
        if self.inner.is_shut_down() {
            return Err(FeedError::ShutDown);
        }
        Ok(self.inner.registry.request_interest(key).await)
    }

    pub async fn release_interest(&self, handle: InterestHandle) -> bool {
        self.inner.registry.release_interest(handle).await
    }

    /// `true`/`false` connectivity, starting with the current value.
    pub fn observe_connection_status(&self) -> StatusStream {
        self.inner.status.observe_status()
    }

    /// Every lifecycle transition including CONNECTING, starting with the current
    /// state.
    pub fn observe_connection_state(&self) -> StateStream {
        self.inner.status.observe_state()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.status.is_connected()
    }

    /// `true` once automatic reconnection has given up; only
    /// [`connect`](Self::connect) starts a new attempt from there.
    pub async fn is_reconnect_exhausted(&self) -> bool {
        self.inner.connection.is_reconnect_exhausted().await
    }

    /// Snapshot of the reconnect counter.
    pub async fn reconnect_policy(&self) -> ReconnectPolicy {
        self.inner.connection.policy().await
    }

    pub fn router_stats(&self) -> RouterStats {
        self.inner.router.stats()
    }

    /// Sends `body` to `destination` over the shared connection.
    pub async fn send(&self, destination: &str, body: &str) -> Result<(), FeedError> {
        if self.inner.is_shut_down() {
            return Err(FeedError::ShutDown);
        }
        if !self.is_connected() {
            return Err(FeedError::Transport(TransportError::NotConnected));
        }
        self.inner.transport.send(destination, body).await?;
        Ok(())
    }

    pub async fn active_wire_subscriptions(&self) -> usize {
        self.inner.registry.active_wire_subscriptions().await
    }

    /// Interests waiting for a connection, in the order they will be armed.
    pub async fn pending_interests(&self) -> Vec<InterestKey> {
        self.inner.registry.pending_keys().await
    }

    /// Outstanding handles for `key`, including the ones held by `observe_*`.
    pub async fn interest_count(&self, key: &InterestKey) -> usize {
        self.inner.registry.interest_count(key).await
    }
}

#[cfg(test)]
mod tests {
    use super::IssueFeed;
    use crate::config::FeedConfig;
    use crate::error::FeedError;
    use crate::registry::InterestKey;
    use crate::transport::{
        ConnectionListener, FeedTransport, FrameListener, TransportError, WireSubscriptionId,
    };
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::time::Duration;

    struct AcceptingTransport;

    #[async_trait]
    impl FeedTransport for AcceptingTransport {
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
            Ok(WireSubscriptionId::new(topic))
        }

        async fn unsubscribe(
            &self,
            _subscription: &WireSubscriptionId,
        ) -> Result<(), TransportError> {
            Ok(())
        }
    }

    fn make_feed() -> IssueFeed {
        IssueFeed::new(FeedConfig::new("ws://test"), Arc::new(AcceptingTransport))
            .expect("inside runtime")
    }

    #[test]
    fn construction_outside_runtime_is_rejected() {
        let result = IssueFeed::new(FeedConfig::new("ws://test"), Arc::new(AcceptingTransport));

        assert!(matches!(result, Err(FeedError::NoRuntime)));
    }

    #[tokio::test]
    async fn issue_feed_interest_is_requested_once() {
        let feed = make_feed();
        feed.connect().await;

        let _first = feed.observe_issue_updates().await.expect("open feed");
        let _second = feed.observe_issue_updates().await.expect("open feed");

        assert_eq!(feed.interest_count(&InterestKey::issues()).await, 1);
        assert_eq!(feed.active_wire_subscriptions().await, 1);
    }

    #[tokio::test]
    async fn stop_observing_without_interest_returns_false() {
        let feed = make_feed();

        assert!(!feed.stop_observing_comments(5).await);
        let _comments = feed.observe_comment_updates(5).await.expect("open feed");
        assert!(feed.stop_observing_comments(5).await);
        assert!(!feed.stop_observing_comments(5).await);
    }

    #[tokio::test]
    async fn send_requires_connection() {
        let feed = make_feed();

        assert!(matches!(
            feed.send("/app/ping", "{}").await,
            Err(FeedError::Transport(TransportError::NotConnected))
        ));
        feed.connect().await;
        assert!(feed.send("/app/ping", "{}").await.is_ok());
    }

    #[tokio::test]
    async fn operations_after_shutdown_are_refused() {
        let feed = make_feed();
        feed.connect().await;
        let mut comments = feed.observe_comment_updates(1).await.expect("open feed");

        feed.shutdown().await;
        feed.connect().await;

        assert!(!feed.is_connected());
        assert!(comments.recv().await.is_none());
        assert!(matches!(
            feed.observe_issue_updates().await,
            Err(FeedError::ShutDown)
        ));
        assert!(matches!(
            feed.request_interest(InterestKey::issues()).await,
            Err(FeedError::ShutDown)
        ));
        assert!(matches!(feed.send("/app/x", "{}").await, Err(FeedError::ShutDown)));
    }
}
