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

//! # issue-feed
//!
//! `issue-feed` multiplexes server-pushed issue tracker change events over one
//! persistent connection. Many independent observers register interest in
//! issue, comment or activity feeds; each distinct interest is backed by at most
//! one wire subscription, and interests survive disconnects and are re-armed
//! transparently when the connection comes back.
//!
//! Typical usage is centered on [`IssueFeed`] and a [`FeedTransport`] implementation.
//!
//! ```
//! use std::sync::Arc;
//! use issue_feed::{FeedConfig, FeedTransport, IssueFeed};
//!
//! # pub mod mock_transport {
//! #     use std::sync::Arc;
//! #     use std::time::Duration;
//! #     use async_trait::async_trait;
//! #     use issue_feed::{ConnectionListener, FeedTransport, FrameListener, TransportError,
//! #         WireSubscriptionId};
//! #
//! #     pub struct MockTransport;
//! #
//! #     #[async_trait]
//! #     impl FeedTransport for MockTransport {
//! #         async fn open(&self, _endpoint: &str, _heartbeat: Duration,
//! #             _listener: Arc<dyn ConnectionListener>) -> Result<(), TransportError> { Ok(()) }
//! #         async fn close(&self) -> Result<(), TransportError> { Ok(()) }
//! #         async fn send(&self, _destination: &str, _body: &str) -> Result<(), TransportError> {
//! #             Ok(())
//! #         }
//! #         async fn subscribe(&self, topic: &str, _listener: Arc<dyn FrameListener>)
//! #             -> Result<WireSubscriptionId, TransportError> {
//! #             Ok(WireSubscriptionId::new(topic))
//! #         }
//! #         async fn unsubscribe(&self, _subscription: &WireSubscriptionId)
//! #             -> Result<(), TransportError> { Ok(()) }
//! #     }
//! # }
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let transport: Arc<dyn FeedTransport> = Arc::new(mock_transport::MockTransport);
//! let feed = IssueFeed::new(FeedConfig::new("ws://localhost:8080/ws"), transport).unwrap();
//!
//! let mut status = feed.observe_connection_status();
//! assert_eq!(status.recv().await, Some(false));
//!
//! feed.connect().await;
//! assert_eq!(status.recv().await, Some(true));
//!
//! let _comments = feed.observe_comment_updates(42).await.unwrap();
//! feed.stop_observing_comments(42).await;
//! feed.shutdown().await;
//! # });
//! ```
//!
//! ## Internal architecture map
//!
//! - Transport seam: the [`FeedTransport`] adapter and its callbacks
//! - Connection: lifecycle state machine, reconnect policy and status channel
//! - Registry: interest keys, reference-counted registrations and the pending queue
//! - Routing: envelope parsing, scope validation and per-kind broadcast channels
//! - Feed: the outward [`IssueFeed`] surface tying the layers together
//!
//! ## Observability model
//!
//! The workspace uses `tracing` for logs/events.
//! Library code emits events/spans and does not initialize a global subscriber.
//! Binaries and tests are responsible for one-time `tracing_subscriber`
//! initialization at process boundaries.

mod config;
pub use config::{FeedConfig, ReconnectConfig};

mod connection;
pub use connection::{ConnectionState, ReconnectPolicy, RetryDecision, StateStream, StatusStream};

mod error;
pub use error::FeedError;

mod feed;
pub use feed::IssueFeed;

#[doc(hidden)]
pub mod observability;

mod registry;
pub use registry::{ChannelKind, InterestHandle, InterestKey};

mod routing;
pub use routing::{
    ActivityEvent, CommentEvent, Envelope, EventStream, EventType, IssueEvent, RouteOutcome,
    RouterStats, ScopedEvent,
};

mod transport;
pub use transport::{
    CloseReason, ConnectionListener, FeedTransport, FrameListener, TransportError,
    WireSubscriptionId,
};
