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

//! # issue-feed-stomp
//!
//! A [`FeedTransport`](issue_feed::FeedTransport) for brokers that speak
//! STOMP 1.2 over a plain WebSocket, such as a Spring message broker relay.
//!
//! ```no_run
//! use std::sync::Arc;
//! use issue_feed::{FeedConfig, IssueFeed};
//! use issue_feed_stomp::StompTransport;
//!
//! # async fn run() {
//! let transport = Arc::new(StompTransport::default());
//! let feed = IssueFeed::new(FeedConfig::new("ws://localhost:8080/ws"), transport).unwrap();
//! feed.connect().await;
//! # }
//! ```

pub mod frame;
mod observability;
mod transport;

pub use frame::{FrameError, StompFrame};
pub use transport::{StompConfig, StompTransport};
