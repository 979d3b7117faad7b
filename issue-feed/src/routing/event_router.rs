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

//! Frame validation and fan-out onto the per-kind event channels.

use crate::observability::{events, fields};
use crate::registry::{ChannelKind, InterestKey};
use crate::routing::envelope::{ActivityEvent, CommentEvent, Envelope, IssueEvent};
use crate::routing::event_stream::EventStream;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard};
use tokio::sync::broadcast::{self, Sender};
use tracing::{debug, warn};

const COMPONENT: &str = "event_router";

/// Result of routing one raw frame.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RouteOutcome {
    Delivered,
    /// Body did not decode as the channel's event type; dropped.
    Malformed,
    /// Envelope names a different issue than the subscription it arrived on; dropped.
    ScopeMismatch,
    /// The feed is shut down; nothing is published anymore.
    Closed,
}

/// Running counters of routing outcomes.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RouterStats {
    pub delivered: u64,
    pub malformed: u64,
    pub scope_mismatch: u64,
}

struct Channels {
    issues: Sender<IssueEvent>,
    comments: Sender<CommentEvent>,
    activities: Sender<ActivityEvent>,
}

/// Stateless apart from its channels: frames are decoded, checked against the
/// interest they arrived on and published on the channel for their kind.
pub(crate) struct EventRouter {
    channels: RwLock<Option<Channels>>,
    delivered: AtomicU64,
    malformed: AtomicU64,
    scope_mismatch: AtomicU64,
}

impl EventRouter {
    pub(crate) fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            channels: RwLock::new(Some(Channels {
                issues: broadcast::channel(capacity).0,
                comments: broadcast::channel(capacity).0,
                activities: broadcast::channel(capacity).0,
            })),
            delivered: AtomicU64::new(0),
            malformed: AtomicU64::new(0),
            scope_mismatch: AtomicU64::new(0),
        }
    }

    fn channels(&self) -> RwLockReadGuard<'_, Option<Channels>> {
        self.channels
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn route_frame(&self, key: &InterestKey, body: &str) -> RouteOutcome {
        let envelope = match Envelope::parse(key.kind(), body) {
            Ok(envelope) => envelope,
            Err(err) => {
                self.malformed.fetch_add(1, Ordering::Relaxed);
                warn!(
                    event = events::FRAME_DROP_MALFORMED,
                    component = COMPONENT,
                    interest = %key,
                    body = %fields::format_body_preview(body),
                    err = %err,
                    "dropping malformed frame"
                );
                return RouteOutcome::Malformed;
            }
        };

        if let Some(scope) = key.scope() {
            if envelope.issue_id() != scope {
                self.scope_mismatch.fetch_add(1, Ordering::Relaxed);
                warn!(
                    event = events::FRAME_DROP_SCOPE_MISMATCH,
                    component = COMPONENT,
                    interest = %key,
                    issue_id = envelope.issue_id(),
                    "dropping envelope addressed to another issue"
                );
                return RouteOutcome::ScopeMismatch;
            }
        }

        let channels = self.channels();
        let Some(channels) = channels.as_ref() else {
            return RouteOutcome::Closed;
        };
        let receivers = match envelope {
            Envelope::Issue(event) => channels.issues.send(event).unwrap_or(0),
            Envelope::Comment(event) => channels.comments.send(event).unwrap_or(0),
            Envelope::Activity(event) => channels.activities.send(event).unwrap_or(0),
        };
        self.delivered.fetch_add(1, Ordering::Relaxed);
        debug!(
            event = events::EVENT_PUBLISH,
            component = COMPONENT,
            interest = %key,
            receivers,
            "published event"
        );
        RouteOutcome::Delivered
    }

    pub(crate) fn subscribe_issues(&self) -> Option<EventStream<IssueEvent>> {
        self.channels().as_ref().map(|channels| {
            EventStream::new(ChannelKind::IssueFeed, None, channels.issues.subscribe())
        })
    }

    pub(crate) fn subscribe_comments(&self, issue_id: i64) -> Option<EventStream<CommentEvent>> {
        self.channels().as_ref().map(|channels| {
            EventStream::new(
                ChannelKind::CommentFeed,
                Some(issue_id),
                channels.comments.subscribe(),
            )
        })
    }

    pub(crate) fn subscribe_activities(
        &self,
        issue_id: i64,
    ) -> Option<EventStream<ActivityEvent>> {
        self.channels().as_ref().map(|channels| {
            EventStream::new(
                ChannelKind::ActivityFeed,
                Some(issue_id),
                channels.activities.subscribe(),
            )
        })
    }

    /// Drops the channels so every open [`EventStream`] ends.
    pub(crate) fn close(&self) {
        self.channels
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
    }

    pub(crate) fn stats(&self) -> RouterStats {
        RouterStats {
            delivered: self.delivered.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            scope_mismatch: self.scope_mismatch.load(Ordering::Relaxed),
        }
    }
}
