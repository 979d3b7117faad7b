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

//! Per-registration frame listener that hands wire frames to the router.

use crate::observability::{events, fields};
use crate::registry::InterestKey;
use crate::routing::EventRouter;
use crate::transport::FrameListener;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, Level};

const COMPONENT: &str = "wire_listener";

pub(crate) struct WireListener {
    key: InterestKey,
    topic: String,
    router: Arc<EventRouter>,
    live: AtomicBool,
}

impl WireListener {
    pub(crate) fn new(key: InterestKey, router: Arc<EventRouter>) -> Self {
        Self {
            key,
            topic: key.topic(),
            router,
            live: AtomicBool::new(true),
        }
    }

    /// Frames arriving after this point are dropped, even if the transport still
    /// has them queued.
    pub(crate) fn disarm(&self) {
        self.live.store(false, Ordering::Release);
    }
}

#[async_trait]
impl FrameListener for WireListener {
    async fn on_frame(&self, topic: &str, body: &str) {
        let interest = fields::format_interest(&self.key);

        if tracing::enabled!(Level::DEBUG) {
            debug!(
                event = events::FRAME_RECEIVE,
                component = COMPONENT,
                interest = interest.as_str(),
                topic,
                body = %fields::format_body_preview(body),
                "received wire frame"
            );
        }

        if !self.live.load(Ordering::Acquire) {
            debug!(
                event = events::FRAME_DROP_RELEASED,
                component = COMPONENT,
                interest = interest.as_str(),
                topic,
                reason = fields::REASON_LAST_INTEREST_RELEASED,
                "dropping frame for released interest"
            );
            return;
        }

        if topic != self.topic {
            debug!(
                event = events::FRAME_DROP_TOPIC_MISMATCH,
                component = COMPONENT,
                interest = interest.as_str(),
                topic,
                expected_topic = self.topic.as_str(),
                "dropping frame delivered on unexpected topic"
            );
            return;
        }

        self.router.route_frame(&self.key, body);
    }
}

#[cfg(test)]
mod tests {
    use super::WireListener;
    use crate::registry::InterestKey;
    use crate::routing::{EventRouter, RouteOutcome};
    use crate::transport::FrameListener;
    use std::sync::Arc;

    const COMMENT: &str = r#"{"eventType":"CREATED","commentId":1,"issueId":42,"content":"hi"}"#;

    #[tokio::test]
    async fn disarmed_listener_drops_frames() {
        let router = Arc::new(EventRouter::new(8));
        let mut comments = router.subscribe_comments(42).expect("router open");
        let listener = WireListener::new(InterestKey::comments(42), router.clone());

        listener.on_frame("/topic/issues/42/comments", COMMENT).await;
        listener.disarm();
        listener.on_frame("/topic/issues/42/comments", COMMENT).await;

        assert!(comments.try_recv().is_some());
        assert!(comments.try_recv().is_none());
        assert_eq!(router.stats().delivered, 1);
    }

    #[tokio::test]
    async fn frames_on_foreign_topic_are_not_routed() {
        let router = Arc::new(EventRouter::new(8));
        let listener = WireListener::new(InterestKey::comments(42), router.clone());

        listener.on_frame("/topic/issues/7/comments", COMMENT).await;

        assert_eq!(router.stats().delivered, 0);
        assert_eq!(
            router.route_frame(&InterestKey::comments(42), COMMENT),
            RouteOutcome::Delivered
        );
    }
}
