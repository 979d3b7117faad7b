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

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing_subscriber::EnvFilter;

const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Installs a test-writer subscriber once per test binary. Filter with `RUST_LOG`.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Polls `condition` until it holds or `within` elapses. Uses tokio time, so a
/// paused test clock advances instead of sleeping.
pub async fn wait_for<F, Fut>(mut condition: F, within: Duration) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + within;
    loop {
        if condition().await {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

pub fn issue_body(event_type: &str, issue_id: i64, title: &str) -> String {
    format!(
        r#"{{"eventType":"{event_type}","issueId":{issue_id},"title":"{title}","status":"OPEN","priority":"MEDIUM","projectId":1}}"#
    )
}

pub fn comment_body(event_type: &str, issue_id: i64, comment_id: i64, content: &str) -> String {
    format!(
        r#"{{"eventType":"{event_type}","issueId":{issue_id},"commentId":{comment_id},"content":"{content}","authorId":3,"authorName":"dana"}}"#
    )
}

pub fn activity_body(issue_id: i64, activity_log_id: i64, activity_type: &str) -> String {
    format!(
        r#"{{"eventType":"CREATED","issueId":{issue_id},"activityLogId":{activity_log_id},"activityType":"{activity_type}","userId":3,"userName":"dana","oldValue":"OPEN","newValue":"IN_PROGRESS"}}"#
    )
}
