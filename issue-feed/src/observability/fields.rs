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

//! Canonical structured field values and value-format helpers.

use crate::registry::InterestKey;
use crate::transport::WireSubscriptionId;

pub const NONE: &str = "none";
pub const REASON_SHUTDOWN: &str = "shutdown";
pub const REASON_DISCONNECT: &str = "disconnect";
pub const REASON_CONNECTION_LOST: &str = "connection_lost";
pub const REASON_LAST_INTEREST_RELEASED: &str = "last_interest_released";
pub const REASON_NOT_CONNECTED: &str = "not_connected";

pub fn format_interest(key: &InterestKey) -> String {
    key.to_string()
}

pub fn format_wire_id(wire_id: Option<&WireSubscriptionId>) -> String {
    wire_id
        .map(|id| id.as_str().to_string())
        .unwrap_or_else(|| NONE.to_string())
}

/// Shortens a frame body for diagnostics so malformed payloads do not flood logs.
pub fn format_body_preview(body: &str) -> String {
    const MAX_PREVIEW_CHARS: usize = 64;

    let mut preview: String = body.chars().take(MAX_PREVIEW_CHARS).collect();
    if body.chars().count() > MAX_PREVIEW_CHARS {
        preview.push_str("...");
    }
    preview
}

#[cfg(test)]
mod tests {
    use super::{format_body_preview, format_interest, format_wire_id, NONE};
    use crate::registry::InterestKey;
    use crate::transport::WireSubscriptionId;

    #[test]
    fn format_interest_uses_kind_and_scope() {
        assert_eq!(format_interest(&InterestKey::comments(7)), "comments:7");
        assert_eq!(format_interest(&InterestKey::issues()), "issues");
    }

    #[test]
    fn format_wire_id_returns_none_when_absent() {
        assert_eq!(format_wire_id(None), NONE);
        assert_eq!(
            format_wire_id(Some(&WireSubscriptionId::new("sub-1"))),
            "sub-1"
        );
    }

    #[test]
    fn format_body_preview_truncates_long_bodies() {
        let body = "x".repeat(100);
        let preview = format_body_preview(&body);

        assert_eq!(preview.len(), 67);
        assert!(preview.ends_with("..."));
        assert_eq!(format_body_preview("{}"), "{}");
    }
}
