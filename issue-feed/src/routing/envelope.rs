//! Typed change notifications and their wire decoding.

use crate::registry::ChannelKind;
use serde::{Deserialize, Serialize};

#[derive(Deserialize, Serialize, Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    Created,
    Updated,
    Deleted,
}

/// Change to an issue, published on the global issue feed.
#[derive(Deserialize, Serialize, Clone, Debug, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IssueEvent {
    pub event_type: EventType,
    pub issue_id: i64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub project_id: Option<i64>,
}

/// Change to one comment of an issue.
#[derive(Deserialize, Serialize, Clone, Debug, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CommentEvent {
    pub event_type: EventType,
    pub comment_id: i64,
    pub issue_id: i64,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub author_id: Option<i64>,
    #[serde(default)]
    pub author_name: Option<String>,
}

/// New activity log entry of an issue.
#[derive(Deserialize, Serialize, Clone, Debug, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEvent {
    pub event_type: EventType,
    pub activity_log_id: i64,
    pub issue_id: i64,
    #[serde(default)]
    pub activity_type: Option<String>,
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub old_value: Option<String>,
    #[serde(default)]
    pub new_value: Option<String>,
}

/// Events that belong to a single issue.
pub trait ScopedEvent {
    fn issue_id(&self) -> i64;
}

impl ScopedEvent for IssueEvent {
    fn issue_id(&self) -> i64 {
        self.issue_id
    }
}

impl ScopedEvent for CommentEvent {
    fn issue_id(&self) -> i64 {
        self.issue_id
    }
}

impl ScopedEvent for ActivityEvent {
    fn issue_id(&self) -> i64 {
        self.issue_id
    }
}

/// One validated inbound notification.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Envelope {
    Issue(IssueEvent),
    Comment(CommentEvent),
    Activity(ActivityEvent),
}

impl Envelope {
    /// Decodes `body` as the event type carried by channels of `kind`.
    pub fn parse(kind: ChannelKind, body: &str) -> Result<Self, serde_json::Error> {
        Ok(match kind {
            ChannelKind::IssueFeed => Envelope::Issue(serde_json::from_str(body)?),
            ChannelKind::CommentFeed => Envelope::Comment(serde_json::from_str(body)?),
            ChannelKind::ActivityFeed => Envelope::Activity(serde_json::from_str(body)?),
        })
    }

    pub fn kind(&self) -> ChannelKind {
        match self {
            Envelope::Issue(_) => ChannelKind::IssueFeed,
            Envelope::Comment(_) => ChannelKind::CommentFeed,
            Envelope::Activity(_) => ChannelKind::ActivityFeed,
        }
    }

    pub fn issue_id(&self) -> i64 {
        match self {
            Envelope::Issue(event) => event.issue_id,
            Envelope::Comment(event) => event.issue_id,
            Envelope::Activity(event) => event.issue_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Envelope, EventType};
    use crate::registry::ChannelKind;

    #[test]
    fn comment_body_decodes_with_missing_optionals() {
        let envelope = Envelope::parse(
            ChannelKind::CommentFeed,
            r#"{"eventType":"DELETED","commentId":3,"issueId":42}"#,
        )
        .expect("valid comment");

        match envelope {
            Envelope::Comment(comment) => {
                assert_eq!(comment.event_type, EventType::Deleted);
                assert_eq!(comment.issue_id, 42);
                assert_eq!(comment.content, None);
            }
            other => panic!("unexpected envelope: {other:?}"),
        }
    }

    #[test]
    fn issue_body_keeps_status_and_priority() {
        let envelope = Envelope::parse(
            ChannelKind::IssueFeed,
            r#"{"eventType":"UPDATED","issueId":5,"title":"Crash","status":"IN_PROGRESS","priority":"HIGH","projectId":2}"#,
        )
        .expect("valid issue");

        assert_eq!(envelope.kind(), ChannelKind::IssueFeed);
        assert_eq!(envelope.issue_id(), 5);
        let Envelope::Issue(issue) = envelope else {
            panic!("expected issue envelope");
        };
        assert_eq!(issue.status.as_deref(), Some("IN_PROGRESS"));
        assert_eq!(issue.project_id, Some(2));
    }

    #[test]
    fn unknown_event_type_and_missing_ids_are_rejected() {
        assert!(Envelope::parse(
            ChannelKind::IssueFeed,
            r#"{"eventType":"ARCHIVED","issueId":5}"#
        )
        .is_err());
        assert!(Envelope::parse(ChannelKind::ActivityFeed, r#"{"eventType":"CREATED"}"#).is_err());
        assert!(Envelope::parse(ChannelKind::CommentFeed, "not json").is_err());
    }
}
