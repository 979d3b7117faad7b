//! Identity of one logical interest.

use std::fmt::{self, Display, Formatter};

/// The three server-pushed feeds.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ChannelKind {
    /// Global issue changes.
    IssueFeed,
    /// Comments on one issue.
    CommentFeed,
    /// Activity log entries for one issue.
    ActivityFeed,
}

impl ChannelKind {
    pub fn is_scoped(self) -> bool {
        !matches!(self, ChannelKind::IssueFeed)
    }
}

/// `(kind, scope)` pair. The issue feed carries no scope; the comment and activity
/// feeds are scoped to one issue id.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct InterestKey {
    kind: ChannelKind,
    scope: Option<i64>,
}

impl InterestKey {
    pub fn issues() -> Self {
        Self {
            kind: ChannelKind::IssueFeed,
            scope: None,
        }
    }

    pub fn comments(issue_id: i64) -> Self {
        Self {
            kind: ChannelKind::CommentFeed,
            scope: Some(issue_id),
        }
    }

    pub fn activities(issue_id: i64) -> Self {
        Self {
            kind: ChannelKind::ActivityFeed,
            scope: Some(issue_id),
        }
    }

    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    pub fn scope(&self) -> Option<i64> {
        self.scope
    }

    /// Server-side destination this interest is armed on.
    pub fn topic(&self) -> String {
        match (self.kind, self.scope) {
            (ChannelKind::CommentFeed, Some(issue_id)) => {
                format!("/topic/issues/{issue_id}/comments")
            }
            (ChannelKind::ActivityFeed, Some(issue_id)) => {
                format!("/topic/issues/{issue_id}/activities")
            }
            _ => "/topic/issues".to_string(),
        }
    }
}

impl Display for InterestKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let label = match self.kind {
            ChannelKind::IssueFeed => "issues",
            ChannelKind::CommentFeed => "comments",
            ChannelKind::ActivityFeed => "activities",
        };
        match self.scope {
            Some(scope) => write!(f, "{label}:{scope}"),
            None => f.write_str(label),
        }
    }
}

/// Proof of one granted interest. Releasing it is the only way to give the
/// interest back; it is deliberately not `Clone`.
#[derive(Debug, Eq, PartialEq)]
pub struct InterestHandle {
    key: InterestKey,
    ticket: u64,
}

impl InterestHandle {
    pub(crate) fn new(key: InterestKey, ticket: u64) -> Self {
        Self { key, ticket }
    }

    pub fn key(&self) -> InterestKey {
        self.key
    }

    pub(crate) fn ticket(&self) -> u64 {
        self.ticket
    }
}
