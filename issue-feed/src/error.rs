//! Errors surfaced by the public feed API.

use crate::transport::TransportError;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Failures of [`IssueFeed`](crate::IssueFeed) operations.
///
/// Transport and parse failures never show up here for observers; they are
/// recovered internally and only visible on the connection status channel.
#[derive(Debug)]
pub enum FeedError {
    NoRuntime,
    ShutDown,
    Transport(TransportError),
}

impl Display for FeedError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            FeedError::NoRuntime => write!(f, "issue feed must be created inside a tokio runtime"),
            FeedError::ShutDown => write!(f, "issue feed has been shut down"),
            FeedError::Transport(err) => write!(f, "transport failure: {err}"),
        }
    }
}

impl Error for FeedError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            FeedError::Transport(err) => Some(err),
            _ => None,
        }
    }
}

impl From<TransportError> for FeedError {
    fn from(err: TransportError) -> Self {
        FeedError::Transport(err)
    }
}

#[cfg(test)]
mod tests {
    use super::FeedError;
    use crate::transport::TransportError;
    use std::error::Error;

    #[test]
    fn transport_error_is_exposed_as_source() {
        let error = FeedError::from(TransportError::NotConnected);

        assert!(error.to_string().contains("transport failure"));
        assert!(error.source().is_some());
    }

    #[test]
    fn shut_down_display_is_stable() {
        assert_eq!(FeedError::ShutDown.to_string(), "issue feed has been shut down");
        assert!(FeedError::ShutDown.source().is_none());
    }
}
