//! Connection state and the replaying status channel.

use crate::observability::events;
use std::fmt::{Display, Formatter};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::warn;

const COMPONENT: &str = "status_channel";

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    fn as_status(self) -> Option<bool> {
        match self {
            ConnectionState::Disconnected => Some(false),
            ConnectionState::Connecting => None,
            ConnectionState::Connected => Some(true),
        }
    }
}

impl Display for ConnectionState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "DISCONNECTED"),
            ConnectionState::Connecting => write!(f, "CONNECTING"),
            ConnectionState::Connected => write!(f, "CONNECTED"),
        }
    }
}

/// Current connection state plus a broadcast of every transition.
///
/// Subscribing and publishing happen under the same lock, so a new observer
/// sees exactly the current state followed by every later transition.
pub(crate) struct StatusChannel {
    current: Mutex<ConnectionState>,
    sender: broadcast::Sender<ConnectionState>,
}

impl StatusChannel {
    pub(crate) fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            current: Mutex::new(ConnectionState::Disconnected),
            sender,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ConnectionState> {
        self.current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn current(&self) -> ConnectionState {
        *self.lock()
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.current() == ConnectionState::Connected
    }

    /// Records a transition. Returns `false` when `state` is already current.
    pub(crate) fn publish(&self, state: ConnectionState) -> bool {
        let mut current = self.lock();
        if *current == state {
            return false;
        }
        *current = state;
        // No receivers is fine; late observers replay the current state.
        let _ = self.sender.send(state);
        true
    }

    pub(crate) fn observe_state(&self) -> StateStream {
        let current = self.lock();
        StateStream {
            initial: Some(*current),
            receiver: self.sender.subscribe(),
        }
    }

    pub(crate) fn observe_status(&self) -> StatusStream {
        let current = self.lock();
        StatusStream {
            initial: current.as_status(),
            receiver: self.sender.subscribe(),
        }
    }
}

/// Every [`ConnectionState`] transition, starting with the current state.
pub struct StateStream {
    initial: Option<ConnectionState>,
    receiver: broadcast::Receiver<ConnectionState>,
}

impl StateStream {
    pub async fn recv(&mut self) -> Option<ConnectionState> {
        if let Some(initial) = self.initial.take() {
            return Some(initial);
        }
        loop {
            match self.receiver.recv().await {
                Ok(state) => return Some(state),
                Err(RecvError::Lagged(skipped)) => log_lagged(skipped),
                Err(RecvError::Closed) => return None,
            }
        }
    }

    pub fn try_recv(&mut self) -> Option<ConnectionState> {
        if let Some(initial) = self.initial.take() {
            return Some(initial);
        }
        loop {
            match self.receiver.try_recv() {
                Ok(state) => return Some(state),
                Err(TryRecvError::Lagged(skipped)) => log_lagged(skipped),
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }
}

/// Boolean connectivity: `true` on CONNECTED, `false` on DISCONNECTED.
///
/// The first value is the current state, so late observers never wait for the
/// next transition to learn whether the feed is up. CONNECTING is not reported.
pub struct StatusStream {
    initial: Option<bool>,
    receiver: broadcast::Receiver<ConnectionState>,
}

impl StatusStream {
    pub async fn recv(&mut self) -> Option<bool> {
        if let Some(initial) = self.initial.take() {
            return Some(initial);
        }
        loop {
            match self.receiver.recv().await {
                Ok(state) => {
                    if let Some(status) = state.as_status() {
                        return Some(status);
                    }
                }
                Err(RecvError::Lagged(skipped)) => log_lagged(skipped),
                Err(RecvError::Closed) => return None,
            }
        }
    }

    pub fn try_recv(&mut self) -> Option<bool> {
        if let Some(initial) = self.initial.take() {
            return Some(initial);
        }
        loop {
            match self.receiver.try_recv() {
                Ok(state) => {
                    if let Some(status) = state.as_status() {
                        return Some(status);
                    }
                }
                Err(TryRecvError::Lagged(skipped)) => log_lagged(skipped),
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }
}

fn log_lagged(skipped: u64) {
    warn!(
        event = events::STATUS_RECV_LAGGED,
        component = COMPONENT,
        skipped,
        "status observer lagged"
    );
}

#[cfg(test)]
mod tests {
    use super::{ConnectionState, StatusChannel};

    #[test]
    fn late_status_observer_sees_current_state_first() {
        let channel = StatusChannel::new(8);
        channel.publish(ConnectionState::Connecting);
        channel.publish(ConnectionState::Connected);

        let mut status = channel.observe_status();

        assert_eq!(status.try_recv(), Some(true));
        assert_eq!(status.try_recv(), None);
    }

    #[test]
    fn status_stream_skips_connecting_but_state_stream_keeps_it() {
        let channel = StatusChannel::new(8);
        let mut status = channel.observe_status();
        let mut states = channel.observe_state();

        channel.publish(ConnectionState::Connecting);
        channel.publish(ConnectionState::Connected);
        channel.publish(ConnectionState::Disconnected);

        assert_eq!(status.try_recv(), Some(false));
        assert_eq!(status.try_recv(), Some(true));
        assert_eq!(status.try_recv(), Some(false));
        assert_eq!(status.try_recv(), None);

        assert_eq!(states.try_recv(), Some(ConnectionState::Disconnected));
        assert_eq!(states.try_recv(), Some(ConnectionState::Connecting));
        assert_eq!(states.try_recv(), Some(ConnectionState::Connected));
        assert_eq!(states.try_recv(), Some(ConnectionState::Disconnected));
        assert_eq!(states.try_recv(), None);
    }

    #[test]
    fn publishing_current_state_is_not_a_transition() {
        let channel = StatusChannel::new(8);

        assert!(!channel.publish(ConnectionState::Disconnected));
        assert!(channel.publish(ConnectionState::Connecting));
        assert!(!channel.is_connected());
    }

    #[tokio::test]
    async fn recv_waits_for_next_transition() {
        let channel = std::sync::Arc::new(StatusChannel::new(8));
        let mut status = channel.observe_status();
        assert_eq!(status.recv().await, Some(false));

        let publisher = channel.clone();
        tokio::spawn(async move {
            publisher.publish(ConnectionState::Connecting);
            publisher.publish(ConnectionState::Connected);
        });

        assert_eq!(status.recv().await, Some(true));
    }
}
