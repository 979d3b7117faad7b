//! Observer-side handle for one event channel.

use crate::observability::events;
use crate::registry::ChannelKind;
use crate::routing::envelope::ScopedEvent;
use futures::Stream;
use tokio::sync::broadcast::{
    self,
    error::{RecvError, TryRecvError},
};
use tracing::warn;

const COMPONENT: &str = "event_stream";

/// Events of one kind, optionally restricted to one issue id.
///
/// A stream that falls behind the channel capacity skips the lost events and keeps
/// going. It ends once the feed is shut down.
pub struct EventStream<T> {
    kind: ChannelKind,
    scope: Option<i64>,
    receiver: broadcast::Receiver<T>,
}

impl<T> EventStream<T>
where
    T: Clone + ScopedEvent + Send + 'static,
{
    pub(crate) fn new(
        kind: ChannelKind,
        scope: Option<i64>,
        receiver: broadcast::Receiver<T>,
    ) -> Self {
        Self {
            kind,
            scope,
            receiver,
        }
    }

    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    pub fn scope(&self) -> Option<i64> {
        self.scope
    }

    fn in_scope(&self, event: &T) -> bool {
        self.scope
            .map_or(true, |scope| event.issue_id() == scope)
    }

    /// Waits for the next event. `None` once the feed has shut down.
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.in_scope(&event) => return Some(event),
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => self.log_lagged(skipped),
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next already-queued event, if any.
    pub fn try_recv(&mut self) -> Option<T> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.in_scope(&event) => return Some(event),
                Ok(_) => {}
                Err(TryRecvError::Lagged(skipped)) => self.log_lagged(skipped),
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = T> + Send + 'static {
        futures::stream::unfold(self, |mut events| async move {
            events.recv().await.map(|event| (event, events))
        })
    }

    fn log_lagged(&self, skipped: u64) {
        warn!(
            event = events::EVENT_RECV_LAGGED,
            component = COMPONENT,
            kind = ?self.kind,
            scope = ?self.scope,
            skipped,
            "event observer lagged; skipping lost events"
        );
    }
}
