//! Event routing layer.
//!
//! Decodes raw frames into typed envelopes, rejects frames whose issue id does not
//! match the interest they arrived on, and fans the rest out to observers.

mod envelope;
mod event_router;
mod event_stream;

pub use envelope::{ActivityEvent, CommentEvent, Envelope, EventType, IssueEvent, ScopedEvent};
pub(crate) use event_router::EventRouter;
pub use event_router::{RouteOutcome, RouterStats};
pub use event_stream::EventStream;
