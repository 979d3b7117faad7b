//! Subscription registry layer.
//!
//! Maps logical interest keys to wire subscriptions, reference-counting callers
//! and queueing interests requested while the connection is down.

mod interest_key;
pub(crate) mod subscription_registry;
pub(crate) mod wire_listener;

pub use interest_key::{ChannelKind, InterestHandle, InterestKey};
