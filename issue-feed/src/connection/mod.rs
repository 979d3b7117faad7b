//! Connection layer.
//!
//! Owns the connection lifecycle state machine, the reconnection policy and the
//! replaying status channel. Only this layer opens or closes the shared transport.
//!
//! ```
//! use std::time::Duration;
//! use issue_feed::{ReconnectPolicy, RetryDecision};
//!
//! let mut policy = ReconnectPolicy::new(2, Duration::from_millis(100));
//! assert!(matches!(policy.next_retry(), RetryDecision::RetryAfter { attempt: 1, .. }));
//! assert!(matches!(policy.next_retry(), RetryDecision::RetryAfter { attempt: 2, .. }));
//! assert_eq!(policy.next_retry(), RetryDecision::Exhausted);
//! assert!(policy.is_exhausted());
//! ```

pub(crate) mod manager;
pub(crate) mod reconnect;
pub(crate) mod state;

pub use reconnect::{ReconnectPolicy, RetryDecision};
pub use state::{ConnectionState, StateStream, StatusStream};
