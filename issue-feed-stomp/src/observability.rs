//! Structured event names emitted by the STOMP session tasks.

pub const COMPONENT: &str = "stomp_transport";

pub const SESSION_OPEN: &str = "stomp_session_open";
pub const SESSION_REFUSED: &str = "stomp_session_refused";
pub const SESSION_CLOSE: &str = "stomp_session_close";
pub const SESSION_ENDED: &str = "stomp_session_ended";
pub const FRAME_UNROUTED: &str = "stomp_frame_unrouted";
pub const FRAME_UNDECODABLE: &str = "stomp_frame_undecodable";
pub const FRAME_IGNORED: &str = "stomp_frame_ignored";
