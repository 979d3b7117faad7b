//! Canonical structured event names used across `issue-feed`.

// Connection lifecycle events.
pub const CONNECT_START: &str = "connect_start";
pub const CONNECT_OK: &str = "connect_ok";
pub const CONNECT_FAILED: &str = "connect_failed";
pub const CONNECT_SUPERSEDED: &str = "connect_superseded";
pub const CONNECT_LOST_IN_HANDSHAKE: &str = "connect_lost_in_handshake";
pub const CONNECTION_LOST: &str = "connection_lost";
pub const CONNECTION_LOST_STALE: &str = "connection_lost_stale";
pub const DISCONNECT_OK: &str = "disconnect_ok";
pub const DISCONNECT_FAILED: &str = "disconnect_failed";
pub const RECONNECT_SCHEDULED: &str = "reconnect_scheduled";
pub const RECONNECT_EXHAUSTED: &str = "reconnect_exhausted";
pub const RECONNECT_CANCELLED: &str = "reconnect_cancelled";
pub const STATUS_RECV_LAGGED: &str = "status_recv_lagged";

// Registry events.
pub const INTEREST_ATTACH: &str = "interest_attach";
pub const INTEREST_CREATE: &str = "interest_create";
pub const INTEREST_RELEASE: &str = "interest_release";
pub const INTEREST_RELEASE_UNKNOWN: &str = "interest_release_unknown";
pub const INTEREST_PENDING: &str = "interest_pending";
pub const WIRE_ARM_OK: &str = "wire_arm_ok";
pub const WIRE_ARM_FAILED: &str = "wire_arm_failed";
pub const WIRE_DISARM_OK: &str = "wire_disarm_ok";
pub const WIRE_DISARM_FAILED: &str = "wire_disarm_failed";
pub const PENDING_FLUSH_START: &str = "pending_flush_start";
pub const PENDING_FLUSH_DONE: &str = "pending_flush_done";

// Routing events.
pub const FRAME_RECEIVE: &str = "frame_receive";
pub const FRAME_DROP_RELEASED: &str = "frame_drop_released";
pub const FRAME_DROP_TOPIC_MISMATCH: &str = "frame_drop_topic_mismatch";
pub const FRAME_DROP_MALFORMED: &str = "frame_drop_malformed";
pub const FRAME_DROP_SCOPE_MISMATCH: &str = "frame_drop_scope_mismatch";
pub const EVENT_PUBLISH: &str = "event_publish";
pub const EVENT_RECV_LAGGED: &str = "event_recv_lagged";

// Feed lifecycle events.
pub const FEED_SHUTDOWN: &str = "feed_shutdown";
pub const DRIVER_STOPPED: &str = "driver_stopped";
