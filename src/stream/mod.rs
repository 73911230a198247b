//! Live-feed modules.
//!
//! - `client`: long-lived GET against the streaming host, its worker task and
//!   the socket handle used to tear it down.
//! - `framing`: carriage-return record splitting.

/// Streaming connection, worker and socket handle.
pub mod client;
/// Record framing for feed chunks.
pub mod framing;
