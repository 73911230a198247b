//! Rust client for the Campfire group-chat API.
//!
//! The crate is organized by transport surface:
//! - `connection`: authenticated HTTP transport for one-shot JSON requests.
//! - `stream`: live room feeds and their record framing.
//! - `client`, `room`, `message`, `user`, `upload`: snapshots of server
//!   resources and the verbs scoped to them.

/// Account entry point and resource-level errors.
pub mod client;
/// Authenticated HTTP transport and connection settings.
pub mod connection;
/// Chat messages.
pub mod message;
/// REST path helpers.
pub mod restful;
/// Rooms and the live listener.
pub mod room;
/// Live feed connection and framing.
pub mod stream;
/// Server timestamp parsing.
pub mod timestamp;
/// Uploaded files.
pub mod upload;
/// Account users.
pub mod user;

pub use client::{Client, ClientError};
pub use connection::{Connection, ConnectionError, ConnectionOptions, HttpMethod};
pub use message::{Message, MessageKind};
pub use room::{RecentOptions, Room, RoomUpdate};
pub use stream::client::{StreamConnection, StreamError, StreamHandle};
pub use stream::framing::Framing;
pub use upload::Upload;
pub use user::User;
