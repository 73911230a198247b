//! Chat rooms and their live listener.
//!
//! A [`Room`] is a snapshot of the room attributes plus one listener slot.
//! The slot is either empty (idle) or holds the socket handle of a live feed
//! and the task delivering its records (active). `listen` on an active room
//! and `stop_listening` on an idle one do nothing.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::client::ClientError;
use crate::connection::{Connection, ConnectionError};
use crate::message::{Message, MessageKind};
use crate::restful::{decode_list, require, take_field, url_for};
use crate::stream::client::StreamHandle;
use crate::timestamp;
use crate::upload::Upload;
use crate::user::User;

/// Options for [`Room::recent_messages`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RecentOptions {
    /// Maximum number of messages (the server caps this at 100).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    /// Only return messages after this one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since_message_id: Option<u64>,
}

/// Attributes accepted by [`Room::update`]. Unset fields are not sent.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RoomUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RoomRecord {
    id: u64,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    topic: Option<String>,
    #[serde(default)]
    membership_limit: Option<u32>,
    #[serde(default)]
    locked: bool,
    #[serde(default)]
    open_to_guests: bool,
    #[serde(default)]
    active_token_value: Option<String>,
    #[serde(default, deserialize_with = "timestamp::deserialize")]
    created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "timestamp::deserialize")]
    updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct Listener {
    stream: StreamHandle,
    delivery: JoinHandle<()>,
}

impl Listener {
    fn is_active(&self) -> bool {
        !self.stream.is_closed()
    }

    fn stop(self) {
        self.stream.destroy();
        self.delivery.abort();
    }
}

/// Snapshot of a room with the verbs scoped to it.
#[derive(Debug)]
pub struct Room {
    pub id: u64,
    pub name: Option<String>,
    pub topic: Option<String>,
    pub membership_limit: Option<u32>,
    pub locked: bool,
    pub open_to_guests: bool,
    /// Guest access token (`active_token_value`).
    pub guest_token: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    connection: Connection,
    listener: Option<Listener>,
}

impl Clone for Room {
    /// The clone shares the snapshot but starts idle.
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            name: self.name.clone(),
            topic: self.topic.clone(),
            membership_limit: self.membership_limit,
            locked: self.locked,
            open_to_guests: self.open_to_guests,
            guest_token: self.guest_token.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            connection: self.connection.clone(),
            listener: None,
        }
    }
}

impl Drop for Room {
    fn drop(&mut self) {
        self.stop_listening();
    }
}

impl Room {
    pub fn from_value(connection: &Connection, value: Value) -> Result<Self, serde_json::Error> {
        let record: RoomRecord = serde_json::from_value(value)?;
        Ok(Self {
            id: record.id,
            name: record.name,
            topic: record.topic,
            membership_limit: record.membership_limit,
            locked: record.locked,
            open_to_guests: record.open_to_guests,
            guest_token: record.active_token_value,
            created_at: record.created_at,
            updated_at: record.updated_at,
            connection: connection.clone(),
            listener: None,
        })
    }

    /// Sends a message of the given type. Returns the created message when
    /// the server echoes it back.
    pub async fn send_message(
        &self,
        body: &str,
        kind: MessageKind,
    ) -> Result<Option<Message>, ClientError> {
        let path = self.path(Some("speak"));
        let payload = json!({ "message": { "body": body, "type": kind } });
        let Some(mut data) = self.connection.post(&path, Some(&payload)).await? else {
            return Ok(None);
        };
        let Some(message) = data.get_mut("message").map(Value::take) else {
            return Ok(None);
        };
        Message::from_value(&self.connection, message)
            .map(Some)
            .map_err(|source| ClientError::Decode { path, source })
    }

    pub async fn speak(&self, message: &str) -> Result<Option<Message>, ClientError> {
        self.send_message(message, MessageKind::Text).await
    }

    /// Sends a pre-formatted message.
    pub async fn paste(&self, message: &str) -> Result<Option<Message>, ClientError> {
        self.send_message(message, MessageKind::Paste).await
    }

    /// Plays the named sound.
    pub async fn play(&self, sound: &str) -> Result<Option<Message>, ClientError> {
        self.send_message(sound, MessageKind::Sound).await
    }

    /// Posts a tweet status URL.
    pub async fn tweet(&self, tweet_url: &str) -> Result<Option<Message>, ClientError> {
        self.send_message(tweet_url, MessageKind::Tweet).await
    }

    /// Updates name and/or topic. This snapshot is not modified; use
    /// [`Room::reload`] to observe the change.
    pub async fn update(&self, attributes: &RoomUpdate) -> Result<(), ClientError> {
        let payload = json!({ "room": attributes });
        self.connection.put(&self.path(None), Some(&payload)).await?;
        Ok(())
    }

    pub async fn join(&self) -> Result<(), ClientError> {
        self.post_action("join").await
    }

    pub async fn leave(&self) -> Result<(), ClientError> {
        self.post_action("leave").await
    }

    /// Locks the room. The api user must be present in it.
    pub async fn lock(&self) -> Result<(), ClientError> {
        self.post_action("lock").await
    }

    pub async fn unlock(&self) -> Result<(), ClientError> {
        self.post_action("unlock").await
    }

    /// Fetches a fresh snapshot of this room. The new snapshot starts idle.
    pub async fn reload(&self) -> Result<Room, ClientError> {
        fetch(&self.connection, self.id).await
    }

    /// Users currently in the room.
    pub async fn users(&self) -> Result<Vec<User>, ClientError> {
        let path = self.path(None);
        let mut data = require(self.connection.get(&path, None).await?, &path)?;
        let mut room = take_field(&mut data, "room", &path)?;
        let users = take_field(&mut room, "users", &path)?;
        decode_list(users, &path, |user| User::from_value(&self.connection, user))
    }

    /// Up to five most recent uploads.
    pub async fn recent_uploads(&self) -> Result<Vec<Upload>, ClientError> {
        let path = self.path(Some("uploads"));
        let mut data = require(self.connection.get(&path, None).await?, &path)?;
        let uploads = take_field(&mut data, "uploads", &path)?;
        decode_list(uploads, &path, |upload| {
            Upload::from_value(&self.connection, upload)
        })
    }

    /// Up to 100 recent messages.
    pub async fn recent_messages(
        &self,
        options: &RecentOptions,
    ) -> Result<Vec<Message>, ClientError> {
        let path = self.path(Some("recent"));
        let query = serde_json::to_value(options).map_err(ConnectionError::Serialize)?;
        let data = self.connection.get(&path, Some(&query)).await?;
        self.messages_from(data, &path)
    }

    /// All messages for `date`, or for today when `date` is `None`.
    pub async fn transcript(&self, date: Option<NaiveDate>) -> Result<Vec<Message>, ClientError> {
        let path = self.path(Some(&transcript_action(date)));
        let data = self.connection.get(&path, None).await?;
        self.messages_from(data, &path)
    }

    /// Uploads a file into the room.
    pub async fn upload(
        &self,
        file_name: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<Upload, ClientError> {
        let path = self.path(Some("uploads"));
        let data = self
            .connection
            .upload(&path, file_name, content_type, bytes)
            .await?;
        self.upload_from(data, &path)
    }

    /// The upload attached to an `UploadMessage`.
    pub async fn upload_for_message(&self, message_id: u64) -> Result<Upload, ClientError> {
        let path = self.path(Some(&format!("messages/{message_id}/upload")));
        let data = self.connection.get(&path, None).await?;
        self.upload_from(data, &path)
    }

    /// Starts delivering live messages to `on_message`.
    ///
    /// Only one listener per room instance is supported: while the room is
    /// listening, further calls are ignored. Records that do not decode as
    /// messages are skipped. Must be called from within a Tokio runtime.
    pub fn listen<F>(&mut self, mut on_message: F)
    where
        F: FnMut(Message) + Send + 'static,
    {
        if self.is_listening() {
            debug!(event = "listen_ignored", room_id = self.id);
            return;
        }
        if let Some(stale) = self.listener.take() {
            stale.stop();
        }

        let mut stream = self.connection.stream(&self.path(Some("live")));
        let handle = stream.handle();
        let connection = self.connection.clone();
        let room_id = self.id;

        let delivery_handle = handle.clone();
        let delivery = tokio::spawn(async move {
            while let Some(record) = stream.recv().await {
                // A stop issued while the previous callback ran.
                if delivery_handle.is_destroyed() {
                    break;
                }
                match Message::from_value(&connection, record) {
                    Ok(message) => on_message(message),
                    Err(err) => debug!(event = "live_record_skipped", room_id, error = %err),
                }
            }
            if let Err(err) = stream.finish().await {
                warn!(event = "listen_stream_failed", room_id, error = %err);
            }
        });

        debug!(event = "listen_started", room_id);
        self.listener = Some(Listener {
            stream: handle,
            delivery,
        });
    }

    /// Tears down the live feed, if any. No message is delivered afterwards.
    pub fn stop_listening(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.stop();
            debug!(event = "listen_stopped", room_id = self.id);
        }
    }

    /// Whether a live feed is currently open for this room instance.
    pub fn is_listening(&self) -> bool {
        self.listener.as_ref().is_some_and(Listener::is_active)
    }

    fn path(&self, action: Option<&str>) -> String {
        url_for("room", Some(&self.id.to_string()), action)
    }

    async fn post_action(&self, action: &str) -> Result<(), ClientError> {
        self.connection.post(&self.path(Some(action)), None).await?;
        Ok(())
    }

    fn messages_from(&self, data: Option<Value>, path: &str) -> Result<Vec<Message>, ClientError> {
        let mut data = require(data, path)?;
        let messages = take_field(&mut data, "messages", path)?;
        decode_list(messages, path, |message| {
            Message::from_value(&self.connection, message)
        })
    }

    fn upload_from(&self, data: Option<Value>, path: &str) -> Result<Upload, ClientError> {
        let mut data = require(data, path)?;
        let upload = take_field(&mut data, "upload", path)?;
        Upload::from_value(&self.connection, upload).map_err(|source| ClientError::Decode {
            path: path.to_string(),
            source,
        })
    }
}

/// `transcript` or `transcript/{year}/{month}/{day}` with a 1-based month.
fn transcript_action(date: Option<NaiveDate>) -> String {
    match date {
        Some(date) => format!(
            "transcript/{}/{}/{}",
            date.year(),
            date.month(),
            date.day()
        ),
        None => "transcript".to_string(),
    }
}

/// Fetches `/room/{id}.json`.
pub(crate) async fn fetch(connection: &Connection, id: u64) -> Result<Room, ClientError> {
    let path = url_for("room", Some(&id.to_string()), None);
    let mut data = require(connection.get(&path, None).await?, &path)?;
    let room = take_field(&mut data, "room", &path)?;
    Room::from_value(connection, room).map_err(|source| ClientError::Decode { path, source })
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use secrecy::SecretString;
    use serde_json::json;

    use super::{transcript_action, RecentOptions, Room, RoomUpdate};
    use crate::connection::{Connection, HttpMethod};

    fn connection() -> Connection {
        Connection::new("acme", &SecretString::new("token".to_string())).expect("connection")
    }

    fn room() -> Room {
        Room::from_value(
            &connection(),
            json!({
                "id": 42,
                "name": "Ops",
                "topic": "on call",
                "membership_limit": 60,
                "locked": false,
                "open_to_guests": true,
                "active_token_value": "abc",
                "created_at": "2010/01/01 00:00:00 +0000",
                "updated_at": "2010/01/02 00:00:00 +0000"
            }),
        )
        .expect("room")
    }

    #[test]
    fn maps_server_fields() {
        let room = room();
        assert_eq!(room.id, 42);
        assert_eq!(room.name.as_deref(), Some("Ops"));
        assert_eq!(room.topic.as_deref(), Some("on call"));
        assert_eq!(room.membership_limit, Some(60));
        assert!(!room.locked);
        assert!(room.open_to_guests);
        assert_eq!(room.guest_token.as_deref(), Some("abc"));
        assert!(room.created_at < room.updated_at);
    }

    #[test]
    fn transcript_path_includes_date_segments() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 9).expect("date");
        assert_eq!(transcript_action(Some(date)), "transcript/2024/1/9");
        assert_eq!(transcript_action(None), "transcript");
        assert_eq!(
            room().path(Some(&transcript_action(Some(date)))),
            "/room/42/transcript/2024/1/9.json"
        );
        assert_eq!(room().path(Some(&transcript_action(None))), "/room/42/transcript.json");
    }

    #[test]
    fn recent_options_use_server_key_for_since_message_id() {
        let options = RecentOptions {
            limit: None,
            since_message_id: Some(42),
        };
        let query = serde_json::to_value(&options).expect("serialize");
        assert_eq!(query, json!({"since_message_id": 42}));

        let prepared = connection()
            .prepare(HttpMethod::Get, &room().path(Some("recent")), Some(&query))
            .expect("prepare");
        assert_eq!(prepared.url.query(), Some("since_message_id=42"));
        assert!(!prepared.url.as_str().contains("sinceMessageId"));
    }

    #[test]
    fn room_update_sends_only_set_fields() {
        let update = RoomUpdate {
            name: None,
            topic: Some("release day".to_string()),
        };
        assert_eq!(
            json!({ "room": update }),
            json!({"room": {"topic": "release day"}})
        );
    }

    #[test]
    fn idle_room_ignores_stop_listening() {
        let mut room = room();
        assert!(!room.is_listening());
        room.stop_listening();
        assert!(!room.is_listening());
    }

    #[test]
    fn clone_starts_idle() {
        let room = room();
        let copy = room.clone();
        assert_eq!(copy.id, room.id);
        assert!(!copy.is_listening());
    }
}
