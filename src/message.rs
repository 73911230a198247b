//! Chat messages.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::client::ClientError;
use crate::connection::Connection;
use crate::restful::url_for;
use crate::timestamp;

/// Message type as reported by the server.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MessageKind {
    Text,
    Paste,
    Sound,
    Tweet,
    Enter,
    Leave,
    Kick,
    Timestamp,
    Upload,
    TopicChange,
    Lock,
    Unlock,
    AllowGuests,
    DisallowGuests,
    Idle,
    Unidle,
    System,
    /// Any type this crate does not know by name.
    Other(String),
}

impl MessageKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Text => "TextMessage",
            Self::Paste => "PasteMessage",
            Self::Sound => "SoundMessage",
            Self::Tweet => "TweetMessage",
            Self::Enter => "EnterMessage",
            Self::Leave => "LeaveMessage",
            Self::Kick => "KickMessage",
            Self::Timestamp => "TimestampMessage",
            Self::Upload => "UploadMessage",
            Self::TopicChange => "TopicChangeMessage",
            Self::Lock => "LockMessage",
            Self::Unlock => "UnlockMessage",
            Self::AllowGuests => "AllowGuestsMessage",
            Self::DisallowGuests => "DisallowGuestsMessage",
            Self::Idle => "IdleMessage",
            Self::Unidle => "UnidleMessage",
            Self::System => "SystemMessage",
            Self::Other(kind) => kind,
        }
    }
}

impl From<String> for MessageKind {
    fn from(kind: String) -> Self {
        match kind.as_str() {
            "TextMessage" => Self::Text,
            "PasteMessage" => Self::Paste,
            "SoundMessage" => Self::Sound,
            "TweetMessage" => Self::Tweet,
            "EnterMessage" => Self::Enter,
            "LeaveMessage" => Self::Leave,
            "KickMessage" => Self::Kick,
            "TimestampMessage" => Self::Timestamp,
            "UploadMessage" => Self::Upload,
            "TopicChangeMessage" => Self::TopicChange,
            "LockMessage" => Self::Lock,
            "UnlockMessage" => Self::Unlock,
            "AllowGuestsMessage" => Self::AllowGuests,
            "DisallowGuestsMessage" => Self::DisallowGuests,
            "IdleMessage" => Self::Idle,
            "UnidleMessage" => Self::Unidle,
            "SystemMessage" => Self::System,
            _ => Self::Other(kind),
        }
    }
}

impl From<MessageKind> for String {
    fn from(kind: MessageKind) -> Self {
        match kind {
            MessageKind::Other(kind) => kind,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Deserialize)]
struct MessageRecord {
    id: u64,
    #[serde(default)]
    room_id: Option<u64>,
    #[serde(default)]
    user_id: Option<u64>,
    #[serde(default)]
    body: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<MessageKind>,
    #[serde(default)]
    starred: bool,
    #[serde(default, deserialize_with = "timestamp::deserialize")]
    created_at: Option<DateTime<Utc>>,
}

/// Snapshot of a message at the time it was fetched or streamed.
#[derive(Clone, Debug)]
pub struct Message {
    pub id: u64,
    pub room_id: Option<u64>,
    pub user_id: Option<u64>,
    pub body: Option<String>,
    pub kind: Option<MessageKind>,
    pub starred: bool,
    pub created_at: Option<DateTime<Utc>>,
    connection: Connection,
}

impl Message {
    pub fn from_value(connection: &Connection, value: Value) -> Result<Self, serde_json::Error> {
        let record: MessageRecord = serde_json::from_value(value)?;
        Ok(Self {
            id: record.id,
            room_id: record.room_id,
            user_id: record.user_id,
            body: record.body,
            kind: record.kind,
            starred: record.starred,
            created_at: record.created_at,
            connection: connection.clone(),
        })
    }

    /// Highlights this message.
    pub async fn star(&self) -> Result<(), ClientError> {
        self.connection.post(&self.star_path(), None).await?;
        Ok(())
    }

    /// Removes the highlight from this message.
    pub async fn unstar(&self) -> Result<(), ClientError> {
        self.connection.del(&self.star_path()).await?;
        Ok(())
    }

    fn star_path(&self) -> String {
        url_for("messages", Some(&self.id.to_string()), Some("star"))
    }
}
