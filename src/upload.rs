//! Files uploaded to rooms.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::client::ClientError;
use crate::connection::Connection;
use crate::timestamp;

#[derive(Debug, Deserialize)]
struct UploadRecord {
    id: u64,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    byte_size: Option<u64>,
    #[serde(default)]
    content_type: Option<String>,
    #[serde(default)]
    full_url: Option<String>,
    #[serde(default)]
    room_id: Option<u64>,
    #[serde(default)]
    user_id: Option<u64>,
    #[serde(default, deserialize_with = "timestamp::deserialize")]
    created_at: Option<DateTime<Utc>>,
}

/// Snapshot of an uploaded file.
#[derive(Clone, Debug)]
pub struct Upload {
    pub id: u64,
    pub name: Option<String>,
    pub byte_size: Option<u64>,
    pub content_type: Option<String>,
    pub full_url: Option<String>,
    pub room_id: Option<u64>,
    pub user_id: Option<u64>,
    pub created_at: Option<DateTime<Utc>>,
    connection: Connection,
}

impl Upload {
    pub fn from_value(connection: &Connection, value: Value) -> Result<Self, serde_json::Error> {
        let record: UploadRecord = serde_json::from_value(value)?;
        Ok(Self {
            id: record.id,
            name: record.name,
            byte_size: record.byte_size,
            content_type: record.content_type,
            full_url: record.full_url,
            room_id: record.room_id,
            user_id: record.user_id,
            created_at: record.created_at,
            connection: connection.clone(),
        })
    }

    /// Downloads the file contents from `full_url`.
    pub async fn download(&self) -> Result<Vec<u8>, ClientError> {
        let Some(url) = self.full_url.as_deref() else {
            return Err(ClientError::MissingField {
                path: format!("upload {}", self.id),
                field: "full_url",
            });
        };
        Ok(self.connection.fetch_bytes(url).await?)
    }
}
