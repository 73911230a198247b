//! Account users.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::client::ClientError;
use crate::connection::Connection;
use crate::restful::{require, take_field, url_for};
use crate::timestamp;

#[derive(Debug, Deserialize)]
struct UserRecord {
    id: u64,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email_address: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    admin: bool,
    #[serde(default)]
    avatar_url: Option<String>,
    #[serde(default, deserialize_with = "timestamp::deserialize")]
    created_at: Option<DateTime<Utc>>,
}

/// Snapshot of a user.
#[derive(Clone, Debug)]
pub struct User {
    pub id: u64,
    pub name: Option<String>,
    pub email_address: Option<String>,
    /// `Member` or `Guest`.
    pub kind: Option<String>,
    pub admin: bool,
    pub avatar_url: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    connection: Connection,
}

impl User {
    pub fn from_value(connection: &Connection, value: Value) -> Result<Self, serde_json::Error> {
        let record: UserRecord = serde_json::from_value(value)?;
        Ok(Self {
            id: record.id,
            name: record.name,
            email_address: record.email_address,
            kind: record.kind,
            admin: record.admin,
            avatar_url: record.avatar_url,
            created_at: record.created_at,
            connection: connection.clone(),
        })
    }

    /// Fetches a fresh snapshot of this user. `self` is left untouched.
    pub async fn reload(&self) -> Result<User, ClientError> {
        fetch(&self.connection, &self.id.to_string()).await
    }
}

/// Fetches `/users/{id}.json`; `id` may be `me`.
pub(crate) async fn fetch(connection: &Connection, id: &str) -> Result<User, ClientError> {
    let path = url_for("users", Some(id), None);
    let mut data = require(connection.get(&path, None).await?, &path)?;
    let user = take_field(&mut data, "user", &path)?;
    User::from_value(connection, user).map_err(|source| ClientError::Decode { path, source })
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;
    use serde_json::json;

    use super::User;
    use crate::connection::Connection;

    #[test]
    fn maps_server_fields() {
        let connection =
            Connection::new("acme", &SecretString::new("token".to_string())).expect("connection");
        let user = User::from_value(
            &connection,
            json!({
                "id": 3,
                "name": "Jane Doe",
                "email_address": "jane@example.com",
                "type": "Member",
                "admin": true,
                "created_at": "2010/05/06 07:08:09 +0000"
            }),
        )
        .expect("user");

        assert_eq!(user.id, 3);
        assert_eq!(user.name.as_deref(), Some("Jane Doe"));
        assert_eq!(user.email_address.as_deref(), Some("jane@example.com"));
        assert_eq!(user.kind.as_deref(), Some("Member"));
        assert!(user.admin);
        assert_eq!(user.avatar_url, None);
        assert!(user.created_at.is_some());
    }
}
