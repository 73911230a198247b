//! Account-level entry point.

use secrecy::SecretString;
use serde_json::Value;
use thiserror::Error;

use crate::connection::{Connection, ConnectionError, ConnectionOptions};
use crate::message::Message;
use crate::restful::{decode_list, require, take_field, url_for};
use crate::room::{self, Room};
use crate::user::{self, User};

/// Errors returned by the resource-level API.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// The endpoint must return data but the payload was empty or not JSON.
    #[error("{path} returned no data")]
    EmptyResponse { path: String },

    #[error("response from {path} is missing `{field}`")]
    MissingField { path: String, field: &'static str },

    #[error("unexpected response from {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Client for one account.
#[derive(Clone, Debug)]
pub struct Client {
    connection: Connection,
}

impl Client {
    /// Creates a client for `https://{account}.campfirenow.com`.
    pub fn new(account: &str, token: SecretString) -> Result<Self, ClientError> {
        Self::with_options(account, token, ConnectionOptions::default())
    }

    pub fn with_options(
        account: &str,
        token: SecretString,
        options: ConnectionOptions,
    ) -> Result<Self, ClientError> {
        let connection = Connection::with_options(account, &token, options)?;
        Ok(Self { connection })
    }

    /// The transport shared by every snapshot this client builds.
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub async fn room(&self, id: u64) -> Result<Room, ClientError> {
        room::fetch(&self.connection, id).await
    }

    /// All rooms on the account.
    pub async fn rooms(&self) -> Result<Vec<Room>, ClientError> {
        self.rooms_at(&url_for("rooms", None, None)).await
    }

    /// Rooms the api user is currently present in.
    pub async fn presence(&self) -> Result<Vec<Room>, ClientError> {
        self.rooms_at(&url_for("presence", None, None)).await
    }

    /// Messages matching `term`.
    pub async fn search(&self, term: &str) -> Result<Vec<Message>, ClientError> {
        let term = urlencoding::encode(term);
        let path = url_for("search", Some(term.as_ref()), None);
        let mut data = self.fetch(&path).await?;
        let messages = take_field(&mut data, "messages", &path)?;
        decode_list(messages, &path, |message| {
            Message::from_value(&self.connection, message)
        })
    }

    pub async fn user(&self, id: u64) -> Result<User, ClientError> {
        user::fetch(&self.connection, &id.to_string()).await
    }

    /// The user the api token belongs to.
    pub async fn me(&self) -> Result<User, ClientError> {
        user::fetch(&self.connection, "me").await
    }

    async fn rooms_at(&self, path: &str) -> Result<Vec<Room>, ClientError> {
        let mut data = self.fetch(path).await?;
        let rooms = take_field(&mut data, "rooms", path)?;
        decode_list(rooms, path, |room| Room::from_value(&self.connection, room))
    }

    async fn fetch(&self, path: &str) -> Result<Value, ClientError> {
        require(self.connection.get(path, None).await?, path)
    }
}
