//! Authenticated HTTP transport shared by every resource wrapper.
//!
//! A [`Connection`] owns the derived `Authorization` header and the two
//! target hosts (per-account API host and the fixed streaming host). It holds
//! no other mutable state, so clones can be handed to every snapshot built
//! from it and used concurrently.

use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use reqwest::header::{HeaderValue, InvalidHeaderValue, AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, Url};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::stream::client::{open_stream, StreamConnection};
use crate::stream::framing::Framing;

/// Service domain that account subdomains hang off.
pub const SERVICE_HOST: &str = "campfirenow.com";
/// Fixed host serving live room feeds.
pub const STREAMING_URL: &str = "https://streaming.campfirenow.com";

const JSON_CONTENT_TYPE: &str = "application/json";
const UPLOAD_PART_NAME: &str = "upload";

/// HTTP verbs accepted by [`Connection::request`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    fn as_method(self) -> Method {
        match self {
            Self::Get => Method::GET,
            Self::Post => Method::POST,
            Self::Put => Method::PUT,
            Self::Delete => Method::DELETE,
        }
    }

    fn sends_payload(self) -> bool {
        !matches!(self, Self::Get)
    }
}

/// Connection settings. Every field has a production default.
#[derive(Clone, Debug)]
pub struct ConnectionOptions {
    /// Domain the account name is prefixed to.
    pub service_host: String,
    /// Explicit API base URL. Takes precedence over `service_host` when set.
    pub api_url: Option<String>,
    /// Base URL of the streaming host.
    pub streaming_url: String,
    /// Connect timeout handed to the HTTP connector. Requests themselves
    /// are never timed out by this crate.
    pub connect_timeout: Option<Duration>,
    /// How live-feed chunks are cut into records.
    pub framing: Framing,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            service_host: SERVICE_HOST.to_string(),
            api_url: None,
            streaming_url: STREAMING_URL.to_string(),
            connect_timeout: None,
            framing: Framing::default(),
        }
    }
}

impl ConnectionOptions {
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = Some(api_url.into().trim_end().to_string());
        self
    }

    pub fn with_streaming_url(mut self, streaming_url: impl Into<String>) -> Self {
        self.streaming_url = streaming_url.into().trim_end().to_string();
        self
    }

    pub fn with_service_host(mut self, service_host: impl Into<String>) -> Self {
        self.service_host = service_host.into();
        self
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = Some(connect_timeout);
        self
    }

    pub fn with_framing(mut self, framing: Framing) -> Self {
        self.framing = framing;
        self
    }

    fn api_base(&self, account: &str) -> String {
        match self.api_url.as_deref() {
            Some(url) => url.to_string(),
            None => format!("https://{account}.{}", self.service_host),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid authorization header: {0}")]
    InvalidHeader(#[from] InvalidHeaderValue),

    #[error("failed to serialize request body: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("invalid upload content type {content_type:?}")]
    InvalidContentType {
        content_type: String,
        #[source]
        source: reqwest::Error,
    },
}

/// A request ready to go on the wire.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct PreparedRequest {
    pub(crate) method: HttpMethod,
    pub(crate) url: Url,
    /// JSON payload for mutating verbs; `None` for GET.
    pub(crate) payload: Option<String>,
}

impl PreparedRequest {
    /// Value of the `Content-Length` header, when one is declared.
    pub(crate) fn content_length(&self) -> Option<usize> {
        self.payload.as_ref().map(String::len)
    }
}

/// Authenticated transport for one account.
#[derive(Clone, Debug)]
pub struct Connection {
    http: Client,
    authorization: HeaderValue,
    api_base: Url,
    streaming_base: Url,
    framing: Framing,
}

impl Connection {
    pub fn new(account: &str, token: &SecretString) -> Result<Self, ConnectionError> {
        Self::with_options(account, token, ConnectionOptions::default())
    }

    pub fn with_options(
        account: &str,
        token: &SecretString,
        options: ConnectionOptions,
    ) -> Result<Self, ConnectionError> {
        let mut builder = Client::builder();
        if let Some(connect_timeout) = options.connect_timeout {
            builder = builder.connect_timeout(connect_timeout);
        }
        let http = builder.build()?;

        Ok(Self {
            http,
            authorization: authorization_value(token)?,
            api_base: parse_base(&options.api_base(account))?,
            streaming_base: parse_base(&options.streaming_url)?,
            framing: options.framing,
        })
    }

    /// Base URL used for REST calls.
    pub fn api_base(&self) -> &Url {
        &self.api_base
    }

    /// Base URL used for live feeds.
    pub fn streaming_base(&self) -> &Url {
        &self.streaming_base
    }

    /// Performs one authenticated round trip and parses the response as JSON.
    ///
    /// For GET a body is folded into the query string; for the other verbs it
    /// is sent as a JSON payload with an explicit `Content-Length`. A payload
    /// that is empty or not JSON yields `Ok(None)`. Network failures are
    /// returned as errors.
    pub async fn request(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Option<Value>, ConnectionError> {
        let prepared = self.prepare(method, path, body)?;
        let content_length = prepared.content_length();

        let mut builder = self
            .http
            .request(prepared.method.as_method(), prepared.url)
            .header(AUTHORIZATION, self.authorization.clone())
            .header(CONTENT_TYPE, JSON_CONTENT_TYPE);

        if let (Some(length), Some(payload)) = (content_length, prepared.payload) {
            builder = builder.header(CONTENT_LENGTH, length).body(payload);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            debug!(
                event = "request_non_success_status",
                method = ?method,
                path,
                status = status.as_u16()
            );
        }

        let bytes = response.bytes().await?;
        Ok(parse_payload(&bytes, path))
    }

    pub async fn get(
        &self,
        path: &str,
        query: Option<&Value>,
    ) -> Result<Option<Value>, ConnectionError> {
        self.request(HttpMethod::Get, path, query).await
    }

    pub async fn post(
        &self,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Option<Value>, ConnectionError> {
        self.request(HttpMethod::Post, path, body).await
    }

    pub async fn put(
        &self,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Option<Value>, ConnectionError> {
        self.request(HttpMethod::Put, path, body).await
    }

    pub async fn del(&self, path: &str) -> Result<Option<Value>, ConnectionError> {
        self.request(HttpMethod::Delete, path, None).await
    }

    /// Posts a file as a multipart form with a single `upload` part.
    pub async fn upload(
        &self,
        path: &str,
        file_name: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<Option<Value>, ConnectionError> {
        let url = self.api_url(path);
        let part = Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(content_type)
            .map_err(|source| ConnectionError::InvalidContentType {
                content_type: content_type.to_string(),
                source,
            })?;
        let form = Form::new().part(UPLOAD_PART_NAME, part);

        let response = self
            .http
            .post(url)
            .header(AUTHORIZATION, self.authorization.clone())
            .multipart(form)
            .send()
            .await?;
        let bytes = response.bytes().await?;
        Ok(parse_payload(&bytes, path))
    }

    /// Downloads raw bytes from an absolute URL with the account credentials.
    pub async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, ConnectionError> {
        let url = parse_base(url)?;
        let response = self
            .http
            .get(url)
            .header(AUTHORIZATION, self.authorization.clone())
            .send()
            .await?
            .error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }

    /// Opens a long-lived GET against the streaming host.
    ///
    /// Returns at once; the connection is driven by a background task whose
    /// handle is available before any record arrives. The stream never
    /// closes itself: stop it with [`StreamHandle::destroy`].
    /// Must be called from within a Tokio runtime.
    ///
    /// [`StreamHandle::destroy`]: crate::stream::client::StreamHandle::destroy
    pub fn stream(&self, path: &str) -> StreamConnection {
        let mut url = self.streaming_base.clone();
        url.set_path(path);
        open_stream(
            self.http.clone(),
            url,
            self.authorization.clone(),
            self.framing,
        )
    }

    pub(crate) fn prepare(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<&Value>,
    ) -> Result<PreparedRequest, ConnectionError> {
        let mut url = self.api_url(path);
        let body = body.filter(|value| !value.is_null());

        if !method.sends_payload() {
            match body {
                Some(Value::Object(params)) => append_query(&mut url, params),
                Some(other) => debug!(event = "query_body_ignored", path, body = %other),
                None => {}
            }
            return Ok(PreparedRequest {
                method,
                url,
                payload: None,
            });
        }

        let payload = match body {
            Some(value) => serde_json::to_string(value)?,
            None => String::new(),
        };

        Ok(PreparedRequest {
            method,
            url,
            payload: Some(payload),
        })
    }

    fn api_url(&self, path: &str) -> Url {
        let mut url = self.api_base.clone();
        let (path, query) = match path.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (path, None),
        };
        url.set_path(path);
        url.set_query(query);
        url
    }
}

fn authorization_value(token: &SecretString) -> Result<HeaderValue, ConnectionError> {
    let encoded = BASE64_STANDARD.encode(format!("{}:X", token.expose_secret()));
    let mut value = HeaderValue::from_str(&format!("Basic {encoded}"))?;
    value.set_sensitive(true);
    Ok(value)
}

fn parse_base(raw: &str) -> Result<Url, ConnectionError> {
    Url::parse(raw).map_err(|err| ConnectionError::InvalidUrl {
        url: raw.to_string(),
        reason: err.to_string(),
    })
}

fn append_query(url: &mut Url, params: &Map<String, Value>) {
    let pairs: Vec<(&str, String)> = params
        .iter()
        .filter_map(|(key, value)| match value {
            Value::Null => None,
            Value::String(text) => Some((key.as_str(), text.clone())),
            other => Some((key.as_str(), other.to_string())),
        })
        .collect();

    if pairs.is_empty() {
        return;
    }

    let mut query = url.query_pairs_mut();
    for (key, value) in pairs {
        query.append_pair(key, &value);
    }
}

fn parse_payload(bytes: &[u8], path: &str) -> Option<Value> {
    match serde_json::from_slice::<Value>(bytes) {
        Ok(Value::Null) => None,
        Ok(value) => Some(value),
        Err(err) => {
            debug!(
                event = "response_not_json",
                path,
                len = bytes.len(),
                error = %err
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;
    use serde_json::json;

    use super::{
        authorization_value, parse_payload, Connection, ConnectionError, ConnectionOptions,
        HttpMethod, STREAMING_URL,
    };

    fn connection() -> Connection {
        Connection::new("acme", &SecretString::new("secret-token".to_string()))
            .expect("build connection")
    }

    #[test]
    fn api_host_is_derived_from_account() {
        let connection = connection();
        assert_eq!(connection.api_base().as_str(), "https://acme.campfirenow.com/");
        assert_eq!(connection.streaming_base().as_str(), format!("{STREAMING_URL}/"));
    }

    #[test]
    fn api_url_override_takes_precedence() {
        let options = ConnectionOptions::default().with_api_url("http://127.0.0.1:9000  \n");
        let connection =
            Connection::with_options("acme", &SecretString::new("t".to_string()), options)
                .expect("build connection");
        assert_eq!(connection.api_base().as_str(), "http://127.0.0.1:9000/");
    }

    #[test]
    fn authorization_is_basic_token_with_x_password() {
        let value = authorization_value(&SecretString::new("abc123".to_string()))
            .expect("header value");
        // base64("abc123:X")
        assert_eq!(value.to_str().expect("ascii"), "Basic YWJjMTIzOlg=");
        assert!(value.is_sensitive());
    }

    #[test]
    fn get_folds_body_into_query_string() {
        let prepared = connection()
            .prepare(
                HttpMethod::Get,
                "/room/1/recent.json",
                Some(&json!({"limit": 10, "since_message_id": 42})),
            )
            .expect("prepare");

        assert_eq!(prepared.payload, None);
        assert_eq!(prepared.content_length(), None);
        assert_eq!(prepared.url.path(), "/room/1/recent.json");
        assert_eq!(prepared.url.query(), Some("limit=10&since_message_id=42"));
    }

    #[test]
    fn get_without_body_has_no_query() {
        let prepared = connection()
            .prepare(HttpMethod::Get, "/rooms.json", Some(&json!({})))
            .expect("prepare");
        assert_eq!(prepared.url.query(), None);
    }

    #[test]
    fn mutating_verbs_declare_exact_payload_length() {
        let body = json!({"message": {"body": "héllo", "type": "TextMessage"}});
        for method in [HttpMethod::Post, HttpMethod::Put, HttpMethod::Delete] {
            let prepared = connection()
                .prepare(method, "/room/1/speak.json", Some(&body))
                .expect("prepare");
            let payload = prepared.payload.clone().expect("payload");
            assert_eq!(prepared.content_length(), Some(payload.len()));
            assert_eq!(
                serde_json::from_str::<serde_json::Value>(&payload).expect("json"),
                body
            );
            assert_eq!(prepared.url.query(), None);
        }
    }

    #[test]
    fn mutating_verbs_without_body_declare_zero_length() {
        let prepared = connection()
            .prepare(HttpMethod::Post, "/room/1/join.json", None)
            .expect("prepare");
        assert_eq!(prepared.content_length(), Some(0));

        let prepared = connection()
            .prepare(HttpMethod::Delete, "/messages/5/star.json", Some(&serde_json::Value::Null))
            .expect("prepare");
        assert_eq!(prepared.content_length(), Some(0));
    }

    #[tokio::test]
    async fn upload_rejects_malformed_content_type_before_sending() {
        let err = connection()
            .upload("/room/1/uploads.json", "notes.txt", "not a mime", b"hi".to_vec())
            .await
            .expect_err("content type cannot be parsed");
        assert!(matches!(
            err,
            ConnectionError::InvalidContentType { ref content_type, .. } if content_type == "not a mime"
        ));
    }

    #[test]
    fn unparsable_payload_is_no_data() {
        assert_eq!(parse_payload(b"", "/x.json"), None);
        assert_eq!(parse_payload(b" ", "/x.json"), None);
        assert_eq!(parse_payload(b"<html>oops</html>", "/x.json"), None);
        assert_eq!(parse_payload(b"null", "/x.json"), None);
        assert_eq!(
            parse_payload(br#"{"room":{"id":1}}"#, "/x.json"),
            Some(serde_json::json!({"room": {"id": 1}}))
        );
    }
}
