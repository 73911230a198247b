//! REST path building and response unwrapping shared by the resource types.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::client::ClientError;

/// Builds `/{resource}[/{id}][/{action}].json`. Empty segments are left out.
pub fn url_for(resource: &str, id: Option<&str>, action: Option<&str>) -> String {
    let mut url = format!("/{resource}");
    if let Some(id) = id.filter(|id| !id.is_empty()) {
        url.push('/');
        url.push_str(id);
    }
    if let Some(action) = action.filter(|action| !action.is_empty()) {
        url.push('/');
        url.push_str(action);
    }
    url.push_str(".json");
    url
}

/// Fails with [`ClientError::EmptyResponse`] when a call that must return
/// data returned none.
pub(crate) fn require(data: Option<Value>, path: &str) -> Result<Value, ClientError> {
    data.ok_or_else(|| ClientError::EmptyResponse {
        path: path.to_string(),
    })
}

/// Removes `field` from a response object.
pub(crate) fn take_field(
    data: &mut Value,
    field: &'static str,
    path: &str,
) -> Result<Value, ClientError> {
    data.get_mut(field)
        .map(Value::take)
        .ok_or_else(|| ClientError::MissingField {
            path: path.to_string(),
            field,
        })
}

pub(crate) fn decode<T: DeserializeOwned>(value: Value, path: &str) -> Result<T, ClientError> {
    serde_json::from_value(value).map_err(|source| ClientError::Decode {
        path: path.to_string(),
        source,
    })
}

/// Decodes a JSON array element by element with `build`.
pub(crate) fn decode_list<T, F>(value: Value, path: &str, mut build: F) -> Result<Vec<T>, ClientError>
where
    F: FnMut(Value) -> Result<T, serde_json::Error>,
{
    let items: Vec<Value> = decode(value, path)?;
    items
        .into_iter()
        .map(|item| {
            build(item).map_err(|source| ClientError::Decode {
                path: path.to_string(),
                source,
            })
        })
        .collect()
}
