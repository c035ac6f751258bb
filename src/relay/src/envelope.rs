use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Field a record's identifier is read from.
pub const ID_FIELD: &str = "id";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Create,
    Update,
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Method::Create => "create",
            Method::Update => "update",
            Method::Delete => "delete",
        })
    }
}

/// Opaque record identifier. Numeric ids are carried in their decimal form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelId(String);

impl ModelId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Reads the identifier of a record snapshot. Missing, null and empty ids yield `None`.
    pub fn from_record(record: &Value) -> Option<Self> {
        match record.get(ID_FIELD)? {
            Value::String(s) if !s.is_empty() => Some(Self(s.clone())),
            Value::Number(n) => Some(Self(n.to_string())),
            _ => None,
        }
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ModelId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for ModelId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<uuid::Uuid> for ModelId {
    fn from(value: uuid::Uuid) -> Self {
        Self(value.to_string())
    }
}

impl From<i64> for ModelId {
    fn from(value: i64) -> Self {
        Self(value.to_string())
    }
}

/// Identity of the user whose action caused a change.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for UserId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// One changed-record event as it travels over the bus.
///
/// `data` is an owned copy of the record taken when the envelope is built, so
/// mutating the live record afterwards never changes what gets published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEnvelope {
    pub model_name: String,
    pub method_name: Method,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<ModelId>,
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_before_update: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
}

impl ChangeEnvelope {
    /// Builds an envelope for `record`, or `None` when the record carries no id.
    pub fn for_record(model_name: &str, method_name: Method, record: &Value) -> Option<Self> {
        let model_id = ModelId::from_record(record)?;
        Some(Self {
            model_name: model_name.to_owned(),
            method_name,
            model_id: Some(model_id),
            data: record.clone(),
            update_data: None,
            data_before_update: None,
            user_id: None,
        })
    }

    pub fn with_update_data(mut self, update_data: Option<Value>) -> Self {
        self.update_data = update_data;
        self
    }

    pub fn with_data_before_update(mut self, before: Option<Value>) -> Self {
        self.data_before_update = before;
        self
    }

    pub fn with_user_id(mut self, user_id: Option<UserId>) -> Self {
        self.user_id = user_id;
        self
    }

    pub fn has_model_id(&self) -> bool {
        self.model_id.as_ref().is_some_and(|id| !id.is_empty())
    }

    pub fn encode(&self) -> serde_json::Result<Bytes> {
        serde_json::to_vec(self).map(Bytes::from)
    }

    pub fn decode(payload: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(payload)
    }
}

/// A decoded envelope handed to an event handler.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub model_name: String,
    pub method_name: Method,
    pub model_id: ModelId,
    pub data: Value,
    pub update_data: Option<Value>,
    pub user_id: Option<UserId>,
    pub data_before_update: Option<Value>,
}

impl TryFrom<ChangeEnvelope> for ChangeEvent {
    type Error = ChangeEnvelope;

    /// Fails, handing the envelope back, when it carries no usable `model_id`.
    fn try_from(mut envelope: ChangeEnvelope) -> Result<Self, Self::Error> {
        let model_id = match envelope.model_id.take() {
            Some(id) if !id.is_empty() => id,
            other => {
                envelope.model_id = other;
                return Err(envelope);
            }
        };
        let ChangeEnvelope {
            model_name,
            method_name,
            data,
            update_data,
            data_before_update,
            user_id,
            ..
        } = envelope;
        Ok(Self {
            model_name,
            method_name,
            model_id,
            data,
            update_data,
            user_id,
            data_before_update,
        })
    }
}
