use crate::error::CommandError;
use crate::mysonos::CatalogEntry;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A pipeline message. Fields this crate does not know about are carried
/// through untouched when the message is forwarded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export: Option<ExportItem>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Playback descriptor of an exported My Sonos item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportItem {
    pub uri: String,
    pub metadata: String,
    pub queue: bool,
}

/// `mediaType`/`serviceName` pair taken from `msg.filter`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterSelection {
    pub media_type: String,
    pub service_name: String,
}

/// String form of a scalar value; `None` for null, empty strings and
/// structured values.
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

impl InputMessage {
    pub fn new(payload: impl Into<Value>) -> Self {
        Self {
            payload: Some(payload.into()),
            ..Self::default()
        }
    }

    pub fn with_topic(mut self, topic: impl Into<Value>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    pub fn with_volume(mut self, volume: impl Into<Value>) -> Self {
        self.volume = Some(volume.into());
        self
    }

    pub fn with_filter(mut self, filter: Value) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Lowercased payload used as the classification key.
    pub fn command_token(&self) -> Result<String, CommandError> {
        let text = match &self.payload {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) if s.is_empty() => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            Some(Value::Bool(b)) => Some(b.to_string()),
            Some(other) => Some(other.to_string()),
        };
        text.map(|t| t.to_lowercase()).ok_or_else(|| {
            CommandError::InvalidPayload(
                serde_json::to_string(self).unwrap_or_else(|_| format!("{:?}", self.payload)),
            )
        })
    }

    /// Non-empty topic or `MissingTopic`.
    pub fn required_topic(&self) -> Result<String, CommandError> {
        self.topic
            .as_ref()
            .and_then(scalar_text)
            .ok_or(CommandError::MissingTopic)
    }

    /// Raw `msg.volume` token, `None` when the field is absent or empty.
    pub fn volume_token(&self) -> Option<String> {
        match self.volume.as_ref()? {
            Value::Null => None,
            Value::String(s) if s.is_empty() => None,
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            other => Some(other.to_string()),
        }
    }

    /// Validated `msg.filter`, `None` when no filter was sent.
    pub fn filter_selection(&self) -> Result<Option<FilterSelection>, CommandError> {
        let filter = match &self.filter {
            None | Some(Value::Null) => return Ok(None),
            Some(filter) => filter,
        };
        let field = |name: &str| match filter.get(name) {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            _ => None,
        };
        match (field("mediaType"), field("serviceName")) {
            (Some(media_type), Some(service_name)) => Ok(Some(FilterSelection {
                media_type,
                service_name,
            })),
            _ => Err(CommandError::InvalidFilter(filter.to_string())),
        }
    }

    pub(crate) fn set_export(&mut self, item: ExportItem) {
        self.payload = Some(Value::String("play.export".to_string()));
        self.export = Some(item);
    }

    pub(crate) fn set_items(&mut self, items: &[CatalogEntry]) -> Result<(), serde_json::Error> {
        self.payload = Some(serde_json::to_value(items)?);
        Ok(())
    }
}
