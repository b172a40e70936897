//! Remote command payloads
//!
//! Commands arrive as JSON objects with optional `light` and `fan` keys, each
//! set to `"on"`, `"off"` or `"toggle"`. Keys are evaluated independently: an
//! unknown value for one key does not invalidate the other. A payload that is
//! not a JSON object is rejected as a whole.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Command payload is not an object")]
    NotAnObject,
}

/// Largest command payload acted on, in bytes
pub const MAX_COMMAND_BYTES: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchAction {
    On,
    Off,
    Toggle,
}

impl SwitchAction {
    /// Resulting output state when applied to `current`
    pub fn apply(self, current: bool) -> bool {
        match self {
            SwitchAction::On => true,
            SwitchAction::Off => false,
            SwitchAction::Toggle => !current,
        }
    }
}

/// What a present command key asked for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldRequest {
    Action(SwitchAction),
    /// Key present with a value we do not understand, kept for logging
    Unrecognized(String),
}

impl FieldRequest {
    fn from_value(value: &Value) -> Self {
        match value.as_str() {
            Some("on") => FieldRequest::Action(SwitchAction::On),
            Some("off") => FieldRequest::Action(SwitchAction::Off),
            Some("toggle") => FieldRequest::Action(SwitchAction::Toggle),
            Some(other) => FieldRequest::Unrecognized(other.to_string()),
            None => FieldRequest::Unrecognized(value.to_string()),
        }
    }

    pub fn action(&self) -> Option<SwitchAction> {
        match self {
            FieldRequest::Action(action) => Some(*action),
            FieldRequest::Unrecognized(_) => None,
        }
    }
}

/// Only invoked by serde when the key is present, so presence survives even
/// for `null` values.
fn present_field<'de, D>(deserializer: D) -> Result<Option<FieldRequest>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(Some(FieldRequest::from_value(&value)))
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
pub struct CommandMessage {
    #[serde(default, deserialize_with = "present_field")]
    pub light: Option<FieldRequest>,
    #[serde(default, deserialize_with = "present_field")]
    pub fan: Option<FieldRequest>,
}

impl CommandMessage {
    pub fn parse(payload: &[u8]) -> Result<Self, CommandError> {
        let value: Value = serde_json::from_slice(payload)?;
        if !value.is_object() {
            return Err(CommandError::NotAnObject);
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Whether any key we act on was present, whatever its value
    pub fn has_recognized_field(&self) -> bool {
        self.light.is_some() || self.fan.is_some()
    }
}
