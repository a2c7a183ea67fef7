//! Push-channel message codec.
//!
//! Frames are tagged JSON records `{"type": "...", "data": ...}`. Only menu
//! change notifications carry meaning for the client; anything else decodes
//! to [`PushMessage::Ignored`] so new server events never break old clients.

use crate::{ProtoError, RestaurantId};
use serde_json::Value;

pub const MENU_CHANGED: &str = "menu-changed";
pub const MENU_UPDATED: &str = "menu-updated";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushMessage {
    /// The document for `restaurant_id` changed remotely. `None` when the
    /// frame carried no id: every subscribed document is then stale.
    MenuChanged { restaurant_id: Option<RestaurantId> },
    Ignored { kind: String },
}

impl PushMessage {
    pub fn menu_changed(restaurant_id: impl Into<RestaurantId>) -> Self {
        PushMessage::MenuChanged {
            restaurant_id: Some(restaurant_id.into()),
        }
    }

    /// Whether a subscriber to `restaurant_id` must reload.
    pub fn invalidates(&self, restaurant_id: &str) -> bool {
        match self {
            PushMessage::MenuChanged { restaurant_id: None } => true,
            PushMessage::MenuChanged {
                restaurant_id: Some(id),
            } => id == restaurant_id,
            PushMessage::Ignored { .. } => false,
        }
    }

    pub fn decode(frame: &str) -> Result<Self, ProtoError> {
        let value: Value = serde_json::from_str(frame.trim())
            .map_err(|e| ProtoError::MalformedFrame(e.to_string()))?;
        Self::from_value(&value)
    }

    pub fn from_value(value: &Value) -> Result<Self, ProtoError> {
        let obj = value
            .as_object()
            .ok_or_else(|| ProtoError::MalformedFrame("frame is not an object".into()))?;
        let kind = obj
            .get("type")
            .or_else(|| obj.get("event"))
            .and_then(Value::as_str)
            .ok_or(ProtoError::MissingType)?;

        match kind {
            MENU_CHANGED | MENU_UPDATED => Ok(PushMessage::MenuChanged {
                restaurant_id: obj.get("data").and_then(restaurant_id_in),
            }),
            other => Ok(PushMessage::Ignored {
                kind: other.to_string(),
            }),
        }
    }
}

fn restaurant_id_in(data: &Value) -> Option<RestaurantId> {
    match data {
        Value::Object(obj) => ["restaurantId", "restaurant_id", "id"]
            .iter()
            .find_map(|key| obj.get(*key))
            .and_then(crate::wire::restaurant_id_of),
        other => crate::wire::restaurant_id_of(other),
    }
}
