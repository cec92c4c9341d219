// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire-format events pushed by the dashboard backend.
//!
//! Every frame is a JSON object `{"type": "<kind>", "payload": {...}}`. This
//! module is the only place that knows that shape: frames are decoded once
//! into a [`ServerEvent`] and everything downstream works with typed values.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DecodeError;

/// A cached row as returned by the REST layer.
pub type Record = serde_json::Map<String, Value>;

// -- Event kinds -------------------------------------------------------------

/// The closed set of event types this client understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    ChannelStatusUpdate,
    BandwidthAlert,
    FaultEvent,
    SourceStatusUpdate,
    DestinationStatusUpdate,
    SystemAlert,
}

impl EventKind {
    pub const ALL: [EventKind; 6] = [
        Self::ChannelStatusUpdate,
        Self::BandwidthAlert,
        Self::FaultEvent,
        Self::SourceStatusUpdate,
        Self::DestinationStatusUpdate,
        Self::SystemAlert,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ChannelStatusUpdate => "channel_status_update",
            Self::BandwidthAlert => "bandwidth_alert",
            Self::FaultEvent => "fault_event",
            Self::SourceStatusUpdate => "source_status_update",
            Self::DestinationStatusUpdate => "destination_status_update",
            Self::SystemAlert => "system_alert",
        }
    }

    pub fn from_wire(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }

    /// Kinds that raise a transient notification regardless of subscribers.
    pub fn is_alerting(&self) -> bool {
        matches!(self, Self::FaultEvent | Self::BandwidthAlert)
    }

    /// Payload fields accepted as the target entity id, in lookup order.
    pub fn id_fields(&self) -> &'static [&'static str] {
        match self {
            Self::ChannelStatusUpdate | Self::FaultEvent => &["id", "channelId", "arteryId"],
            Self::SourceStatusUpdate => &["id", "sourceId"],
            Self::DestinationStatusUpdate => &["id", "destinationId"],
            Self::BandwidthAlert => &["channelId"],
            Self::SystemAlert => &["id", "alertId"],
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// -- Entity keys -------------------------------------------------------------

/// Identifier of a cached row: backend ids are integers or strings.
///
/// Also used for timestamps in time series, so the ordering matters:
/// integers compare numerically, strings lexically (ISO-8601 sorts correctly),
/// and every integer sorts before every string. Integral floats are read as
/// integers; other numbers outside `i64` keep their decimal text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityKey {
    Int(i64),
    Text(String),
}

impl EntityKey {
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => Some(match n.as_i64() {
                Some(i) => Self::Int(i),
                None => match n.as_f64() {
                    Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 => {
                        Self::Int(f as i64)
                    }
                    _ => Self::Text(n.to_string()),
                },
            }),
            Value::String(s) => Some(Self::Text(s.clone())),
            _ => None,
        }
    }

    /// Whether a JSON value identifies this key.
    pub fn matches(&self, value: Option<&Value>) -> bool {
        value.and_then(Self::from_value).as_ref() == Some(self)
    }

    pub fn to_value(&self) -> Value {
        match self {
            Self::Int(n) => Value::from(*n),
            Self::Text(s) => Value::from(s.as_str()),
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for EntityKey {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<&str> for EntityKey {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

// -- Payloads ----------------------------------------------------------------

/// Partial update addressed to one entity.
///
/// `fields` holds the changed fields only; the id fields used to address the
/// entity are stripped so a merge never rewrites a row's identity.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityPatch {
    pub id: EntityKey,
    pub fields: Record,
}

/// One bandwidth sample, scoped to a channel when the payload names one.
#[derive(Debug, Clone, PartialEq)]
pub struct BandwidthSample {
    pub channel: Option<EntityKey>,
    pub timestamp: EntityKey,
    pub fields: Record,
}

/// A system-wide alert. The payload is the complete alert record.
#[derive(Debug, Clone, PartialEq)]
pub struct SystemAlert {
    pub key: EntityKey,
    pub key_field: &'static str,
    pub record: Record,
}

impl SystemAlert {
    pub fn message(&self) -> Option<&str> {
        self.record.get("message").and_then(Value::as_str)
    }

    pub fn severity(&self) -> Option<&str> {
        self.record.get("severity").and_then(Value::as_str)
    }
}

// -- Decoded events ----------------------------------------------------------

/// A decoded server event: one payload shape per tag.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    ChannelStatusUpdate(EntityPatch),
    BandwidthAlert(BandwidthSample),
    FaultEvent(EntityPatch),
    SourceStatusUpdate(EntityPatch),
    DestinationStatusUpdate(EntityPatch),
    SystemAlert(SystemAlert),
}

impl ServerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::ChannelStatusUpdate(_) => EventKind::ChannelStatusUpdate,
            Self::BandwidthAlert(_) => EventKind::BandwidthAlert,
            Self::FaultEvent(_) => EventKind::FaultEvent,
            Self::SourceStatusUpdate(_) => EventKind::SourceStatusUpdate,
            Self::DestinationStatusUpdate(_) => EventKind::DestinationStatusUpdate,
            Self::SystemAlert(_) => EventKind::SystemAlert,
        }
    }

    /// Entity patch carried by the status and fault events.
    pub fn entity_patch(&self) -> Option<&EntityPatch> {
        match self {
            Self::ChannelStatusUpdate(p)
            | Self::FaultEvent(p)
            | Self::SourceStatusUpdate(p)
            | Self::DestinationStatusUpdate(p) => Some(p),
            _ => None,
        }
    }

    /// Decode one text frame.
    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| DecodeError::Malformed(e.to_string()))?;
        let Value::Object(mut envelope) = value else {
            return Err(DecodeError::Malformed("frame is not an object".to_owned()));
        };

        let type_str = match envelope.get("type") {
            Some(Value::String(s)) => s.clone(),
            _ => return Err(DecodeError::MissingType),
        };
        let kind = EventKind::from_wire(&type_str).ok_or(DecodeError::UnknownType(type_str))?;

        let payload = match envelope.remove("payload") {
            Some(Value::Object(map)) => map,
            Some(_) | None => {
                return Err(DecodeError::InvalidPayload {
                    kind,
                    reason: "payload must be an object".to_owned(),
                })
            }
        };

        Self::from_payload(kind, payload)
    }

    fn from_payload(kind: EventKind, payload: Record) -> Result<Self, DecodeError> {
        match kind {
            EventKind::ChannelStatusUpdate => {
                entity_patch(kind, payload).map(Self::ChannelStatusUpdate)
            }
            EventKind::FaultEvent => entity_patch(kind, payload).map(Self::FaultEvent),
            EventKind::SourceStatusUpdate => {
                entity_patch(kind, payload).map(Self::SourceStatusUpdate)
            }
            EventKind::DestinationStatusUpdate => {
                entity_patch(kind, payload).map(Self::DestinationStatusUpdate)
            }
            EventKind::BandwidthAlert => bandwidth_sample(payload).map(Self::BandwidthAlert),
            EventKind::SystemAlert => system_alert(payload).map(Self::SystemAlert),
        }
    }
}

/// First id field present in the payload, with the name it was found under.
fn find_key(fields: &[&'static str], payload: &Record) -> Option<(&'static str, EntityKey)> {
    fields
        .iter()
        .find_map(|f| payload.get(*f).and_then(EntityKey::from_value).map(|k| (*f, k)))
}

fn entity_patch(kind: EventKind, mut payload: Record) -> Result<EntityPatch, DecodeError> {
    let id_fields = kind.id_fields();
    let (_, id) = find_key(id_fields, &payload).ok_or_else(|| DecodeError::InvalidPayload {
        kind,
        reason: format!("missing entity id (one of {})", id_fields.join(", ")),
    })?;
    for field in id_fields {
        payload.remove(*field);
    }
    Ok(EntityPatch { id, fields: payload })
}

fn bandwidth_sample(mut payload: Record) -> Result<BandwidthSample, DecodeError> {
    let kind = EventKind::BandwidthAlert;
    let timestamp = payload
        .remove("timestamp")
        .as_ref()
        .and_then(EntityKey::from_value)
        .ok_or_else(|| DecodeError::InvalidPayload {
            kind,
            reason: "missing timestamp".to_owned(),
        })?;
    let channel = find_key(kind.id_fields(), &payload).map(|(_, k)| k);
    for field in kind.id_fields() {
        payload.remove(*field);
    }
    Ok(BandwidthSample { channel, timestamp, fields: payload })
}

fn system_alert(mut payload: Record) -> Result<SystemAlert, DecodeError> {
    let kind = EventKind::SystemAlert;
    let (found, key) = find_key(&["id", "alertId", "timestamp"], &payload).ok_or_else(|| {
        DecodeError::InvalidPayload { kind, reason: "missing id or timestamp".to_owned() }
    })?;
    // Feed rows from the REST layer are keyed by `id`.
    let key_field = match found {
        "alertId" => {
            payload.remove("alertId");
            payload.insert("id".to_owned(), key.to_value());
            "id"
        }
        other => other,
    };
    Ok(SystemAlert { key, key_field, record: payload })
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
