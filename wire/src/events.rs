//! Typed event payloads exchanged on the tracking channel.
//!
//! DESIGN
//! ======
//! Outbound events are a closed enum so every emission has a fixed name and
//! field set. Inbound events are decoded from `(name, data)` pairs; names this
//! client does not interpret decode to `None` rather than an error.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

// =============================================================================
// EVENT NAMES
// =============================================================================

pub const USER_LOGIN: &str = "user-login";
pub const JOIN_TRACKING: &str = "join-tracking";
pub const LEAVE_TRACKING: &str = "leave-tracking";
pub const LOCATION_UPDATE: &str = "location-update";
pub const STATUS_UPDATE: &str = "status-update";
pub const DELIVERY_COMPLETED: &str = "delivery-completed";
pub const BROADCAST_ANNOUNCEMENT: &str = "broadcast-announcement";
pub const PARCEL_BOOKED: &str = "parcel-booked";
pub const AGENT_ASSIGNED: &str = "agent-assigned";

pub const CONNECTION_CONFIRMED: &str = "connection-confirmed";
pub const SYSTEM_ANNOUNCEMENT: &str = "system-announcement";
pub const LOCATION_UPDATED: &str = "location-updated";
pub const STATUS_CHANGED: &str = "status-changed";
pub const DELIVERY_FINISHED: &str = "delivery-finished";

// =============================================================================
// PARCEL STATUS
// =============================================================================

/// Delivery lifecycle of a parcel.
///
/// The happy path is ordered `Pending < PickedUp < InTransit < Delivered`;
/// `Failed` is terminal and sits outside that progression.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ParcelStatus {
    Pending,
    PickedUp,
    InTransit,
    Delivered,
    Failed,
}

impl ParcelStatus {
    /// Happy-path progression in order.
    pub const FLOW: [Self; 4] = [Self::Pending, Self::PickedUp, Self::InTransit, Self::Delivered];

    /// Wire spelling, e.g. `"picked-up"`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::PickedUp => "picked-up",
            Self::InTransit => "in-transit",
            Self::Delivered => "delivered",
            Self::Failed => "failed",
        }
    }

    /// Whether no further transition is expected.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Failed)
    }

    /// Next step on the happy path, if any.
    #[must_use]
    pub fn next(self) -> Option<Self> {
        let index = Self::FLOW.iter().position(|s| *s == self)?;
        Self::FLOW.get(index + 1).copied()
    }
}

impl std::fmt::Display for ParcelStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ParcelStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "picked-up" => Ok(Self::PickedUp),
            "in-transit" => Ok(Self::InTransit),
            "delivered" => Ok(Self::Delivered),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown parcel status: {other}")),
        }
    }
}

/// Announcement urgency for admin broadcasts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    #[default]
    Info,
    Warning,
    Critical,
}

// =============================================================================
// OUTBOUND PAYLOADS
// =============================================================================

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserLogin {
    pub user_id: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationUpdate {
    pub parcel_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub agent_id: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub parcel_id: String,
    pub status: ParcelStatus,
    pub previous_status: Option<ParcelStatus>,
    pub agent_id: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryCompleted {
    pub parcel_id: String,
    pub status: ParcelStatus,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastAnnouncement {
    pub message: String,
    pub priority: Priority,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParcelBooked {
    pub parcel_id: String,
    pub tracking_number: String,
    pub pickup_city: String,
    pub delivery_city: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentAssigned {
    pub parcel_id: String,
    pub agent_id: String,
    pub agent_name: String,
    pub pickup_city: String,
    pub delivery_city: String,
}

/// Every event this client may send.
#[derive(Clone, Debug, PartialEq)]
pub enum OutboundEvent {
    UserLogin(UserLogin),
    /// Payload is the bare parcel id string.
    JoinTracking(String),
    /// Payload is the bare parcel id string.
    LeaveTracking(String),
    LocationUpdate(LocationUpdate),
    StatusUpdate(StatusUpdate),
    DeliveryCompleted(DeliveryCompleted),
    BroadcastAnnouncement(BroadcastAnnouncement),
    ParcelBooked(ParcelBooked),
    AgentAssigned(AgentAssigned),
}

impl OutboundEvent {
    /// Event name on the wire.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::UserLogin(_) => USER_LOGIN,
            Self::JoinTracking(_) => JOIN_TRACKING,
            Self::LeaveTracking(_) => LEAVE_TRACKING,
            Self::LocationUpdate(_) => LOCATION_UPDATE,
            Self::StatusUpdate(_) => STATUS_UPDATE,
            Self::DeliveryCompleted(_) => DELIVERY_COMPLETED,
            Self::BroadcastAnnouncement(_) => BROADCAST_ANNOUNCEMENT,
            Self::ParcelBooked(_) => PARCEL_BOOKED,
            Self::AgentAssigned(_) => AGENT_ASSIGNED,
        }
    }

    /// Event argument as JSON.
    ///
    /// # Errors
    ///
    /// Propagates serializer failures; none of the payload types produce one
    /// in practice.
    pub fn to_data(&self) -> Result<Value, serde_json::Error> {
        match self {
            Self::UserLogin(p) => serde_json::to_value(p),
            Self::JoinTracking(id) | Self::LeaveTracking(id) => Ok(Value::String(id.clone())),
            Self::LocationUpdate(p) => serde_json::to_value(p),
            Self::StatusUpdate(p) => serde_json::to_value(p),
            Self::DeliveryCompleted(p) => serde_json::to_value(p),
            Self::BroadcastAnnouncement(p) => serde_json::to_value(p),
            Self::ParcelBooked(p) => serde_json::to_value(p),
            Self::AgentAssigned(p) => serde_json::to_value(p),
        }
    }
}

// =============================================================================
// INBOUND PAYLOADS
// =============================================================================

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionConfirmed {
    pub socket_id: String,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationUpdated {
    pub parcel_id: String,
    pub latitude: f64,
    pub longitude: f64,
    /// `None` when absent or unreadable.
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub timestamp: Option<OffsetDateTime>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChanged {
    pub parcel_id: String,
    pub status: ParcelStatus,
    /// `None` when absent or unreadable.
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub timestamp: Option<OffsetDateTime>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryFinished {
    pub parcel_id: String,
    pub status: ParcelStatus,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub completed_at: Option<OffsetDateTime>,
}

/// Parcel-scoped events folded into a tracking view.
#[derive(Clone, Debug, PartialEq)]
pub enum TrackingEvent {
    LocationUpdated(LocationUpdated),
    StatusChanged(StatusChanged),
    DeliveryFinished(DeliveryFinished),
}

impl TrackingEvent {
    /// Event names that decode into a [`TrackingEvent`].
    pub const NAMES: [&'static str; 3] = [LOCATION_UPDATED, STATUS_CHANGED, DELIVERY_FINISHED];

    /// Decode a named inbound event.
    ///
    /// Returns `Ok(None)` for names that are not tracking events.
    ///
    /// # Errors
    ///
    /// Returns the serde error when a tracking event's payload is malformed.
    pub fn decode(name: &str, data: &Value) -> Result<Option<Self>, serde_json::Error> {
        let event = match name {
            LOCATION_UPDATED => Self::LocationUpdated(LocationUpdated::deserialize(data)?),
            STATUS_CHANGED => Self::StatusChanged(StatusChanged::deserialize(data)?),
            DELIVERY_FINISHED => Self::DeliveryFinished(DeliveryFinished::deserialize(data)?),
            _ => return Ok(None),
        };
        Ok(Some(event))
    }

    /// Parcel the event refers to.
    #[must_use]
    pub fn parcel_id(&self) -> &str {
        match self {
            Self::LocationUpdated(e) => &e.parcel_id,
            Self::StatusChanged(e) => &e.parcel_id,
            Self::DeliveryFinished(e) => &e.parcel_id,
        }
    }
}

/// Read RFC 3339 strings or epoch milliseconds (integer or fractional).
/// Anything else becomes `None`; a bad timestamp never rejects the event.
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<Option<OffsetDateTime>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(parse_timestamp(&Value::deserialize(deserializer)?))
}

#[allow(clippy::cast_possible_truncation)]
fn parse_timestamp(value: &Value) -> Option<OffsetDateTime> {
    match value {
        Value::String(text) => OffsetDateTime::parse(text, &time::format_description::well_known::Rfc3339).ok(),
        Value::Number(number) => {
            let nanos = match number.as_i64() {
                Some(millis) => i128::from(millis).checked_mul(1_000_000)?,
                None => {
                    let millis = number.as_f64().filter(|m| m.is_finite())?;
                    (millis * 1_000_000.0).round() as i128
                }
            };
            OffsetDateTime::from_unix_timestamp_nanos(nanos).ok()
        }
        _ => None,
    }
}

#[cfg(test)]
#[path = "events_test.rs"]
mod tests;
