//! Server -> console events.
//!
//! Every payload field is optional: a field missing from an event means
//! "no update for that field", never zero. A field of the wrong type is
//! treated the same as a missing one; the rest of the event still applies.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::ProtoError;

pub const STATUS_UPDATE: &str = "status_update";
pub const GIMBAL_UPDATE: &str = "gimbal_update";
pub const IMU_UPDATE: &str = "imu_update";
pub const IMU_STATUS: &str = "status";
pub const BATTERY_UPDATE: &str = "battery_update";
pub const BATTERY_CRITICAL: &str = "battery_critical";
pub const CONNECTION_ESTABLISHED: &str = "connection_established";
pub const PONG: &str = "pong";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdate {
    #[serde(default, deserialize_with = "lenient")]
    pub speed: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub direction: Option<String>,
}

/// Gimbal angles in degrees.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GimbalUpdate {
    #[serde(default, deserialize_with = "lenient")]
    pub horizontal: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub vertical: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Orientation {
    #[serde(default, deserialize_with = "lenient")]
    pub roll: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub pitch: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub yaw: Option<f64>,
}

/// Acceleration in g.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Acceleration {
    #[serde(default, deserialize_with = "lenient")]
    pub x: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub y: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub z: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImuUpdate {
    #[serde(default, deserialize_with = "lenient")]
    pub available: Option<bool>,
    #[serde(default, deserialize_with = "lenient")]
    pub orientation: Option<Orientation>,
    #[serde(default, deserialize_with = "lenient")]
    pub acceleration: Option<Acceleration>,
    #[serde(default, deserialize_with = "lenient")]
    pub error: Option<String>,
}

/// Sent once by the server right after a client connects.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImuStatus {
    #[serde(default, deserialize_with = "lenient")]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub imu_available: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatteryClass {
    Normal,
    Low,
    Critical,
    #[serde(other)]
    Unknown,
}

impl BatteryClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatteryClass::Normal => "normal",
            BatteryClass::Low => "low",
            BatteryClass::Critical => "critical",
            BatteryClass::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatteryUpdate {
    /// Percent 0-100
    #[serde(default, deserialize_with = "lenient")]
    pub level: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub status: Option<BatteryClass>,
    #[serde(default, deserialize_with = "lenient")]
    pub voltage: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatteryCritical {
    #[serde(default, deserialize_with = "lenient")]
    pub message: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub level: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stamp {
    #[serde(default, deserialize_with = "lenient")]
    pub timestamp: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    Status(StatusUpdate),
    Gimbal(GimbalUpdate),
    Imu(ImuUpdate),
    ImuStatus(ImuStatus),
    Battery(BatteryUpdate),
    BatteryCritical(BatteryCritical),
    ConnectionEstablished(Stamp),
    Pong(Stamp),
}

impl InboundEvent {
    /// Decodes a named event. Unknown names yield `Ok(None)`.
    pub fn decode(name: &str, data: &Value) -> Result<Option<Self>, ProtoError> {
        let ev = match name {
            STATUS_UPDATE => Self::Status(payload(STATUS_UPDATE, data)?),
            GIMBAL_UPDATE => Self::Gimbal(payload(GIMBAL_UPDATE, data)?),
            IMU_UPDATE => Self::Imu(payload(IMU_UPDATE, data)?),
            IMU_STATUS => Self::ImuStatus(payload(IMU_STATUS, data)?),
            BATTERY_UPDATE => Self::Battery(payload(BATTERY_UPDATE, data)?),
            BATTERY_CRITICAL => Self::BatteryCritical(payload(BATTERY_CRITICAL, data)?),
            CONNECTION_ESTABLISHED => Self::ConnectionEstablished(payload(CONNECTION_ESTABLISHED, data)?),
            PONG => Self::Pong(payload(PONG, data)?),
            _ => return Ok(None),
        };
        Ok(Some(ev))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Status(_) => STATUS_UPDATE,
            Self::Gimbal(_) => GIMBAL_UPDATE,
            Self::Imu(_) => IMU_UPDATE,
            Self::ImuStatus(_) => IMU_STATUS,
            Self::Battery(_) => BATTERY_UPDATE,
            Self::BatteryCritical(_) => BATTERY_CRITICAL,
            Self::ConnectionEstablished(_) => CONNECTION_ESTABLISHED,
            Self::Pong(_) => PONG,
        }
    }
}

// Events without a body arrive as null
fn payload<T: DeserializeOwned + Default>(event: &'static str, data: &Value) -> Result<T, ProtoError> {
    if data.is_null() {
        return Ok(T::default());
    }
    T::deserialize(data).map_err(|source| ProtoError::Payload { event, source })
}

fn lenient<'de, D, T>(de: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let raw = Value::deserialize(de)?;
    Ok(serde_json::from_value(raw).ok())
}
