//! Console -> server events.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::Frame;

pub const CAR_CONTROL: &str = "car_control";
pub const GIMBAL_CONTROL: &str = "gimbal_control";
pub const PING: &str = "ping";

/// One axis pair of operator intent, each axis in [-1, 1].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ControlVector {
    pub x: f64,
    pub y: f64,
}

impl ControlVector {
    pub const ZERO: ControlVector = ControlVector { x: 0.0, y: 0.0 };

    pub fn is_zero(&self) -> bool {
        self.x == 0.0 && self.y == 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutboundEvent {
    CarControl(ControlVector),
    GimbalControl(ControlVector),
    Ping,
}

impl OutboundEvent {
    pub fn name(&self) -> &'static str {
        match self {
            OutboundEvent::CarControl(_) => CAR_CONTROL,
            OutboundEvent::GimbalControl(_) => GIMBAL_CONTROL,
            OutboundEvent::Ping => PING,
        }
    }

    pub fn payload(&self) -> Value {
        match self {
            OutboundEvent::CarControl(v) | OutboundEvent::GimbalControl(v) => json!({ "x": v.x, "y": v.y }),
            OutboundEvent::Ping => json!({}),
        }
    }

    pub fn to_frame(&self) -> Frame {
        Frame::new(self.name(), self.payload())
    }
}
