//! Joystick input to outbound control events.
//!
//! Pointer samples use screen convention: x grows to the right, y grows
//! downward. On the wire "push forward" is positive y, so the vertical axis
//! is flipped here for both pads.

use rover_proto::command::{ControlVector, OutboundEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pad {
    /// Drives the car (`car_control`)
    Vehicle,
    /// Pans and tilts the camera (`gimbal_control`)
    Gimbal,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PadInput {
    Move { x: f64, y: f64 },
    Release,
}

impl Pad {
    pub fn name(&self) -> &'static str {
        match self {
            Pad::Vehicle => "car",
            Pad::Gimbal => "gimbal",
        }
    }

    /// Every move is emitted as-is; there is no throttling or smoothing.
    pub fn on_move(self, x: f64, y: f64) -> OutboundEvent {
        self.event(ControlVector { x: axis(x), y: axis(-y) })
    }

    /// A release always yields exactly (0, 0).
    pub fn on_release(self) -> OutboundEvent {
        self.event(ControlVector::ZERO)
    }

    pub fn handle(self, input: PadInput) -> OutboundEvent {
        match input {
            PadInput::Move { x, y } => self.on_move(x, y),
            PadInput::Release => self.on_release(),
        }
    }

    fn event(self, v: ControlVector) -> OutboundEvent {
        match self {
            Pad::Vehicle => OutboundEvent::CarControl(v),
            Pad::Gimbal => OutboundEvent::GimbalControl(v),
        }
    }
}

fn axis(v: f64) -> f64 {
    if !v.is_finite() {
        return 0.0;
    }
    let v = v.clamp(-1.0, 1.0);
    // no negative zero on the wire
    if v == 0.0 {
        0.0
    } else {
        v
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vector(ev: OutboundEvent) -> ControlVector {
        match ev {
            OutboundEvent::CarControl(v) | OutboundEvent::GimbalControl(v) => v,
            OutboundEvent::Ping => panic!("not a control event"),
        }
    }

    #[test]
    fn moves_then_release_end_in_one_zero() {
        let inputs = [
            PadInput::Move { x: 0.1, y: -0.2 },
            PadInput::Move { x: 0.4, y: -0.6 },
            PadInput::Move { x: 0.9, y: -1.0 },
            PadInput::Release,
        ];
        let sent: Vec<ControlVector> = inputs.iter().map(|i| vector(Pad::Vehicle.handle(*i))).collect();
        assert_eq!(sent.len(), 4);
        assert_eq!(sent.iter().filter(|v| v.is_zero()).count(), 1);
        assert_eq!(sent[3], ControlVector::ZERO);
        assert_eq!(sent[2], ControlVector { x: 0.9, y: 1.0 });
    }

    #[test]
    fn vertical_axis_is_inverted_for_both_pads() {
        assert_eq!(Pad::Vehicle.on_move(0.0, -0.5), OutboundEvent::CarControl(ControlVector { x: 0.0, y: 0.5 }));
        assert_eq!(Pad::Gimbal.on_move(0.3, 0.5), OutboundEvent::GimbalControl(ControlVector { x: 0.3, y: -0.5 }));
    }

    #[test]
    fn out_of_range_and_non_finite_axes_are_sanitised() {
        let v = vector(Pad::Gimbal.on_move(3.0, f64::NAN));
        assert_eq!(v, ControlVector { x: 1.0, y: 0.0 });
        let v = vector(Pad::Vehicle.on_move(f64::NEG_INFINITY, 7.0));
        assert_eq!(v, ControlVector { x: 0.0, y: -1.0 });
    }

    #[test]
    fn release_payload_has_no_negative_zero() {
        let f = Pad::Vehicle.on_move(0.0, 0.0).to_frame();
        assert_eq!(f.data, json!({"x": 0.0, "y": 0.0}));
        assert!(!vector(Pad::Vehicle.on_move(0.0, 0.0)).y.is_sign_negative());
        assert_eq!(Pad::Gimbal.on_release().to_frame().event, "gimbal_control");
    }
}
