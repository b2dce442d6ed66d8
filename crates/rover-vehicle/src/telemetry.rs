//! Routes inbound socket events to the snapshot and the battery monitor.

use rover_proto::telemetry::{
    BatteryCritical, BatteryUpdate, GimbalUpdate, ImuStatus, ImuUpdate, InboundEvent, Stamp, StatusUpdate,
};
use serde_json::Value;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::battery::BatteryMonitor;
use crate::state::{ImuAvailability, TelemetrySnapshot};

/// What an inbound event touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routed {
    Status,
    Gimbal,
    Imu,
    Battery,
    /// `true` when a new alert was raised
    BatteryAlert(bool),
    ServerHello,
    Ignored,
}

#[derive(Debug, Default)]
pub struct TelemetryRouter {
    snapshot: TelemetrySnapshot,
    battery: BatteryMonitor,
}

impl TelemetryRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> &TelemetrySnapshot {
        &self.snapshot
    }

    pub fn battery(&self) -> &BatteryMonitor {
        &self.battery
    }

    pub fn battery_mut(&mut self) -> &mut BatteryMonitor {
        &mut self.battery
    }

    /// Decodes and applies one named event. Unknown names and bad payloads
    /// are logged and produce no update.
    pub fn handle(&mut self, name: &str, data: &Value) -> Routed {
        match InboundEvent::decode(name, data) {
            Ok(Some(ev)) => self.apply(ev),
            Ok(None) => {
                debug!("telemetry: ignoring unknown event {:?}", name);
                Routed::Ignored
            }
            Err(e) => {
                warn!("telemetry: {}", e);
                Routed::Ignored
            }
        }
    }

    pub fn apply(&mut self, ev: InboundEvent) -> Routed {
        let routed = match ev {
            InboundEvent::Status(s) => self.on_status(s),
            InboundEvent::Gimbal(g) => self.on_gimbal(g),
            InboundEvent::Imu(i) => self.on_imu(i),
            InboundEvent::ImuStatus(s) => self.on_imu_status(s),
            InboundEvent::Battery(b) => self.on_battery(b),
            InboundEvent::BatteryCritical(c) => self.on_battery_critical(c),
            InboundEvent::ConnectionEstablished(Stamp { timestamp }) => {
                info!("telemetry: server says hello (ts {:?})", timestamp);
                Routed::ServerHello
            }
            // consumed by the link; harmless if it slips through
            InboundEvent::Pong(_) => Routed::Ignored,
        };
        if routed != Routed::Ignored {
            self.snapshot.last_update = Some(Instant::now());
        }
        routed
    }

    /// Any change of link state invalidates what we know about the IMU.
    pub fn on_session_transition(&mut self) {
        if self.snapshot.imu.availability != ImuAvailability::Unknown {
            debug!("telemetry: imu availability reset to unknown");
        }
        self.snapshot.imu.mark_unknown();
    }

    fn on_status(&mut self, s: StatusUpdate) -> Routed {
        if let Some(speed) = s.speed {
            self.snapshot.speed = Some(speed);
        }
        if let Some(dir) = s.direction {
            self.snapshot.direction = Some(dir);
        }
        Routed::Status
    }

    fn on_gimbal(&mut self, g: GimbalUpdate) -> Routed {
        if let Some(h) = g.horizontal {
            self.snapshot.gimbal_h = Some(h);
        }
        if let Some(v) = g.vertical {
            self.snapshot.gimbal_v = Some(v);
        }
        Routed::Gimbal
    }

    fn on_imu(&mut self, u: ImuUpdate) -> Routed {
        let imu = &mut self.snapshot.imu;
        let mut got_values = false;
        if let Some(o) = u.orientation {
            got_values |= merge(&mut imu.roll, o.roll) | merge(&mut imu.pitch, o.pitch) | merge(&mut imu.yaw, o.yaw);
        }
        if let Some(a) = u.acceleration {
            got_values |= merge(&mut imu.accel_x, a.x) | merge(&mut imu.accel_y, a.y) | merge(&mut imu.accel_z, a.z);
        }
        if u.error.is_some() {
            imu.error = u.error;
        }
        match u.available {
            Some(true) => imu.availability = ImuAvailability::Available,
            Some(false) => imu.availability = ImuAvailability::Unavailable,
            None if got_values => imu.availability = ImuAvailability::Available,
            None => {}
        }
        if got_values {
            imu.mark_fresh();
        }
        if imu.availability == ImuAvailability::Unavailable {
            if let Some(err) = &imu.error {
                debug!("telemetry: imu unavailable: {}", err);
            }
        }
        Routed::Imu
    }

    fn on_imu_status(&mut self, s: ImuStatus) -> Routed {
        if let Some(status) = &s.status {
            debug!("telemetry: server status {:?}", status);
        }
        match s.imu_available {
            Some(true) => self.snapshot.imu.availability = ImuAvailability::Available,
            Some(false) => self.snapshot.imu.availability = ImuAvailability::Unavailable,
            None => {}
        }
        Routed::Imu
    }

    fn on_battery(&mut self, b: BatteryUpdate) -> Routed {
        self.battery.on_battery_update(b.level, b.status, b.voltage);
        Routed::Battery
    }

    fn on_battery_critical(&mut self, c: BatteryCritical) -> Routed {
        Routed::BatteryAlert(self.battery.on_battery_critical(c.message, c.level))
    }
}

fn merge(slot: &mut Option<f64>, value: Option<f64>) -> bool {
    match value {
        Some(v) => {
            *slot = Some(v);
            true
        }
        None => false,
    }
}
