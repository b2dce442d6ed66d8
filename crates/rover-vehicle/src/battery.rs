use rover_proto::http::BatteryReport;
use rover_proto::telemetry::BatteryClass;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

const DEFAULT_ALERT: &str = "Battery critical";

#[derive(Debug, Clone, PartialEq)]
pub struct BatteryAlert {
    pub message: String,
    pub level: Option<f64>,
    pub raised_at: OffsetDateTime,
}

/// Indicator as shown to the operator: rounded percent plus the class
/// reported by the vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatteryIndicator {
    pub percent: Option<u8>,
    pub class: Option<BatteryClass>,
}

impl std::fmt::Display for BatteryIndicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.percent {
            Some(p) => write!(f, "{}%", p)?,
            None => write!(f, "--%")?,
        }
        if let Some(c) = self.class {
            write!(f, " [{}]", c.as_str())?;
        }
        Ok(())
    }
}

/// Battery level tracking and the single critical alert.
#[derive(Debug, Default)]
pub struct BatteryMonitor {
    level: Option<f64>,
    voltage: Option<f64>,
    class: Option<BatteryClass>,
    alert: Option<BatteryAlert>,
}

impl BatteryMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_battery_update(&mut self, level: Option<f64>, class: Option<BatteryClass>, voltage: Option<f64>) {
        if let Some(l) = level {
            if l.is_finite() {
                self.level = Some(l.clamp(0.0, 100.0));
            } else {
                warn!("battery: ignoring non-finite level");
            }
        }
        if voltage.is_some() {
            self.voltage = voltage;
        }
        match class {
            None => {}
            Some(BatteryClass::Unknown) => debug!("battery: unrecognised status, keeping {:?}", self.class),
            Some(c) => {
                let was_critical = self.class == Some(BatteryClass::Critical);
                self.class = Some(c);
                if was_critical && c != BatteryClass::Critical && self.alert.take().is_some() {
                    info!("battery: left critical ({}), alert cleared", c.as_str());
                }
            }
        }
    }

    pub fn apply_report(&mut self, report: &BatteryReport) {
        self.on_battery_update(report.level, report.status, report.voltage);
    }

    /// Raises the alert unless one is already shown. Returns true if raised.
    pub fn on_battery_critical(&mut self, message: Option<String>, level: Option<f64>) -> bool {
        if let Some(alert) = &self.alert {
            debug!("battery: alert already shown since {}", alert.raised_at);
            return false;
        }
        let message = message.filter(|m| !m.trim().is_empty()).unwrap_or_else(|| DEFAULT_ALERT.to_string());
        warn!("battery: ALERT {} (level {:?})", message, level.or(self.level));
        self.alert = Some(BatteryAlert { message, level: level.or(self.level), raised_at: OffsetDateTime::now_utc() });
        true
    }

    /// Hides the alert. Returns false if none was shown.
    pub fn dismiss(&mut self) -> bool {
        match self.alert.take() {
            Some(_) => {
                info!("battery: alert dismissed");
                true
            }
            None => false,
        }
    }

    pub fn alert(&self) -> Option<&BatteryAlert> {
        self.alert.as_ref()
    }

    pub fn voltage(&self) -> Option<f64> {
        self.voltage
    }

    pub fn indicator(&self) -> BatteryIndicator {
        BatteryIndicator { percent: self.level.map(|l| l.round() as u8), class: self.class }
    }
}
