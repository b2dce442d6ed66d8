use std::time::{Duration, Instant};

/// Whether the vehicle's IMU can be trusted right now.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ImuAvailability {
    /// No IMU report since the link (re)connected
    #[default]
    Unknown,
    Unavailable,
    Available,
}

/// A displayable value together with how far it can be trusted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading<T> {
    Live(T),
    /// Last value seen before the link dropped
    Stale(T),
    NotAvailable,
}

impl<T: Copy> Reading<T> {
    pub fn live(&self) -> Option<T> {
        match self {
            Reading::Live(v) => Some(*v),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImuState {
    pub availability: ImuAvailability,
    pub roll: Option<f64>,
    pub pitch: Option<f64>,
    pub yaw: Option<f64>,
    pub accel_x: Option<f64>,
    pub accel_y: Option<f64>,
    pub accel_z: Option<f64>,
    pub error: Option<String>,
    // values arrived since the last reset
    fresh: bool,
}

impl ImuState {
    pub fn mark_unknown(&mut self) {
        self.availability = ImuAvailability::Unknown;
        self.fresh = false;
    }

    pub(crate) fn mark_fresh(&mut self) {
        self.fresh = true;
    }

    pub fn is_fresh(&self) -> bool {
        self.fresh
    }

    pub fn reading(&self, value: Option<f64>) -> Reading<f64> {
        match (self.availability, value) {
            (ImuAvailability::Unavailable, _) | (_, None) => Reading::NotAvailable,
            (ImuAvailability::Available, Some(v)) if self.fresh => Reading::Live(v),
            (_, Some(v)) => Reading::Stale(v),
        }
    }

    pub fn roll(&self) -> Reading<f64> {
        self.reading(self.roll)
    }

    pub fn pitch(&self) -> Reading<f64> {
        self.reading(self.pitch)
    }

    pub fn yaw(&self) -> Reading<f64> {
        self.reading(self.yaw)
    }

    pub fn acceleration(&self) -> [Reading<f64>; 3] {
        [self.reading(self.accel_x), self.reading(self.accel_y), self.reading(self.accel_z)]
    }
}

/// Latest known vehicle status, merged field by field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TelemetrySnapshot {
    pub speed: Option<f64>,
    pub direction: Option<String>,
    /// Degrees
    pub gimbal_h: Option<f64>,
    pub gimbal_v: Option<f64>,
    pub imu: ImuState,
    pub last_update: Option<Instant>,
}

impl TelemetrySnapshot {
    pub fn age(&self) -> Option<Duration> {
        self.last_update.map(|t| t.elapsed())
    }

    /// One-screen textual board, the terminal's stand-in for the dashboard.
    pub fn render(&self) -> String {
        fn deg(r: Reading<f64>) -> String {
            match r {
                Reading::Live(v) => format!("{}°", v.round()),
                Reading::Stale(v) => format!("{}° (stale)", v.round()),
                Reading::NotAvailable => "N/A".into(),
            }
        }
        fn g(r: Reading<f64>) -> String {
            match r {
                Reading::Live(v) => format!("{:.2} g", v),
                Reading::Stale(v) => format!("{:.2} g (stale)", v),
                Reading::NotAvailable => "N/A".into(),
            }
        }
        fn opt_deg(v: Option<f64>) -> String {
            v.map(|v| format!("{}°", v.round())).unwrap_or_else(|| "-".into())
        }

        let [ax, ay, az] = self.imu.acceleration();
        format!(
            "speed={} direction={} gimbal=({}, {}) imu={:?} roll={} pitch={} accel=({}, {}, {})",
            self.speed.map(|s| s.to_string()).unwrap_or_else(|| "-".into()),
            self.direction.as_deref().unwrap_or("-"),
            opt_deg(self.gimbal_h),
            opt_deg(self.gimbal_v),
            self.imu.availability,
            deg(self.imu.roll()),
            deg(self.imu.pitch()),
            g(ax),
            g(ay),
            g(az),
        )
    }
}
