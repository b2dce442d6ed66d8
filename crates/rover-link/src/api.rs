use anyhow::{Context, Result};
use rover_proto::http::{
    ActionAck, BatteryReport, ImuAvailability, MapData, PositionData, BATTERY_STATUS, IMU_DATA, IMU_STATUS,
    MAP_DATA, POSITION, RESET_GIMBAL, RESET_SLAM,
};
use rover_proto::telemetry::ImuUpdate;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, info};

/// Client for the vehicle's request/response endpoints.
#[derive(Debug, Clone)]
pub struct VehicleApi {
    client: reqwest::Client,
    base: String,
}

impl VehicleApi {
    pub fn new(base: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("rover-console/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .context("build http client")?;
        Ok(Self { client, base: base.trim_end_matches('/').to_string() })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    pub async fn map_data(&self) -> Result<MapData> {
        self.get_json(MAP_DATA).await
    }

    pub async fn position(&self) -> Result<PositionData> {
        self.get_json(POSITION).await
    }

    pub async fn battery_status(&self) -> Result<BatteryReport> {
        self.get_json(BATTERY_STATUS).await
    }

    pub async fn imu_status(&self) -> Result<ImuAvailability> {
        self.get_json(IMU_STATUS).await
    }

    /// One IMU reading, used to seed the display before the first push.
    pub async fn imu_data(&self) -> Result<ImuUpdate> {
        self.get_json(IMU_DATA).await
    }

    pub async fn reset_gimbal(&self) -> Result<ActionAck> {
        self.post(RESET_GIMBAL).await
    }

    pub async fn reset_slam(&self) -> Result<ActionAck> {
        self.post(RESET_SLAM).await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path);
        debug!("api: GET {}", url);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {}", url))?
            .error_for_status()
            .with_context(|| format!("GET {}", url))?;
        resp.json::<T>().await.with_context(|| format!("decode {}", url))
    }

    async fn post(&self, path: &str) -> Result<ActionAck> {
        let url = self.url(path);
        let resp = self
            .client
            .post(&url)
            .send()
            .await
            .with_context(|| format!("POST {}", url))?
            .error_for_status()
            .with_context(|| format!("POST {}", url))?;
        let ack: ActionAck = resp.json().await.with_context(|| format!("decode {}", url))?;
        anyhow::ensure!(ack.is_success(), "{} answered status={:?}", path, ack.status);
        info!("api: {} ok", path);
        Ok(ack)
    }
}
