mod config;
mod console;
mod input;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use rover_link::api::VehicleApi;
use rover_map::{HeadlessScene, SpatialSync};
use rover_vehicle::BatteryMonitor;

use config::{check_config, load_config, Config};
use input::ResetTarget;

#[derive(Debug, Parser)]
#[command(name = "rover", version, about = "Operator console for a camera rover")]
struct Cli {
    #[arg(long)]
    config: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Validate the config and check the vehicle answers over HTTP.
    Doctor,
    /// Run the console; control lines are read from stdin.
    Run,
    /// One-shot reset action.
    Reset {
        #[arg(value_enum)]
        target: ResetTarget,
    },
    /// Print the battery status once.
    Battery,
    /// Fetch map and pose once and print the resulting scene.
    Map,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let cfg = load_config(&cli.config)?;

    match cli.cmd {
        Command::Doctor => doctor(&cfg).await?,
        Command::Run => console::run(&cfg).await?,
        Command::Reset { target } => reset(&cfg, target).await?,
        Command::Battery => battery(&cfg).await?,
        Command::Map => map(&cfg).await?,
    }
    Ok(())
}

fn api(cfg: &Config) -> Result<VehicleApi> {
    VehicleApi::new(&cfg.link.http_base, cfg.link.request_timeout())
}

async fn doctor(cfg: &Config) -> Result<()> {
    info!("doctor: starting");

    check_config(cfg)?;

    match api(cfg)?.imu_status().await {
        Ok(imu) => info!("doctor: vehicle reachable at {} (imu available: {})", cfg.link.http_base, imu.available),
        Err(e) => warn!("doctor: vehicle not reachable: {:#}", e),
    }

    info!("doctor: OK");
    Ok(())
}

async fn reset(cfg: &Config, target: ResetTarget) -> Result<()> {
    let api = api(cfg)?;
    let ack = match target {
        ResetTarget::Gimbal => api.reset_gimbal().await?,
        ResetTarget::Map => api.reset_slam().await?,
    };
    println!("{:?}: {}", target, ack.status);
    Ok(())
}

async fn battery(cfg: &Config) -> Result<()> {
    let report = api(cfg)?.battery_status().await?;
    let mut monitor = BatteryMonitor::new();
    monitor.apply_report(&report);
    match monitor.voltage() {
        Some(v) => println!("battery: {} {:.2} V", monitor.indicator(), v),
        None => println!("battery: {}", monitor.indicator()),
    }
    Ok(())
}

async fn map(cfg: &Config) -> Result<()> {
    let api = api(cfg)?;
    let (map, pose) = tokio::join!(api.map_data(), api.position());
    let mut sync = SpatialSync::new(HeadlessScene::new(), &cfg.map);
    let applied = sync.apply_map(&map?);
    match pose {
        Ok(pose) => {
            sync.apply_pose(&pose);
        }
        Err(e) => warn!("map: /position failed: {:#}", e),
    }
    println!("{:?}", applied);
    println!("{}", sync.summary());
    print!("{}", sync.scene().summary());
    Ok(())
}
