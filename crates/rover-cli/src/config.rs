use anyhow::{Context, Result};
use rover_link::doctor as link_doctor;
use rover_link::media::MediaConfig;
use rover_link::LinkConfig;
use rover_map::{doctor as map_doctor, MapConfig};
use serde::Deserialize;

/// Every section and field is optional; missing ones take their defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub link: LinkConfig,
    pub map: MapConfig,
    pub media: MediaConfig,
}

pub fn load_config(path: &str) -> Result<Config> {
    let s = std::fs::read_to_string(path).with_context(|| format!("read config {}", path))?;
    parse_config(&s)
}

pub fn parse_config(s: &str) -> Result<Config> {
    toml::from_str(s).context("parse config toml")
}

/// Rejects values the runtime cannot honour, such as zero periods.
pub fn check_config(cfg: &Config) -> Result<()> {
    link_doctor::check_link(&cfg.link)?;
    link_doctor::check_media(&cfg.media)?;
    map_doctor::check_map(&cfg.map)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn partial_sections_keep_defaults() {
        let cfg = parse_config(
            r#"
            [link]
            address = "rover.local:5001"
            http_base = "http://rover.local:5000"
            reconnect_max_attempts = 3

            [map]
            chase_camera = false
            "#,
        )
        .unwrap();
        assert_eq!(cfg.link.address, "rover.local:5001");
        assert_eq!(cfg.link.reconnect_max_attempts, 3);
        assert_eq!(cfg.link.heartbeat_timeout_ms, 10_000);
        assert!(!cfg.map.chase_camera);
        assert_eq!(cfg.map.pose_poll_ms, 200);
        assert!(cfg.media.enable);
    }

    #[test]
    fn empty_file_is_all_defaults() {
        let cfg = parse_config("").unwrap();
        assert_eq!(cfg.map.map_poll_ms, 1_000);
        assert_eq!(cfg.media.reload_max_attempts, 8);
    }

    #[test]
    fn wrong_type_is_an_error() {
        assert!(parse_config("[map]\nmap_poll_ms = \"fast\"\n").is_err());
    }

    #[test]
    fn parsed_zero_periods_fail_the_check() {
        check_config(&parse_config("").unwrap()).unwrap();
        for bad in [
            "[map]\nmap_poll_ms = 0\n",
            "[link]\nheartbeat_interval_ms = 0\n",
            "[media]\nstall_timeout_ms = 0\n",
        ] {
            let cfg = parse_config(bad).unwrap();
            assert!(check_config(&cfg).is_err(), "{:?} passed", bad);
        }
    }
}
