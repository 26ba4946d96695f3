use crate::prelude::*;

use serde::Deserialize;
use serde_with::{serde_as, DurationMilliSeconds};
use std::time::Duration;

/// One day of readings at a one second cadence.
pub const MAX_BLOCK_SIZE: usize = 86_400;

#[serde_as]
#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    /// Device path of the P1 cable, e.g. `/dev/ttyUSB0`.
    pub serial_port: String,

    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "poll_interval_ms", default = "Config::default_poll_interval")]
    pub poll_interval: Duration,

    /// Number of readings averaged into one stored value; 0 stores every reading.
    #[serde(default = "Config::default_block_size")]
    pub block_size: usize,

    #[serde(default = "Config::default_max_serial_errors")]
    pub max_serial_errors: u32,

    #[serde(default = "Config::default_max_recent_readings")]
    pub max_recent_readings: i64,

    #[serde(default = "Config::default_database_url")]
    pub database_url: String,

    #[serde(default = "Config::default_event_log")]
    pub event_log: String,

    #[serde(default = "Config::default_loglevel")]
    pub loglevel: String,
}

impl Config {
    pub fn new(file: String) -> Result<Self> {
        let content = std::fs::read_to_string(&file)
            .map_err(|err| crate::file_error_with_source!(err, "error reading {}", file))?;

        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn log_summary(&self) {
        info!("Configuration loaded successfully:");
        info!("  Serial port: {}", self.serial_port);
        info!("  Poll interval: {}ms", self.poll_interval.as_millis());
        info!("  Block size: {}", self.block_size);
        info!("  Max serial errors: {}", self.max_serial_errors);
        info!("  Max recent readings: {}", self.max_recent_readings);
        info!("  Database: {}", self.database_url);
        info!("  Event log: {}", self.event_log);
        info!("  Log Level: {}", self.loglevel);
    }

    fn validate(&self) -> Result<()> {
        if self.serial_port.is_empty() {
            bail!("serial_port cannot be empty");
        }

        if self.poll_interval.is_zero() {
            bail!("poll_interval_ms must be greater than 0");
        }

        if self.block_size > MAX_BLOCK_SIZE {
            bail!(
                "block_size {} is too large, at most {} is allowed",
                self.block_size,
                MAX_BLOCK_SIZE
            );
        }

        match url::Url::parse(&self.database_url) {
            Ok(url) if url.scheme() == "sqlite" => {}
            Ok(url) => bail!("unsupported database {}, only sqlite is supported", url.scheme()),
            Err(err) => return Err(anyhow!("config.rs:Invalid database URL: {}", err)),
        }

        if self.event_log.is_empty() {
            bail!("event_log cannot be empty");
        }

        if log::LevelFilter::from_str(&self.loglevel).is_err() {
            bail!("unknown loglevel {}", self.loglevel);
        }

        Ok(())
    }

    fn default_poll_interval() -> Duration {
        Duration::from_millis(1000)
    }

    // ten minute averages at the default interval
    fn default_block_size() -> usize {
        600
    }

    fn default_max_serial_errors() -> u32 {
        10
    }

    fn default_max_recent_readings() -> i64 {
        144
    }

    fn default_database_url() -> String {
        "sqlite://readings.db".to_string()
    }

    fn default_event_log() -> String {
        "log.txt".to_string()
    }

    fn default_loglevel() -> String {
        "info".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_uses_defaults() {
        let config = Config::from_yaml("serial_port: /dev/ttyUSB0\n").unwrap();

        assert_eq!(config.serial_port, "/dev/ttyUSB0");
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.block_size, 600);
        assert_eq!(config.max_serial_errors, 10);
        assert_eq!(config.database_url, "sqlite://readings.db");
        assert_eq!(config.loglevel, "info");
    }

    #[test]
    fn full_config() {
        let yaml = r#"
serial_port: /dev/ttyAMA0
poll_interval_ms: 2500
block_size: 0
max_serial_errors: 3
max_recent_readings: 0
database_url: "sqlite:///var/lib/p1/readings.db"
event_log: /var/log/p1-reader.log
loglevel: debug
"#;
        let config = Config::from_yaml(yaml).unwrap();

        assert_eq!(config.poll_interval, Duration::from_millis(2500));
        assert_eq!(config.block_size, 0);
        assert_eq!(config.max_serial_errors, 3);
        assert_eq!(config.max_recent_readings, 0);
        assert_eq!(config.event_log, "/var/log/p1-reader.log");
    }

    #[test]
    fn serial_port_is_required() {
        assert!(Config::from_yaml("block_size: 10\n").is_err());
        assert!(Config::from_yaml("serial_port: ''\n").is_err());
    }

    #[test]
    fn rejects_zero_interval() {
        let err = Config::from_yaml("serial_port: /dev/ttyUSB0\npoll_interval_ms: 0\n").unwrap_err();
        assert!(err.to_string().contains("poll_interval_ms"));
    }

    #[test]
    fn rejects_oversized_block() {
        let err = Config::from_yaml("serial_port: /dev/ttyUSB0\nblock_size: 10000000000000\n")
            .unwrap_err();
        assert!(err.to_string().contains("block_size"));

        let yaml = format!("serial_port: /dev/ttyUSB0\nblock_size: {}\n", MAX_BLOCK_SIZE);
        assert_eq!(Config::from_yaml(&yaml).unwrap().block_size, MAX_BLOCK_SIZE);
    }

    #[test]
    fn rejects_non_sqlite_database() {
        assert!(Config::from_yaml(
            "serial_port: /dev/ttyUSB0\ndatabase_url: postgres://localhost/p1\n"
        )
        .is_err());
        assert!(Config::from_yaml("serial_port: /dev/ttyUSB0\ndatabase_url: readings\n").is_err());
    }

    #[test]
    fn rejects_unknown_loglevel() {
        assert!(Config::from_yaml("serial_port: /dev/ttyUSB0\nloglevel: chatty\n").is_err());
    }

    #[test]
    fn missing_file() {
        let err = Config::new("/nonexistent/config.yaml".to_string()).unwrap_err();
        assert!(err.to_string().contains("config.rs"));
    }
}
