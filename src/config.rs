use std::{env, path::PathBuf, time::Duration};

use anyhow::Context;

use crate::track_sim::VehicleConfig;

// Runtime/server settings, read from the environment (.env is loaded first).

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:9001";
pub const DEFAULT_TICK_HZ: u32 = 60;

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub tick_hz: u32,
    /// TOML vehicle definition; the tank preset when unset.
    pub vehicle_config: Option<PathBuf>,
    pub batch_probes: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            tick_hz: DEFAULT_TICK_HZ,
            vehicle_config: None,
            batch_probes: false,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as `from_env`, reading through `lookup` (tests pass a map).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: lookup("SIM_BIND_ADDR").unwrap_or(defaults.bind_addr),
            tick_hz: lookup("SIM_TICK_HZ")
                .and_then(|v| v.parse::<u32>().ok())
                .filter(|hz| *hz > 0)
                .unwrap_or(defaults.tick_hz),
            vehicle_config: lookup("SIM_VEHICLE_CONFIG")
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from),
            batch_probes: lookup("SIM_BATCH_PROBES")
                .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
                .unwrap_or(defaults.batch_probes),
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.tick_hz))
    }

    pub fn tick_dt(&self) -> f32 {
        1.0 / self.tick_hz as f32
    }

    /// Vehicle every new client drives.
    pub fn load_vehicle(&self) -> anyhow::Result<VehicleConfig> {
        let mut vehicle = match &self.vehicle_config {
            Some(path) => VehicleConfig::from_toml_file(path)
                .with_context(|| format!("loading vehicle config {}", path.display()))?,
            None => VehicleConfig::tank(),
        };
        vehicle.flags.batch_probes |= self.batch_probes;
        Ok(vehicle)
    }
}
