use std::time::Duration;

use nv40::{NV40_AXES, NV40_TIMEOUT};
use serde::{Deserialize, Serialize};

/// Device units (µm) to host position units.
///
/// The host side keeps positions as fixed-point counts, so a unit scale of
/// 1.0 would truncate sub-micron readings.
pub const NV40_UNIT_SCALE: f64 = 1.0e6;

fn default_unit_scale() -> f64 {
    NV40_UNIT_SCALE
}

fn default_timeout_ms() -> u64 {
    NV40_TIMEOUT.as_millis() as u64
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct Nv40ControllerConfig {
    pub port_name: String,
    pub transport_port: String,
    pub num_axes: usize,
    pub poll_period_ms: u64,

    #[serde(default = "default_unit_scale")]
    pub unit_scale: f64,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Nv40ControllerConfig {
    pub fn poll_period(&self) -> Duration {
        Duration::from_millis(self.poll_period_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.port_name.is_empty() {
            return Err("port_name must not be empty".to_string());
        }
        if !(1..=NV40_AXES).contains(&self.num_axes) {
            return Err(format!(
                "{}: num_axes must be between 1 and {}, got {}",
                self.port_name, NV40_AXES, self.num_axes
            ));
        }
        if self.poll_period_ms == 0 {
            return Err(format!("{}: poll_period_ms must be positive", self.port_name));
        }
        if self.timeout_ms == 0 {
            return Err(format!("{}: timeout_ms must be positive", self.port_name));
        }
        if !self.unit_scale.is_finite() || self.unit_scale == 0.0 {
            return Err(format!(
                "{}: unit_scale must be a non-zero number, got {}",
                self.port_name, self.unit_scale
            ));
        }
        Ok(())
    }
}

impl Default for Nv40ControllerConfig {
    fn default() -> Self {
        Self {
            port_name: "NV40_1".to_string(),
            transport_port: "nv40_tcp".to_string(),
            num_axes: NV40_AXES,
            poll_period_ms: 200,

            unit_scale: NV40_UNIT_SCALE,
            timeout_ms: default_timeout_ms(),
        }
    }
}
