use crate::error::ConfigError;
use dxl_transport::{DeviceId, RegisterAddress};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Everything the bring-up and recovery paths need, read once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    pub device_name: String,
    pub baud_rate: u32,
    pub robot_file: Option<PathBuf>,
    pub offset_file: Option<PathBuf>,
    pub init_file: Option<PathBuf>,
    pub simulation: bool,
    /// Only honored when `simulation` is set.
    pub simulation_robot_name: Option<String>,
    /// Button event payload that starts a recovery (long press).
    pub button_trigger: String,
    pub bus: BusLayout,
    pub timing: Timing,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            device_name: "/dev/ttyUSB0".to_string(),
            baud_rate: 2_000_000,
            robot_file: None,
            offset_file: None,
            init_file: None,
            simulation: false,
            simulation_robot_name: None,
            button_trigger: "user_long".to_string(),
            bus: BusLayout::default(),
            timing: Timing::default(),
        }
    }
}

/// Device ids and control-table layout of this deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusLayout {
    pub sub_controller_id: u8,
    /// Target of the power-enable write; broadcast by default.
    pub power_target_id: u8,
    pub power_register: u16,
    pub led_register: u16,
    pub torque_register: u16,
    pub power_on_attempts: u32,
}

impl Default for BusLayout {
    fn default() -> Self {
        Self {
            sub_controller_id: DeviceId::SUB_CONTROLLER.0,
            power_target_id: DeviceId::BROADCAST.0,
            power_register: 24,
            led_register: 26,
            torque_register: 64,
            power_on_attempts: 5,
        }
    }
}

impl BusLayout {
    pub fn sub_controller(&self) -> DeviceId {
        DeviceId(self.sub_controller_id)
    }

    pub fn power_target(&self) -> DeviceId {
        DeviceId(self.power_target_id)
    }

    pub fn power(&self) -> RegisterAddress {
        RegisterAddress(self.power_register)
    }

    pub fn led(&self) -> RegisterAddress {
        RegisterAddress(self.led_register)
    }

    pub fn torque(&self) -> RegisterAddress {
        RegisterAddress(self.torque_register)
    }
}

/// Fixed settle delays, in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Timing {
    pub power_settle_ms: u64,
    pub resume_settle_ms: u64,
    pub startup_init_delay_ms: u64,
    pub startup_resume_ms: u64,
    pub control_cycle_ms: u64,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            power_settle_ms: 100,
            resume_settle_ms: 200,
            startup_init_delay_ms: 300,
            startup_resume_ms: 100,
            control_cycle_ms: 8,
        }
    }
}

impl Timing {
    pub fn power_settle(&self) -> Duration {
        Duration::from_millis(self.power_settle_ms)
    }

    pub fn resume_settle(&self) -> Duration {
        Duration::from_millis(self.resume_settle_ms)
    }

    pub fn startup_init_delay(&self) -> Duration {
        Duration::from_millis(self.startup_init_delay_ms)
    }

    pub fn startup_resume(&self) -> Duration {
        Duration::from_millis(self.startup_resume_ms)
    }

    pub fn control_cycle(&self) -> Duration {
        Duration::from_millis(self.control_cycle_ms)
    }
}

impl ManagerConfig {
    /// Load from a JSON file, or fall back to defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        serde_json::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Check value ranges. The robot file is checked by the startup sequence,
    /// after the bus has been powered.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bus.power_on_attempts == 0 {
            return Err(ConfigError::Invalid(
                "bus.power_on_attempts must be at least 1".to_string(),
            ));
        }
        if self.baud_rate == 0 {
            return Err(ConfigError::Invalid("baud_rate must be non-zero".to_string()));
        }
        if self.button_trigger.is_empty() {
            return Err(ConfigError::Invalid(
                "button_trigger must not be empty".to_string(),
            ));
        }
        if self.timing.control_cycle_ms == 0 {
            return Err(ConfigError::Invalid(
                "timing.control_cycle_ms must be non-zero".to_string(),
            ));
        }
        if !self.simulation && self.simulation_robot_name.is_some() {
            tracing::warn!("simulation_robot_name is ignored outside simulation mode");
        }
        Ok(())
    }

    /// The robot file, treating an empty path as missing.
    pub fn robot_file(&self) -> Result<&Path, ConfigError> {
        match self.robot_file.as_deref() {
            Some(p) if !p.as_os_str().is_empty() => Ok(p),
            _ => Err(ConfigError::MissingRobotFile),
        }
    }

    /// Simulated robot name, present only in simulation mode.
    pub fn simulated_robot(&self) -> Option<&str> {
        if !self.simulation {
            return None;
        }
        self.simulation_robot_name
            .as_deref()
            .filter(|name| !name.is_empty())
    }
}
