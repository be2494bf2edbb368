use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RobotDescriptor {
    pub name: String,
    #[serde(default)]
    pub port: Option<PortSpec>,
    #[serde(default)]
    pub joints: Vec<JointEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortSpec {
    pub device: String,
    pub baud_rate: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JointEntry {
    pub name: String,
    pub id: u8,
    #[serde(default)]
    pub model: Option<String>,
}

/// One control-table write applied during device initialization.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegisterWrite {
    pub address: u16,
    pub width: u8,
    pub value: u32,
}

/// Per-joint register writes, keyed by joint name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InitFile {
    pub joints: BTreeMap<String, Vec<RegisterWrite>>,
}

/// Joint calibration offsets in radians, keyed by joint name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OffsetFile {
    pub offsets: BTreeMap<String, f64>,
}
