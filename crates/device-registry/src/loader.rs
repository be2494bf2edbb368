use crate::types::{InitFile, OffsetFile, RobotDescriptor};
use anyhow::{bail, Context};
use dxl_transport::{DeviceId, RegisterAddress, RegisterWidth};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Joints of one robot, indexed by name.
#[derive(Debug, Clone)]
pub struct DeviceRegistry {
    pub robot: RobotDescriptor,
    by_name: HashMap<String, DeviceId>,
}

/// A resolved init-file entry, ready to be written to the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedWrite {
    pub device: DeviceId,
    pub address: RegisterAddress,
    pub width: RegisterWidth,
    pub value: u32,
}

impl DeviceRegistry {
    pub fn from_descriptor(robot: RobotDescriptor) -> anyhow::Result<Self> {
        let mut by_name = HashMap::new();
        let mut seen_ids = HashMap::new();
        for joint in &robot.joints {
            let id = DeviceId(joint.id);
            if id.is_broadcast() {
                bail!("joint {} uses the broadcast id", joint.name);
            }
            if let Some(other) = seen_ids.insert(id, joint.name.clone()) {
                bail!("joints {other} and {} share id {id}", joint.name);
            }
            if by_name.insert(joint.name.clone(), id).is_some() {
                bail!("duplicate joint name: {}", joint.name);
            }
        }
        Ok(Self { robot, by_name })
    }

    pub fn device(&self, joint: &str) -> Option<DeviceId> {
        self.by_name.get(joint).copied()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Resolve every init entry to a device write, in joint-name order.
    pub fn init_plan(&self, init: &InitFile) -> anyhow::Result<Vec<PlannedWrite>> {
        let mut plan = Vec::new();
        for (joint, writes) in &init.joints {
            let device = self
                .device(joint)
                .with_context(|| format!("init file names unknown joint: {joint}"))?;
            for w in writes {
                let width = RegisterWidth::from_len(w.width).with_context(|| {
                    format!("joint {joint}: invalid width {} at @{}", w.width, w.address)
                })?;
                if w.value > width.max_value() {
                    bail!(
                        "joint {joint}: value {} does not fit {}-byte register @{}",
                        w.value,
                        w.width,
                        w.address
                    );
                }
                plan.push(PlannedWrite {
                    device,
                    address: RegisterAddress(w.address),
                    width,
                    value: w.value,
                });
            }
        }
        Ok(plan)
    }
}

fn load_yaml<T: DeserializeOwned>(path: &Path, what: &str) -> anyhow::Result<T> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading {what}: {}", path.display()))?;
    serde_yaml::from_str(&raw).with_context(|| format!("parsing {what}: {}", path.display()))
}

pub fn load_robot_file(path: impl AsRef<Path>) -> anyhow::Result<DeviceRegistry> {
    let path = path.as_ref();
    let robot: RobotDescriptor = load_yaml(path, "robot file")?;
    let reg = DeviceRegistry::from_descriptor(robot)
        .with_context(|| format!("validating robot file: {}", path.display()))?;
    tracing::debug!(robot = %reg.robot.name, joints = reg.len(), "robot file loaded");
    Ok(reg)
}

pub fn load_init_file(path: impl AsRef<Path>) -> anyhow::Result<InitFile> {
    load_yaml(path.as_ref(), "init file")
}

pub fn load_offset_file(path: impl AsRef<Path>) -> anyhow::Result<OffsetFile> {
    load_yaml(path.as_ref(), "offset file")
}
