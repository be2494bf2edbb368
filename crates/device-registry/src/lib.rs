//! device-registry: YAML-driven robot, init and offset files

mod types;
pub use types::*;

mod loader;
pub use loader::{
    load_init_file, load_offset_file, load_robot_file, DeviceRegistry, PlannedWrite,
};
