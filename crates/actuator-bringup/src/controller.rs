use crate::error::ControllerError;
use core::fmt;
use std::path::Path;

/// Strategy name that detaches every motion module from the control loop.
pub const NO_STRATEGY: &str = "none";

/// Commands published to the motion layer.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum MotionCommand {
    /// Move every joint to the initial pose.
    InitPose,
}

impl MotionCommand {
    pub fn as_str(self) -> &'static str {
        match self {
            MotionCommand::InitPose => "ini_pose",
        }
    }
}

impl fmt::Display for MotionCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outbound channel to the motion layer.
pub trait CommandSink {
    fn publish(&mut self, command: MotionCommand);
}

/// A sensor driven by the periodic loop on every tick.
pub trait SensorModule: Send {
    fn name(&self) -> &str;

    fn process(&mut self, tick: u64);
}

/// A motion generator (walking, head control, actions, base pose).
pub trait MotionModule: Send {
    fn name(&self) -> &str;

    /// Offer a command. Returning `true` makes this module the active strategy.
    fn handle_command(&mut self, command: MotionCommand) -> bool;

    /// Run one control cycle while this module is the active strategy.
    fn process(&mut self, tick: u64);

    /// Called when the module stops being the active strategy.
    fn stop(&mut self) {}
}

/// The robot controller as seen by the bring-up and recovery paths.
///
/// The controller owns the periodic control loop. Callers must stop the loop
/// before touching the actuator bus themselves.
pub trait Controller {
    /// Load the robot description and, when given, apply the init file.
    fn initialize(
        &mut self,
        robot_file: &Path,
        init_file: Option<&Path>,
    ) -> Result<(), ControllerError>;

    /// Write the init file's register values to every joint.
    fn initialize_devices(&mut self, init_file: &Path) -> Result<(), ControllerError>;

    fn load_calibration(&mut self, offset_file: &Path) -> Result<(), ControllerError>;

    fn set_simulation_robot(&mut self, robot_name: &str);

    fn set_active_strategy(&mut self, name: &str);

    fn start_periodic_loop(&mut self);

    fn stop_periodic_loop(&mut self);

    fn register_sensor_module(&mut self, module: Box<dyn SensorModule>);

    fn register_motion_module(&mut self, module: Box<dyn MotionModule>);
}
