//! actuator-bringup: power sequencing and recovery for the actuator bus
//!
//! This crate sequences the actuator bus of a legged robot:
//! - Bounded-retry power-on with a settle delay and a "ready" LED
//! - Torque-state check so a software reset does not redo the power-on
//! - A button-triggered recovery state machine that suspends the control loop,
//!   re-arms power and resumes
//! - The one-shot startup bring-up
//!
//! The robot controller and its motion modules are consumed through the
//! [`Controller`] trait; the bus through [`dxl_transport`].

mod config;
pub use config::{BusLayout, ManagerConfig, Timing};

mod error;
pub use error::{ConfigError, ControllerError, RecoveryAbort, StartupError};

mod controller;
pub use controller::{
    CommandSink, Controller, MotionCommand, MotionModule, SensorModule, NO_STRATEGY,
};

mod delay;
pub use delay::{Delay, RecordingDelay, ThreadDelay};

mod indicator;
pub use indicator::{LedColor, StatusIndicator};

mod torque;
pub use torque::TorqueStateGuard;

mod sequencer;
pub use sequencer::{ActuatorPowerSequencer, PowerSequenceResult};

pub mod recovery;
pub use recovery::{RecoveryEventHandler, RecoveryOutcome, RecoveryState};

mod startup;
pub use startup::{ModuleSet, StartupReport, StartupSequence};

mod metrics;
pub use metrics::{BringupMetrics, MetricsHub};
