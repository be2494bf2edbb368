use crate::config::ManagerConfig;
use crate::controller::{CommandSink, Controller, MotionCommand, MotionModule, SensorModule};
use crate::delay::Delay;
use crate::error::StartupError;
use crate::sequencer::{ActuatorPowerSequencer, PowerSequenceResult};
use dxl_transport::{BusOpener, RegisterBus};

/// Modules handed to the controller once it is initialized.
#[derive(Default)]
pub struct ModuleSet {
    pub sensors: Vec<Box<dyn SensorModule>>,
    pub motions: Vec<Box<dyn MotionModule>>,
}

impl ModuleSet {
    pub fn with_sensor(mut self, module: Box<dyn SensorModule>) -> Self {
        self.sensors.push(module);
        self
    }

    pub fn with_motion(mut self, module: Box<dyn MotionModule>) -> Self {
        self.motions.push(module);
        self
    }
}

#[derive(Debug)]
pub struct StartupReport {
    /// `None` in simulation mode.
    pub power: Option<PowerSequenceResult>,
    pub calibration_loaded: bool,
}

/// One-shot bring-up at process start.
pub struct StartupSequence<'a> {
    config: &'a ManagerConfig,
    sequencer: ActuatorPowerSequencer,
}

impl<'a> StartupSequence<'a> {
    pub fn new(config: &'a ManagerConfig, sequencer: ActuatorPowerSequencer) -> Self {
        Self { config, sequencer }
    }

    /// Power the actuators, initialize the controller and start the loop.
    ///
    /// Bus failures are logged and do not stop startup, so the robot can still
    /// be recovered from the button. Only a missing robot file or a failed
    /// controller initialization is fatal.
    pub fn run<O: BusOpener>(
        &self,
        opener: &O,
        delay: &dyn Delay,
        controller: &mut dyn Controller,
        modules: ModuleSet,
        sink: &mut dyn CommandSink,
    ) -> Result<StartupReport, StartupError> {
        let cfg = self.config;

        let power = if cfg.simulation {
            tracing::warn!("simulation mode; skipping actuator power-on");
            if let Some(name) = cfg.simulated_robot() {
                controller.set_simulation_robot(name);
            }
            None
        } else {
            Some(self.power_on(opener, delay))
        };

        let robot_file = cfg.robot_file()?;
        controller
            .initialize(robot_file, cfg.init_file.as_deref())
            .map_err(StartupError::ControllerInit)?;
        tracing::info!(robot_file = %robot_file.display(), "controller initialized");

        let mut calibration_loaded = false;
        if let Some(offset_file) = cfg.offset_file.as_deref() {
            match controller.load_calibration(offset_file) {
                Ok(()) => calibration_loaded = true,
                Err(e) => tracing::warn!(error = %e, "failed to load joint offsets"),
            }
        }

        delay.sleep(cfg.timing.startup_init_delay());

        for sensor in modules.sensors {
            controller.register_sensor_module(sensor);
        }
        for motion in modules.motions {
            controller.register_motion_module(motion);
        }

        controller.start_periodic_loop();
        delay.sleep(cfg.timing.startup_resume());
        sink.publish(MotionCommand::InitPose);
        tracing::info!("control loop started; going to init pose");

        Ok(StartupReport {
            power,
            calibration_loaded,
        })
    }

    fn power_on<O: BusOpener>(&self, opener: &O, delay: &dyn Delay) -> PowerSequenceResult {
        let cfg = self.config;
        let mut bus = match opener.open(&cfg.device_name, cfg.baud_rate) {
            Ok(bus) => bus,
            Err(e) => {
                tracing::error!(port = %cfg.device_name, error = %e, "failed to open actuator bus");
                return PowerSequenceResult::TransportError(e);
            }
        };
        let result = self.sequencer.run(&mut bus, delay);
        if !result.is_success() {
            tracing::error!(?result, "actuator power-on failed; continuing startup");
        }
        bus.close();
        result
    }
}
