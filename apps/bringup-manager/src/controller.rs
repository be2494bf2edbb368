use actuator_bringup::{
    CommandSink, Controller, ControllerError, ManagerConfig, MotionCommand, MotionModule,
    SensorModule, NO_STRATEGY,
};
use device_registry::{load_init_file, load_offset_file, load_robot_file, DeviceRegistry};
use dxl_transport::{BusOpener, RegisterBus};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Modules and queued commands, shared with the loop thread.
struct LoopState {
    sensors: Vec<Box<dyn SensorModule>>,
    motions: Vec<Box<dyn MotionModule>>,
    active: Option<usize>,
    commands: Receiver<MotionCommand>,
    tick: u64,
}

impl LoopState {
    fn activate(&mut self, index: Option<usize>) {
        if self.active == index {
            return;
        }
        if let Some(prev) = self.active.and_then(|i| self.motions.get_mut(i)) {
            prev.stop();
        }
        self.active = index;
        let name = index
            .and_then(|i| self.motions.get(i))
            .map(|m| m.name())
            .unwrap_or(NO_STRATEGY);
        info!(strategy = name, "active strategy changed");
    }

    fn dispatch(&mut self, command: MotionCommand) {
        let accepted = self
            .motions
            .iter_mut()
            .position(|m| m.handle_command(command));
        match accepted {
            Some(i) => self.activate(Some(i)),
            None => warn!(%command, "no motion module accepted command"),
        }
    }

    fn step(&mut self) {
        self.tick += 1;
        let tick = self.tick;
        while let Ok(command) = self.commands.try_recv() {
            self.dispatch(command);
        }
        for sensor in &mut self.sensors {
            sensor.process(tick);
        }
        if let Some(module) = self.active.and_then(|i| self.motions.get_mut(i)) {
            module.process(tick);
        }
    }
}

/// Forwards motion commands to the control loop.
#[derive(Clone)]
pub struct LoopCommandSink {
    tx: Sender<MotionCommand>,
}

impl CommandSink for LoopCommandSink {
    fn publish(&mut self, command: MotionCommand) {
        if self.tx.send(command).is_err() {
            warn!(%command, "control loop is gone; command dropped");
        }
    }
}

/// Reference controller: a periodic loop thread driving registered modules,
/// plus device initialization over its own bus connection.
pub struct LoopController<O: BusOpener> {
    opener: O,
    device_name: String,
    baud_rate: u32,
    cycle: Duration,
    simulation: bool,
    simulation_robot: Option<String>,
    registry: Option<DeviceRegistry>,
    offsets: BTreeMap<String, f64>,
    state: Arc<Mutex<LoopState>>,
    commands: Sender<MotionCommand>,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl<O: BusOpener> LoopController<O> {
    pub fn new(config: &ManagerConfig, opener: O) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            opener,
            device_name: config.device_name.clone(),
            baud_rate: config.baud_rate,
            cycle: config.timing.control_cycle(),
            simulation: config.simulation,
            simulation_robot: None,
            registry: None,
            offsets: BTreeMap::new(),
            state: Arc::new(Mutex::new(LoopState {
                sensors: Vec::new(),
                motions: Vec::new(),
                active: None,
                commands: rx,
                tick: 0,
            })),
            commands: tx,
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    pub fn command_sink(&self) -> LoopCommandSink {
        LoopCommandSink {
            tx: self.commands.clone(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    pub fn joint_offset(&self, joint: &str) -> Option<f64> {
        self.offsets.get(joint).copied()
    }

    pub fn active_strategy(&self) -> Option<String> {
        let state = self.state.lock().ok()?;
        state
            .active
            .and_then(|i| state.motions.get(i))
            .map(|m| m.name().to_string())
    }

    fn with_state(&self, f: impl FnOnce(&mut LoopState)) {
        match self.state.lock() {
            Ok(mut state) => f(&mut state),
            Err(_) => error!("control loop state poisoned"),
        }
    }

    fn write_init_plan(&self, init_file: &Path) -> Result<(), ControllerError> {
        let registry = self
            .registry
            .as_ref()
            .ok_or(ControllerError::NotInitialized)?;
        let init = load_init_file(init_file).map_err(|e| ControllerError::Load {
            what: "init file",
            path: init_file.to_path_buf(),
            reason: format!("{e:#}"),
        })?;
        let plan = registry
            .init_plan(&init)
            .map_err(|e| ControllerError::DeviceInit(format!("{e:#}")))?;
        if self.simulation {
            debug!(writes = plan.len(), "simulation mode; init writes skipped");
            return Ok(());
        }

        let mut bus = self.opener.open(&self.device_name, self.baud_rate)?;
        let mut failed = 0usize;
        for w in &plan {
            if let Err(e) = bus.write(w.device, w.address, w.width, w.value) {
                warn!(device = %w.device, address = %w.address, error = %e, "init write failed");
                failed += 1;
            }
        }
        bus.close();

        if failed > 0 {
            return Err(ControllerError::DeviceInit(format!(
                "{failed} of {} init writes failed",
                plan.len()
            )));
        }
        info!(writes = plan.len(), "devices initialized");
        Ok(())
    }
}

fn run_loop(state: Arc<Mutex<LoopState>>, running: Arc<AtomicBool>, cycle: Duration) {
    let mut next = Instant::now();
    while running.load(Ordering::Acquire) {
        match state.lock() {
            Ok(mut s) => s.step(),
            Err(_) => {
                error!("control loop state poisoned; stopping loop");
                break;
            }
        }
        next += cycle;
        let now = Instant::now();
        if next > now {
            thread::sleep(next - now);
        } else {
            next = now;
        }
    }
}

impl<O: BusOpener> Controller for LoopController<O> {
    fn initialize(
        &mut self,
        robot_file: &Path,
        init_file: Option<&Path>,
    ) -> Result<(), ControllerError> {
        let registry = load_robot_file(robot_file).map_err(|e| ControllerError::Load {
            what: "robot file",
            path: robot_file.to_path_buf(),
            reason: format!("{e:#}"),
        })?;
        if let Some(port) = &registry.robot.port {
            if port.device != self.device_name {
                debug!(
                    robot_port = %port.device,
                    configured = %self.device_name,
                    "robot file names a different port; using configured port"
                );
            }
        }
        info!(robot = %registry.robot.name, joints = registry.len(), "robot loaded");
        self.registry = Some(registry);

        // Non-fatal; recovery re-runs device init after power-on.
        if let Some(init_file) = init_file {
            if let Err(e) = self.initialize_devices(init_file) {
                warn!(init_file = %init_file.display(), error = %e, "device init failed at startup");
            }
        }
        Ok(())
    }

    fn initialize_devices(&mut self, init_file: &Path) -> Result<(), ControllerError> {
        self.write_init_plan(init_file)
    }

    fn load_calibration(&mut self, offset_file: &Path) -> Result<(), ControllerError> {
        let offsets = load_offset_file(offset_file).map_err(|e| ControllerError::Load {
            what: "offset file",
            path: offset_file.to_path_buf(),
            reason: format!("{e:#}"),
        })?;
        if let Some(registry) = &self.registry {
            for joint in offsets.offsets.keys() {
                if registry.device(joint).is_none() {
                    warn!(joint = %joint, "offset for unknown joint");
                }
            }
        }
        info!(joints = offsets.offsets.len(), "joint offsets loaded");
        self.offsets = offsets.offsets;
        Ok(())
    }

    fn set_simulation_robot(&mut self, robot_name: &str) {
        info!(robot = robot_name, "simulated robot selected");
        self.simulation_robot = Some(robot_name.to_string());
    }

    fn set_active_strategy(&mut self, name: &str) {
        self.with_state(|state| {
            let index = state.motions.iter().position(|m| m.name() == name);
            if index.is_none() && name != NO_STRATEGY {
                warn!(strategy = name, "unknown strategy; detaching all modules");
            }
            state.activate(index);
        });
    }

    fn start_periodic_loop(&mut self) {
        if self.worker.is_some() {
            debug!("control loop already running");
            return;
        }
        self.running.store(true, Ordering::Release);
        let state = Arc::clone(&self.state);
        let running = Arc::clone(&self.running);
        let cycle = self.cycle;
        match thread::Builder::new()
            .name("control-loop".to_string())
            .spawn(move || run_loop(state, running, cycle))
        {
            Ok(handle) => {
                self.worker = Some(handle);
                info!(cycle_ms = cycle.as_millis() as u64, "control loop started");
            }
            Err(e) => {
                self.running.store(false, Ordering::Release);
                error!(error = %e, "failed to spawn control loop");
            }
        }
    }

    fn stop_periodic_loop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                error!("control loop thread panicked");
            }
            info!("control loop stopped");
        }
    }

    fn register_sensor_module(&mut self, module: Box<dyn SensorModule>) {
        debug!(module = module.name(), "sensor module registered");
        self.with_state(|state| state.sensors.push(module));
    }

    fn register_motion_module(&mut self, module: Box<dyn MotionModule>) {
        debug!(module = module.name(), "motion module registered");
        self.with_state(|state| state.motions.push(module));
    }
}

impl<O: BusOpener> Drop for LoopController<O> {
    fn drop(&mut self) {
        self.stop_periodic_loop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::BaseModule;
    use actuator_bringup::{
        ActuatorPowerSequencer, ModuleSet, PowerSequenceResult, RecordingDelay, StartupSequence,
    };
    use dxl_transport::{BusOp, DeviceId, MockOpener, RegisterAddress, TransportError};
    use std::fs;
    use std::sync::atomic::AtomicUsize;

    struct Counting {
        name: &'static str,
        accepts: bool,
        processed: Arc<AtomicUsize>,
    }

    impl MotionModule for Counting {
        fn name(&self) -> &str {
            self.name
        }
        fn handle_command(&mut self, _: MotionCommand) -> bool {
            self.accepts
        }
        fn process(&mut self, _: u64) {
            self.processed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn write_robot(dir: &Path) -> (std::path::PathBuf, std::path::PathBuf) {
        let robot = dir.join("op3.robot.yaml");
        let init = dir.join("dxl_init.yaml");
        fs::write(
            &robot,
            "name: op3\njoints:\n  - { name: head_pan, id: 19 }\n  - { name: head_tilt, id: 20 }\n",
        )
        .unwrap();
        fs::write(
            &init,
            "head_pan:\n  - { address: 9, width: 1, value: 0 }\nhead_tilt:\n  - { address: 84, width: 2, value: 800 }\n",
        )
        .unwrap();
        (robot, init)
    }

    #[test]
    fn test_initialize_writes_init_plan() {
        let dir = tempfile::tempdir().unwrap();
        let (robot, init) = write_robot(dir.path());
        let bus = MockOpener::new();
        let mut controller = LoopController::new(&ManagerConfig::default(), bus.clone());

        controller.initialize(&robot, Some(&init)).unwrap();

        assert_eq!(bus.register(DeviceId(20), RegisterAddress(84)), Some(800));
        assert_eq!(bus.journal().last(), Some(&BusOp::Closed));
    }

    fn start_up(
        robot: &Path,
        init: &Path,
        bus: &MockOpener,
    ) -> (LoopController<MockOpener>, Option<PowerSequenceResult>) {
        let cfg = ManagerConfig {
            robot_file: Some(robot.to_path_buf()),
            init_file: Some(init.to_path_buf()),
            ..ManagerConfig::default()
        };
        let mut controller = LoopController::new(&cfg, bus.clone());
        let mut sink = controller.command_sink();
        let modules = ModuleSet::default().with_motion(Box::new(BaseModule::new(
            Duration::from_millis(80),
            cfg.timing.control_cycle(),
        )));
        let report = StartupSequence::new(&cfg, ActuatorPowerSequencer::new(&cfg))
            .run(bus, &RecordingDelay::new(), &mut controller, modules, &mut sink)
            .unwrap();
        (controller, report.power)
    }

    #[test]
    fn test_startup_runs_loop_when_bus_refuses_open() {
        let dir = tempfile::tempdir().unwrap();
        let (robot, init) = write_robot(dir.path());
        let bus = MockOpener::new();
        bus.fail_open(true);

        let (mut controller, power) = start_up(&robot, &init, &bus);

        assert!(matches!(
            power,
            Some(PowerSequenceResult::TransportError(TransportError::PortOpen { .. }))
        ));
        assert!(controller.is_running());
        controller.stop_periodic_loop();
    }

    #[test]
    fn test_startup_runs_loop_when_init_writes_fail() {
        let dir = tempfile::tempdir().unwrap();
        let (robot, init) = write_robot(dir.path());
        let bus = MockOpener::new();
        bus.fail_writes(DeviceId(20), RegisterAddress(84), u32::MAX);

        let (mut controller, power) = start_up(&robot, &init, &bus);

        assert_eq!(power, Some(PowerSequenceResult::Success { attempts: 1 }));
        assert_eq!(bus.register(DeviceId(19), RegisterAddress(9)), Some(0));
        assert!(controller.is_running());
        controller.stop_periodic_loop();
    }

    #[test]
    fn test_device_init_requires_robot() {
        let dir = tempfile::tempdir().unwrap();
        let (_, init) = write_robot(dir.path());
        let mut controller = LoopController::new(&ManagerConfig::default(), MockOpener::new());
        assert!(matches!(
            controller.initialize_devices(&init),
            Err(ControllerError::NotInitialized)
        ));
    }

    #[test]
    fn test_failed_init_write_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let (robot, init) = write_robot(dir.path());
        let bus = MockOpener::new();
        let mut controller = LoopController::new(&ManagerConfig::default(), bus.clone());
        controller.initialize(&robot, None).unwrap();
        bus.fail_writes(DeviceId(19), RegisterAddress(9), 1);

        let err = controller.initialize_devices(&init).unwrap_err();
        assert!(matches!(err, ControllerError::DeviceInit(_)));
        // The remaining joint is still written.
        assert_eq!(bus.register(DeviceId(20), RegisterAddress(84)), Some(800));
    }

    #[test]
    fn test_simulation_skips_bus_writes() {
        let dir = tempfile::tempdir().unwrap();
        let (robot, init) = write_robot(dir.path());
        let cfg = ManagerConfig {
            simulation: true,
            ..ManagerConfig::default()
        };
        let bus = MockOpener::new();
        let mut controller = LoopController::new(&cfg, bus.clone());

        controller.initialize(&robot, Some(&init)).unwrap();
        assert!(bus.journal().is_empty());
    }

    #[test]
    fn test_calibration_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let offsets = dir.path().join("offset.yaml");
        fs::write(&offsets, "head_pan: -0.02\n").unwrap();
        let mut controller = LoopController::new(&ManagerConfig::default(), MockOpener::new());

        controller.load_calibration(&offsets).unwrap();
        assert_eq!(controller.joint_offset("head_pan"), Some(-0.02));
        assert!(controller
            .load_calibration(&dir.path().join("missing.yaml"))
            .is_err());
    }

    #[test]
    fn test_command_activates_accepting_module() {
        let mut cfg = ManagerConfig::default();
        cfg.timing.control_cycle_ms = 1;
        let mut controller = LoopController::new(&cfg, MockOpener::new());
        let walking = Arc::new(AtomicUsize::new(0));
        let base = Arc::new(AtomicUsize::new(0));
        controller.register_motion_module(Box::new(Counting {
            name: "walking_module",
            accepts: false,
            processed: walking.clone(),
        }));
        controller.register_motion_module(Box::new(Counting {
            name: "base_module",
            accepts: true,
            processed: base.clone(),
        }));

        let mut sink = controller.command_sink();
        sink.publish(MotionCommand::InitPose);
        controller.start_periodic_loop();
        controller.start_periodic_loop();
        assert!(controller.is_running());
        thread::sleep(Duration::from_millis(30));
        controller.stop_periodic_loop();
        controller.stop_periodic_loop();

        assert!(!controller.is_running());
        assert_eq!(controller.active_strategy().as_deref(), Some("base_module"));
        assert!(base.load(Ordering::SeqCst) > 0);
        assert_eq!(walking.load(Ordering::SeqCst), 0);

        controller.set_active_strategy(NO_STRATEGY);
        assert_eq!(controller.active_strategy(), None);
    }
}
