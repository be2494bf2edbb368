use std::path::{Path, PathBuf};

use actuator_bringup::{
    CommandSink, Controller, ControllerError, LedColor, ManagerConfig, MotionCommand,
    MotionModule, RecordingDelay, RecoveryEventHandler, RecoveryOutcome, RecoveryState,
    SensorModule,
};
use dxl_transport::{BusOp, DeviceId, MockOpener, RegisterAddress};

// ---------------------------------------------------------------------------
// Test doubles
// ---------------------------------------------------------------------------

const POWER: RegisterAddress = RegisterAddress(24);
const LED: RegisterAddress = RegisterAddress(26);
const TORQUE: RegisterAddress = RegisterAddress(64);

/// Records controller calls into the mock bus journal so they interleave with
/// bus operations.
struct RecordingController {
    bus: MockOpener,
    device_inits: Vec<PathBuf>,
    loop_starts: usize,
}

impl RecordingController {
    fn new(bus: &MockOpener) -> Self {
        Self {
            bus: bus.clone(),
            device_inits: Vec::new(),
            loop_starts: 0,
        }
    }
}

impl Controller for RecordingController {
    fn initialize(&mut self, _: &Path, _: Option<&Path>) -> Result<(), ControllerError> {
        Ok(())
    }

    fn initialize_devices(&mut self, init_file: &Path) -> Result<(), ControllerError> {
        self.bus.mark("device init");
        self.device_inits.push(init_file.to_path_buf());
        Ok(())
    }

    fn load_calibration(&mut self, _: &Path) -> Result<(), ControllerError> {
        Ok(())
    }

    fn set_simulation_robot(&mut self, _: &str) {}

    fn set_active_strategy(&mut self, name: &str) {
        self.bus.mark(format!("strategy {name}"));
    }

    fn start_periodic_loop(&mut self) {
        self.loop_starts += 1;
        self.bus.mark("loop started");
    }

    fn stop_periodic_loop(&mut self) {
        self.bus.mark("loop stopped");
    }

    fn register_sensor_module(&mut self, _: Box<dyn SensorModule>) {}

    fn register_motion_module(&mut self, _: Box<dyn MotionModule>) {}
}

#[derive(Default)]
struct RecordingSink {
    published: Vec<MotionCommand>,
}

impl CommandSink for RecordingSink {
    fn publish(&mut self, command: MotionCommand) {
        self.published.push(command);
    }
}

fn config() -> ManagerConfig {
    ManagerConfig {
        device_name: "/dev/ttyUSB0".to_string(),
        robot_file: Some(PathBuf::from("/opt/op3/op3.robot")),
        init_file: Some(PathBuf::from("/opt/op3/dxl_init_OP3.yaml")),
        ..ManagerConfig::default()
    }
}

fn index_of(journal: &[BusOp], pred: impl Fn(&BusOp) -> bool) -> usize {
    journal
        .iter()
        .position(pred)
        .unwrap_or_else(|| panic!("entry not found in {journal:?}"))
}

fn marker(label: &str) -> impl Fn(&BusOp) -> bool + '_ {
    move |op: &BusOp| *op == BusOp::Marker(label.to_string())
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn unpowered_actuators_are_powered_initialized_and_resumed() {
    let cfg = config();
    let bus = MockOpener::new();
    bus.set_register(DeviceId::SUB_CONTROLLER, TORQUE, 0);
    let mut controller = RecordingController::new(&bus);
    let mut sink = RecordingSink::default();
    let delay = RecordingDelay::new();
    let mut handler = RecoveryEventHandler::new(&cfg, bus.clone(), &delay);

    let outcome = handler.handle_event("user_long", &mut controller, &mut sink);

    assert!(matches!(outcome, RecoveryOutcome::Resumed { powered_on: true }));
    assert_eq!(handler.state(), RecoveryState::Idle);
    assert!(handler.last_recovery().is_some());

    let journal = bus.journal();
    let power_write = index_of(&journal, |op| {
        matches!(op, BusOp::Write { device, address, value: 1, ok: true }
            if *device == DeviceId::BROADCAST && *address == POWER)
    });
    let led_write = index_of(&journal, |op| {
        matches!(op, BusOp::Write { device, address, value, ok: true }
            if *device == DeviceId::SUB_CONTROLLER
                && *address == LED
                && *value == LedColor::READY.encode() as u32)
    });
    let device_init = index_of(&journal, marker("device init"));
    let loop_started = index_of(&journal, marker("loop started"));

    assert!(power_write < led_write);
    assert!(led_write < device_init);
    assert!(device_init < loop_started);
    assert_eq!(bus.write_attempts(DeviceId::BROADCAST, POWER), 1);
    assert_eq!(
        controller.device_inits,
        vec![PathBuf::from("/opt/op3/dxl_init_OP3.yaml")]
    );
    assert_eq!(controller.loop_starts, 1);
    assert_eq!(sink.published, vec![MotionCommand::InitPose]);
    assert_eq!(
        delay.requested(),
        vec![cfg.timing.power_settle(), cfg.timing.resume_settle()]
    );
}

#[test]
fn powered_actuators_skip_power_on_and_device_init() {
    let cfg = config();
    let bus = MockOpener::new();
    bus.set_register(DeviceId::SUB_CONTROLLER, TORQUE, 1);
    let mut controller = RecordingController::new(&bus);
    let mut sink = RecordingSink::default();
    let mut handler = RecoveryEventHandler::new(&cfg, bus.clone(), RecordingDelay::new());

    let outcome = handler.handle_event("user_long", &mut controller, &mut sink);

    assert!(matches!(outcome, RecoveryOutcome::Resumed { powered_on: false }));
    assert_eq!(bus.write_attempts(DeviceId::BROADCAST, POWER), 0);
    assert!(controller.device_inits.is_empty());
    assert_eq!(controller.loop_starts, 1);
    assert_eq!(sink.published, vec![MotionCommand::InitPose]);
}

#[test]
fn loop_is_stopped_before_the_bus_is_opened() {
    let cfg = config();
    let bus = MockOpener::new();
    let mut controller = RecordingController::new(&bus);
    let mut handler = RecoveryEventHandler::new(&cfg, bus.clone(), RecordingDelay::new());

    handler.handle_event("user_long", &mut controller, &mut RecordingSink::default());

    let journal = bus.journal();
    let detached = index_of(&journal, marker("strategy none"));
    let stopped = index_of(&journal, marker("loop stopped"));
    let opened = index_of(&journal, |op| {
        matches!(op, BusOp::Opened { port, baud_rate: 2_000_000 } if port == "/dev/ttyUSB0")
    });
    assert!(detached < stopped);
    assert!(stopped < opened);
}

#[test]
fn aborted_rearm_never_restarts_the_loop() {
    let cfg = config();
    let bus = MockOpener::new();
    bus.fail_writes(DeviceId::BROADCAST, POWER, u32::MAX);
    let mut controller = RecordingController::new(&bus);
    let mut sink = RecordingSink::default();
    let mut handler = RecoveryEventHandler::new(&cfg, bus.clone(), RecordingDelay::new());

    let outcome = handler.handle_event("user_long", &mut controller, &mut sink);

    assert!(matches!(outcome, RecoveryOutcome::Aborted(_)));
    assert_eq!(handler.state(), RecoveryState::Idle);
    assert_eq!(controller.loop_starts, 0);
    assert!(!bus.journal().contains(&BusOp::Marker("loop started".to_string())));
    assert!(sink.published.is_empty());

    // Power comes back on the next press.
    bus.fail_writes(DeviceId::BROADCAST, POWER, 0);
    let outcome = handler.handle_event("user_long", &mut controller, &mut sink);
    assert!(matches!(outcome, RecoveryOutcome::Resumed { powered_on: true }));
    assert_eq!(controller.loop_starts, 1);
}

#[test]
fn other_button_events_cause_no_activity() {
    let cfg = config();
    let bus = MockOpener::new();
    let mut controller = RecordingController::new(&bus);
    let mut sink = RecordingSink::default();
    let mut handler = RecoveryEventHandler::new(&cfg, bus.clone(), RecordingDelay::new());

    for payload in ["user", "mode", "start", "mode_long", "start_long", "user_long\n"] {
        let outcome = handler.handle_event(payload, &mut controller, &mut sink);
        assert!(matches!(outcome, RecoveryOutcome::Ignored));
        assert_eq!(handler.state(), RecoveryState::Idle);
    }

    assert!(bus.journal().is_empty());
    assert!(sink.published.is_empty());
}

#[test]
fn custom_trigger_replaces_the_default() {
    let cfg = ManagerConfig {
        button_trigger: "mode_long".to_string(),
        ..config()
    };
    let bus = MockOpener::new();
    bus.set_register(DeviceId::SUB_CONTROLLER, TORQUE, 1);
    let mut controller = RecordingController::new(&bus);
    let mut sink = RecordingSink::default();
    let mut handler = RecoveryEventHandler::new(&cfg, bus.clone(), RecordingDelay::new());

    let ignored = handler.handle_event("user_long", &mut controller, &mut sink);
    let resumed = handler.handle_event("mode_long", &mut controller, &mut sink);

    assert!(matches!(ignored, RecoveryOutcome::Ignored));
    assert!(matches!(resumed, RecoveryOutcome::Resumed { .. }));
    assert_eq!(sink.published.len(), 1);
}
