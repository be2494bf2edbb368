//! Button-triggered recovery.
//!
//! A long press suspends the control loop, re-arms actuator power when it was
//! lost, and resumes the loop with the robot sent to its initial pose:
//!
//! ```text
//! Idle --trigger--> Suspending --hardware--> ReArming --ok--> Resuming --> Idle
//!                        |                       |
//!                        +--simulation-----------+--> Resuming
//!                                                |
//!                                                +--abort--> Idle (loop stays stopped)
//! ```
//!
//! Stopping the loop before opening the bus, and restarting it only after the
//! bus is closed again, is what keeps the two from issuing requests concurrently.

use crate::config::ManagerConfig;
use crate::controller::{CommandSink, Controller, MotionCommand, NO_STRATEGY};
use crate::delay::Delay;
use crate::error::RecoveryAbort;
use crate::metrics::BringupMetrics;
use crate::sequencer::{ActuatorPowerSequencer, PowerSequenceResult};
use crate::torque::TorqueStateGuard;
use dxl_transport::{BusOpener, RegisterBus};
use time::OffsetDateTime;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RecoveryState {
    Idle,
    Suspending,
    ReArming,
    Resuming,
}

/// Result of dispatching one button event.
#[derive(Debug)]
pub enum RecoveryOutcome {
    /// Not the trigger payload; nothing happened.
    Ignored,
    /// Trigger arrived while a recovery was already in progress.
    Busy,
    /// Control loop restarted and the init pose published.
    Resumed { powered_on: bool },
    /// Re-arm failed; the control loop was left stopped.
    Aborted(RecoveryAbort),
}

pub struct RecoveryEventHandler<'a, O: BusOpener, D: Delay> {
    config: &'a ManagerConfig,
    opener: O,
    delay: D,
    sequencer: ActuatorPowerSequencer,
    guard: TorqueStateGuard,
    state: RecoveryState,
    metrics: Option<BringupMetrics>,
    last_recovery: Option<OffsetDateTime>,
}

impl<'a, O: BusOpener, D: Delay> RecoveryEventHandler<'a, O, D> {
    pub fn new(config: &'a ManagerConfig, opener: O, delay: D) -> Self {
        Self {
            config,
            opener,
            delay,
            sequencer: ActuatorPowerSequencer::new(config),
            guard: TorqueStateGuard::new(config.bus.torque()),
            state: RecoveryState::Idle,
            metrics: None,
            last_recovery: None,
        }
    }

    pub fn with_metrics(mut self, metrics: BringupMetrics) -> Self {
        self.sequencer = self.sequencer.with_metrics(metrics.clone());
        self.metrics = Some(metrics);
        self
    }

    pub fn state(&self) -> RecoveryState {
        self.state
    }

    /// When the last recovery resumed the control loop.
    pub fn last_recovery(&self) -> Option<OffsetDateTime> {
        self.last_recovery
    }

    /// Dispatch one button event. Runs the whole recovery, including blocking
    /// bus I/O and settle delays, before returning.
    ///
    /// The handler is back in [`RecoveryState::Idle`] whenever this returns,
    /// and `&mut self` rules out re-entry, so a trigger that arrives while a
    /// recovery runs waits in the caller's queue and starts a full recovery of
    /// its own. [`RecoveryOutcome::Busy`] is only reported if the state was
    /// left non-idle, which no path here does.
    pub fn handle_event(
        &mut self,
        payload: &str,
        controller: &mut dyn Controller,
        sink: &mut dyn CommandSink,
    ) -> RecoveryOutcome {
        if payload != self.config.button_trigger {
            tracing::trace!(payload, "ignoring button event");
            return RecoveryOutcome::Ignored;
        }
        if self.state != RecoveryState::Idle {
            tracing::warn!(state = ?self.state, "recovery already in progress; trigger ignored");
            return RecoveryOutcome::Busy;
        }
        tracing::info!("recovery requested");
        if let Some(m) = &self.metrics {
            m.recoveries_started.inc();
        }

        self.state = RecoveryState::Suspending;
        self.suspend(controller);

        let mut powered_on = false;
        if self.config.simulation {
            tracing::debug!("simulation mode; skipping actuator re-arm");
        } else {
            self.state = RecoveryState::ReArming;
            match self.rearm(controller) {
                Ok(p) => powered_on = p,
                Err(abort) => {
                    tracing::error!(error = %abort, "recovery aborted; control loop left stopped");
                    if let Some(m) = &self.metrics {
                        m.recoveries_aborted.inc();
                    }
                    self.state = RecoveryState::Idle;
                    return RecoveryOutcome::Aborted(abort);
                }
            }
        }

        self.state = RecoveryState::Resuming;
        self.resume(controller, sink);

        self.state = RecoveryState::Idle;
        self.last_recovery = Some(OffsetDateTime::now_utc());
        if let Some(m) = &self.metrics {
            m.recoveries_completed.inc();
        }
        RecoveryOutcome::Resumed { powered_on }
    }

    fn suspend(&mut self, controller: &mut dyn Controller) {
        controller.set_active_strategy(NO_STRATEGY);
        controller.stop_periodic_loop();
        tracing::debug!("control loop suspended");
    }

    /// Returns whether power had to be enabled.
    fn rearm(&mut self, controller: &mut dyn Controller) -> Result<bool, RecoveryAbort> {
        let mut bus = self
            .opener
            .open(&self.config.device_name, self.config.baud_rate)
            .map_err(RecoveryAbort::TransportOpen)?;
        let result = self.rearm_on(&mut bus, controller);
        bus.close();
        result
    }

    fn rearm_on(
        &mut self,
        bus: &mut O::Bus,
        controller: &mut dyn Controller,
    ) -> Result<bool, RecoveryAbort> {
        let sub_controller = self.config.bus.sub_controller();
        let needs_power = match self.guard.is_torque_enabled(bus, sub_controller) {
            Ok(true) => {
                tracing::info!("torque is already on; skipping power-on");
                false
            }
            Ok(false) => true,
            Err(e) => {
                tracing::warn!(error = %e, "torque query failed; assuming actuators are unpowered");
                true
            }
        };
        if !needs_power {
            return Ok(false);
        }

        match self.sequencer.run(bus, &self.delay) {
            PowerSequenceResult::Success { .. } => {}
            PowerSequenceResult::TransportError(e) => return Err(RecoveryAbort::Transport(e)),
            PowerSequenceResult::RetriesExhausted {
                attempts,
                last_error,
            } => {
                return Err(RecoveryAbort::RetriesExhausted {
                    attempts,
                    last_error,
                })
            }
        }

        // Device init opens its own connection.
        bus.close();
        match self.config.init_file.as_deref() {
            Some(init_file) => {
                controller
                    .initialize_devices(init_file)
                    .map_err(RecoveryAbort::DeviceInit)?;
                tracing::info!(init_file = %init_file.display(), "devices re-initialized");
            }
            None => tracing::warn!("no init file configured; skipping device re-initialization"),
        }
        Ok(true)
    }

    fn resume(&mut self, controller: &mut dyn Controller, sink: &mut dyn CommandSink) {
        controller.start_periodic_loop();
        self.delay.sleep(self.config.timing.resume_settle());
        sink.publish(MotionCommand::InitPose);
        tracing::info!("control loop resumed; going to init pose");
    }
}
