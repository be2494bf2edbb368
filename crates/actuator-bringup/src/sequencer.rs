use crate::config::ManagerConfig;
use crate::delay::Delay;
use crate::indicator::{LedColor, StatusIndicator};
use crate::metrics::BringupMetrics;
use dxl_transport::{DeviceId, RegisterAddress, RegisterBus, RegisterWidth, TransportError};
use std::time::Duration;

/// Outcome of one power-on sequencing attempt.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PowerSequenceResult {
    /// Power enabled; `attempts` writes were issued.
    Success { attempts: u32 },
    /// The bus could not be used at all.
    TransportError(TransportError),
    /// Every write attempt failed.
    RetriesExhausted {
        attempts: u32,
        last_error: TransportError,
    },
}

impl PowerSequenceResult {
    pub fn is_success(&self) -> bool {
        matches!(self, PowerSequenceResult::Success { .. })
    }
}

/// Enables actuator power with a bounded number of retries, then lets the
/// actuators settle and shows the "ready" color.
#[derive(Clone)]
pub struct ActuatorPowerSequencer {
    target: DeviceId,
    power_register: RegisterAddress,
    max_attempts: u32,
    settle: Duration,
    indicator: StatusIndicator,
    metrics: Option<BringupMetrics>,
}

impl ActuatorPowerSequencer {
    pub fn new(config: &ManagerConfig) -> Self {
        Self {
            target: config.bus.power_target(),
            power_register: config.bus.power(),
            max_attempts: config.bus.power_on_attempts.max(1),
            settle: config.timing.power_settle(),
            indicator: StatusIndicator::new(config.bus.sub_controller(), config.bus.led()),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: BringupMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn run<B: RegisterBus + ?Sized>(&self, bus: &mut B, delay: &dyn Delay) -> PowerSequenceResult {
        if !bus.is_open() {
            self.record_failure();
            return PowerSequenceResult::TransportError(TransportError::NotOpen);
        }

        let mut last_error = TransportError::NotOpen;
        for attempt in 1..=self.max_attempts {
            if let Some(m) = &self.metrics {
                m.power_on_attempts.inc();
            }
            match bus.write(self.target, self.power_register, RegisterWidth::Byte, 1) {
                Ok(()) => {
                    tracing::info!(attempt, target = %self.target, "actuator power enabled");
                    delay.sleep(self.settle);
                    self.indicator.set_color(bus, LedColor::READY);
                    return PowerSequenceResult::Success { attempts: attempt };
                }
                Err(e) => {
                    tracing::warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %e,
                        "power-enable write failed"
                    );
                    last_error = e;
                }
            }
        }

        tracing::error!(attempts = self.max_attempts, "giving up on actuator power-on");
        self.record_failure();
        PowerSequenceResult::RetriesExhausted {
            attempts: self.max_attempts,
            last_error,
        }
    }

    fn record_failure(&self) {
        if let Some(m) = &self.metrics {
            m.power_on_failures.inc();
        }
    }
}
