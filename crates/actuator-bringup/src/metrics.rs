use prometheus::{Encoder, IntCounter, Registry, TextEncoder};

#[derive(Clone)]
pub struct BringupMetrics {
    pub power_on_attempts: IntCounter,
    pub power_on_failures: IntCounter,
    pub recoveries_started: IntCounter,
    pub recoveries_completed: IntCounter,
    pub recoveries_aborted: IntCounter,
}

#[derive(Clone)]
pub struct MetricsHub {
    pub registry: Registry,
    pub bringup: BringupMetrics,
}

fn counter(name: &str, help: &str) -> Result<IntCounter, String> {
    IntCounter::new(name, help).map_err(|e| format!("metrics init error: {e}"))
}

impl MetricsHub {
    pub fn new() -> Result<Self, String> {
        let registry = Registry::new();
        let bringup = BringupMetrics {
            power_on_attempts: counter(
                "bringup_power_on_attempts",
                "Power-enable writes issued to the actuator bus",
            )?,
            power_on_failures: counter(
                "bringup_power_on_failures",
                "Power-on sequences that gave up or could not reach the bus",
            )?,
            recoveries_started: counter(
                "bringup_recoveries_started",
                "Button-triggered recoveries started",
            )?,
            recoveries_completed: counter(
                "bringup_recoveries_completed",
                "Recoveries that resumed the control loop",
            )?,
            recoveries_aborted: counter(
                "bringup_recoveries_aborted",
                "Recoveries aborted with the control loop left stopped",
            )?,
        };
        for c in [
            &bringup.power_on_attempts,
            &bringup.power_on_failures,
            &bringup.recoveries_started,
            &bringup.recoveries_completed,
            &bringup.recoveries_aborted,
        ] {
            registry
                .register(Box::new(c.clone()))
                .map_err(|e| format!("metrics register error: {e}"))?;
        }
        Ok(Self { registry, bringup })
    }

    pub fn encode_text(&self) -> String {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buf) {
            return format!("error encoding metrics: {e}");
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}
