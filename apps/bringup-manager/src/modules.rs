use actuator_bringup::{MotionCommand, MotionModule, SensorModule};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Drives every joint to the initial pose when asked, then holds it.
pub struct BaseModule {
    pose_ticks: u64,
    remaining: u64,
}

impl BaseModule {
    pub const NAME: &'static str = "base_module";

    /// `pose_time` is how long the move to the init pose takes at `cycle`.
    pub fn new(pose_time: Duration, cycle: Duration) -> Self {
        let cycle_ms = cycle.as_millis().max(1);
        Self {
            pose_ticks: (pose_time.as_millis() / cycle_ms).max(1) as u64,
            remaining: 0,
        }
    }

    pub fn is_moving(&self) -> bool {
        self.remaining > 0
    }
}

impl MotionModule for BaseModule {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn handle_command(&mut self, command: MotionCommand) -> bool {
        match command {
            MotionCommand::InitPose => {
                info!(ticks = self.pose_ticks, "moving to init pose");
                self.remaining = self.pose_ticks;
                true
            }
        }
    }

    fn process(&mut self, tick: u64) {
        if self.remaining == 0 {
            return;
        }
        self.remaining -= 1;
        if self.remaining == 0 {
            info!(tick, "init pose reached");
        }
    }

    fn stop(&mut self) {
        if self.remaining > 0 {
            debug!(remaining = self.remaining, "init pose interrupted");
        }
        self.remaining = 0;
    }
}

/// Watches the loop period and reports overruns.
pub struct CycleMonitor {
    expected: Duration,
    last: Option<Instant>,
    overruns: u64,
}

impl CycleMonitor {
    pub const NAME: &'static str = "cycle_monitor";

    /// Log every this many overruns after the first.
    const REPORT_EVERY: u64 = 100;

    pub fn new(expected: Duration) -> Self {
        Self {
            expected,
            last: None,
            overruns: 0,
        }
    }

    pub fn overruns(&self) -> u64 {
        self.overruns
    }

    fn observe(&mut self, tick: u64, now: Instant) {
        if let Some(last) = self.last {
            let period = now.saturating_duration_since(last);
            if period > self.expected * 2 {
                self.overruns += 1;
                if self.overruns == 1 || self.overruns % Self::REPORT_EVERY == 0 {
                    warn!(
                        tick,
                        period_ms = period.as_millis() as u64,
                        overruns = self.overruns,
                        "control cycle overrun"
                    );
                }
            }
        }
        self.last = Some(now);
    }
}

impl SensorModule for CycleMonitor {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn process(&mut self, tick: u64) {
        self.observe(tick, Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_module_runs_pose_to_completion() {
        let mut base = BaseModule::new(Duration::from_millis(40), Duration::from_millis(8));
        assert!(!base.is_moving());
        assert!(base.handle_command(MotionCommand::InitPose));
        for tick in 1..5 {
            base.process(tick);
            assert!(base.is_moving());
        }
        base.process(5);
        assert!(!base.is_moving());
    }

    #[test]
    fn test_base_module_stop_cancels_pose() {
        let mut base = BaseModule::new(Duration::from_secs(1), Duration::from_millis(8));
        base.handle_command(MotionCommand::InitPose);
        base.stop();
        assert!(!base.is_moving());
    }

    #[test]
    fn test_cycle_monitor_counts_overruns() {
        let mut monitor = CycleMonitor::new(Duration::from_millis(8));
        let start = Instant::now();
        monitor.observe(1, start);
        monitor.observe(2, start + Duration::from_millis(8));
        monitor.observe(3, start + Duration::from_millis(40));
        assert_eq!(monitor.overruns(), 1);
    }
}
