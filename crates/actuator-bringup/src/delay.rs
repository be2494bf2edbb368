use std::sync::Mutex;
use std::time::Duration;

/// Blocking wait used for settle delays.
pub trait Delay {
    fn sleep(&self, duration: Duration);
}

/// Blocks the calling thread.
#[derive(Clone, Copy, Debug, Default)]
pub struct ThreadDelay;

impl Delay for ThreadDelay {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Records requested delays without waiting.
#[derive(Debug, Default)]
pub struct RecordingDelay {
    requested: Mutex<Vec<Duration>>,
}

impl RecordingDelay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requested(&self) -> Vec<Duration> {
        self.requested
            .lock()
            .map(|v| v.clone())
            .unwrap_or_default()
    }
}

impl Delay for RecordingDelay {
    fn sleep(&self, duration: Duration) {
        if let Ok(mut v) = self.requested.lock() {
            v.push(duration);
        }
    }
}

impl<D: Delay + ?Sized> Delay for &D {
    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}
