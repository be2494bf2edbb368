use crate::{
    BusOpener, DeviceId, RegisterAddress, RegisterBus, RegisterWidth, Result, TransportError,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// One journaled interaction with the mock bus.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum BusOp {
    Opened { port: String, baud_rate: u32 },
    OpenFailed { port: String },
    Read { device: DeviceId, address: RegisterAddress },
    Write { device: DeviceId, address: RegisterAddress, value: u32, ok: bool },
    Closed,
    /// Free-form entry recorded by a collaborator, used to interleave events.
    Marker(String),
}

#[derive(Default)]
struct MockState {
    registers: HashMap<(DeviceId, RegisterAddress), u32>,
    write_failures: HashMap<(DeviceId, RegisterAddress), u32>,
    read_failures: HashMap<(DeviceId, RegisterAddress), u32>,
    fail_open: bool,
    journal: Vec<BusOp>,
}

/// In-memory register file shared by every bus opened from the same opener.
#[derive(Clone, Default)]
pub struct MockOpener {
    state: Arc<Mutex<MockState>>,
}

impl MockOpener {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        // A panicking test thread must not hide the journal from other assertions.
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn set_register(&self, device: DeviceId, address: RegisterAddress, value: u32) {
        self.lock().registers.insert((device, address), value);
    }

    pub fn register(&self, device: DeviceId, address: RegisterAddress) -> Option<u32> {
        self.lock().registers.get(&(device, address)).copied()
    }

    /// Make the next `count` writes to this register fail.
    pub fn fail_writes(&self, device: DeviceId, address: RegisterAddress, count: u32) {
        self.lock().write_failures.insert((device, address), count);
    }

    /// Make the next `count` reads of this register fail.
    pub fn fail_reads(&self, device: DeviceId, address: RegisterAddress, count: u32) {
        self.lock().read_failures.insert((device, address), count);
    }

    pub fn fail_open(&self, fail: bool) {
        self.lock().fail_open = fail;
    }

    pub fn mark(&self, label: impl Into<String>) {
        self.lock().journal.push(BusOp::Marker(label.into()));
    }

    pub fn journal(&self) -> Vec<BusOp> {
        self.lock().journal.clone()
    }

    /// Number of write attempts (successful or not) to one register.
    pub fn write_attempts(&self, device: DeviceId, address: RegisterAddress) -> usize {
        self.lock()
            .journal
            .iter()
            .filter(|op| {
                matches!(op, BusOp::Write { device: d, address: a, .. } if *d == device && *a == address)
            })
            .count()
    }

    /// Number of register reads and writes of any kind.
    pub fn register_accesses(&self) -> usize {
        self.lock()
            .journal
            .iter()
            .filter(|op| matches!(op, BusOp::Read { .. } | BusOp::Write { .. }))
            .count()
    }
}

impl BusOpener for MockOpener {
    type Bus = MockBus;

    fn open(&self, port: &str, baud_rate: u32) -> Result<MockBus> {
        let mut state = self.lock();
        if state.fail_open {
            state.journal.push(BusOp::OpenFailed {
                port: port.to_string(),
            });
            return Err(TransportError::PortOpen {
                port: port.to_string(),
                reason: "mock configured to refuse open".to_string(),
            });
        }
        state.journal.push(BusOp::Opened {
            port: port.to_string(),
            baud_rate,
        });
        Ok(MockBus {
            opener: self.clone(),
            open: true,
        })
    }
}

pub struct MockBus {
    opener: MockOpener,
    open: bool,
}

fn consume_failure(
    failures: &mut HashMap<(DeviceId, RegisterAddress), u32>,
    key: (DeviceId, RegisterAddress),
) -> bool {
    match failures.get_mut(&key) {
        Some(remaining) if *remaining > 0 => {
            *remaining -= 1;
            true
        }
        _ => false,
    }
}

impl RegisterBus for MockBus {
    fn read(
        &mut self,
        device: DeviceId,
        address: RegisterAddress,
        width: RegisterWidth,
    ) -> Result<u32> {
        if !self.open {
            return Err(TransportError::NotOpen);
        }
        let mut state = self.opener.lock();
        state.journal.push(BusOp::Read { device, address });
        if consume_failure(&mut state.read_failures, (device, address)) {
            return Err(TransportError::Timeout);
        }
        let value = state.registers.get(&(device, address)).copied().unwrap_or(0);
        Ok(value & width.max_value())
    }

    fn write(
        &mut self,
        device: DeviceId,
        address: RegisterAddress,
        width: RegisterWidth,
        value: u32,
    ) -> Result<()> {
        if !self.open {
            return Err(TransportError::NotOpen);
        }
        let mut state = self.opener.lock();
        let failed = consume_failure(&mut state.write_failures, (device, address));
        state.journal.push(BusOp::Write {
            device,
            address,
            value,
            ok: !failed,
        });
        if failed {
            return Err(TransportError::Timeout);
        }
        if value > width.max_value() {
            return Err(TransportError::InvalidPacket("value exceeds register width"));
        }
        state.registers.insert((device, address), value);
        Ok(())
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            self.opener.lock().journal.push(BusOp::Closed);
        }
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TORQUE: RegisterAddress = RegisterAddress(64);

    #[test]
    fn test_scripted_write_failures_then_success() {
        let opener = MockOpener::new();
        opener.fail_writes(DeviceId(1), TORQUE, 2);
        let mut bus = opener.open("mock0", 57_600).unwrap();

        assert!(bus.write(DeviceId(1), TORQUE, RegisterWidth::Byte, 1).is_err());
        assert!(bus.write(DeviceId(1), TORQUE, RegisterWidth::Byte, 1).is_err());
        assert!(bus.write(DeviceId(1), TORQUE, RegisterWidth::Byte, 1).is_ok());
        assert_eq!(opener.write_attempts(DeviceId(1), TORQUE), 3);
        assert_eq!(opener.register(DeviceId(1), TORQUE), Some(1));
    }

    #[test]
    fn test_closed_bus_refuses_access_and_close_is_idempotent() {
        let opener = MockOpener::new();
        let mut bus = opener.open("mock0", 57_600).unwrap();
        bus.close();
        bus.close();
        assert!(!bus.is_open());
        assert_eq!(
            bus.read(DeviceId(1), TORQUE, RegisterWidth::Byte),
            Err(TransportError::NotOpen)
        );
        assert_eq!(opener.register_accesses(), 0);
        let closes = opener
            .journal()
            .iter()
            .filter(|op| **op == BusOp::Closed)
            .count();
        assert_eq!(closes, 1);
    }

    #[test]
    fn test_refused_open_is_reported() {
        let opener = MockOpener::new();
        opener.fail_open(true);
        assert!(matches!(
            opener.open("/dev/missing", 1_000_000),
            Err(TransportError::PortOpen { .. })
        ));
    }
}
