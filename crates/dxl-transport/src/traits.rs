use crate::{DeviceId, RegisterAddress, RegisterWidth, Result};

/// An open, exclusively owned connection to an actuator bus.
///
/// Every call is one blocking bus transaction. Implementations must refuse
/// register access with [`crate::TransportError::NotOpen`] once closed.
pub trait RegisterBus {
    /// Read one register and return its little-endian value.
    fn read(
        &mut self,
        device: DeviceId,
        address: RegisterAddress,
        width: RegisterWidth,
    ) -> Result<u32>;

    /// Write one register. Broadcast writes succeed once transmitted.
    fn write(
        &mut self,
        device: DeviceId,
        address: RegisterAddress,
        width: RegisterWidth,
        value: u32,
    ) -> Result<()>;

    /// Release the connection. Safe to call more than once.
    fn close(&mut self);

    fn is_open(&self) -> bool;
}

/// Creates bus connections. Kept separate from [`RegisterBus`] so callers can
/// reopen the bus after closing it.
pub trait BusOpener {
    type Bus: RegisterBus;

    /// Open a port (e.g. "/dev/ttyUSB0") at a fixed baud rate.
    fn open(&self, port: &str, baud_rate: u32) -> Result<Self::Bus>;
}
