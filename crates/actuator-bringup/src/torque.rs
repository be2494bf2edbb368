use dxl_transport::{DeviceId, RegisterAddress, RegisterBus, RegisterWidth, Result};

/// Tells "actuators already powered" apart from "power needs to be enabled",
/// so a software-only reset does not redo the full power-on sequence.
#[derive(Clone, Copy, Debug)]
pub struct TorqueStateGuard {
    register: RegisterAddress,
}

impl TorqueStateGuard {
    pub fn new(register: RegisterAddress) -> Self {
        Self { register }
    }

    /// Read the torque-enable byte. A failed read is returned as-is.
    pub fn is_torque_enabled<B: RegisterBus + ?Sized>(
        &self,
        bus: &mut B,
        device: DeviceId,
    ) -> Result<bool> {
        let value = bus.read(device, self.register, RegisterWidth::Byte)?;
        tracing::debug!(%device, value, "torque-enable state read");
        Ok(value == 1)
    }
}
