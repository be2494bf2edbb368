use dxl_transport::{DeviceId, RegisterAddress, RegisterBus, RegisterWidth};

const CHANNEL_MAX: u8 = 0x1F;
const GREEN_SHIFT: u16 = 5;
const BLUE_SHIFT: u16 = 10;

/// RGB color with 5-bit channels, as held by the sub-controller LED register.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LedColor {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

impl LedColor {
    pub const OFF: LedColor = LedColor::new(0, 0, 0);
    /// Shown once actuator power is up.
    pub const READY: LedColor = LedColor::new(0, CHANNEL_MAX, 0);

    /// Channels above 31 are clamped.
    pub const fn new(red: u8, green: u8, blue: u8) -> Self {
        const fn clamp(v: u8) -> u8 {
            if v > CHANNEL_MAX {
                CHANNEL_MAX
            } else {
                v
            }
        }
        Self {
            red: clamp(red),
            green: clamp(green),
            blue: clamp(blue),
        }
    }

    pub fn encode(self) -> u16 {
        (self.red as u16) | ((self.green as u16) << GREEN_SHIFT) | ((self.blue as u16) << BLUE_SHIFT)
    }
}

/// RGB LED on the sub-controller.
#[derive(Clone, Copy, Debug)]
pub struct StatusIndicator {
    device: DeviceId,
    register: RegisterAddress,
}

impl StatusIndicator {
    pub fn new(device: DeviceId, register: RegisterAddress) -> Self {
        Self { device, register }
    }

    /// Write the color. Failures are logged only; returns whether the write went through.
    pub fn set_color<B: RegisterBus + ?Sized>(&self, bus: &mut B, color: LedColor) -> bool {
        let value = color.encode();
        match bus.write(self.device, self.register, RegisterWidth::Word, value as u32) {
            Ok(()) => {
                tracing::debug!(device = %self.device, value, "status LED updated");
                true
            }
            Err(e) => {
                tracing::warn!(device = %self.device, error = %e, "failed to set status LED");
                false
            }
        }
    }
}
