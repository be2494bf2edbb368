use core::fmt;

/// Id of one participant on the actuator bus.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct DeviceId(pub u8);

impl DeviceId {
    /// Addresses every device at once. Devices never answer broadcast writes.
    pub const BROADCAST: DeviceId = DeviceId(254);
    /// Default id of the sub-controller board that gates actuator power.
    pub const SUB_CONTROLLER: DeviceId = DeviceId(200);

    pub fn is_broadcast(self) -> bool {
        self == Self::BROADCAST
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Offset into a device control table.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct RegisterAddress(pub u16);

impl fmt::Display for RegisterAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// Number of bytes a register occupies.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum RegisterWidth {
    Byte,
    Word,
    DoubleWord,
}

impl RegisterWidth {
    pub fn len(self) -> usize {
        match self {
            RegisterWidth::Byte => 1,
            RegisterWidth::Word => 2,
            RegisterWidth::DoubleWord => 4,
        }
    }

    pub fn from_len(len: u8) -> Option<Self> {
        match len {
            1 => Some(RegisterWidth::Byte),
            2 => Some(RegisterWidth::Word),
            4 => Some(RegisterWidth::DoubleWord),
            _ => None,
        }
    }

    /// Largest value the register can hold.
    pub fn max_value(self) -> u32 {
        match self {
            RegisterWidth::Byte => u8::MAX as u32,
            RegisterWidth::Word => u16::MAX as u32,
            RegisterWidth::DoubleWord => u32::MAX,
        }
    }
}

#[derive(Clone, Debug)]
pub struct PortInfo {
    pub name: String,
    pub driver: String,
}
