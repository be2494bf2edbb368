//! dxl-transport: register access to Dynamixel Protocol 2.0 actuator buses
//!
//! This crate provides the blocking bus traits and the Protocol 2.0 packet codec, with
//! feature-gated backends. The default build enables a `mock` backend so that binaries and
//! tests can run on any host without a serial adapter; `serial` adds the `serialport`
//! backend.

mod types;
pub use types::{DeviceId, PortInfo, RegisterAddress, RegisterWidth};

mod error;
pub use error::{Result, TransportError};

mod traits;
pub use traits::{BusOpener, RegisterBus};

pub mod protocol;

#[cfg(feature = "mock")]
mod mock;

#[cfg(feature = "mock")]
pub use mock::{BusOp, MockBus, MockOpener};

#[cfg(feature = "serial")]
mod serial;

#[cfg(feature = "serial")]
pub use serial::{list_ports, SerialBus, SerialOpener};
