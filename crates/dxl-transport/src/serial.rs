use crate::protocol::{self, StatusPacket};
use crate::{
    BusOpener, DeviceId, PortInfo, RegisterAddress, RegisterBus, RegisterWidth, Result,
    TransportError,
};
use serialport::{SerialPort, SerialPortType};
use std::io::{Read, Write};
use std::time::{Duration, Instant};

/// Opens [`SerialBus`] connections on a host serial port (USB2Dynamixel, U2D2, OpenCR).
#[derive(Clone, Debug)]
pub struct SerialOpener {
    pub response_timeout: Duration,
}

impl Default for SerialOpener {
    fn default() -> Self {
        Self {
            response_timeout: Duration::from_millis(50),
        }
    }
}

impl BusOpener for SerialOpener {
    type Bus = SerialBus;

    fn open(&self, port: &str, baud_rate: u32) -> Result<SerialBus> {
        let handle = serialport::new(port, baud_rate)
            .timeout(self.response_timeout)
            .open()
            .map_err(|e| TransportError::PortOpen {
                port: port.to_string(),
                reason: e.to_string(),
            })?;
        tracing::debug!(port, baud_rate, "serial bus opened");
        Ok(SerialBus {
            port_path: port.to_string(),
            port: Some(handle),
            response_timeout: self.response_timeout,
        })
    }
}

/// Protocol 2.0 half-duplex bus over a serial port.
pub struct SerialBus {
    port_path: String,
    port: Option<Box<dyn SerialPort>>,
    response_timeout: Duration,
}

impl SerialBus {
    fn port(&mut self) -> Result<&mut Box<dyn SerialPort>> {
        self.port.as_mut().ok_or(TransportError::NotOpen)
    }

    fn transmit(&mut self, packet: &[u8]) -> Result<()> {
        let port = self.port()?;
        // Stale bytes from an earlier timed-out exchange would desync the parser.
        port.clear(serialport::ClearBuffer::Input)
            .map_err(|e| TransportError::Io(e.to_string()))?;
        port.write_all(packet)
            .map_err(|e| TransportError::Io(e.to_string()))?;
        port.flush().map_err(|e| TransportError::Io(e.to_string()))
    }

    fn receive_status(&mut self, device: DeviceId) -> Result<StatusPacket> {
        let deadline = Instant::now() + self.response_timeout;
        let port = self.port()?;
        let mut buf = [0u8; 64];
        let mut acc: Vec<u8> = Vec::with_capacity(32);
        loop {
            if let Some(start) = protocol::find_header(&acc) {
                acc.drain(..start);
                if let Some(total) = protocol::frame_len(&acc) {
                    if acc.len() >= total {
                        let status = protocol::decode_status(&acc[..total])?;
                        if status.id != device {
                            // Echo or a late reply from another device; keep looking.
                            acc.drain(..total);
                            continue;
                        }
                        return Ok(status);
                    }
                }
            }
            if Instant::now() >= deadline {
                return Err(TransportError::Timeout);
            }
            match port.read(&mut buf) {
                Ok(n) if n > 0 => acc.extend_from_slice(&buf[..n]),
                Ok(_) => continue,
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {
                    return Err(TransportError::Timeout)
                }
                Err(e) => return Err(TransportError::Io(e.to_string())),
            }
        }
    }

    fn exchange(&mut self, device: DeviceId, packet: &[u8]) -> Result<StatusPacket> {
        self.transmit(packet)?;
        let status = self.receive_status(device)?;
        if status.hardware_alert() {
            tracing::warn!(%device, "device reports hardware alert");
        }
        match status.error_code() {
            0 => Ok(status),
            code => Err(TransportError::Status { device, code }),
        }
    }
}

impl RegisterBus for SerialBus {
    fn read(
        &mut self,
        device: DeviceId,
        address: RegisterAddress,
        width: RegisterWidth,
    ) -> Result<u32> {
        if device.is_broadcast() {
            return Err(TransportError::Unsupported("broadcast read"));
        }
        let packet = protocol::read_request(device, address, width);
        let status = self.exchange(device, &packet)?;
        let value = protocol::value_from_params(&status.params, width)?;
        tracing::trace!(%device, %address, value, "register read");
        Ok(value)
    }

    fn write(
        &mut self,
        device: DeviceId,
        address: RegisterAddress,
        width: RegisterWidth,
        value: u32,
    ) -> Result<()> {
        let packet = protocol::write_request(device, address, width, value)?;
        if device.is_broadcast() {
            self.transmit(&packet)?;
        } else {
            self.exchange(device, &packet)?;
        }
        tracing::trace!(%device, %address, value, "register write");
        Ok(())
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            tracing::debug!(port = %self.port_path, "serial bus closed");
        }
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }
}

/// Enumerate serial ports that could host an actuator bus.
pub fn list_ports() -> Result<Vec<PortInfo>> {
    let mut out = Vec::new();
    for p in serialport::available_ports().map_err(|e| TransportError::Io(e.to_string()))? {
        let driver = match p.port_type {
            SerialPortType::UsbPort(_) => "usb-serial",
            _ => "serial",
        };
        out.push(PortInfo {
            name: p.port_name,
            driver: driver.to_string(),
        });
    }
    Ok(out)
}
