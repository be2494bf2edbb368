//! Dynamixel Protocol 2.0 packet codec.
//!
//! Layout: `FF FF FD 00 | id | len (LE16) | instruction | params | crc (LE16)`,
//! where `len` counts instruction, params and crc. Any `FF FF FD` run inside the
//! instruction/params region is followed by a stuffed `FD` byte.

use crate::{DeviceId, RegisterAddress, RegisterWidth, Result, TransportError};

pub const HEADER: [u8; 4] = [0xFF, 0xFF, 0xFD, 0x00];

/// Header, id and length field.
pub const PREFIX_LEN: usize = 7;

/// Smallest valid status packet: prefix, instruction, error byte, crc.
pub const MIN_STATUS_LEN: usize = PREFIX_LEN + 4;

#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Instruction {
    Ping = 0x01,
    Read = 0x02,
    Write = 0x03,
    Status = 0x55,
}

/// Decoded status (response) packet.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StatusPacket {
    pub id: DeviceId,
    pub error: u8,
    pub params: Vec<u8>,
}

impl StatusPacket {
    /// Error number reported by the device, ignoring the hardware alert bit.
    pub fn error_code(&self) -> u8 {
        self.error & 0x7F
    }

    pub fn hardware_alert(&self) -> bool {
        self.error & 0x80 != 0
    }
}

/// CRC-16 with polynomial 0x8005, initial value 0, no reflection.
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0;
    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x8005
            } else {
                crc << 1
            };
        }
    }
    crc
}

fn stuff(body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len() + 2);
    for &b in body {
        out.push(b);
        if out.ends_with(&[0xFF, 0xFF, 0xFD]) {
            out.push(0xFD);
        }
    }
    out
}

fn unstuff(body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len());
    let mut skip_next_fd = false;
    for &b in body {
        if skip_next_fd {
            skip_next_fd = false;
            if b == 0xFD {
                continue;
            }
        }
        out.push(b);
        if out.ends_with(&[0xFF, 0xFF, 0xFD]) {
            skip_next_fd = true;
        }
    }
    out
}

pub fn encode_instruction(id: DeviceId, instruction: Instruction, params: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(params.len() + 1);
    body.push(instruction as u8);
    body.extend_from_slice(params);
    let body = stuff(&body);

    let len = (body.len() + 2) as u16;
    let mut packet = Vec::with_capacity(PREFIX_LEN + body.len() + 2);
    packet.extend_from_slice(&HEADER);
    packet.push(id.0);
    packet.extend_from_slice(&len.to_le_bytes());
    packet.extend_from_slice(&body);
    let crc = crc16(&packet);
    packet.extend_from_slice(&crc.to_le_bytes());
    packet
}

pub fn read_request(id: DeviceId, address: RegisterAddress, width: RegisterWidth) -> Vec<u8> {
    let mut params = [0u8; 4];
    params[..2].copy_from_slice(&address.0.to_le_bytes());
    params[2..].copy_from_slice(&(width.len() as u16).to_le_bytes());
    encode_instruction(id, Instruction::Read, &params)
}

pub fn write_request(
    id: DeviceId,
    address: RegisterAddress,
    width: RegisterWidth,
    value: u32,
) -> Result<Vec<u8>> {
    if value > width.max_value() {
        return Err(TransportError::InvalidPacket("value exceeds register width"));
    }
    let mut params = Vec::with_capacity(2 + width.len());
    params.extend_from_slice(&address.0.to_le_bytes());
    params.extend_from_slice(&value.to_le_bytes()[..width.len()]);
    Ok(encode_instruction(id, Instruction::Write, &params))
}

/// Position of the first packet header in `buf`.
pub fn find_header(buf: &[u8]) -> Option<usize> {
    buf.windows(HEADER.len()).position(|w| w == HEADER)
}

/// Total frame length announced by a header-aligned prefix, once known.
pub fn frame_len(prefix: &[u8]) -> Option<usize> {
    if prefix.len() < PREFIX_LEN {
        return None;
    }
    let len = u16::from_le_bytes([prefix[5], prefix[6]]) as usize;
    Some(PREFIX_LEN + len)
}

/// Decode one complete, header-aligned status frame.
pub fn decode_status(frame: &[u8]) -> Result<StatusPacket> {
    if frame.len() < MIN_STATUS_LEN {
        return Err(TransportError::InvalidPacket("short status"));
    }
    if frame[..4] != HEADER {
        return Err(TransportError::InvalidPacket("bad header"));
    }
    if frame_len(frame) != Some(frame.len()) {
        return Err(TransportError::InvalidPacket("length mismatch"));
    }
    let (data, crc_bytes) = frame.split_at(frame.len() - 2);
    let expected = u16::from_le_bytes([crc_bytes[0], crc_bytes[1]]);
    if crc16(data) != expected {
        return Err(TransportError::InvalidPacket("crc mismatch"));
    }
    let body = unstuff(&data[PREFIX_LEN..]);
    if body.len() < 2 {
        return Err(TransportError::InvalidPacket("short status"));
    }
    if body[0] != Instruction::Status as u8 {
        return Err(TransportError::InvalidPacket("not a status packet"));
    }
    Ok(StatusPacket {
        id: DeviceId(frame[4]),
        error: body[1],
        params: body[2..].to_vec(),
    })
}

/// Interpret status params as a little-endian register value.
pub fn value_from_params(params: &[u8], width: RegisterWidth) -> Result<u32> {
    if params.len() != width.len() {
        return Err(TransportError::InvalidPacket("unexpected data length"));
    }
    let mut bytes = [0u8; 4];
    bytes[..params.len()].copy_from_slice(params);
    Ok(u32::from_le_bytes(bytes))
}
