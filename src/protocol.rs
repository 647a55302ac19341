//! Frame layout shared by every board on the bus.
//!
//! ```text
//! Header:  address:u8, type:u8, size:u16
//! Payload: size bytes
//! Footer:  checksum over header ++ payload, little-endian
//! ```

use heapless::Vec;

use crate::checksum::{Checksum, footer_bytes};
use crate::error::{Error, ErrorCode, Result};

pub const HEADER_LEN: usize = 4;
/// Largest reply payload, which is the longest diagnostic text line.
pub const MAX_REPLY_PAYLOAD: usize = 64;
/// Header, reply payload and the widest footer.
pub const MAX_REPLY_FRAME: usize = HEADER_LEN + MAX_REPLY_PAYLOAD + 4;

/// Fixed message type codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum MessageType {
    Ping = 0x01,
    Pong = 0x02,
    SelfTest = 0x03,
    SelfTestResult = 0x04,
    ReadValue = 0x05,
    Value = 0x06,
    SetCoefficients = 0x1F,
    SetCoefficientsAck = 0x20,
    SetSetpoints = 0x21,
    SetSetpointsAck = 0x22,
    Sleep = 0x23,
    SleepAck = 0x24,
    Error = 0xFF,
}

impl TryFrom<u8> for MessageType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        Ok(match value {
            0x01 => Self::Ping,
            0x02 => Self::Pong,
            0x03 => Self::SelfTest,
            0x04 => Self::SelfTestResult,
            0x05 => Self::ReadValue,
            0x06 => Self::Value,
            0x1F => Self::SetCoefficients,
            0x20 => Self::SetCoefficientsAck,
            0x21 => Self::SetSetpoints,
            0x22 => Self::SetSetpointsAck,
            0x23 => Self::Sleep,
            0x24 => Self::SleepAck,
            0xFF => Self::Error,
            other => return Err(Error::UnknownMessageType(other)),
        })
    }
}

impl From<MessageType> for u8 {
    fn from(value: MessageType) -> Self {
        value as Self
    }
}

/// Fixed-size frame header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Header {
    pub address: u8,
    pub message_type: u8,
    pub size: u16,
}

impl Header {
    #[must_use]
    pub const fn new(address: u8, message_type: MessageType, size: u16) -> Self {
        Self {
            address,
            message_type: message_type as u8,
            size,
        }
    }

    #[must_use]
    pub const fn from_bytes(bytes: [u8; HEADER_LEN]) -> Self {
        let [address, message_type, s0, s1] = bytes;
        Self {
            address,
            message_type,
            size: u16::from_le_bytes([s0, s1]),
        }
    }

    #[must_use]
    pub const fn to_bytes(self) -> [u8; HEADER_LEN] {
        let [s0, s1] = self.size.to_le_bytes();
        [self.address, self.message_type, s0, s1]
    }

    /// Payload length as a `usize`.
    #[must_use]
    pub fn payload_len(self) -> usize {
        usize::from(self.size)
    }
}

/// PID gains carried by a set-coefficients request, with an optional raw target.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Coefficients {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
    pub setpoint: Option<u16>,
}

const GAINS_LEN: usize = 12;
const GAINS_WITH_SETPOINT_LEN: usize = 14;

impl Coefficients {
    /// Parse `{kp, ki, kd: f32}` with an optional trailing `setpoint: u16`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPayload`] for any other payload length.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        if !matches!(payload.len(), GAINS_LEN | GAINS_WITH_SETPOINT_LEN) {
            return Err(Error::InvalidPayload);
        }
        let (gains, rest) = payload
            .split_first_chunk::<GAINS_LEN>()
            .ok_or(Error::InvalidPayload)?;
        let [p0, p1, p2, p3, i0, i1, i2, i3, d0, d1, d2, d3] = *gains;
        let setpoint = match *rest {
            [s0, s1] => Some(u16::from_le_bytes([s0, s1])),
            _ => None,
        };
        Ok(Self {
            kp: f32::from_le_bytes([p0, p1, p2, p3]),
            ki: f32::from_le_bytes([i0, i1, i2, i3]),
            kd: f32::from_le_bytes([d0, d1, d2, d3]),
            setpoint,
        })
    }

    /// Wire form; 12 bytes, or 14 with a setpoint.
    #[cfg(test)]
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8, GAINS_WITH_SETPOINT_LEN> {
        let mut out = Vec::new();
        for gain in [self.kp, self.ki, self.kd] {
            for byte in gain.to_le_bytes() {
                let _ = out.push(byte);
            }
        }
        if let Some(setpoint) = self.setpoint {
            for byte in setpoint.to_le_bytes() {
                let _ = out.push(byte);
            }
        }
        out
    }
}

/// Assemble a complete frame: header, payload and checksum footer.
///
/// # Errors
///
/// Returns [`Error::PayloadTooLarge`] if the frame does not fit in `N` bytes.
pub fn encode_frame<C: Checksum, const N: usize>(
    address: u8,
    message_type: MessageType,
    payload: &[u8],
) -> Result<Vec<u8, N>> {
    let size = u16::try_from(payload.len()).map_err(|_| Error::PayloadTooLarge(u16::MAX))?;
    let header = Header::new(address, message_type, size);

    let mut frame = Vec::new();
    frame
        .extend_from_slice(&header.to_bytes())
        .map_err(|()| Error::PayloadTooLarge(size))?;
    frame
        .extend_from_slice(payload)
        .map_err(|()| Error::PayloadTooLarge(size))?;
    let footer = footer_bytes::<C>(C::compute(&frame));
    frame
        .extend_from_slice(&footer)
        .map_err(|()| Error::PayloadTooLarge(size))?;
    Ok(frame)
}

/// Payload of an `Error` reply.
#[must_use]
pub const fn error_payload(code: ErrorCode) -> [u8; 2] {
    code.to_le_bytes()
}
