//! Fixed 6-byte command frames exchanged with the motor/servo microcontroller.
//!
//! ```text
//!   [0] 0xAA header
//!   [1] CMD
//!   [2] LEN (0..=2)
//!   [3] DATA0
//!   [4] DATA1
//!   [5] CHECKSUM = CMD ^ LEN ^ DATA0 ^ DATA1
//! ```
//!
//! Unused data bytes are transmitted as zero and still take part in the XOR.

use serde::{Deserialize, Serialize};
use static_assertions::const_assert_eq;
use thiserror::Error;

pub const FRAME_LEN: usize = 6;
pub const HEADER: u8 = 0xAA;
pub const MAX_PAYLOAD: usize = 2;

pub const MOTOR_SPEED_MAX: i32 = 255;
pub const SERVO_ANGLE_MAX: i32 = 180;

const_assert_eq!(FRAME_LEN, 4 + MAX_PAYLOAD);

pub type RawFrame = [u8; FRAME_LEN];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum CommandCode {
    ModeSelect = 0x00,
    MotorSpeed = 0x01,
    ServoSet = 0x02,
    StatusRequest = 0x03,
    Ping = 0x0F,
}

impl CommandCode {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(CommandCode::ModeSelect),
            0x01 => Some(CommandCode::MotorSpeed),
            0x02 => Some(CommandCode::ServoSet),
            0x03 => Some(CommandCode::StatusRequest),
            0x0F => Some(CommandCode::Ping),
            _ => None,
        }
    }
}

impl From<CommandCode> for u8 {
    fn from(code: CommandCode) -> Self {
        code as u8
    }
}

/// Firmware operating mode selected with [`CommandCode::ModeSelect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum Mode {
    Car = 0,
    Quad = 1,
}

impl From<Mode> for u8 {
    fn from(mode: Mode) -> Self {
        mode as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("payload of {0} bytes exceeds the 2-byte frame limit")]
    PayloadTooLong(usize),
    #[error("motor speed {0} outside -255..=255")]
    SpeedOutOfRange(i32),
    #[error("servo angle {0} outside 0..=180")]
    AngleOutOfRange(i32),
    #[error("servo channel {0} outside 0..=255")]
    ChannelOutOfRange(u32),
}

/// XOR of the four logical fields. Callers pass 0 for unset data bytes.
#[inline]
pub const fn checksum(cmd: u8, len: u8, data0: u8, data1: u8) -> u8 {
    cmd ^ len ^ data0 ^ data1
}

/// A frame is valid iff the checksum over bytes 1..=4 matches byte 5.
#[inline]
pub fn validate(frame: &RawFrame) -> bool {
    checksum(frame[1], frame[2], frame[3], frame[4]) == frame[5]
}

/// An outgoing request frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    bytes: RawFrame,
}

impl Frame {
    pub fn build(cmd: u8, data: &[u8]) -> Result<Self, ProtocolError> {
        if data.len() > MAX_PAYLOAD {
            return Err(ProtocolError::PayloadTooLong(data.len()));
        }

        let len = data.len() as u8;
        let data0 = data.first().copied().unwrap_or(0);
        let data1 = data.get(1).copied().unwrap_or(0);

        Ok(Self {
            bytes: [HEADER, cmd, len, data0, data1, checksum(cmd, len, data0, data1)],
        })
    }

    pub fn command(code: CommandCode, data: &[u8]) -> Result<Self, ProtocolError> {
        Self::build(code.into(), data)
    }

    pub fn motor_speed(speed: i32) -> Result<Self, ProtocolError> {
        if !(-MOTOR_SPEED_MAX..=MOTOR_SPEED_MAX).contains(&speed) {
            return Err(ProtocolError::SpeedOutOfRange(speed));
        }
        Self::command(CommandCode::MotorSpeed, &encode_speed(speed as i16))
    }

    pub fn servo(channel: u8, angle: i32) -> Result<Self, ProtocolError> {
        let angle = check_angle(angle)?;
        Self::command(CommandCode::ServoSet, &[channel, angle])
    }

    pub fn cmd(&self) -> u8 {
        self.bytes[1]
    }

    pub fn payload(&self) -> &[u8] {
        let len = usize::from(self.bytes[2]).min(MAX_PAYLOAD);
        &self.bytes[3..3 + len]
    }

    pub fn is_valid(&self) -> bool {
        self.bytes[0] == HEADER && validate(&self.bytes)
    }

    pub fn as_bytes(&self) -> &RawFrame {
        &self.bytes
    }
}

/// The six bytes clocked back by the microcontroller during an exchange.
///
/// Returned to callers even when the checksum does not match; firmware replies
/// are advisory and some firmware revisions answer with the previous frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    bytes: RawFrame,
}

impl Response {
    pub fn from_bytes(bytes: RawFrame) -> Self {
        Self { bytes }
    }

    pub fn header(&self) -> u8 {
        self.bytes[0]
    }

    pub fn cmd(&self) -> u8 {
        self.bytes[1]
    }

    pub fn len(&self) -> u8 {
        self.bytes[2]
    }

    pub fn is_empty(&self) -> bool {
        self.bytes[2] == 0
    }

    pub fn data(&self) -> [u8; MAX_PAYLOAD] {
        [self.bytes[3], self.bytes[4]]
    }

    pub fn is_valid(&self) -> bool {
        self.bytes[0] == HEADER && validate(&self.bytes)
    }

    pub fn as_bytes(&self) -> &RawFrame {
        &self.bytes
    }

    pub fn to_hex(&self) -> String {
        self.bytes
            .iter()
            .map(|b| format!("{b:02X}"))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Little-endian two's complement, as the firmware reads `int16_t` from DATA0/DATA1.
#[inline]
pub fn encode_speed(speed: i16) -> [u8; 2] {
    speed.to_le_bytes()
}

#[inline]
pub fn decode_speed(data: [u8; 2]) -> i16 {
    i16::from_le_bytes(data)
}

pub fn check_angle(angle: i32) -> Result<u8, ProtocolError> {
    if !(0..=SERVO_ANGLE_MAX).contains(&angle) {
        return Err(ProtocolError::AngleOutOfRange(angle));
    }
    Ok(angle as u8)
}
