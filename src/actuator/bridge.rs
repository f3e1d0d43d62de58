use super::angles::{AngleCache, AngleTable, JOINTS_PER_LEG};
use crate::protocol::{check_angle, CommandCode, Frame, Mode, ProtocolError, Response};
use crate::transport::{BusTransport, Connector, TransportError};
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum BridgeError {
    /// Rejected before any byte reached the bus.
    #[error("invalid command: {0}")]
    Range(#[from] ProtocolError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl BridgeError {
    pub fn is_range(&self) -> bool {
        matches!(self, BridgeError::Range(_))
    }
}

/// Typed command API for the motor/servo microcontroller.
pub struct ActuatorBridge<C: Connector> {
    transport: BusTransport<C>,
    angles: AngleCache,
    leg_delay: Duration,
}

impl<C: Connector> ActuatorBridge<C> {
    pub fn new(connector: C) -> Self {
        Self {
            transport: BusTransport::new(connector),
            angles: AngleCache::new(),
            leg_delay: Duration::ZERO,
        }
    }

    /// Pause between the three joint frames of [`ActuatorBridge::set_leg`] for
    /// firmware that cannot ingest back-to-back frames.
    pub fn with_leg_delay(mut self, delay: Duration) -> Self {
        self.leg_delay = delay;
        self
    }

    pub fn ping(&self) -> Result<Response, BridgeError> {
        self.send(Frame::command(CommandCode::Ping, &[])?)
    }

    pub fn set_mode(&self, mode: u8) -> Result<Response, BridgeError> {
        self.send(Frame::command(CommandCode::ModeSelect, &[mode])?)
    }

    pub fn select_mode(&self, mode: Mode) -> Result<Response, BridgeError> {
        self.set_mode(mode.into())
    }

    pub fn request_status(&self) -> Result<Response, BridgeError> {
        self.send(Frame::command(CommandCode::StatusRequest, &[])?)
    }

    pub fn set_motor_speed(&self, speed: i32) -> Result<Response, BridgeError> {
        self.send(Frame::motor_speed(speed)?)
    }

    pub fn set_servo(&self, channel: u8, angle: i32) -> Result<Response, BridgeError> {
        let frame = Frame::servo(channel, angle)?;
        self.angles.record(channel, check_angle(angle)?);
        self.send(frame)
    }

    /// Three independent servo frames on channels `leg*3 + {0,1,2}`.
    ///
    /// Every angle is validated before anything is sent, and the cache sees all
    /// three joints change at once.
    pub fn set_leg(&self, leg: u8, a0: i32, a1: i32, a2: i32) -> Result<[Response; JOINTS_PER_LEG], BridgeError> {
        let angles = [check_angle(a0)?, check_angle(a1)?, check_angle(a2)?];

        let base = u32::from(leg) * JOINTS_PER_LEG as u32;
        let last = base + JOINTS_PER_LEG as u32 - 1;
        if last > u32::from(u8::MAX) {
            return Err(ProtocolError::ChannelOutOfRange(last).into());
        }
        let base = base as u8;

        let frames = [
            Frame::servo(base, i32::from(angles[0]))?,
            Frame::servo(base + 1, i32::from(angles[1]))?,
            Frame::servo(base + 2, i32::from(angles[2]))?,
        ];

        self.angles.record_leg(leg, angles);
        debug!("Leg {} -> {:?}", leg, angles);

        let mut responses = [Response::from_bytes([0; 6]); JOINTS_PER_LEG];
        for (i, frame) in frames.into_iter().enumerate() {
            responses[i] = self.send(frame)?;
            if !self.leg_delay.is_zero() && i + 1 < JOINTS_PER_LEG {
                thread::sleep(self.leg_delay);
            }
        }

        Ok(responses)
    }

    /// Best-effort stop: motor to 0, then servo channel 0 to `neutral_angle`.
    ///
    /// Both steps are attempted; the first failure is returned.
    pub fn release(&self, neutral_angle: u8) -> Result<(), BridgeError> {
        let motor = self.set_motor_speed(0);
        if let Err(e) = &motor {
            warn!("Release: motor stop failed: {}", e);
        }

        let servo = self.set_servo(0, i32::from(neutral_angle));
        if let Err(e) = &servo {
            warn!("Release: servo neutral failed: {}", e);
        }

        motor.and(servo).map(|_| ())
    }

    pub fn angles(&self) -> AngleTable {
        self.angles.snapshot()
    }

    pub fn reset_angles(&self) {
        self.angles.reset();
    }

    pub fn close(&self) {
        self.transport.close();
    }

    fn send(&self, frame: Frame) -> Result<Response, BridgeError> {
        Ok(self.transport.transact(&frame)?)
    }
}
