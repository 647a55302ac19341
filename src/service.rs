//! Request handling: turns a verified message into a scheduler action and a reply.

use core::fmt::Write as _;

use heapless::Vec;

use crate::address::{BoardId, DiagnosticKind};
use crate::error::{Error, Result};
use crate::motion::Motion;
use crate::protocol::{Coefficients, MAX_REPLY_PAYLOAD, MessageType};
use crate::setpoint::{PulseStep, Setpoint, SetpointBatch};
use crate::shared_constants::LOOP_INFINITE;

pub const SELF_TEST_BANNER: &str = "Testing motor control...\r\n";

/// Reply payload, raw or framed.
pub type ReplyPayload = Vec<u8, MAX_REPLY_PAYLOAD>;

/// A successful reply: its message type and payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Response {
    pub kind: MessageType,
    pub payload: ReplyPayload,
}

impl Response {
    fn empty(kind: MessageType) -> Self {
        Self {
            kind,
            payload: Vec::new(),
        }
    }
}

/// Dispatches requests for one board against its motion scheduler.
#[derive(Clone, Copy)]
pub struct Service<'a> {
    motion: Motion<'a>,
    board: BoardId,
}

impl<'a> Service<'a> {
    #[must_use]
    pub const fn new(motion: Motion<'a>, board: BoardId) -> Self {
        Self { motion, board }
    }

    /// Handle a framed request whose checksum has already been verified.
    ///
    /// # Errors
    ///
    /// Returns the command or capacity error to report back to the sender.
    pub fn handle(&self, message_type: u8, payload: &[u8]) -> Result<Response> {
        match MessageType::try_from(message_type)? {
            MessageType::Ping => Ok(Response::empty(MessageType::Pong)),
            MessageType::SelfTest => Ok(Response {
                kind: MessageType::SelfTestResult,
                payload: self.self_test()?,
            }),
            MessageType::ReadValue => Ok(Response {
                kind: MessageType::Value,
                payload: self.read_value(),
            }),
            MessageType::SetCoefficients => {
                let coefficients = Coefficients::parse(payload)?;
                self.motion.apply_coefficients(&coefficients)?;
                info!(
                    "coefficients kp={} ki={} kd={}",
                    coefficients.kp, coefficients.ki, coefficients.kd
                );
                Ok(Response::empty(MessageType::SetCoefficientsAck))
            }
            MessageType::SetSetpoints => {
                let batch = SetpointBatch::parse(payload)?;
                self.motion.enqueue(&batch).inspect_err(|err| {
                    warn!("setpoint batch rejected: {:?}", err);
                })?;
                Ok(Response::empty(MessageType::SetSetpointsAck))
            }
            MessageType::Sleep => {
                self.motion.halt()?;
                Ok(Response::empty(MessageType::SleepAck))
            }
            other @ (MessageType::Pong
            | MessageType::SelfTestResult
            | MessageType::Value
            | MessageType::SetCoefficientsAck
            | MessageType::SetSetpointsAck
            | MessageType::SleepAck
            | MessageType::Error) => Err(Error::UnknownMessageType(u8::from(other))),
        }
    }

    /// Handle a single-byte terminal diagnostic; the reply is sent unframed.
    #[must_use]
    pub fn diagnostic(&self, kind: DiagnosticKind) -> ReplyPayload {
        match kind {
            DiagnosticKind::Ping => {
                let mut reply = Vec::new();
                let _ = reply.push(u8::from(MessageType::Pong));
                reply
            }
            DiagnosticKind::SelfTest => self.self_test().unwrap_or_else(text_line),
            DiagnosticKind::ReadValue => self.read_value(),
        }
    }

    /// Queue the canned bench motion and return the banner text.
    fn self_test(&self) -> Result<ReplyPayload> {
        let (hold, low, high) = if self.board.uses_pulse_step() {
            (
                PulseStep::new(10, 63).to_target(),
                PulseStep::new(10, 10).to_target(),
                PulseStep::new(10, 80).to_target(),
            )
        } else {
            (15488, 1500, 10000)
        };

        let park = SetpointBatch::new(0, LOOP_INFINITE, &[Setpoint::new(LOOP_INFINITE, hold)])?;
        let swing = SetpointBatch::new(
            2000,
            4,
            &[Setpoint::new(1000, low), Setpoint::new(2000, high)],
        )?;
        self.motion.enqueue_all(&[park, swing])?;

        info!("self-test queued");
        Ok(Vec::from_slice(SELF_TEST_BANNER.as_bytes()).unwrap_or_default())
    }

    fn read_value(&self) -> ReplyPayload {
        text_line(Position(self.motion.current_position()))
    }
}

struct Position(f32);

impl core::fmt::Display for Position {
    fn fmt(&self, formatter: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(formatter, "{:.4}", self.0)
    }
}

/// Render `value` followed by CRLF, truncated to the reply capacity.
fn text_line(value: impl core::fmt::Display) -> ReplyPayload {
    let mut text: heapless::String<MAX_REPLY_PAYLOAD> = heapless::String::new();
    let _ = write!(text, "{value}\r\n");
    text.into_bytes()
}
