use derive_more::derive::{Display, Error};

/// A specialized `Result` where the error is this crate's `Error` type.
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Short signed code carried in an `Error` reply frame.
pub type ErrorCode = i16;

/// Define a unified error type for this crate.
#[derive(Debug, Display, Error, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    // Framing: recovered locally by dropping the frame, never replied.
    #[display("Timed out waiting for bus data")]
    Timeout,

    #[display("Frame checksum mismatch")]
    ChecksumMismatch,

    #[display("Bus transceiver error")]
    Bus,

    // Capacity
    #[display("Setpoint queue is full")]
    QueueFull,

    #[display("Setpoint pool is exhausted")]
    PoolExhausted,

    #[display("Payload of {_0} bytes exceeds the maximum")]
    PayloadTooLarge(#[error(not(source))] u16),

    // Command
    #[display("Unknown message type {_0:#x}")]
    UnknownMessageType(#[error(not(source))] u8),

    #[display("Active renderer has no PID state")]
    NotPidRenderer,

    #[display("Malformed payload")]
    InvalidPayload,

    // Boot
    #[display("Address straps do not name a known board")]
    InvalidIdentity,
}

impl Error {
    /// Wire code for errors that are reported back to the sender.
    ///
    /// Framing and boot errors return `None`: the sender of a damaged frame
    /// cannot be identified, and a board without identity never replies.
    #[must_use]
    pub const fn code(self) -> Option<ErrorCode> {
        match self {
            Self::QueueFull => Some(-1),
            Self::PoolExhausted => Some(-2),
            Self::PayloadTooLarge(_) => Some(-3),
            Self::UnknownMessageType(_) => Some(-4),
            Self::NotPidRenderer => Some(-5),
            Self::InvalidPayload => Some(-6),
            Self::Timeout | Self::ChecksumMismatch | Self::Bus | Self::InvalidIdentity => None,
        }
    }
}

#[cfg(all(test, not(target_os = "none")))]
mod tests {
    use super::*;

    #[test]
    fn framing_errors_are_never_replied() {
        assert_eq!(Error::Timeout.code(), None);
        assert_eq!(Error::ChecksumMismatch.code(), None);
        assert_eq!(Error::Bus.code(), None);
        assert_eq!(Error::InvalidIdentity.code(), None);
    }

    #[test]
    fn reported_errors_have_distinct_negative_codes() {
        let codes = [
            Error::QueueFull,
            Error::PoolExhausted,
            Error::PayloadTooLarge(2000),
            Error::UnknownMessageType(0x42),
            Error::NotPidRenderer,
            Error::InvalidPayload,
        ]
        .map(|err| err.code().unwrap());
        for (i, code) in codes.iter().enumerate() {
            assert!(*code < 0, "code {code} should be negative");
            assert!(
                !codes[i + 1..].contains(code),
                "code {code} is used twice"
            );
        }
    }
}
