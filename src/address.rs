//! Board identity, read once from the address straps at boot.
//!
//! Each board on the bus has a fixed single-bit address code and matches
//! frames by exact comparison; there is no broadcast address.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};

use crate::error::{Error, Result};

/// Settling time after driving the strap output before sampling.
const STRAP_SETTLE_US: u32 = 10;

/// The boards of the creature, from rear to head.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BoardId {
    Ribs,
    Purr,
    Spine,
    HeadYaw,
    HeadPitch,
    Invalid,
}

impl BoardId {
    pub const ALL: [Self; 5] = [
        Self::Ribs,
        Self::Purr,
        Self::Spine,
        Self::HeadYaw,
        Self::HeadPitch,
    ];

    /// Map sampled strap bits, ordered `H1 H0 L1 L0`, to a board.
    ///
    /// The table was measured on the harness rather than derived.
    #[must_use]
    pub const fn from_strap_bits(bits: u8) -> Self {
        match bits {
            0b0000 => Self::HeadPitch,
            0b1010 => Self::HeadYaw,
            0b0101 => Self::Spine,
            0b1111 => Self::Purr,
            0b1101 => Self::Ribs,
            _ => Self::Invalid,
        }
    }

    /// Address byte carried in frame headers.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Ribs => 0x01,
            Self::Purr => 0x02,
            Self::Spine => 0x04,
            Self::HeadYaw => 0x08,
            Self::HeadPitch => 0x10,
            Self::Invalid => 0x00,
        }
    }

    /// One-based board number used by the single-byte diagnostic codes.
    #[must_use]
    pub const fn number(self) -> Option<u8> {
        match self {
            Self::Ribs => Some(1),
            Self::Purr => Some(2),
            Self::Spine => Some(3),
            Self::HeadYaw => Some(4),
            Self::HeadPitch => Some(5),
            Self::Invalid => None,
        }
    }

    /// The Purr board drives a vibration motor with pulse-step control.
    #[must_use]
    pub const fn uses_pulse_step(self) -> bool {
        matches!(self, Self::Purr)
    }

    /// Direction the motor turns to reach its lower end stop.
    #[must_use]
    pub const fn drive_direction(self) -> i8 {
        match self {
            Self::HeadYaw => -1,
            _ => 1,
        }
    }
}

/// Sample the address straps.
///
/// The strap output is driven low and then high; each phase reads both strap
/// inputs, giving `H1 H0 L1 L0`. Call once at boot before any interrupt
/// handlers run. The caller releases the strap output afterwards.
///
/// # Errors
///
/// Returns [`Error::InvalidIdentity`] if a pin cannot be driven or read.
pub fn read_strap_bits<O, I0, I1, D>(
    addrout: &mut O,
    addr0: &mut I0,
    addr1: &mut I1,
    delay: &mut D,
) -> Result<u8>
where
    O: OutputPin,
    I0: InputPin,
    I1: InputPin,
    D: DelayNs,
{
    let mut bits = 0_u8;

    addrout.set_low().map_err(|_| Error::InvalidIdentity)?;
    delay.delay_us(STRAP_SETTLE_US);
    if addr0.is_high().map_err(|_| Error::InvalidIdentity)? {
        bits |= 0b0001;
    }
    if addr1.is_high().map_err(|_| Error::InvalidIdentity)? {
        bits |= 0b0010;
    }

    addrout.set_high().map_err(|_| Error::InvalidIdentity)?;
    delay.delay_us(STRAP_SETTLE_US);
    if addr0.is_high().map_err(|_| Error::InvalidIdentity)? {
        bits |= 0b0100;
    }
    if addr1.is_high().map_err(|_| Error::InvalidIdentity)? {
        bits |= 0b1000;
    }

    Ok(bits)
}

/// What a single leading byte means when it is one of the printable diagnostic codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DiagnosticKind {
    Ping,
    SelfTest,
    ReadValue,
}

/// A decoded diagnostic byte: what was asked, and of which board.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub board: BoardId,
}

impl Diagnostic {
    /// Decode a terminal-typed diagnostic byte.
    ///
    /// Board `n` answers `'0' + n` (ping), `'a' + n - 1` (self-test) and
    /// `'A' + n - 1` (read value).
    #[must_use]
    pub fn decode(byte: u8) -> Option<Self> {
        let (kind, number) = match byte {
            b'1'..=b'5' => (DiagnosticKind::Ping, byte - b'0'),
            b'a'..=b'e' => (DiagnosticKind::SelfTest, byte - b'a' + 1),
            b'A'..=b'E' => (DiagnosticKind::ReadValue, byte - b'A' + 1),
            _ => return None,
        };
        let board = BoardId::ALL
            .into_iter()
            .find(|board| board.number() == Some(number))?;
        Some(Self { kind, board })
    }

    /// The byte a given board answers to for `kind`.
    #[must_use]
    pub fn code(kind: DiagnosticKind, board: BoardId) -> Option<u8> {
        let number = board.number()?;
        Some(match kind {
            DiagnosticKind::Ping => b'0' + number,
            DiagnosticKind::SelfTest => b'a' + number - 1,
            DiagnosticKind::ReadValue => b'A' + number - 1,
        })
    }
}

/// This board's validated identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Address {
    board: BoardId,
}

impl Address {
    /// Wrap a strap reading.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIdentity`] for [`BoardId::Invalid`]; a board
    /// without a valid address must not join the bus.
    pub const fn new(board: BoardId) -> Result<Self> {
        match board {
            BoardId::Invalid => Err(Error::InvalidIdentity),
            _ => Ok(Self { board }),
        }
    }

    #[must_use]
    pub const fn board(self) -> BoardId {
        self.board
    }

    #[must_use]
    pub const fn code(self) -> u8 {
        self.board.code()
    }

    /// Exact match against a frame's address byte.
    #[must_use]
    pub const fn is_self(self, address: u8) -> bool {
        address == self.board.code()
    }

    /// True if `diagnostic` is addressed to this board.
    #[must_use]
    pub fn owns(self, diagnostic: Diagnostic) -> bool {
        diagnostic.board == self.board
    }
}

#[cfg(all(test, not(target_os = "none")))]
mod tests {
    use core::cell::Cell;
    use core::convert::Infallible;

    use super::*;

    #[test]
    fn strap_table_is_exact() {
        assert_eq!(BoardId::from_strap_bits(0b0000), BoardId::HeadPitch);
        assert_eq!(BoardId::from_strap_bits(0b1010), BoardId::HeadYaw);
        assert_eq!(BoardId::from_strap_bits(0b0101), BoardId::Spine);
        assert_eq!(BoardId::from_strap_bits(0b1111), BoardId::Purr);
        assert_eq!(BoardId::from_strap_bits(0b1101), BoardId::Ribs);

        let mapped = [0b0000, 0b1010, 0b0101, 0b1111, 0b1101];
        for bits in 0..16_u8 {
            if !mapped.contains(&bits) {
                assert_eq!(
                    BoardId::from_strap_bits(bits),
                    BoardId::Invalid,
                    "pattern {bits:04b} should not map to a board"
                );
            }
        }
    }

    #[test]
    fn is_self_matches_only_own_code() {
        for board in BoardId::ALL {
            let address = Address::new(board).unwrap();
            for other in 0..=u8::MAX {
                assert_eq!(
                    address.is_self(other),
                    other == board.code(),
                    "{board:?} vs {other:#x}"
                );
            }
        }
    }

    #[test]
    fn invalid_board_has_no_address() {
        assert_eq!(Address::new(BoardId::Invalid), Err(Error::InvalidIdentity));
    }

    #[test]
    fn diagnostic_codes_round_trip() {
        for board in BoardId::ALL {
            for kind in [
                DiagnosticKind::Ping,
                DiagnosticKind::SelfTest,
                DiagnosticKind::ReadValue,
            ] {
                let code = Diagnostic::code(kind, board).unwrap();
                assert_eq!(Diagnostic::decode(code), Some(Diagnostic { kind, board }));
            }
        }
        assert_eq!(Diagnostic::code(DiagnosticKind::Ping, BoardId::Ribs), Some(b'1'));
        assert_eq!(Diagnostic::code(DiagnosticKind::SelfTest, BoardId::Spine), Some(b'c'));
        assert_eq!(Diagnostic::code(DiagnosticKind::ReadValue, BoardId::HeadPitch), Some(b'E'));
    }

    #[test]
    fn frame_address_bytes_are_not_diagnostics() {
        for board in BoardId::ALL {
            assert_eq!(Diagnostic::decode(board.code()), None);
        }
        assert_eq!(Diagnostic::decode(b'0'), None);
        assert_eq!(Diagnostic::decode(b'6'), None);
        assert_eq!(Diagnostic::decode(b'f'), None);
    }

    /// Strap output whose level is visible to the inputs wired to it.
    struct StrapOut<'a> {
        level: &'a Cell<bool>,
    }

    impl embedded_hal::digital::ErrorType for StrapOut<'_> {
        type Error = Infallible;
    }

    impl OutputPin for StrapOut<'_> {
        fn set_low(&mut self) -> Result<(), Infallible> {
            self.level.set(false);
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Infallible> {
            self.level.set(true);
            Ok(())
        }
    }

    /// Strap input: either left floating onto the strap output or tied to a rail.
    enum StrapIn<'a> {
        Floating(&'a Cell<bool>),
        Tied(bool),
    }

    impl embedded_hal::digital::ErrorType for StrapIn<'_> {
        type Error = Infallible;
    }

    impl InputPin for StrapIn<'_> {
        fn is_high(&mut self) -> Result<bool, Infallible> {
            Ok(match self {
                Self::Floating(level) => level.get(),
                Self::Tied(high) => *high,
            })
        }

        fn is_low(&mut self) -> Result<bool, Infallible> {
            self.is_high().map(|high| !high)
        }
    }

    struct NoDelay;

    impl DelayNs for NoDelay {
        fn delay_ns(&mut self, _ns: u32) {}
    }

    #[test]
    fn strap_reading_samples_both_phases() {
        let level = Cell::new(false);
        let mut addrout = StrapOut { level: &level };

        // ADDR0 floating onto ADDROUT, ADDR1 tied high.
        let bits = read_strap_bits(
            &mut addrout,
            &mut StrapIn::Floating(&level),
            &mut StrapIn::Tied(true),
            &mut NoDelay,
        )
        .unwrap();
        assert_eq!(bits, 0b1110);

        // Both tied high.
        let bits = read_strap_bits(
            &mut addrout,
            &mut StrapIn::Tied(true),
            &mut StrapIn::Tied(true),
            &mut NoDelay,
        )
        .unwrap();
        assert_eq!(BoardId::from_strap_bits(bits), BoardId::Purr);

        // Both tied low.
        let bits = read_strap_bits(
            &mut addrout,
            &mut StrapIn::Tied(false),
            &mut StrapIn::Tied(false),
            &mut NoDelay,
        )
        .unwrap();
        assert_eq!(BoardId::from_strap_bits(bits), BoardId::HeadPitch);
    }
}
