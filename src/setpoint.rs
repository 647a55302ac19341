//! Timed motion targets and the batches that carry them.

use heapless::Vec;

use crate::error::{Error, Result};
use crate::shared_constants::{
    LOOP_INFINITE, MAX_SETPOINTS, SETPOINT_BATCH_HEADER_LEN, SETPOINT_WIRE_LEN,
};

/// Hold `target` for `duration` ticks. A zero duration plays for one tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Setpoint {
    pub duration: u16,
    pub target: u16,
}

impl Setpoint {
    #[must_use]
    pub const fn new(duration: u16, target: u16) -> Self {
        Self { duration, target }
    }
}

/// Pulse-step view of a setpoint target.
///
/// The low byte is the pulse length in ticks; the high byte is the signed
/// step drive held once the pulse ends.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PulseStep {
    pub pulse_duration: u8,
    pub step: i8,
}

impl PulseStep {
    #[must_use]
    pub const fn new(pulse_duration: u8, step: i8) -> Self {
        Self {
            pulse_duration,
            step,
        }
    }

    #[must_use]
    pub const fn from_target(target: u16) -> Self {
        let [pulse_duration, step] = target.to_le_bytes();
        Self {
            pulse_duration,
            step: i8::from_le_bytes([step]),
        }
    }

    #[must_use]
    pub const fn to_target(self) -> u16 {
        let [step] = self.step.to_le_bytes();
        u16::from_le_bytes([self.pulse_duration, step])
    }
}

/// A sequence of setpoints played `loop_count` times after `delay` ticks.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SetpointBatch {
    pub delay: u16,
    pub loop_count: u16,
    pub setpoints: Vec<Setpoint, MAX_SETPOINTS>,
}

impl SetpointBatch {
    /// Empty batch with no delay; activating it halts motion.
    pub const STOP: Self = Self {
        delay: 0,
        loop_count: 0,
        setpoints: Vec::new(),
    };

    /// Build a batch from a slice of setpoints.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPayload`] if there are more than `MAX_SETPOINTS`.
    pub fn new(delay: u16, loop_count: u16, setpoints: &[Setpoint]) -> Result<Self> {
        Ok(Self {
            delay,
            loop_count,
            setpoints: Vec::from_slice(setpoints).map_err(|()| Error::InvalidPayload)?,
        })
    }

    #[must_use]
    pub const fn is_infinite(&self) -> bool {
        self.loop_count == LOOP_INFINITE
    }

    /// Parse `{delay, loop, count, [{duration, target}; count]}`, all little-endian.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPayload`] if the length disagrees with `count`
    /// or `count` exceeds `MAX_SETPOINTS`.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let (header, body) = payload
            .split_first_chunk::<SETPOINT_BATCH_HEADER_LEN>()
            .ok_or(Error::InvalidPayload)?;
        let [d0, d1, l0, l1, c0, c1] = *header;
        let delay = u16::from_le_bytes([d0, d1]);
        let loop_count = u16::from_le_bytes([l0, l1]);
        let count = usize::from(u16::from_le_bytes([c0, c1]));

        if count > MAX_SETPOINTS || body.len() != count.saturating_mul(SETPOINT_WIRE_LEN) {
            return Err(Error::InvalidPayload);
        }

        let mut setpoints = Vec::new();
        for chunk in body.chunks_exact(SETPOINT_WIRE_LEN) {
            let &[u0, u1, t0, t1] = chunk else {
                return Err(Error::InvalidPayload);
            };
            setpoints
                .push(Setpoint::new(
                    u16::from_le_bytes([u0, u1]),
                    u16::from_le_bytes([t0, t1]),
                ))
                .map_err(|_| Error::InvalidPayload)?;
        }

        Ok(Self {
            delay,
            loop_count,
            setpoints,
        })
    }

    /// Append the wire form of this batch to `out`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PayloadTooLarge`] if `out` runs out of room.
    #[cfg(test)]
    pub fn encode<const N: usize>(&self, out: &mut Vec<u8, N>) -> Result<()> {
        let count = u16::try_from(self.setpoints.len()).map_err(|_| Error::InvalidPayload)?;
        let too_large = |_| Error::PayloadTooLarge(u16::try_from(N).unwrap_or(u16::MAX));
        out.extend_from_slice(&self.delay.to_le_bytes())
            .map_err(too_large)?;
        out.extend_from_slice(&self.loop_count.to_le_bytes())
            .map_err(too_large)?;
        out.extend_from_slice(&count.to_le_bytes())
            .map_err(too_large)?;
        for setpoint in &self.setpoints {
            out.extend_from_slice(&setpoint.duration.to_le_bytes())
                .map_err(too_large)?;
            out.extend_from_slice(&setpoint.target.to_le_bytes())
                .map_err(too_large)?;
        }
        Ok(())
    }
}

#[cfg(all(test, not(target_os = "none")))]
mod tests {
    use super::*;
    use crate::shared_constants::MAX_PAYLOAD;

    #[test]
    fn parses_two_setpoint_batch() {
        let payload = [
            0x00, 0x00, // delay
            0x02, 0x00, // loop
            0x02, 0x00, // count
            0x64, 0x00, 0xE8, 0x03, // {100, 1000}
            0xC8, 0x00, 0xD0, 0x07, // {200, 2000}
        ];
        let batch = SetpointBatch::parse(&payload).unwrap();
        assert_eq!(batch.delay, 0);
        assert_eq!(batch.loop_count, 2);
        assert_eq!(
            batch.setpoints.as_slice(),
            &[Setpoint::new(100, 1000), Setpoint::new(200, 2000)]
        );
        assert!(!batch.is_infinite());
    }

    #[test]
    fn rejects_count_that_disagrees_with_length() {
        // count says 2, only one setpoint present
        let payload = [0, 0, 1, 0, 2, 0, 1, 0, 1, 0];
        assert_eq!(SetpointBatch::parse(&payload), Err(Error::InvalidPayload));
        // trailing garbage
        let payload = [0, 0, 1, 0, 1, 0, 1, 0, 1, 0, 9];
        assert_eq!(SetpointBatch::parse(&payload), Err(Error::InvalidPayload));
        // short header
        assert_eq!(SetpointBatch::parse(&[0, 0, 1]), Err(Error::InvalidPayload));
    }

    #[test]
    fn empty_batch_is_valid() {
        let batch = SetpointBatch::parse(&[5, 0, 1, 0, 0, 0]).unwrap();
        assert_eq!(batch.delay, 5);
        assert!(batch.setpoints.is_empty());
    }

    #[test]
    fn largest_batch_fits_one_payload() {
        let setpoints = [Setpoint::new(1, 2); MAX_SETPOINTS];
        let batch = SetpointBatch::new(0, LOOP_INFINITE, &setpoints).unwrap();
        let mut wire: Vec<u8, MAX_PAYLOAD> = Vec::new();
        batch.encode(&mut wire).unwrap();
        assert!(wire.len() <= MAX_PAYLOAD);
        assert_eq!(SetpointBatch::parse(&wire).unwrap(), batch);
    }

    #[test]
    fn pulse_step_splits_target_bytes() {
        let ps = PulseStep::from_target(0x3F0A);
        assert_eq!(ps, PulseStep::new(10, 63));
        assert_eq!(PulseStep::from_target(0xF605), PulseStep::new(5, -10));
        assert_eq!(PulseStep::new(5, -10).to_target(), 0xF605);
    }
}
