//! Motor and position-sensor seams, plus the boot-time calibration sweep.
//!
//! Positions are radians. Raw sensor angles are shifted by the calibrated
//! offset and wrapped into `[0, TAU)`, so the lower end stop reads zero.

use core::f32::consts::TAU;

use embedded_hal::delay::DelayNs;
use micromath::F32Ext;

use crate::shared_constants::{
    CALIBRATION_DRIVE, CALIBRATION_MARGIN, CALIBRATION_SETTLE_MS, DRIVE_LIMIT,
};

/// Smallest target the PID renderer will command; anything below rests at zero.
const MIN_TARGET: f32 = 0.01;

/// Angular position sensor.
pub trait PositionSensor {
    /// Raw shaft angle in radians.
    fn sample(&mut self) -> f32;
}

/// Signed motor drive.
pub trait MotorDrive {
    /// Apply `drive` in `-127..=127`; `-128` is treated as `-127`.
    fn set_drive(&mut self, drive: i8);
}

/// Clamp a drive command into the symmetric range.
#[must_use]
pub const fn clamp_drive(drive: i8) -> i8 {
    if drive < -DRIVE_LIMIT { -DRIVE_LIMIT } else { drive }
}

/// Wrap an angle into `[0, TAU)`.
#[must_use]
pub fn wrap_angle(angle: f32) -> f32 {
    if !angle.is_finite() {
        return 0.0;
    }
    let wrapped = F32Ext::rem_euclid(angle, TAU);
    // rem_euclid can round up to TAU for tiny negative inputs
    if wrapped >= TAU { 0.0 } else { wrapped }
}

/// Mapping from raw sensor angles to the calibrated working range.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Calibration {
    /// Raw angle at the lower end stop.
    pub offset: f32,
    /// Calibrated angle at the upper end stop.
    pub upper_bound: f32,
    /// Fraction of the range kept clear at each end.
    pub margin: f32,
}

impl Calibration {
    /// Full circle, no offset; used before calibration has run.
    pub const UNCALIBRATED: Self = Self {
        offset: 0.0,
        upper_bound: TAU,
        margin: CALIBRATION_MARGIN,
    };

    /// Build from the two raw end-stop readings.
    #[must_use]
    pub fn from_end_stops(offset: f32, limit: f32) -> Self {
        let offset = if offset.is_finite() { offset } else { 0.0 };
        Self {
            offset,
            upper_bound: wrap_angle(limit - offset),
            margin: CALIBRATION_MARGIN,
        }
    }

    /// Calibrated position of a raw sensor angle.
    #[must_use]
    pub fn apply(&self, raw: f32) -> f32 {
        wrap_angle(raw - self.offset)
    }

    /// Map a raw `0..=65535` target into the calibrated range, inset by the margin.
    #[must_use]
    pub fn scale(&self, target: u16) -> f32 {
        let fraction = f32::from(target) / f32::from(u16::MAX);
        let span = 1.0 - 2.0 * self.margin;
        let angle = (fraction * span + self.margin) * self.upper_bound;
        if !angle.is_finite() || angle < MIN_TARGET {
            0.0
        } else {
            angle.min(self.upper_bound)
        }
    }
}

impl Default for Calibration {
    fn default() -> Self {
        Self::UNCALIBRATED
    }
}

/// A sensor that reports calibrated positions.
pub struct CalibratedSensor<S> {
    sensor: S,
    calibration: Calibration,
}

impl<S: PositionSensor> CalibratedSensor<S> {
    pub const fn new(sensor: S, calibration: Calibration) -> Self {
        Self {
            sensor,
            calibration,
        }
    }

    #[must_use]
    pub const fn calibration(&self) -> Calibration {
        self.calibration
    }
}

impl<S: PositionSensor> PositionSensor for CalibratedSensor<S> {
    fn sample(&mut self) -> f32 {
        self.calibration.apply(self.sensor.sample())
    }
}

/// Drive the motor against each end stop and record the raw angles.
///
/// `direction` is `1`, or `-1` for boards whose motor is mounted reversed.
/// Blocks for two settle periods and leaves the motor stopped.
pub fn calibrate<S, M, D>(sensor: &mut S, motor: &mut M, delay: &mut D, direction: i8) -> Calibration
where
    S: PositionSensor,
    M: MotorDrive,
    D: DelayNs,
{
    let toward_lower = if direction < 0 {
        -CALIBRATION_DRIVE
    } else {
        CALIBRATION_DRIVE
    };

    motor.set_drive(toward_lower);
    delay.delay_ms(CALIBRATION_SETTLE_MS);
    let offset = sensor.sample();

    motor.set_drive(-toward_lower);
    delay.delay_ms(CALIBRATION_SETTLE_MS);
    let limit = sensor.sample();

    motor.set_drive(0);
    Calibration::from_end_stops(offset, limit)
}
