//! Bounded PID position controller.
//!
//! Works in `no_std` and does not allocate memory. Gains are pre-normalized
//! for a fixed tick rate, so `update` takes no time step.

use crate::shared_constants::{DRIVE_LIMIT_F32, MAX_SETPOINT_STEP};

/// PID controller over a continuous position domain, in radians.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Pid {
    kp: f32,
    /// Integral gain per tick.
    ki: f32,
    /// Derivative gain per second.
    kd: f32,

    setpoint: f32,
    last_error: f32,
    integrator: f32,
}

impl Pid {
    /// A controller with zero gains; it outputs zero until configured.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            kp: 0.0,
            ki: 0.0,
            kd: 0.0,
            setpoint: 0.0,
            last_error: 0.0,
            integrator: 0.0,
        }
    }

    /// Store gains, normalizing `ki` and `kd` for a `tick_hz` update rate.
    pub fn set_coefficients(&mut self, kp: f32, ki: f32, kd: f32, tick_hz: u32) {
        #[expect(clippy::cast_precision_loss, reason = "tick rates are small")]
        let frequency = tick_hz.max(1) as f32;
        self.kp = kp;
        self.ki = ki / frequency;
        self.kd = kd * frequency;
    }

    #[must_use]
    pub const fn coefficients(&self) -> (f32, f32, f32) {
        (self.kp, self.ki, self.kd)
    }

    #[must_use]
    pub const fn setpoint(&self) -> f32 {
        self.setpoint
    }

    #[must_use]
    pub const fn integrator(&self) -> f32 {
        self.integrator
    }

    /// Jump the setpoint to `position` and clear history.
    pub fn reset(&mut self, position: f32) {
        self.setpoint = if position.is_finite() { position } else { 0.0 };
        self.last_error = 0.0;
        self.integrator = 0.0;
    }

    /// Move toward `target` by at most `MAX_SETPOINT_STEP`; returns the accepted setpoint.
    pub fn set_setpoint(&mut self, target: f32) -> f32 {
        if !self.setpoint.is_finite() {
            self.setpoint = 0.0;
        }
        if target.is_finite() {
            let step = (target - self.setpoint).clamp(-MAX_SETPOINT_STEP, MAX_SETPOINT_STEP);
            self.setpoint += step;
        }
        self.setpoint
    }

    /// One control step; the result is always finite and within the drive range.
    pub fn update(&mut self, position: f32) -> f32 {
        let mut error = self.setpoint - position;
        if !error.is_finite() {
            error = 0.0;
        }

        self.integrator = (self.integrator + error).clamp(-DRIVE_LIMIT_F32, DRIVE_LIMIT_F32);
        if !self.integrator.is_finite() {
            self.integrator = 0.0;
        }

        let mut output = self.kp * error
            + self.ki * self.integrator
            + self.kd * (error - self.last_error);
        output = output.clamp(-DRIVE_LIMIT_F32, DRIVE_LIMIT_F32);
        if !output.is_finite() {
            output = 0.0;
        }

        self.last_error = error;
        output
    }
}

impl Default for Pid {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(all(test, not(target_os = "none")))]
mod tests {
    use super::*;

    fn bounded(value: f32, limit: f32) -> bool {
        value.is_finite() && (-limit..=limit).contains(&value)
    }

    #[test]
    fn gains_are_normalized_by_tick_rate() {
        let mut pid = Pid::new();
        pid.set_coefficients(2.0, 10.0, 0.5, 1000);
        let (kp, ki, kd) = pid.coefficients();
        assert!((kp - 2.0).abs() < 1e-6);
        assert!((ki - 0.01).abs() < 1e-6);
        assert!((kd - 500.0).abs() < 1e-3);
    }

    #[test]
    fn setpoint_moves_at_most_one_degree_per_call() {
        let mut pid = Pid::new();
        let accepted = pid.set_setpoint(3.0);
        assert!((accepted - MAX_SETPOINT_STEP).abs() < 1e-6);
        let accepted = pid.set_setpoint(-3.0);
        assert!(accepted.abs() < 1e-6, "one step back from +1 degree is zero");
        let accepted = pid.set_setpoint(0.001);
        assert!((accepted - 0.001).abs() < 1e-6, "small moves are taken whole");
    }

    #[test]
    fn non_finite_setpoint_is_ignored() {
        let mut pid = Pid::new();
        pid.reset(0.5);
        assert!((pid.set_setpoint(f32::NAN) - 0.5).abs() < 1e-6);
        assert!((pid.set_setpoint(f32::INFINITY) - 0.5).abs() < 1e-6);
        pid.reset(f32::NAN);
        assert!(pid.setpoint().abs() < 1e-6);
    }

    #[test]
    fn proportional_response_saturates() {
        let mut pid = Pid::new();
        pid.set_coefficients(10.0, 0.0, 0.0, 1000);
        pid.reset(1.0);
        assert!((pid.update(0.5) - 5.0).abs() < 1e-4);
        assert!((pid.update(-100.0) - DRIVE_LIMIT_F32).abs() < 1e-4);
        assert!((pid.update(100.0) + DRIVE_LIMIT_F32).abs() < 1e-4);
    }

    #[test]
    fn output_and_integrator_stay_bounded_under_hostile_input() {
        let mut pid = Pid::new();
        pid.set_coefficients(1.0e6, 1.0e9, 1.0e3, 1000);
        let inputs = [
            0.0,
            f32::NAN,
            f32::INFINITY,
            f32::NEG_INFINITY,
            f32::MAX,
            f32::MIN,
            1.0e-30,
            -3.0,
            f32::NAN,
            7.0,
        ];
        let targets = [f32::MAX, f32::NAN, -1.0e30, 2.0, f32::NEG_INFINITY];
        for round in 0..200 {
            let _ = pid.set_setpoint(targets[round % targets.len()]);
            let output = pid.update(inputs[round % inputs.len()]);
            assert!(bounded(output, DRIVE_LIMIT_F32), "round {round}: output {output}");
            assert!(
                bounded(pid.integrator(), DRIVE_LIMIT_F32),
                "round {round}: integrator {}",
                pid.integrator()
            );
        }
    }

    #[test]
    fn derivative_opposes_error_change() {
        let mut pid = Pid::new();
        pid.set_coefficients(0.0, 0.0, 0.001, 1000);
        pid.reset(0.0);
        let _ = pid.update(0.0);
        // error goes from 0 to -0.1: derivative term is kd * -0.1 = -0.1
        let output = pid.update(0.1);
        assert!((output + 0.1).abs() < 1e-4, "got {output}");
    }
}
