//! Per-tick control strategies plugged into the motion scheduler.
//!
//! Every strategy follows the same four phases each tick: `reset` on
//! (re)activation, `before_tick` with the filtered position, `compute` with the
//! raw setpoint target, and `after_tick` once the drive has been computed.

use crate::motor::{Calibration, clamp_drive};
use crate::pid::Pid;
use crate::protocol::Coefficients;
use crate::setpoint::PulseStep;
use crate::shared_constants::{DRIVE_LIMIT, TICK_HZ};

/// Continuous position control through a PID loop.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PidRender {
    pid: Pid,
    calibration: Calibration,
    position: f32,
    /// Target carried by a set-coefficients request; wins over the batch target.
    held: Option<u16>,
}

impl PidRender {
    #[must_use]
    pub const fn new(calibration: Calibration) -> Self {
        Self {
            pid: Pid::new(),
            calibration,
            position: 0.0,
            held: None,
        }
    }

    #[must_use]
    pub const fn pid(&self) -> &Pid {
        &self.pid
    }

    #[must_use]
    pub const fn calibration(&self) -> Calibration {
        self.calibration
    }

    /// Target that overrides the playing batch, if one was carried with the gains.
    #[must_use]
    pub const fn held_target(&self) -> Option<u16> {
        self.held
    }

    /// Apply new gains. A carried target is held in place of the batch target
    /// until the next batch activates.
    pub fn apply_coefficients(&mut self, coefficients: &Coefficients) {
        self.pid
            .set_coefficients(coefficients.kp, coefficients.ki, coefficients.kd, TICK_HZ);
        if coefficients.setpoint.is_some() {
            self.held = coefficients.setpoint;
        }
    }

    fn reset(&mut self, position: f32) {
        self.pid.reset(position);
        self.position = position;
    }

    fn compute(&mut self, target: u16) -> i8 {
        let target = self.held.unwrap_or(target);
        let _ = self.pid.set_setpoint(self.calibration.scale(target));
        drive_from(self.pid.update(self.position))
    }
}

/// Open-loop pulse then hold, for the vibration motor.
///
/// A change in target starts a full-drive pulse toward the new step for the
/// encoded pulse duration, after which the step value itself is the drive.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PulseStepRender {
    target: u16,
    pulse_remaining: u8,
    pulse_drive: i8,
}

impl PulseStepRender {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            target: 0,
            pulse_remaining: 0,
            pulse_drive: 0,
        }
    }

    fn reset(&mut self) {
        self.pulse_remaining = 0;
    }

    fn compute(&mut self, target: u16) -> i8 {
        if target != self.target {
            let previous = PulseStep::from_target(self.target);
            let next = PulseStep::from_target(target);
            self.target = target;
            self.pulse_drive = if previous.step < next.step {
                DRIVE_LIMIT
            } else {
                -DRIVE_LIMIT
            };
            self.pulse_remaining = next.pulse_duration;
        }

        if self.pulse_remaining > 0 {
            self.pulse_remaining -= 1;
            self.pulse_drive
        } else {
            clamp_drive(PulseStep::from_target(self.target).step)
        }
    }
}

/// The closed set of strategies the scheduler can drive.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Renderer {
    Pid(PidRender),
    PulseStep(PulseStepRender),
}

impl Renderer {
    #[must_use]
    pub const fn pid(calibration: Calibration) -> Self {
        Self::Pid(PidRender::new(calibration))
    }

    #[must_use]
    pub const fn pulse_step() -> Self {
        Self::PulseStep(PulseStepRender::new())
    }

    /// Called when the scheduler (re)activates after having no batch.
    pub fn reset(&mut self, position: f32) {
        match self {
            Self::Pid(render) => render.reset(position),
            Self::PulseStep(render) => render.reset(),
        }
    }

    /// Called each time a new batch becomes current.
    pub fn batch_activated(&mut self) {
        match self {
            Self::Pid(render) => render.held = None,
            Self::PulseStep(_) => {}
        }
    }

    /// Refresh cached inputs before the drive is computed.
    pub fn before_tick(&mut self, position: f32) {
        match self {
            Self::Pid(render) => render.position = position,
            Self::PulseStep(_) => {}
        }
    }

    /// Drive command for this tick.
    pub fn compute(&mut self, target: u16) -> i8 {
        match self {
            Self::Pid(render) => render.compute(target),
            Self::PulseStep(render) => render.compute(target),
        }
    }

    /// Called after the drive has been computed.
    pub fn after_tick(&mut self) {
        match self {
            Self::Pid(_) | Self::PulseStep(_) => {}
        }
    }

    #[must_use]
    pub fn as_pid_mut(&mut self) -> Option<&mut PidRender> {
        match self {
            Self::Pid(render) => Some(render),
            Self::PulseStep(_) => None,
        }
    }
}

/// Convert a bounded PID output to a drive command.
fn drive_from(output: f32) -> i8 {
    let limit = f32::from(DRIVE_LIMIT);
    let clamped = if output.is_finite() {
        output.clamp(-limit, limit)
    } else {
        0.0
    };
    #[expect(
        clippy::cast_possible_truncation,
        reason = "value is clamped to the i8 drive range"
    )]
    let drive = clamped as i8;
    drive
}

#[cfg(all(test, not(target_os = "none")))]
mod tests {
    use super::*;
    use crate::shared_constants::MAX_SETPOINT_STEP;

    #[test]
    fn pulse_step_pulses_toward_new_step_then_holds() {
        let mut render = Renderer::pulse_step();
        render.reset(0.0);

        let up = PulseStep::new(3, 40).to_target();
        let drives: [i8; 5] = core::array::from_fn(|_| render.compute(up));
        assert_eq!(drives, [127, 127, 127, 40, 40]);

        let down = PulseStep::new(2, 10).to_target();
        let drives: [i8; 4] = core::array::from_fn(|_| render.compute(down));
        assert_eq!(drives, [-127, -127, 10, 10]);
    }

    #[test]
    fn pulse_step_repeated_target_does_not_repulse() {
        let mut render = Renderer::pulse_step();
        let target = PulseStep::new(1, -20).to_target();
        assert_eq!(render.compute(target), -127);
        assert_eq!(render.compute(target), -20);
        render.reset(0.0);
        assert_eq!(render.compute(target), -20);
    }

    #[test]
    fn pulse_step_zero_duration_goes_straight_to_step() {
        let mut render = Renderer::pulse_step();
        assert_eq!(render.compute(PulseStep::new(0, 63).to_target()), 63);
    }

    #[test]
    fn pulse_step_clamps_most_negative_step() {
        let mut render = Renderer::pulse_step();
        assert_eq!(render.compute(PulseStep::new(0, i8::MIN).to_target()), -127);
    }

    #[test]
    fn pid_render_reset_seeds_setpoint_at_position() {
        let calibration = Calibration::from_end_stops(0.0, 3.0);
        let mut render = Renderer::pid(calibration);
        if let Some(pid) = render.as_pid_mut() {
            pid.apply_coefficients(&Coefficients {
                kp: 100.0,
                ki: 0.0,
                kd: 0.0,
                setpoint: None,
            });
        }
        render.reset(1.5);
        render.before_tick(1.5);
        // 0x8000 maps to the middle of the 0..3 rad range, where the shaft sits.
        assert_eq!(render.compute(0x8000), 0);
    }

    #[test]
    fn pid_render_drives_toward_target_and_is_rate_limited() {
        let calibration = Calibration::from_end_stops(0.0, 3.0);
        let mut render = Renderer::pid(calibration);
        if let Some(pid) = render.as_pid_mut() {
            pid.apply_coefficients(&Coefficients {
                kp: 1000.0,
                ki: 0.0,
                kd: 0.0,
                setpoint: None,
            });
        }
        render.reset(0.2);
        render.before_tick(0.2);
        let drive = render.compute(u16::MAX);
        assert!(drive > 0, "target above position drives forward");
        let Renderer::Pid(pid_render) = render else {
            panic!("expected the PID renderer");
        };
        let moved = pid_render.pid().setpoint() - 0.2;
        assert!(moved > 0.0 && moved <= MAX_SETPOINT_STEP + 1e-6);
    }

    #[test]
    fn carried_target_holds_until_next_batch() {
        let calibration = Calibration::from_end_stops(0.0, 3.0);
        let mut render = Renderer::pid(calibration);
        if let Some(pid) = render.as_pid_mut() {
            pid.apply_coefficients(&Coefficients {
                kp: 1000.0,
                ki: 0.0,
                kd: 0.0,
                setpoint: Some(u16::MAX),
            });
        }
        render.reset(1.5);
        for _ in 0..20 {
            render.before_tick(1.5);
            assert!(render.compute(0x8000) > 0, "held target wins over the batch");
        }

        render.batch_activated();
        render.reset(1.5);
        render.before_tick(1.5);
        assert_eq!(render.compute(0x8000), 0);
        let Renderer::Pid(pid_render) = render else {
            panic!("expected the PID renderer");
        };
        assert_eq!(pid_render.held_target(), None);
    }

    #[test]
    fn pulse_step_has_no_pid() {
        assert!(Renderer::pulse_step().as_pid_mut().is_none());
    }
}
