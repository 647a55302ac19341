use embassy_time::Duration;

/// Motion scheduler tick rate.
pub const TICK_HZ: u32 = 1000;
pub const TICK_PERIOD: Duration = Duration::from_hz(TICK_HZ as u64);

/// Largest payload accepted in one frame.
pub const MAX_PAYLOAD: usize = 1024;

/// Setpoint batches waiting behind the pending one.
pub const SETPOINT_QUEUE_DEPTH: usize = 8;
/// Queue depth plus one "current" and one "next" batch.
pub const BATCH_POOL_SIZE: usize = SETPOINT_QUEUE_DEPTH + 2;
/// `{delay, loop, count}` then four bytes per setpoint.
pub const SETPOINT_BATCH_HEADER_LEN: usize = 6;
pub const SETPOINT_WIRE_LEN: usize = 4;
pub const MAX_SETPOINTS: usize = (MAX_PAYLOAD - SETPOINT_BATCH_HEADER_LEN) / SETPOINT_WIRE_LEN;

/// `loop_count` sentinel meaning "repeat forever".
pub const LOOP_INFINITE: u16 = 0xFFFF;

/// Position changes below this many radians are treated as sensor noise.
pub const POSITION_NOISE_FLOOR: f32 = 0.01;
/// Largest PID setpoint change per tick, one degree in radians.
pub const MAX_SETPOINT_STEP: f32 = core::f32::consts::PI / 180.0;

/// Drive command range is `-DRIVE_LIMIT..=DRIVE_LIMIT`.
pub const DRIVE_LIMIT: i8 = 127;
pub const DRIVE_LIMIT_F32: f32 = 127.0;

/// Fraction of the calibrated range kept clear at each end.
pub const CALIBRATION_MARGIN: f32 = 0.05;
/// Drive used to push the motor to each end stop during calibration.
pub const CALIBRATION_DRIVE: i8 = 75;
pub const CALIBRATION_SETTLE_MS: u32 = 1000;
