//! RP2040 glue: the sin/cos position sensor, the H-bridge and the RS-485 transceiver.

use embassy_rp::adc::{Adc, Blocking, Channel};
use embassy_rp::gpio::Output;
use embassy_rp::pwm::{Config, Pwm};
use embassy_rp::uart::{Async, Uart};
use embassy_time::{Duration, with_timeout};
use micromath::F32Ext;

use crate::address::BoardId;
use crate::comm::Bus;
use crate::error::{Error, Result};
use crate::motor::{MotorDrive, PositionSensor, clamp_drive, wrap_angle};
use crate::shared_constants::DRIVE_LIMIT;

/// PWM counter top for the position motors; the drive is added on top of `top - 127`.
const PWM_TOP: u16 = 306;
/// The vibration motor runs at a higher PWM frequency.
const PWM_TOP_PURR: u16 = 207;
const PWM_DIVIDER: u8 = 3;

/// Idle gap that marks the receive FIFO as drained after a restart.
const FLUSH_GAP: Duration = Duration::from_micros(200);
/// Bound on the bytes discarded by one restart.
const FLUSH_LIMIT: usize = 64;

/// Hall sensor with sine and cosine outputs, both referenced to a mid-rail voltage.
pub struct SinCosSensor<'d> {
    adc: Adc<'d, Blocking>,
    cos: Channel<'d>,
    sin: Channel<'d>,
    reference: Channel<'d>,
    last: f32,
}

impl<'d> SinCosSensor<'d> {
    pub const fn new(
        adc: Adc<'d, Blocking>,
        cos: Channel<'d>,
        sin: Channel<'d>,
        reference: Channel<'d>,
    ) -> Self {
        Self {
            adc,
            cos,
            sin,
            reference,
            last: 0.0,
        }
    }

    fn read(&mut self) -> Option<f32> {
        let reference = f32::from(self.adc.blocking_read(&mut self.reference).ok()?);
        let cos = f32::from(self.adc.blocking_read(&mut self.cos).ok()?) - reference;
        let sin = f32::from(self.adc.blocking_read(&mut self.sin).ok()?) - reference;
        Some(wrap_angle(F32Ext::atan2(cos, sin)))
    }
}

impl PositionSensor for SinCosSensor<'_> {
    /// Returns the previous angle if the conversion fails.
    fn sample(&mut self) -> f32 {
        if let Some(angle) = self.read() {
            self.last = angle;
        }
        self.last
    }
}

/// Two-channel H-bridge: channel A drives forward, channel B reverse.
pub struct HBridge<'d> {
    pwm: Pwm<'d>,
    cfg: Config,
    enable: Output<'d>,
    offset: u16,
    state: i8,
}

impl<'d> HBridge<'d> {
    /// Configure the slice for `board` and leave the bridge disabled.
    pub fn new(mut pwm: Pwm<'d>, mut enable: Output<'d>, board: BoardId) -> Self {
        let top = if board.uses_pulse_step() {
            PWM_TOP_PURR
        } else {
            PWM_TOP
        };

        let mut cfg = Config::default();
        cfg.top = top;
        cfg.divider = PWM_DIVIDER.into();
        cfg.compare_a = 0;
        cfg.compare_b = 0;
        cfg.enable = true;
        pwm.set_config(&cfg);
        enable.set_low();

        info!("h-bridge top={} for {:?}", top, board);
        Self {
            pwm,
            cfg,
            enable,
            offset: top.saturating_sub(DRIVE_LIMIT.unsigned_abs().into()),
            state: 0,
        }
    }
}

impl MotorDrive for HBridge<'_> {
    fn set_drive(&mut self, drive: i8) {
        let drive = clamp_drive(drive);
        if drive == self.state {
            return;
        }

        if drive == 0 {
            self.enable.set_low();
            self.cfg.compare_a = 0;
            self.cfg.compare_b = 0;
        } else {
            let duty = self.offset.saturating_add(drive.unsigned_abs().into());
            if drive > 0 {
                self.cfg.compare_a = duty;
                self.cfg.compare_b = 0;
            } else {
                self.cfg.compare_a = 0;
                self.cfg.compare_b = duty;
            }
            self.enable.set_high();
        }
        self.pwm.set_config(&self.cfg);
        self.state = drive;
    }
}

/// RS-485 transceiver on a UART, with a driver-enable pin held high while transmitting.
pub struct Rs485<'d> {
    uart: Uart<'d, Async>,
    driver_enable: Output<'d>,
}

impl<'d> Rs485<'d> {
    pub fn new(uart: Uart<'d, Async>, mut driver_enable: Output<'d>) -> Self {
        driver_enable.set_low();
        Self {
            uart,
            driver_enable,
        }
    }
}

impl Bus for Rs485<'_> {
    async fn read_exact(&mut self, buf: &mut [u8], timeout: Option<Duration>) -> Result<()> {
        let result = match timeout {
            Some(timeout) => with_timeout(timeout, self.uart.read(buf))
                .await
                .map_err(|_| Error::Timeout)?,
            None => self.uart.read(buf).await,
        };
        result.map_err(|err| {
            warn!("uart read error: {:?}", err);
            Error::Bus
        })
    }

    async fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        self.driver_enable.set_high();
        let result = match self.uart.write(bytes).await {
            Ok(()) => self.uart.blocking_flush(),
            Err(err) => Err(err),
        };
        self.driver_enable.set_low();
        result.map_err(|err| {
            warn!("uart write error: {:?}", err);
            Error::Bus
        })
    }

    async fn restart(&mut self) {
        self.driver_enable.set_low();
        let mut byte = [0_u8; 1];
        for _ in 0..FLUSH_LIMIT {
            if !matches!(
                with_timeout(FLUSH_GAP, self.uart.read(&mut byte)).await,
                Ok(Ok(()))
            ) {
                break;
            }
        }
    }
}
