//! Actuator board firmware.
//!
//! Reads the address straps, calibrates the motor against its end stops, then
//! runs the motion scheduler on a high-priority interrupt executor and the bus
//! receive loop on the thread executor.
#![no_std]
#![no_main]
#![allow(clippy::future_not_send, reason = "Single-threaded")]

use core::convert::Infallible;

use actuator_node::address::read_strap_bits;
use actuator_node::hardware::{HBridge, Rs485, SinCosSensor};
use actuator_node::motor::{CalibratedSensor, Calibration, calibrate};
use actuator_node::{
    Address, BoardId, CommConfig, CommDriver, Motion, MotionStatic, Renderer, Service, TICK_PERIOD,
};
use actuator_node::checksum::Crc16;
use defmt::{error, info, unwrap};
use defmt_rtt as _;
use embassy_executor::{InterruptExecutor, Spawner};
use embassy_rp::adc::{self, Adc};
use embassy_rp::gpio::{Input, Level, Output, Pull};
use embassy_rp::interrupt;
use embassy_rp::interrupt::{InterruptExt, Priority};
use embassy_rp::peripherals::UART0;
use embassy_rp::pwm::{self, Pwm};
use embassy_rp::uart::{self, Uart};
use embassy_rp::bind_interrupts;
use embassy_time::{Delay, Ticker};
use panic_probe as _;

bind_interrupts!(struct Irqs {
    UART0_IRQ => uart::InterruptHandler<UART0>;
});

static EXECUTOR_HIGH: InterruptExecutor = InterruptExecutor::new();
static MOTION_STATIC: MotionStatic = Motion::new_static();

#[interrupt]
#[expect(unsafe_code, reason = "the executor must be polled from its interrupt")]
unsafe fn SWI_IRQ_1() {
    unsafe { EXECUTOR_HIGH.on_interrupt() }
}

type Sensor = CalibratedSensor<SinCosSensor<'static>>;

#[embassy_executor::task]
async fn motion_task(motion: Motion<'static>, mut sensor: Sensor, mut motor: HBridge<'static>) -> ! {
    motion.run(&mut sensor, &mut motor).await
}

/// Periodic wake-up for the motion loop; does no scheduling work itself.
#[embassy_executor::task]
async fn tick_task(motion: Motion<'static>) -> ! {
    let mut ticker = Ticker::every(TICK_PERIOD);
    loop {
        ticker.next().await;
        motion.signal_tick();
    }
}

#[embassy_executor::main]
async fn main(_spawner: Spawner) -> ! {
    let peripherals = embassy_rp::init(Default::default());

    let bits = {
        let mut addrout = Output::new(peripherals.PIN_2, Level::High);
        let mut addr0 = Input::new(peripherals.PIN_3, Pull::Up);
        let mut addr1 = Input::new(peripherals.PIN_4, Pull::Up);
        unwrap!(read_strap_bits(&mut addrout, &mut addr0, &mut addr1, &mut Delay))
    };
    let board = BoardId::from_strap_bits(bits);
    let Ok(address) = Address::new(board) else {
        error!("invalid board identity from straps {=u8:04b}, halting", bits);
        match core::future::pending::<Infallible>().await {}
    };
    info!("board {:?} at address {=u8:#04x}", board, address.code());

    let adc = Adc::new_blocking(peripherals.ADC, adc::Config::default());
    let mut sensor = SinCosSensor::new(
        adc,
        adc::Channel::new_pin(peripherals.PIN_26, Pull::None),
        adc::Channel::new_pin(peripherals.PIN_27, Pull::None),
        adc::Channel::new_pin(peripherals.PIN_28, Pull::None),
    );
    let mut motor = HBridge::new(
        Pwm::new_output_ab(
            peripherals.PWM_SLICE0,
            peripherals.PIN_16,
            peripherals.PIN_17,
            pwm::Config::default(),
        ),
        Output::new(peripherals.PIN_18, Level::Low),
        board,
    );

    let (calibration, renderer) = if board.uses_pulse_step() {
        (Calibration::UNCALIBRATED, Renderer::pulse_step())
    } else {
        let calibration = calibrate(&mut sensor, &mut motor, &mut Delay, board.drive_direction());
        info!("calibrated {:?}", calibration);
        (calibration, Renderer::pid(calibration))
    };

    let motion = Motion::new(&MOTION_STATIC);
    motion.start(renderer);

    interrupt::SWI_IRQ_1.set_priority(Priority::P2);
    let high = EXECUTOR_HIGH.start(interrupt::SWI_IRQ_1);
    high.spawn(unwrap!(motion_task(
        motion,
        CalibratedSensor::new(sensor, calibration),
        motor
    )));
    high.spawn(unwrap!(tick_task(motion)));

    let config = CommConfig::default();
    let mut uart_config = uart::Config::default();
    uart_config.baudrate = config.baud_rate;
    let uart = Uart::new(
        peripherals.UART0,
        peripherals.PIN_0,
        peripherals.PIN_1,
        Irqs,
        peripherals.DMA_CH0,
        peripherals.DMA_CH1,
        uart_config,
    );
    let bus = Rs485::new(uart, Output::new(peripherals.PIN_15, Level::Low));

    let mut driver: CommDriver<'static, _, Crc16> =
        CommDriver::new(bus, address, Service::new(motion, board), config);
    driver.run().await
}
