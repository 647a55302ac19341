//! Setpoint scheduler: turns queued batches into a per-tick target and drive.
//!
//! A periodic tick (see [`Motion::signal_tick`]) wakes [`Motion::run`], which
//! samples the position sensor, advances the schedule inside a short critical
//! section, and applies the resulting drive. The comm driver enqueues batches
//! and coefficients through the same [`Motion`] handle.
//!
//! # Example
//!
//! ```no_run
//! use actuator_node::motion::{Motion, MotionStatic};
//! use actuator_node::render::Renderer;
//! use actuator_node::motor::Calibration;
//!
//! static MOTION_STATIC: MotionStatic = Motion::new_static();
//!
//! let motion = Motion::new(&MOTION_STATIC);
//! motion.start(Renderer::pid(Calibration::UNCALIBRATED));
//! ```

use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use heapless::Deque;
use micromath::F32Ext;

use crate::error::{Error, Result};
use crate::motor::{Calibration, MotorDrive, PositionSensor, clamp_drive};
use crate::pool::{BatchId, BatchPool};
use crate::protocol::Coefficients;
use crate::render::Renderer;
use crate::setpoint::SetpointBatch;
use crate::shared_constants::{
    BATCH_POOL_SIZE, POSITION_NOISE_FLOOR, SETPOINT_QUEUE_DEPTH,
};

/// Scheduler state. Every method runs with the caller holding exclusive access.
pub struct MotionState {
    pool: BatchPool<BATCH_POOL_SIZE>,
    queue: Deque<BatchId, SETPOINT_QUEUE_DEPTH>,
    current: Option<BatchId>,
    next: Option<BatchId>,

    /// Ticks left before `next` becomes current.
    delay: u16,
    /// Passes left through the current batch.
    loop_count: u16,
    index: usize,
    /// Ticks left on the current setpoint.
    duration: u16,
    target: u16,

    running: bool,
    active: bool,
    renderer: Renderer,

    position: f32,
    has_position: bool,
    rendered: Option<u16>,
}

impl MotionState {
    #[must_use]
    pub const fn new(renderer: Renderer) -> Self {
        Self {
            pool: BatchPool::new(),
            queue: Deque::new(),
            current: None,
            next: None,
            delay: 0,
            loop_count: 0,
            index: 0,
            duration: 0,
            target: 0,
            running: false,
            active: false,
            renderer,
            position: 0.0,
            has_position: false,
            rendered: None,
        }
    }

    /// Install `renderer` and begin rendering on the next tick.
    pub fn start(&mut self, renderer: Renderer) {
        self.renderer = renderer;
        self.active = false;
        self.running = true;
    }

    /// Stop rendering and free every batch, queued or playing.
    pub fn stop(&mut self) {
        self.release_queued();
        if let Some(id) = self.next.take() {
            self.pool.release(id);
        }
        self.release_current();
        self.delay = 0;
        self.loop_count = 0;
        self.index = 0;
        self.duration = 0;
        self.target = 0;
        self.active = false;
        self.running = false;
        self.rendered = None;
    }

    /// Queue a batch behind any already waiting.
    ///
    /// # Errors
    ///
    /// Returns [`Error::QueueFull`] without touching the queue when it is at
    /// capacity, or [`Error::PoolExhausted`] if no slot is free.
    pub fn enqueue(&mut self, batch: &SetpointBatch) -> Result<()> {
        if self.queue.is_full() {
            return Err(Error::QueueFull);
        }
        let id = self.pool.acquire(batch)?;
        if let Err(id) = self.queue.push_back(id) {
            self.pool.release(id);
            return Err(Error::QueueFull);
        }
        Ok(())
    }

    /// Queue every batch in order, or none of them.
    ///
    /// # Errors
    ///
    /// Returns [`Error::QueueFull`] or [`Error::PoolExhausted`] if the whole
    /// group does not fit; the queue is left as it was.
    pub fn enqueue_all(&mut self, batches: &[SetpointBatch]) -> Result<()> {
        let queue_room = self.queue.capacity().saturating_sub(self.queue.len());
        if queue_room < batches.len() {
            return Err(Error::QueueFull);
        }
        let pool_room = self.pool.capacity().saturating_sub(self.pool.in_use());
        if pool_room < batches.len() {
            return Err(Error::PoolExhausted);
        }
        for (queued, batch) in batches.iter().enumerate() {
            if let Err(err) = self.enqueue(batch) {
                for _ in 0..queued {
                    if let Some(id) = self.queue.pop_back() {
                        self.pool.release(id);
                    }
                }
                return Err(err);
            }
        }
        Ok(())
    }

    /// Drop everything queued and make an empty batch the next to activate.
    ///
    /// The empty batch has no delay, so motion halts on the next tick.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PoolExhausted`] if no slot is free, which cannot happen
    /// once the queue and pending batch have been released.
    pub fn halt(&mut self) -> Result<()> {
        self.release_queued();
        if let Some(id) = self.next.take() {
            self.pool.release(id);
        }
        self.next = Some(self.pool.acquire_stop()?);
        self.delay = 0;
        Ok(())
    }

    /// Update PID gains on the active renderer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotPidRenderer`] on pulse-step boards.
    pub fn apply_coefficients(&mut self, coefficients: &Coefficients) -> Result<()> {
        let render = self.renderer.as_pid_mut().ok_or(Error::NotPidRenderer)?;
        render.apply_coefficients(coefficients);
        Ok(())
    }

    /// Last filtered position, in calibrated radians.
    #[must_use]
    pub const fn position(&self) -> f32 {
        self.position
    }

    /// Target handed to the renderer on the most recent tick, if it rendered.
    #[must_use]
    pub const fn rendered_target(&self) -> Option<u16> {
        self.rendered
    }

    #[must_use]
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.running
    }

    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    #[must_use]
    pub const fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    /// Batch slots currently allocated, including the current and next batch.
    #[must_use]
    pub fn batches_in_use(&self) -> usize {
        self.pool.in_use()
    }

    /// Keep `sample` only if it moved by more than the noise floor.
    pub fn filter_position(&mut self, sample: f32) {
        if !sample.is_finite() {
            return;
        }
        if !self.has_position || F32Ext::abs(self.position - sample) > POSITION_NOISE_FLOOR {
            self.position = sample;
            self.has_position = true;
        }
    }

    /// Advance one tick and return the drive to apply.
    pub fn tick(&mut self, sample: f32) -> i8 {
        self.filter_position(sample);
        self.rendered = None;
        if !self.running {
            return 0;
        }

        self.load_next();
        self.activate_after_delay();
        self.release_current_if_empty();

        if !self.has_update() {
            if self.active {
                debug!("motion idle");
            }
            self.active = false;
            return 0;
        }

        let position = self.position;
        if !self.active {
            self.renderer.reset(position);
            self.active = true;
        }

        self.renderer.before_tick(position);
        let drive = self.renderer.compute(self.target);
        self.rendered = Some(self.target);
        self.step();
        self.renderer.after_tick();

        clamp_drive(drive)
    }

    fn load_next(&mut self) {
        if self.next.is_none() {
            if let Some(id) = self.queue.pop_front() {
                self.delay = self.pool.get(&id).map_or(0, |batch| batch.delay);
                self.next = Some(id);
            }
        }
    }

    fn activate_after_delay(&mut self) {
        if self.next.is_none() {
            return;
        }
        if self.delay > 0 {
            self.delay -= 1;
            return;
        }

        self.release_current();
        self.current = self.next.take();
        self.loop_count = self
            .current
            .as_ref()
            .and_then(|id| self.pool.get(id))
            .map_or(0, |batch| batch.loop_count);
        self.index = 0;
        self.load_setpoint();
        self.renderer.batch_activated();
        if let Some(batch) = self.current.as_ref().and_then(|id| self.pool.get(id)) {
            debug!(
                "batch activated: {} setpoints, loop {}",
                batch.setpoints.len(),
                batch.loop_count
            );
        }
    }

    fn release_current_if_empty(&mut self) {
        let empty = self
            .current
            .as_ref()
            .and_then(|id| self.pool.get(id))
            .is_some_and(|batch| batch.setpoints.is_empty());
        if empty {
            self.release_current();
        }
    }

    fn current_batch(&self) -> Option<&SetpointBatch> {
        self.current.as_ref().and_then(|id| self.pool.get(id))
    }

    fn current_is_infinite(&self) -> bool {
        self.current_batch().is_some_and(SetpointBatch::is_infinite)
    }

    fn has_update(&mut self) -> bool {
        if self.current.is_none() {
            return false;
        }
        if self.current_is_infinite() || self.loop_count > 0 {
            return true;
        }
        debug!("batch exhausted");
        self.release_current();
        false
    }

    fn step(&mut self) {
        // A zero duration counts as one tick.
        if self.duration > 0 {
            self.duration -= 1;
        }
        if self.duration > 0 {
            return;
        }

        self.index = self.index.saturating_add(1);
        if self.index >= self.current_len() {
            if !self.current_is_infinite() {
                self.loop_count = self.loop_count.saturating_sub(1);
            }
            self.index = 0;
        }
        self.load_setpoint();
    }

    fn current_len(&self) -> usize {
        self.current_batch().map_or(0, |batch| batch.setpoints.len())
    }

    fn load_setpoint(&mut self) {
        let setpoint = self
            .current
            .as_ref()
            .and_then(|id| self.pool.get(id))
            .and_then(|batch| batch.setpoints.get(self.index))
            .copied();
        if let Some(setpoint) = setpoint {
            self.duration = setpoint.duration;
            self.target = setpoint.target;
        }
    }

    fn release_current(&mut self) {
        if let Some(id) = self.current.take() {
            self.pool.release(id);
        }
    }

    fn release_queued(&mut self) {
        while let Some(id) = self.queue.pop_front() {
            self.pool.release(id);
        }
    }
}

/// Static resources for [`Motion`].
pub struct MotionStatic {
    state: Mutex<CriticalSectionRawMutex, RefCell<MotionState>>,
    tick: Signal<CriticalSectionRawMutex, ()>,
}

impl MotionStatic {
    /// Create static resources for the motion scheduler.
    #[must_use]
    pub const fn new_static() -> Self {
        Self {
            state: Mutex::new(RefCell::new(MotionState::new(Renderer::pid(
                Calibration::UNCALIBRATED,
            )))),
            tick: Signal::new(),
        }
    }
}

/// Handle shared by the tick source, the motion loop and the comm driver.
#[derive(Clone, Copy)]
pub struct Motion<'a> {
    motion_static: &'a MotionStatic,
}

impl<'a> Motion<'a> {
    /// Create static resources for the motion scheduler.
    #[must_use]
    pub const fn new_static() -> MotionStatic {
        MotionStatic::new_static()
    }

    #[must_use]
    pub const fn new(motion_static: &'a MotionStatic) -> Self {
        Self { motion_static }
    }

    /// Run `f` with exclusive access to the scheduler state.
    pub fn with_state<R>(&self, action: impl FnOnce(&mut MotionState) -> R) -> R {
        self.motion_static
            .state
            .lock(|state| action(&mut state.borrow_mut()))
    }

    pub fn start(&self, renderer: Renderer) {
        info!("motion start");
        self.with_state(|state| state.start(renderer));
    }

    pub fn stop(&self) {
        info!("motion stop");
        self.with_state(MotionState::stop);
    }

    /// Queue a setpoint batch without blocking.
    ///
    /// # Errors
    ///
    /// See [`MotionState::enqueue`].
    pub fn enqueue(&self, batch: &SetpointBatch) -> Result<()> {
        self.with_state(|state| state.enqueue(batch))
    }

    /// Queue a group of batches atomically.
    ///
    /// # Errors
    ///
    /// See [`MotionState::enqueue_all`].
    pub fn enqueue_all(&self, batches: &[SetpointBatch]) -> Result<()> {
        self.with_state(|state| state.enqueue_all(batches))
    }

    /// Emergency stop: discard queued motion and halt on the next tick.
    ///
    /// # Errors
    ///
    /// See [`MotionState::halt`].
    pub fn halt(&self) -> Result<()> {
        info!("motion halt requested");
        self.with_state(MotionState::halt)
    }

    /// Update PID gains.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotPidRenderer`] on pulse-step boards.
    pub fn apply_coefficients(&self, coefficients: &Coefficients) -> Result<()> {
        self.with_state(|state| state.apply_coefficients(coefficients))
    }

    /// Last filtered position, in calibrated radians.
    #[must_use]
    pub fn current_position(&self) -> f32 {
        self.with_state(|state| state.position())
    }

    /// Wake the motion loop. Safe to call from an interrupt.
    pub fn signal_tick(&self) {
        self.motion_static.tick.signal(());
    }

    /// Advance one tick with an already-sampled position.
    pub fn tick(&self, sample: f32) -> i8 {
        self.with_state(|state| state.tick(sample))
    }

    /// Wait for ticks forever, sampling and driving outside the critical section.
    pub async fn run<S, M>(&self, sensor: &mut S, motor: &mut M) -> !
    where
        S: PositionSensor,
        M: MotorDrive,
    {
        loop {
            self.motion_static.tick.wait().await;
            let sample = sensor.sample();
            let drive = self.tick(sample);
            motor.set_drive(drive);
        }
    }
}
