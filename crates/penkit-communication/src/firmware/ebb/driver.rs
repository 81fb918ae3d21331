//! The EBB device handle.
//!
//! An [`Ebb`] owns a background I/O task that talks to the serial link.
//! Callers submit commands through a channel and await their replies; the
//! task writes one command at a time and routes reply lines through the
//! [`CommandQueue`].

use super::protocol::{CommandQueue, Expect, LineAssembler, PendingRequest, Reply};
use super::steps::{self, StepAccumulator};
use super::version::FirmwareVersion;
use super::EbbConfig;
use crate::communication::serial::SerialLink;
use glam::DVec2;
use parking_lot::Mutex;
use penkit_core::{
    Block, ConnectionError, DeviceError, Motion, PenMotion, Plan, ProtocolError, Result, XyMotion,
};
use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, watch, OnceCell};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Analog readings from `QC`, in volts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Voltages {
    /// Current-set pin voltage.
    pub ra0: f64,
    /// Divided-down motor supply voltage.
    pub v_plus: f64,
    /// Motor supply voltage at the input jack.
    pub v_in: f64,
}

const ADC_FULL_SCALE: f64 = 1023.0;
const ADC_REFERENCE_VOLTS: f64 = 3.3;
const VIN_DIVIDER: f64 = 9.2;
const VIN_DIODE_DROP: f64 = 0.3;
const STEPPER_POWER_THRESHOLD: f64 = 6.0;

/// A connected EiBotBoard.
pub struct Ebb {
    name: String,
    config: EbbConfig,
    requests: mpsc::Sender<PendingRequest>,
    shutdown: mpsc::Sender<()>,
    closed: watch::Receiver<bool>,
    io_task: Mutex<Option<JoinHandle<()>>>,
    microstepping_mode: AtomicU8,
    /// Set by `halt`, cleared by `enable_motors`.
    halted: AtomicBool,
    error: Mutex<StepAccumulator>,
    supports_lm: OnceCell<bool>,
}

impl Ebb {
    /// Take over `link` and start the I/O task. Must be called from within a
    /// tokio runtime.
    pub fn open(link: Box<dyn SerialLink>, config: EbbConfig) -> Result<Self> {
        config.validate()?;
        let name = link.name();
        let (request_tx, request_rx) = mpsc::channel::<PendingRequest>(100);
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
        let (closed_tx, closed_rx) = watch::channel(false);

        let handle = tokio::spawn(run_io_loop(
            link,
            request_rx,
            shutdown_rx,
            closed_tx,
            config.io_poll(),
        ));
        info!("Opened EBB on {}", name);

        Ok(Self {
            name,
            config,
            requests: request_tx,
            shutdown: shutdown_tx,
            closed: closed_rx,
            io_task: Mutex::new(Some(handle)),
            microstepping_mode: AtomicU8::new(0),
            halted: AtomicBool::new(false),
            error: Mutex::new(StepAccumulator::new()),
            supports_lm: OnceCell::new(),
        })
    }

    /// Port name of the underlying link.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &EbbConfig {
        &self.config
    }

    async fn request(&self, command: String, expect: Expect) -> Result<Reply> {
        if self.is_closed() {
            return Err(lost("device is closed").into());
        }
        let (request, reply) = PendingRequest::new(command, expect);
        self.requests
            .send(request)
            .await
            .map_err(|_| lost("I/O task stopped"))?;
        reply.await.map_err(|_| lost("I/O task stopped"))?
    }

    /// Send a raw command and return its single reply line.
    pub async fn query(&self, command: &str) -> Result<String> {
        match self.request(command.to_string(), Expect::Line).await? {
            Reply::Line(line) => Ok(line),
            other => Err(malformed(command, &format!("{:?}", other))),
        }
    }

    /// Send a raw command and return the lines before its terminating `OK`.
    pub async fn query_multi(&self, command: &str) -> Result<Vec<String>> {
        match self.request(command.to_string(), Expect::LinesUntilOk).await? {
            Reply::Lines(lines) => Ok(lines),
            other => Err(malformed(command, &format!("{:?}", other))),
        }
    }

    /// Send a raw command that is acknowledged with a single `OK`.
    pub async fn command(&self, command: &str) -> Result<()> {
        match self.request(command.to_string(), Expect::Ok).await? {
            Reply::Ok => Ok(()),
            other => Err(malformed(command, &format!("{:?}", other))),
        }
    }

    /// Energize both steppers at microstepping `mode` (1 = 16x .. 5 = full).
    pub async fn enable_motors(&self, mode: u8) -> Result<()> {
        steps::step_multiplier(mode)?;
        self.microstepping_mode.store(mode, Ordering::SeqCst);
        self.halted.store(false, Ordering::SeqCst);
        self.command(&format!("EM,{},{}", mode, mode)).await
    }

    /// De-energize both steppers. The carriage can then be moved by hand.
    pub async fn disable_motors(&self) -> Result<()> {
        self.command("EM,0,0").await
    }

    /// Refuse further `LM`/`XM` moves, then de-energize the steppers.
    ///
    /// A move already written to the board still completes, but nothing
    /// queued behind it can re-energize the motors. `enable_motors` lifts
    /// the halt.
    pub async fn halt(&self) -> Result<()> {
        self.halted.store(true, Ordering::SeqCst);
        warn!("Halting motion on {}", self.name);
        self.disable_motors().await
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    fn check_not_halted(&self) -> Result<()> {
        if self.is_halted() {
            return Err(DeviceError::Halted.into());
        }
        Ok(())
    }

    /// Reset the board and close the connection.
    pub async fn emergency_stop(&self) -> Result<()> {
        self.command("R").await?;
        warn!("Emergency stop on {}", self.name);
        self.close().await;
        Ok(())
    }

    /// Move the pen servo to `height` at `rate`, then hold off the next
    /// command for `delay_ms`.
    pub async fn set_pen_height(&self, height: i32, rate: u32, delay_ms: u32) -> Result<()> {
        self.command(&format!("S2,{},4,{},{}", height, rate, delay_ms))
            .await
    }

    /// Issue `LM` for per-motor steps and rates in steps per second.
    pub async fn lowlevel_move(
        &self,
        steps_axis1: i64,
        initial_sps_axis1: f64,
        final_sps_axis1: f64,
        steps_axis2: i64,
        initial_sps_axis2: f64,
        final_sps_axis2: f64,
    ) -> Result<()> {
        self.check_not_halted()?;
        let (rate1, delta1) = steps::axis_rate(steps_axis1, initial_sps_axis1, final_sps_axis1);
        let (rate2, delta2) = steps::axis_rate(steps_axis2, initial_sps_axis2, final_sps_axis2);
        self.command(&format!(
            "LM,{},{},{},{},{},{}",
            rate1, steps_axis1, delta1, rate2, steps_axis2, delta2
        ))
        .await
    }

    /// Constant-acceleration move of `x_steps`, `y_steps` microsteps with
    /// the rate ramping from `initial_rate` to `final_rate` steps per second.
    ///
    /// Requires firmware with `LM` (2.5.3 or later).
    pub async fn move_with_acceleration(
        &self,
        x_steps: i64,
        y_steps: i64,
        initial_rate: f64,
        final_rate: f64,
    ) -> Result<()> {
        if x_steps == 0 && y_steps == 0 {
            return Err(DeviceError::NoMotion.into());
        }
        let rates_valid = initial_rate >= 0.0
            && final_rate >= 0.0
            && (initial_rate > 0.0 || final_rate > 0.0);
        if !rates_valid {
            return Err(DeviceError::InvalidRates {
                initial: initial_rate,
                final_rate,
            }
            .into());
        }
        let m = steps::decompose(x_steps, y_steps, initial_rate, final_rate);
        self.lowlevel_move(
            m.steps1,
            m.initial_rate1,
            m.final_rate1,
            m.steps2,
            m.initial_rate2,
            m.final_rate2,
        )
        .await
    }

    /// Constant-velocity `XM` move taking `duration` seconds.
    pub async fn move_at_constant_rate(&self, duration: f64, x: i64, y: i64) -> Result<()> {
        self.check_not_halted()?;
        let ms = (duration * 1000.0).floor() as i64;
        self.command(&format!("XM,{},{},{}", ms, x, y)).await
    }

    /// Poll `QM` until the command executor and the motion FIFO are empty.
    pub async fn wait_until_motors_idle(&self) -> Result<()> {
        loop {
            let status = self.query("QM").await?;
            let fields: Vec<&str> = status.split(',').map(str::trim).collect();
            if fields.len() < 5 || fields[0] != "QM" {
                return Err(malformed("QM", &status));
            }
            if fields[1] == "0" && fields[4] == "0" {
                return Ok(());
            }
            tokio::time::sleep(self.config.idle_poll()).await;
        }
    }

    /// Microstepping mode set by the last `enable_motors`, 0 if none.
    pub fn microstepping_mode(&self) -> u8 {
        self.microstepping_mode.load(Ordering::SeqCst)
    }

    fn step_multiplier(&self) -> Result<f64> {
        Ok(f64::from(steps::step_multiplier(self.microstepping_mode())?))
    }

    /// Sub-step remainder carried into the next move, in microsteps.
    pub fn step_error(&self) -> DVec2 {
        self.error.lock().error()
    }

    fn take_steps(&self, delta: DVec2) -> (i64, i64) {
        self.error.lock().take(delta)
    }

    /// Execute one block with `LM`, carrying the sub-step remainder.
    pub async fn execute_block_with_lm(&self, block: &Block) -> Result<()> {
        let multiplier = self.step_multiplier()?;
        let (x, y) = self.take_steps((block.p2() - block.p1()) * multiplier);
        if x != 0 || y != 0 {
            self.move_with_acceleration(
                x,
                y,
                block.v_initial() * multiplier,
                block.v_final() * multiplier,
            )
            .await?;
        }
        Ok(())
    }

    /// Execute an XY motion block by block with `LM`.
    pub async fn execute_xy_motion_with_lm(&self, motion: &XyMotion) -> Result<()> {
        for block in motion.blocks() {
            self.execute_block_with_lm(block).await?;
        }
        Ok(())
    }

    /// Execute an XY motion as a series of constant-rate `XM` moves, one per
    /// `timestep` of the motion's timeline.
    pub async fn execute_xy_motion_with_xm(
        &self,
        motion: &XyMotion,
        timestep: Duration,
    ) -> Result<()> {
        let multiplier = self.step_multiplier()?;
        let dt = timestep.as_secs_f64();
        let mut t = 0.0;
        while t < motion.duration() {
            let (Some(a), Some(b)) = (motion.instant(t), motion.instant(t + dt)) else {
                break;
            };
            let (x, y) = self.take_steps((b.p - a.p) * multiplier);
            self.move_at_constant_rate(dt, x, y).await?;
            t += dt;
        }
        Ok(())
    }

    /// Execute an XY motion with `LM` when the firmware has it, `XM`
    /// otherwise.
    pub async fn execute_xy_motion(&self, motion: &XyMotion) -> Result<()> {
        if self.supports_lm().await? {
            self.execute_xy_motion_with_lm(motion).await
        } else {
            self.execute_xy_motion_with_xm(motion, self.config.xm_timestep())
                .await
        }
    }

    /// Move the pen to the motion's final position, holding the queue for
    /// the motion's duration.
    pub async fn execute_pen_motion(&self, motion: &PenMotion) -> Result<()> {
        let delay_ms = (motion.duration() * 1000.0).round().max(0.0) as u32;
        self.set_pen_height(motion.final_pos, 0, delay_ms).await
    }

    pub async fn execute_motion(&self, motion: &Motion) -> Result<()> {
        match motion {
            Motion::Xy(xy) => self.execute_xy_motion(xy).await,
            Motion::Pen(pen) => self.execute_pen_motion(pen).await,
        }
    }

    /// Enable the motors and run every motion of `plan` in order.
    pub async fn execute_plan(&self, plan: &Plan, microstepping_mode: u8) -> Result<()> {
        self.enable_motors(microstepping_mode).await?;
        for motion in plan.motions() {
            self.execute_motion(motion).await?;
        }
        Ok(())
    }

    /// Read the board voltages. Useful to tell whether stepper power is
    /// plugged in.
    pub async fn query_voltages(&self) -> Result<Voltages> {
        let lines = self.query_multi("QC").await?;
        let first = lines.first().ok_or_else(|| malformed("QC", ""))?;
        let readings: Vec<f64> = first
            .split(',')
            .map(|v| v.trim().parse::<f64>())
            .collect::<std::result::Result<_, _>>()
            .map_err(|_| malformed("QC", first))?;
        let &[ra0, v_plus] = readings.as_slice() else {
            return Err(malformed("QC", first));
        };
        let to_volts = |raw: f64| raw / ADC_FULL_SCALE * ADC_REFERENCE_VOLTS;
        Ok(Voltages {
            ra0: to_volts(ra0),
            v_plus: to_volts(v_plus),
            v_in: to_volts(v_plus) * VIN_DIVIDER + VIN_DIODE_DROP,
        })
    }

    pub async fn are_steppers_powered(&self) -> Result<bool> {
        Ok(self.query_voltages().await?.v_in > STEPPER_POWER_THRESHOLD)
    }

    /// Whether the PRG button was pressed since the last query.
    pub async fn query_button(&self) -> Result<bool> {
        let lines = self.query_multi("QB").await?;
        Ok(lines.first().map(String::as_str) == Some("1"))
    }

    /// The raw reply to `V`, e.g. `EBBv13_and_above EB Firmware Version 2.5.3`.
    pub async fn firmware_version(&self) -> Result<String> {
        self.query("V").await
    }

    /// Whether the firmware accepts `LM`. Queried once and cached.
    pub async fn supports_lm(&self) -> Result<bool> {
        self.supports_lm
            .get_or_try_init(|| async {
                let reply = self.firmware_version().await?;
                let supported = match FirmwareVersion::parse_reply(&reply) {
                    Some(version) => {
                        debug!("EBB firmware {}", version);
                        version.supports_lm()
                    }
                    None => {
                        warn!("Unrecognized firmware version '{}', using XM moves", reply);
                        false
                    }
                };
                Ok(supported)
            })
            .await
            .copied()
    }

    /// Drive the carriage back to the motor-enable position at `rate`
    /// steps per second.
    pub async fn home(&self, rate: u32) -> Result<()> {
        self.command(&format!("HM,{}", rate)).await
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Resolves once the link is gone, by `close` or by transport loss.
    pub async fn closed(&self) {
        let mut closed = self.closed.clone();
        // an error means the I/O task is gone, which is closed too
        let _ = closed.wait_for(|c| *c).await;
    }

    /// Stop the I/O task and close the link. Pending commands fail.
    pub async fn close(&self) {
        let _ = self.shutdown.try_send(());
        let handle = self.io_task.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("EBB I/O task ended abnormally: {}", e);
            }
        }
        self.closed().await;
    }
}

impl std::fmt::Debug for Ebb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ebb")
            .field("name", &self.name)
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn lost(reason: &str) -> ConnectionError {
    ConnectionError::ConnectionLost {
        reason: reason.to_string(),
    }
}

fn malformed(command: &str, response: &str) -> penkit_core::Error {
    ProtocolError::MalformedResponse {
        command: command.to_string(),
        response: response.to_string(),
    }
    .into()
}

fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

async fn run_io_loop(
    mut link: Box<dyn SerialLink>,
    mut request_rx: mpsc::Receiver<PendingRequest>,
    mut shutdown_rx: mpsc::Receiver<()>,
    closed_tx: watch::Sender<bool>,
    poll: Duration,
) {
    let mut assembler = LineAssembler::new();
    let mut queue = CommandQueue::new();
    let mut outbox: VecDeque<PendingRequest> = VecDeque::new();
    let mut buf = [0u8; 256];

    let reason = loop {
        // a dropped Ebb disconnects the channel, which also means stop
        if !matches!(
            shutdown_rx.try_recv(),
            Err(mpsc::error::TryRecvError::Empty)
        ) {
            break "closed".to_string();
        }
        let mut busy = false;

        // 1. READ PHASE
        match link.read(&mut buf) {
            Ok(0) => {}
            Ok(n) => {
                busy = true;
                for line in assembler.push(&buf[..n]) {
                    debug!("EBB <- {}", line);
                    queue.dispatch(&line);
                }
            }
            Err(e) if is_transient(&e) => {}
            Err(e) => break e.to_string(),
        }

        // 2. COMMAND FETCH PHASE
        while let Ok(request) = request_rx.try_recv() {
            outbox.push_back(request);
        }

        // 3. WRITE PHASE: one command in flight at a time
        if queue.is_empty() {
            if let Some(request) = outbox.pop_front() {
                busy = true;
                debug!("EBB -> {}", request.command());
                let line = format!("{}\r", request.command());
                let written = link.write(line.as_bytes());
                queue.push(request);
                if let Err(e) = written {
                    break e.to_string();
                }
            }
        }

        if !busy {
            tokio::time::sleep(poll).await;
        }
    };

    if reason != "closed" {
        warn!("Lost connection to {}: {}", link.name(), reason);
    }

    request_rx.close();
    while let Ok(request) = request_rx.try_recv() {
        outbox.push_back(request);
    }
    for request in outbox {
        queue.push(request);
    }
    queue.fail_all(ConnectionError::ConnectionLost { reason });

    if let Err(e) = link.close() {
        warn!("Failed to close {}: {}", link.name(), e);
    }
    closed_tx.send_replace(true);
}
