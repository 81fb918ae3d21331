//! The plot session.
//!
//! A [`PlotSession`] owns the attached device, the state machine and the
//! event bus. Plots run on their own task; pause and cancel only flip
//! flags that the plot task checks between motions, so a motion always runs
//! to completion before they are honoured. Limp also halts the device,
//! which cuts the current motion short.

use crate::plotter::{DevicePlotter, Plotter, SimulatedPlotter};
use crate::state::{SessionConfig, SessionState};
use parking_lot::Mutex;
use penkit_communication::Ebb;
use penkit_core::{
    DeviceError, EventBus, EventFilter, Motion, Plan, PlotEvent, Result, SessionError,
    SubscriptionId,
};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Handle to a plot session. Clones share the same session.
#[derive(Clone)]
pub struct PlotSession {
    inner: Arc<Inner>,
}

struct Inner {
    config: SessionConfig,
    bus: EventBus,
    shared: Mutex<Shared>,
    /// Open (`true`) unless a pause is pending or in effect.
    gate: watch::Sender<bool>,
}

struct Shared {
    state: SessionState,
    plot_active: bool,
    device: Option<Arc<Ebb>>,
    pause_requested: bool,
    cancel_requested: bool,
    limp_requested: bool,
    motion_index: Option<usize>,
    total: usize,
    current_plan: Option<Arc<Plan>>,
}

enum Ending {
    Finished,
    Cancelled,
    Limped,
}

impl PlotSession {
    pub fn new(config: SessionConfig) -> Self {
        let bus = EventBus::with_config(config.events.clone());
        let (gate, _) = watch::channel(true);
        Self {
            inner: Arc::new(Inner {
                config,
                bus,
                shared: Mutex::new(Shared {
                    state: SessionState::Idle,
                    plot_active: false,
                    device: None,
                    pause_requested: false,
                    cancel_requested: false,
                    limp_requested: false,
                    motion_index: None,
                    total: 0,
                    current_plan: None,
                }),
                gate,
            }),
        }
    }

    /// The session's event bus, for async receivers.
    pub fn bus(&self) -> &EventBus {
        &self.inner.bus
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn state(&self) -> SessionState {
        self.inner.shared.lock().state
    }

    /// Whether a plot task is still running, including one winding down
    /// after a cancel or limp.
    pub fn is_plotting(&self) -> bool {
        self.inner.shared.lock().plot_active
    }

    pub fn device(&self) -> Option<Arc<Ebb>> {
        self.inner.shared.lock().device.clone()
    }

    /// Attach a device, or detach with `None`, and tell observers.
    pub fn attach_device(&self, device: Option<Arc<Ebb>>) {
        let path = device.as_ref().map(|d| d.name().to_string());
        self.inner.shared.lock().device = device;
        match &path {
            Some(p) => info!("Device attached: {}", p),
            None => info!("Device detached"),
        }
        self.inner.bus.publish(PlotEvent::DeviceAttached { path });
    }

    /// Attach every device the discovery task reports, until its channel
    /// closes.
    pub fn watch_devices(&self, mut devices: mpsc::Receiver<Option<Arc<Ebb>>>) -> JoinHandle<()> {
        let session = self.clone();
        tokio::spawn(async move {
            while let Some(device) = devices.recv().await {
                session.attach_device(device);
            }
        })
    }

    /// Register an observer and replay the current device, pause, progress
    /// and plan state to it.
    ///
    /// The handler runs on the publishing task and must not register or
    /// unregister observers itself.
    pub fn register_observer<F>(&self, filter: EventFilter, handler: F) -> SubscriptionId
    where
        F: Fn(PlotEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = self.inner.bus.subscribe(filter, handler);

        let replay = {
            let s = self.inner.shared.lock();
            let mut events = vec![
                PlotEvent::DeviceAttached {
                    path: s.device.as_ref().map(|d| d.name().to_string()),
                },
                PlotEvent::PauseChanged {
                    paused: s.state == SessionState::Paused,
                },
            ];
            if let Some(motion_index) = s.motion_index {
                events.push(PlotEvent::Progress {
                    motion_index,
                    total: s.total,
                });
            }
            if let Some(plan) = &s.current_plan {
                events.push(PlotEvent::PlanAccepted { plan: plan.clone() });
            }
            events
        };
        for event in replay {
            self.inner.bus.publish_to(id, event);
        }
        id
    }

    pub fn unregister_observer(&self, id: SubscriptionId) -> bool {
        self.inner.bus.unsubscribe(id)
    }

    /// Start plotting `plan` on the attached device, or simulate it when no
    /// device is attached.
    pub fn submit_plot(&self, plan: Plan) -> std::result::Result<JoinHandle<()>, SessionError> {
        let device = self.device().filter(|d| !d.is_closed());
        let config = &self.inner.config;
        let plotter: Box<dyn Plotter> = match device {
            Some(ebb) => Box::new(DevicePlotter::new(
                ebb,
                config.device.clone(),
                config.machine.pen_home_pos(),
            )),
            None => Box::new(SimulatedPlotter::new(config.simulation_time_scale)),
        };
        self.submit_plot_with(plotter, plan)
    }

    /// Start plotting `plan` with `plotter`.
    ///
    /// Rejected with [`SessionError::Busy`] while another plot is running;
    /// the running plot is unaffected.
    pub fn submit_plot_with(
        &self,
        plotter: Box<dyn Plotter>,
        plan: Plan,
    ) -> std::result::Result<JoinHandle<()>, SessionError> {
        let plan = Arc::new(plan);
        {
            let mut s = self.inner.shared.lock();
            if s.plot_active {
                warn!("Received plot request, but a plot is already in progress!");
                return Err(SessionError::Busy);
            }
            s.plot_active = true;
            s.state = SessionState::Plotting;
            s.pause_requested = false;
            s.cancel_requested = false;
            s.limp_requested = false;
            s.motion_index = None;
            s.total = plan.len();
            s.current_plan = Some(plan.clone());
        }
        self.inner.gate.send_replace(true);

        info!(
            "Received plan of estimated duration {:.1}s, plotting on {}",
            plan.duration(),
            plotter.name()
        );
        self.inner
            .bus
            .publish(PlotEvent::PlanAccepted { plan: plan.clone() });

        let inner = self.inner.clone();
        Ok(tokio::spawn(async move {
            inner.run_plot(plotter, plan).await;
        }))
    }

    /// Request a pause. It takes effect at the next motion boundary where
    /// the pen is up.
    pub fn pause(&self) -> std::result::Result<(), SessionError> {
        let mut s = self.inner.shared.lock();
        match s.state {
            SessionState::Plotting => {
                s.state = SessionState::PausePending;
                s.pause_requested = true;
                self.inner.gate.send_replace(false);
                info!("Pause requested");
                Ok(())
            }
            SessionState::PausePending | SessionState::Paused => Ok(()),
            state if s.plot_active => Err(invalid_state("pause", state)),
            _ => Err(SessionError::NotPlotting),
        }
    }

    /// Withdraw a pending pause or continue a paused plot from the next
    /// motion. A running plot that is not paused is left alone.
    pub fn resume(&self) -> std::result::Result<(), SessionError> {
        let mut s = self.inner.shared.lock();
        match s.state {
            SessionState::PausePending | SessionState::Paused => {
                s.state = SessionState::Plotting;
                s.pause_requested = false;
                self.inner.gate.send_replace(true);
                info!("Resuming");
                Ok(())
            }
            _ if s.plot_active => Ok(()),
            _ => Err(SessionError::NotPlotting),
        }
    }

    /// Request cancellation at the next motion boundary. A paused plot is
    /// released so it can stop.
    pub fn cancel(&self) -> std::result::Result<(), SessionError> {
        let mut s = self.inner.shared.lock();
        if !s.plot_active {
            return Err(SessionError::NotPlotting);
        }
        if s.state == SessionState::Limp {
            return Err(invalid_state("cancel", s.state));
        }
        s.state = SessionState::Cancelling;
        s.cancel_requested = true;
        s.pause_requested = false;
        self.inner.gate.send_replace(true);
        info!("Cancel requested");
        Ok(())
    }

    /// Disable the motors now and abandon any running plot without
    /// returning the pen home.
    ///
    /// The device is halted, so a motion in progress stops after the move
    /// the board is already executing.
    pub async fn limp(&self) -> Result<()> {
        let device = {
            let mut s = self.inner.shared.lock();
            if s.plot_active {
                s.limp_requested = true;
                s.pause_requested = false;
            }
            s.state = SessionState::Limp;
            s.device.clone()
        };
        self.inner.gate.send_replace(true);
        warn!("Limp requested, disabling motors");
        self.inner.bus.publish(PlotEvent::Limped);
        if let Some(ebb) = device {
            ebb.halt().await?;
        }
        Ok(())
    }

    /// Move the pen of the attached device directly.
    pub async fn set_pen_height(&self, height: i32, rate: u32) -> Result<()> {
        let device = self.device().ok_or(DeviceError::NotAttached)?;
        device.set_pen_height(height, rate, 0).await
    }
}

fn invalid_state(request: &str, state: SessionState) -> SessionError {
    SessionError::InvalidState {
        request: request.to_string(),
        state: state.to_string(),
    }
}

impl Inner {
    async fn run_plot(&self, plotter: Box<dyn Plotter>, plan: Arc<Plan>) {
        let started = Instant::now();
        let ending = self.drive(plotter.as_ref(), &plan).await;
        {
            let mut s = self.shared.lock();
            s.motion_index = None;
            s.current_plan = None;
        }

        match ending {
            Ok(Ending::Finished) => {
                self.bus.publish(PlotEvent::PlotFinished);
                self.post_plot(plotter.as_ref()).await;
                info!("Plot took {:.1}s", started.elapsed().as_secs_f64());
            }
            Ok(Ending::Cancelled) => {
                self.post_cancel(plotter.as_ref()).await;
                self.bus.publish(PlotEvent::PlotCancelled);
                self.post_plot(plotter.as_ref()).await;
            }
            Ok(Ending::Limped) => {
                info!("Plot abandoned");
            }
            Err(e) => {
                error!("Plot failed: {:#}", e);
                self.bus.publish(PlotEvent::PlotFailed {
                    message: format!("{:#}", e),
                });
                self.post_cancel(plotter.as_ref()).await;
                self.post_plot(plotter.as_ref()).await;
            }
        }

        let mut s = self.shared.lock();
        s.plot_active = false;
        s.pause_requested = false;
        s.cancel_requested = false;
        s.limp_requested = false;
        if s.state != SessionState::Limp {
            s.state = SessionState::Idle;
        }
        self.gate.send_replace(true);
    }

    async fn drive(&self, plotter: &dyn Plotter, plan: &Plan) -> anyhow::Result<Ending> {
        let initial_pen_height = plan.first_pen_motion().map(|p| p.initial_pos);
        plotter.pre_plot(initial_pen_height).await?;

        let total = plan.len();
        let mut pen_up = true;
        for (motion_index, motion) in plan.motions().iter().enumerate() {
            self.shared.lock().motion_index = Some(motion_index);
            self.bus.publish(PlotEvent::Progress {
                motion_index,
                total,
            });
            if let Err(e) = plotter.execute_motion(motion, (motion_index, total)).await {
                // a halted device refuses the rest of the motion
                if self.shared.lock().limp_requested {
                    info!("Motion {}/{} cut short: {:#}", motion_index + 1, total, e);
                    return Ok(Ending::Limped);
                }
                return Err(e);
            }

            if let Motion::Pen(pen) = motion {
                pen_up = pen.raises_pen();
            }
            if pen_up && self.enter_pause() {
                info!("Paused after motion {}/{}", motion_index + 1, total);
                self.bus.publish(PlotEvent::PauseChanged { paused: true });
                let mut gate = self.gate.subscribe();
                // the sender lives as long as the session
                let _ = gate.wait_for(|open| *open).await;
                self.bus.publish(PlotEvent::PauseChanged { paused: false });
            }

            let s = self.shared.lock();
            if s.cancel_requested {
                return Ok(Ending::Cancelled);
            }
            if s.limp_requested {
                return Ok(Ending::Limped);
            }
        }
        Ok(Ending::Finished)
    }

    /// Move from pause-pending to paused. False if no pause is pending.
    fn enter_pause(&self) -> bool {
        let mut s = self.shared.lock();
        if s.pause_requested && s.state == SessionState::PausePending {
            s.state = SessionState::Paused;
            true
        } else {
            false
        }
    }

    async fn post_cancel(&self, plotter: &dyn Plotter) {
        if let Err(e) = plotter.post_cancel().await {
            error!("Cleanup after cancelled plot failed: {:#}", e);
        }
    }

    async fn post_plot(&self, plotter: &dyn Plotter) {
        if let Err(e) = plotter.post_plot().await {
            error!("Post-plot shutdown failed: {:#}", e);
        }
    }
}
