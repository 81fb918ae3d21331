//! Plot execution backends.
//!
//! A [`Plotter`] is what a session drives motion by motion. The device
//! plotter talks to an EBB; the simulated plotter only logs and waits.

use async_trait::async_trait;
use penkit_communication::{Ebb, EbbConfig};
use penkit_core::Motion;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Hooks a plot session calls around and for every motion.
#[async_trait]
pub trait Plotter: Send + Sync {
    /// Display name for logs.
    fn name(&self) -> &str;

    /// Prepare for a plot, moving the pen to `initial_pen_height` if the
    /// plan has pen motions.
    async fn pre_plot(&self, initial_pen_height: Option<i32>) -> anyhow::Result<()>;

    /// Run one motion. `progress` is `(motion_index, total)`.
    async fn execute_motion(&self, motion: &Motion, progress: (usize, usize))
        -> anyhow::Result<()>;

    /// Leave the machine safe after a cancelled or failed plot.
    async fn post_cancel(&self) -> anyhow::Result<()>;

    /// Wind down after any plot that was not abandoned.
    async fn post_plot(&self) -> anyhow::Result<()>;
}

/// Drives a connected EBB.
pub struct DevicePlotter {
    ebb: Arc<Ebb>,
    config: EbbConfig,
    pen_home_pos: i32,
}

impl DevicePlotter {
    pub fn new(ebb: Arc<Ebb>, config: EbbConfig, pen_home_pos: i32) -> Self {
        Self {
            ebb,
            config,
            pen_home_pos,
        }
    }
}

#[async_trait]
impl Plotter for DevicePlotter {
    fn name(&self) -> &str {
        self.ebb.name()
    }

    async fn pre_plot(&self, initial_pen_height: Option<i32>) -> anyhow::Result<()> {
        self.ebb
            .enable_motors(self.config.microstepping_mode)
            .await?;
        if let Some(height) = initial_pen_height {
            self.ebb
                .set_pen_height(
                    height,
                    self.config.pre_plot_pen_rate,
                    self.config.pre_plot_pen_delay_ms,
                )
                .await?;
        }
        Ok(())
    }

    async fn execute_motion(
        &self,
        motion: &Motion,
        _progress: (usize, usize),
    ) -> anyhow::Result<()> {
        self.ebb.execute_motion(motion).await?;
        Ok(())
    }

    async fn post_cancel(&self) -> anyhow::Result<()> {
        self.ebb
            .set_pen_height(self.pen_home_pos, self.config.cancel_pen_rate, 0)
            .await?;
        self.ebb.home(self.config.home_rate).await?;
        Ok(())
    }

    async fn post_plot(&self) -> anyhow::Result<()> {
        self.ebb.wait_until_motors_idle().await?;
        self.ebb.disable_motors().await?;
        Ok(())
    }
}

/// Pretends to plot by sleeping for each motion's duration.
pub struct SimulatedPlotter {
    time_scale: f64,
}

impl SimulatedPlotter {
    /// `time_scale` multiplies every motion's duration; 0 runs instantly.
    pub fn new(time_scale: f64) -> Self {
        Self { time_scale }
    }
}

impl Default for SimulatedPlotter {
    fn default() -> Self {
        Self::new(1.0)
    }
}

#[async_trait]
impl Plotter for SimulatedPlotter {
    fn name(&self) -> &str {
        "simulation"
    }

    async fn pre_plot(&self, _initial_pen_height: Option<i32>) -> anyhow::Result<()> {
        Ok(())
    }

    async fn execute_motion(
        &self,
        motion: &Motion,
        progress: (usize, usize),
    ) -> anyhow::Result<()> {
        info!("Motion {}/{}", progress.0 + 1, progress.1);
        let seconds = motion.duration() * self.time_scale;
        if seconds.is_finite() && seconds > 0.0 {
            tokio::time::sleep(Duration::from_secs_f64(seconds)).await;
        }
        Ok(())
    }

    async fn post_cancel(&self) -> anyhow::Result<()> {
        info!("Plot cancelled");
        Ok(())
    }

    async fn post_plot(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use penkit_communication::MockSerialLink;
    use penkit_core::PenMotion;

    #[tokio::test]
    async fn test_device_plotter_hooks() {
        let (link, handle) = MockSerialLink::new("mock0");
        let ebb = Arc::new(Ebb::open(Box::new(link), EbbConfig::default()).unwrap());
        let plotter = DevicePlotter::new(ebb, EbbConfig::default(), 28000);

        plotter.pre_plot(Some(17750)).await.unwrap();
        plotter
            .execute_motion(&Motion::Pen(PenMotion::new(17750, 15700, 0.12)), (0, 1))
            .await
            .unwrap();
        plotter.post_cancel().await.unwrap();
        plotter.post_plot().await.unwrap();

        assert_eq!(
            handle.commands(),
            vec![
                "EM,2,2",
                "S2,17750,4,1000,1000",
                "S2,15700,4,0,120",
                "S2,28000,4,1000,0",
                "HM,5000",
                "QM",
                "EM,0,0",
            ]
        );
    }

    #[tokio::test]
    async fn test_simulated_plotter_instant_at_zero_scale() {
        let plotter = SimulatedPlotter::new(0.0);
        let motion = Motion::Pen(PenMotion::new(0, 1, 100.0));
        tokio::time::timeout(
            Duration::from_millis(500),
            plotter.execute_motion(&motion, (0, 1)),
        )
        .await
        .unwrap()
        .unwrap();
    }
}
