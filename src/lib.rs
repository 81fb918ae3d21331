//! # Penkit
//!
//! Motion planning and device control for EiBotBoard pen plotters.
//!
//! ## Architecture
//!
//! Penkit is organized as a workspace with multiple crates:
//!
//! 1. **penkit-core** - Plan model, errors, event bus
//! 2. **penkit-planner** - Path ordering, acceleration planning, plan preparation
//! 3. **penkit-communication** - Serial links, the EBB driver, device discovery
//! 4. **penkit-settings** - Persisted configuration
//! 5. **penkit-session** - Plot sessions with pause, cancel and limp
//! 6. **penkit** - Main binary that integrates all crates

use anyhow::Context;
use std::path::Path;

pub use penkit_communication::{
    connect_once, list_ebb_ports, spawn_discovery, Ebb, EbbConfig, FirmwareVersion,
    LinkProvider, SerialPortInfo, SystemLinkProvider,
};

pub use penkit_core::{
    Block, ConnectionError, DeviceError, Error, EventBus, EventBusError, EventCategory,
    EventFilter, Motion, PenMotion, Plan, PlanError, PlotEvent, Point, Polyline, ProtocolError,
    Result, SessionError, XyMotion,
};

pub use penkit_planner::{replan, AccelerationProfile, MachineProfile, PlanOptions, ToolingProfile};

pub use penkit_session::{PlotSession, Plotter, SessionConfig, SessionState};

pub use penkit_settings::{Config, ConnectionSettings, SessionSettings, SettingsError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Initialize logging with the default configuration
///
/// Console output, `RUST_LOG` support, INFO by default.
pub fn init_logging() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(tracing::Level::INFO.to_string()));

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_thread_names(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .context("failed to install tracing subscriber")?;

    Ok(())
}

/// Build a session configuration from the persisted settings.
pub fn session_config(config: &Config) -> SessionConfig {
    SessionConfig {
        device: config.device.clone(),
        machine: config.machine,
        simulation_time_scale: config.session.simulation_time_scale,
        events: penkit_core::EventBusConfig {
            channel_capacity: config.session.event_capacity,
        },
    }
}

/// Read a plot from a JSON file.
///
/// The file holds either a serialized plan, which is used as is apart from
/// the pen heights, or an array of millimetre paths (`[[[x, y], ...], ...]`),
/// which are run through the full preparation pipeline.
pub fn load_plot(path: &Path, config: &Config) -> anyhow::Result<Plan> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;

    let options = &config.plan;
    let machine = &config.machine;
    if let Ok(paths) = serde_json::from_str::<Vec<Polyline>>(&content) {
        let plan = replan(&paths, options, machine)
            .with_context(|| format!("failed to plan {}", path.display()))?;
        return Ok(plan);
    }

    let plan = Plan::from_json(&content)
        .with_context(|| format!("{} is neither a plan nor a path list", path.display()))?;
    Ok(plan.with_pen_heights(
        machine.pen_pct_to_pos(options.pen_up_height),
        machine.pen_pct_to_pos(options.pen_down_height),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_session_config_from_settings() {
        let mut config = Config::default();
        config.session.simulation_time_scale = 0.5;
        config.session.event_capacity = 64;
        let session = session_config(&config);
        assert_eq!(session.simulation_time_scale, 0.5);
        assert_eq!(session.events.channel_capacity, 64);
        assert_eq!(session.device, config.device);
    }

    #[test]
    fn test_load_plot_from_paths() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("square.json");
        std::fs::write(
            &path,
            "[[[0, 0], [10, 0], [10, 10], [0, 10], [0, 0]], [[20, 0], [30, 5]]]",
        )
        .unwrap();

        let plan = load_plot(&path, &Config::default()).unwrap();
        assert!(!plan.is_empty());
        assert!(plan.first_pen_motion().is_some());
    }

    #[test]
    fn test_load_plot_from_plan() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("plan.json");
        let plan = Plan::new(vec![
            Motion::Pen(PenMotion::new(1, 2, 0.1)),
            Motion::Pen(PenMotion::new(2, 1, 0.1)),
            Motion::Pen(PenMotion::new(1, 3, 0.1)),
            Motion::Pen(PenMotion::new(3, 1, 0.1)),
        ]);
        std::fs::write(&path, plan.to_json().unwrap()).unwrap();

        let config = Config::default();
        let loaded = load_plot(&path, &config).unwrap();
        let up = config.machine.pen_pct_to_pos(config.plan.pen_up_height);
        let down = config.machine.pen_pct_to_pos(config.plan.pen_down_height);
        let first = loaded.first_pen_motion().unwrap();
        assert_eq!((first.initial_pos, first.final_pos), (up, down));
    }

    #[test]
    fn test_load_plot_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("junk.json");
        std::fs::write(&path, "{\"nope\": true}").unwrap();
        assert!(load_plot(&path, &Config::default()).is_err());
    }
}
