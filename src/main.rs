use anyhow::Context;
use penkit::{
    init_logging, load_plot, session_config, spawn_discovery, Config, EventBusError, PlotEvent,
    PlotSession, SystemLinkProvider, BUILD_DATE, VERSION,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// How long to wait for a device before falling back to simulation.
const DEVICE_WAIT: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging()?;
    info!("penkit {} (built {})", VERSION, BUILD_DATE);

    let config_path = match std::env::var_os("PENKIT_CONFIG") {
        Some(path) => PathBuf::from(path),
        None => Config::default_path()?,
    };
    let config = Config::load_or_default(&config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;

    let session = PlotSession::new(session_config(&config));
    let event_log = spawn_event_log(session.bus().receiver());

    let provider = Arc::new(SystemLinkProvider {
        baud_rate: config.connection.baud_rate,
        read_timeout: config.connection.read_timeout(),
    });
    let (devices_tx, devices_rx) = mpsc::channel(4);
    let discovery = spawn_discovery(
        provider,
        config.connection.port.clone(),
        config.connection.reconnect_delay(),
        config.device.clone(),
        devices_tx,
    );
    let watcher = session.watch_devices(devices_rx);

    match std::env::args_os().nth(1).map(PathBuf::from) {
        Some(plot_path) => {
            let plan = load_plot(&plot_path, &config)?;

            let deadline = tokio::time::Instant::now() + DEVICE_WAIT;
            while session.device().is_none() && tokio::time::Instant::now() < deadline {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            if session.device().is_none() {
                warn!("No EBB found, simulating");
            }

            let plot = session.submit_plot(plan)?;
            tokio::select! {
                result = plot => result.context("plot task panicked")?,
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted, cancelling plot");
                    if let Err(e) = session.cancel() {
                        warn!("{}", e);
                    }
                    while session.is_plotting() {
                        tokio::time::sleep(Duration::from_millis(50)).await;
                    }
                }
            }
        }
        None => {
            info!("Waiting for devices, press Ctrl-C to exit");
            tokio::signal::ctrl_c().await?;
        }
    }

    discovery.abort();
    watcher.abort();
    event_log.abort();
    if let Some(ebb) = session.device() {
        ebb.close().await;
    }
    Ok(())
}

/// Log session events from a broadcast receiver until the bus goes away.
fn spawn_event_log(mut events: broadcast::Receiver<PlotEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await.map_err(EventBusError::from) {
                Ok(event @ PlotEvent::Progress { .. }) => debug!("{}", event.description()),
                Ok(event @ PlotEvent::PlotFailed { .. }) => warn!("{}", event.description()),
                Ok(event) => info!("{}", event.description()),
                Err(e @ EventBusError::Lagged(_)) => warn!("{}", e),
                Err(EventBusError::ChannelClosed) => break,
            }
        }
    })
}
