//! Background device (re)acquisition.
//!
//! The discovery task waits for an EBB to show up, opens it and hands it
//! over. When the link drops it reports the loss and starts waiting again.

use crate::communication::serial::LinkProvider;
use crate::firmware::ebb::{Ebb, EbbConfig};
use penkit_core::{ConnectionError, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Spawn the discovery loop.
///
/// Opens `port` when given, otherwise the first EBB the provider lists,
/// polling every `retry_delay` until one appears. Each opened device is sent
/// as `Some(ebb)`, followed by `None` once its link closes. Failed opens are
/// retried after `retry_delay`. The task ends when the receiver is dropped.
pub fn spawn_discovery(
    provider: Arc<dyn LinkProvider>,
    port: Option<String>,
    retry_delay: Duration,
    config: EbbConfig,
    devices: mpsc::Sender<Option<Arc<Ebb>>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let name = match &port {
                Some(p) => p.clone(),
                None => wait_for_ebb(provider.as_ref(), retry_delay).await,
            };
            info!("Found EBB at {}", name);

            let ebb = match open(provider.as_ref(), &name, &config) {
                Ok(ebb) => Arc::new(ebb),
                Err(e) => {
                    error!("Error connecting to EBB: {}", e);
                    error!("Retrying in {:?}", retry_delay);
                    tokio::time::sleep(retry_delay).await;
                    continue;
                }
            };

            if devices.send(Some(ebb.clone())).await.is_err() {
                ebb.close().await;
                return;
            }
            ebb.closed().await;
            if devices.send(None).await.is_err() {
                return;
            }
            error!("Lost connection to EBB, reconnecting...");
        }
    })
}

fn open(provider: &dyn LinkProvider, name: &str, config: &EbbConfig) -> Result<Ebb> {
    let link = provider.open(name)?;
    Ebb::open(link, config.clone())
}

async fn wait_for_ebb(provider: &dyn LinkProvider, retry_delay: Duration) -> String {
    loop {
        match provider.list_ebb_ports() {
            Ok(ports) => {
                if let Some(first) = ports.into_iter().next() {
                    return first;
                }
            }
            Err(e) => error!("{}", e),
        }
        tokio::time::sleep(retry_delay).await;
    }
}

/// Open `port`, or the first EBB found, once.
pub fn connect_once(
    provider: &dyn LinkProvider,
    port: Option<&str>,
    config: &EbbConfig,
) -> Result<Ebb> {
    let name = match port {
        Some(p) => p.to_string(),
        None => provider
            .list_ebb_ports()?
            .into_iter()
            .next()
            .ok_or_else(|| ConnectionError::PortNotFound {
                port: "EBB".to_string(),
            })?,
    };
    open(provider, &name, config)
}
