//! Wiring of the discovery and dispatch loops
//!
//! Both loops and every session they start hang off one cancellation token.
//! Cancelling it through `StreamerHandle` stops both loops at their next
//! suspension point and kills the running transcoders.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::discovery::{peer_channel, Discovery, DiscoveryLoop};
use crate::dispatch::{DispatchLoop, SessionRegistry};
use crate::protocol::StreamSource;
use crate::transcode::Launcher;

/// Running pipeline
pub struct StreamerHandle {
    shutdown: CancellationToken,
    registry: SessionRegistry,
    discovery_task: JoinHandle<()>,
    dispatch_task: JoinHandle<()>,
}

/// Start discovery and dispatch for `source`.
///
/// `source` must already be resolved; an empty selection never gets this far.
pub fn spawn<D: Discovery, L: Launcher>(
    config: &AppConfig,
    source: StreamSource,
    discovery: Arc<D>,
    launcher: Arc<L>,
) -> StreamerHandle {
    let shutdown = CancellationToken::new();
    let registry = SessionRegistry::new();
    let (tx, rx) = peer_channel();

    let discovery_loop = DiscoveryLoop::new(discovery, config.discovery.clone(), tx, shutdown.clone());
    let dispatch_loop = DispatchLoop::new(
        source,
        &config.stream,
        launcher,
        registry.clone(),
        shutdown.child_token(),
    );

    StreamerHandle {
        discovery_task: tokio::spawn(discovery_loop.run()),
        dispatch_task: tokio::spawn(dispatch_loop.run(rx)),
        shutdown,
        registry,
    }
}

impl StreamerHandle {
    /// Token that stops the whole pipeline when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Wait for both loops to finish.
    pub async fn join(self) {
        if let Err(e) = self.discovery_task.await {
            tracing::error!("Discovery task failed: {}", e);
        }
        if let Err(e) = self.dispatch_task.await {
            tracing::error!("Dispatch task failed: {}", e);
        }
    }

    /// Request shutdown and wait for both loops to stop.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        self.join().await;
    }
}
