//! Discovery loop
//!
//! Repeatedly waits for a receiver, asks it for its address and hands the
//! address to the dispatch loop. Every failure is logged and the loop moves
//! on; it only stops on shutdown or when nobody is left to receive.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::DiscoveryConfig;
use crate::discovery::{Discovery, DiscoveryRequest, PeerAddressSender};
use crate::protocol::PeerAddress;

/// Producer side of the peer address channel
pub struct DiscoveryLoop<D: Discovery> {
    discovery: Arc<D>,
    config: DiscoveryConfig,
    addresses: PeerAddressSender,
    shutdown: CancellationToken,
}

/// Whether the loop should keep going
enum Step {
    Continue,
    Stop,
}

impl<D: Discovery> DiscoveryLoop<D> {
    pub fn new(
        discovery: Arc<D>,
        config: DiscoveryConfig,
        addresses: PeerAddressSender,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            discovery,
            config,
            addresses,
            shutdown,
        }
    }

    /// Run until shutdown or until the dispatch side goes away.
    pub async fn run(self) {
        tracing::info!(
            "Discovering '{}' receivers on {}",
            self.config.service_name,
            if self.config.interface.is_empty() { "all interfaces" } else { self.config.interface.as_str() }
        );

        while let Step::Continue = self.iterate().await {}

        tracing::info!("Discovery loop stopped");
    }

    async fn iterate(&self) -> Step {
        match self.interruptible(self.discovery.wait_for(&self.config.service_name)).await {
            None => return Step::Stop,
            Some(Ok(())) => {}
            Some(Err(e)) => {
                tracing::warn!("{}", e);
                return self.pause(self.config.transport_cooldown()).await;
            }
        }

        // The service becomes reachable slightly before the peer can answer.
        if let Step::Stop = self.pause(self.config.settle_interval()).await {
            return Step::Stop;
        }

        let request = match DiscoveryRequest::new(&self.config.service_name, &self.config.address_path) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!("{}", e);
                return Step::Continue;
            }
        };

        let response = match self.interruptible(self.discovery.get(&request)).await {
            None => return Step::Stop,
            Some(Ok(response)) => response,
            Some(Err(e)) => {
                tracing::warn!("{}", e);
                // Give the peer time to drop the failed connection.
                return self.pause(self.config.transport_cooldown()).await;
            }
        };

        let address = match self.interruptible(response.text()).await {
            None => return Step::Stop,
            Some(body) => match body.and_then(|body| PeerAddress::parse(&body)) {
                Ok(address) => address,
                Err(e) => {
                    tracing::warn!("{}", e);
                    return Step::Continue;
                }
            },
        };

        tracing::debug!("Discovered receiver at {}", address);

        match self.interruptible(self.addresses.send(address)).await {
            None => return Step::Stop,
            Some(Ok(())) => {}
            Some(Err(_)) => {
                tracing::info!("Dispatch loop is gone");
                return Step::Stop;
            }
        }

        self.pause(self.config.discovery_interval()).await
    }

    /// Await `future` unless shutdown is requested first.
    async fn interruptible<F: Future>(&self, future: F) -> Option<F::Output> {
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => None,
            output = future => Some(output),
        }
    }

    async fn pause(&self, duration: Duration) -> Step {
        match self.interruptible(tokio::time::sleep(duration)).await {
            Some(()) => Step::Continue,
            None => Step::Stop,
        }
    }
}
