//! Peer discovery
//!
//! The pipeline only needs two things from a discovery backend: a way to
//! wait until a named service is reachable, and a way to ask a reachable
//! peer for its address. `Discovery` captures exactly that; `MdnsDiscovery`
//! is the backend shipped with the crate.

pub mod mdns;
pub mod worker;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::DiscoveryError;
use crate::protocol::PeerAddress;

pub use mdns::MdnsDiscovery;
pub use worker::DiscoveryLoop;

/// Sending half of the peer address hand-off
pub type PeerAddressSender = mpsc::Sender<PeerAddress>;

/// Receiving half of the peer address hand-off
pub type PeerAddressReceiver = mpsc::Receiver<PeerAddress>;

/// Create the channel between the discovery and dispatch loops.
///
/// Capacity is a single slot, so discovery can never run more than one
/// address ahead of dispatch.
pub fn peer_channel() -> (PeerAddressSender, PeerAddressReceiver) {
    mpsc::channel(1)
}

/// Address request sent to a discovered peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryRequest {
    pub service: String,
    pub path: String,
}

impl DiscoveryRequest {
    /// Form a request for `path` on the peer providing `service`.
    pub fn new(service: &str, path: &str) -> Result<Self, DiscoveryError> {
        if service.is_empty() || service.len() > 15 {
            return Err(DiscoveryError::Request(format!(
                "service name {:?} must be 1-15 characters",
                service
            )));
        }
        if !service
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-')
        {
            return Err(DiscoveryError::Request(format!(
                "service name {:?} may only contain letters, digits and '-'",
                service
            )));
        }

        let path = path.trim_start_matches('/');
        if path.chars().any(|c| c.is_whitespace() || c == '?' || c == '#') {
            return Err(DiscoveryError::Request(format!("invalid path {:?}", path)));
        }

        Ok(Self {
            service: service.to_string(),
            path: path.to_string(),
        })
    }
}

/// Body of an address response
#[async_trait]
pub trait ResponseBody: Send {
    /// Read the whole body as text.
    async fn text(self: Box<Self>) -> Result<String, DiscoveryError>;
}

/// Service discovery backend
#[async_trait]
pub trait Discovery: Send + Sync + 'static {
    /// Wait until a peer providing `service` is reachable.
    async fn wait_for(&self, service: &str) -> Result<(), DiscoveryError>;

    /// Send `request` to a reachable peer.
    async fn get(&self, request: &DiscoveryRequest) -> Result<Box<dyn ResponseBody>, DiscoveryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_construction() {
        let request = DiscoveryRequest::new("streamplay-ip", "/ip").unwrap();
        assert_eq!(request.service, "streamplay-ip");
        assert_eq!(request.path, "ip");
    }

    #[test]
    fn test_invalid_requests() {
        assert!(matches!(
            DiscoveryRequest::new("", "ip"),
            Err(DiscoveryError::Request(_))
        ));
        assert!(matches!(
            DiscoveryRequest::new("a-service-name-too-long", "ip"),
            Err(DiscoveryError::Request(_))
        ));
        assert!(matches!(
            DiscoveryRequest::new("stream play", "ip"),
            Err(DiscoveryError::Request(_))
        ));
        assert!(matches!(
            DiscoveryRequest::new("streamplay-ip", "ip?x=1"),
            Err(DiscoveryError::Request(_))
        ));
    }

    #[tokio::test]
    async fn test_peer_channel_is_fifo() {
        let (tx, mut rx) = peer_channel();
        tokio::spawn(async move {
            for ip in ["10.0.0.1", "10.0.0.2", "10.0.0.3"] {
                tx.send(PeerAddress::parse(ip).unwrap()).await.unwrap();
            }
        });

        let mut received = Vec::new();
        while let Some(address) = rx.recv().await {
            received.push(address.to_string());
        }
        assert_eq!(received, vec!["10.0.0.1", "10.0.0.2", "10.0.0.3"]);
    }
}
