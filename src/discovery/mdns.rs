//! mDNS/DNS-SD discovery backend
//!
//! Receivers announce `_{service}._tcp.local.`. The backend browses for that
//! type, keeps the set of currently resolved peers, and fetches the address
//! from a peer over plain HTTP.

use async_trait::async_trait;
use mdns_sd::{IfKind, ServiceDaemon, ServiceEvent};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

use crate::config::DiscoveryConfig;
use crate::discovery::{Discovery, DiscoveryRequest, ResponseBody};
use crate::error::DiscoveryError;

/// DNS-SD service type for a service name
pub fn service_type(service: &str) -> String {
    format!("_{}._tcp.local.", service)
}

/// A resolved receiver instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPeer {
    pub addresses: Vec<IpAddr>,
    pub port: u16,
}

impl ResolvedPeer {
    /// IPv4 if the peer has one, else a routable IPv6 address.
    ///
    /// Link-local IPv6 is never chosen: mDNS reports it without a scope, so
    /// a request to it cannot be routed.
    pub fn preferred_address(&self) -> Option<IpAddr> {
        self.addresses
            .iter()
            .find(|ip| ip.is_ipv4())
            .or_else(|| self.addresses.iter().find(|ip| !is_link_local_v6(ip)))
            .copied()
    }
}

fn is_link_local_v6(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V6(v6) => (v6.segments()[0] & 0xffc0) == 0xfe80,
        IpAddr::V4(_) => false,
    }
}

/// Fail unless `name` is one of the host's network interfaces.
///
/// The daemon accepts any interface name and silently listens on nothing
/// when it does not exist.
pub fn check_interface(name: &str) -> Result<(), DiscoveryError> {
    let interfaces = if_addrs::get_if_addrs()
        .map_err(|e| DiscoveryError::Init(format!("cannot list network interfaces: {}", e)))?;
    let names: Vec<String> = interfaces.into_iter().map(|iface| iface.name).collect();
    require_interface(name, &names)
}

fn require_interface(name: &str, available: &[String]) -> Result<(), DiscoveryError> {
    if available.iter().any(|candidate| candidate == name) {
        return Ok(());
    }

    let mut known = available.to_vec();
    known.sort();
    known.dedup();
    Err(DiscoveryError::Init(format!(
        "network interface '{}' not found (available: {})",
        name,
        known.join(", ")
    )))
}

/// Create a daemon, restricted to `interface` unless it is empty.
pub fn start_daemon(interface: &str) -> Result<ServiceDaemon, DiscoveryError> {
    let init = |e: mdns_sd::Error| DiscoveryError::Init(e.to_string());

    if !interface.is_empty() {
        check_interface(interface)?;
    }

    let daemon = ServiceDaemon::new().map_err(init)?;
    if !interface.is_empty() {
        daemon.disable_interface(IfKind::All).map_err(init)?;
        daemon
            .enable_interface(IfKind::Name(interface.to_string()))
            .map_err(init)?;
    }
    Ok(daemon)
}

/// Peers currently resolved for one service type
#[derive(Default)]
pub struct PeerTable {
    peers: Mutex<BTreeMap<String, ResolvedPeer>>,
    changed: Notify,
    cursor: AtomicUsize,
}

impl PeerTable {
    pub fn resolve(&self, fullname: &str, peer: ResolvedPeer) {
        self.peers.lock().insert(fullname.to_string(), peer);
        self.changed.notify_waiters();
    }

    pub fn remove(&self, fullname: &str) {
        self.peers.lock().remove(fullname);
    }

    pub fn is_empty(&self) -> bool {
        self.peers.lock().is_empty()
    }

    /// Wait until at least one peer is resolved.
    pub async fn wait_until_reachable(&self) {
        loop {
            let changed = self.changed.notified();
            let reachable = !self.is_empty();
            if reachable {
                return;
            }
            changed.await;
        }
    }

    /// Next peer in round-robin order
    pub fn next_peer(&self) -> Option<ResolvedPeer> {
        let peers = self.peers.lock();
        if peers.is_empty() {
            return None;
        }
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % peers.len();
        peers.values().nth(index).cloned()
    }

    fn apply(&self, event: ServiceEvent) -> bool {
        match event {
            ServiceEvent::ServiceResolved(info) => {
                let peer = ResolvedPeer {
                    addresses: info.get_addresses().iter().copied().collect(),
                    port: info.get_port(),
                };
                tracing::debug!(
                    "Resolved {} at {:?} port {}",
                    info.get_fullname(),
                    peer.addresses,
                    peer.port
                );
                self.resolve(info.get_fullname(), peer);
            }
            ServiceEvent::ServiceRemoved(_, fullname) => {
                tracing::debug!("{} went away", fullname);
                self.remove(&fullname);
            }
            ServiceEvent::SearchStopped(service_type) => {
                tracing::debug!("Stopped browsing {}", service_type);
                return false;
            }
            _ => {}
        }
        true
    }
}

/// Discovery over mDNS with HTTP address retrieval
pub struct MdnsDiscovery {
    daemon: ServiceDaemon,
    client: reqwest::Client,
    tables: Mutex<HashMap<String, Arc<PeerTable>>>,
}

impl MdnsDiscovery {
    /// Start the mDNS daemon on the configured interface.
    ///
    /// This is the only fatal discovery failure.
    pub fn new(config: &DiscoveryConfig) -> Result<Self, DiscoveryError> {
        let daemon = start_daemon(&config.interface)?;

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| DiscoveryError::Init(e.to_string()))?;

        Ok(Self {
            daemon,
            client,
            tables: Mutex::new(HashMap::new()),
        })
    }

    /// Peer table for `service`, browsing for it on first use
    fn table(&self, service: &str) -> Result<Arc<PeerTable>, DiscoveryError> {
        let mut tables = self.tables.lock();
        if let Some(table) = tables.get(service) {
            return Ok(table.clone());
        }

        let service_type = service_type(service);
        let events = self
            .daemon
            .browse(&service_type)
            .map_err(|e| DiscoveryError::Transport(format!("browse {}: {}", service_type, e)))?;
        tracing::debug!("Browsing for {}", service_type);

        let table = Arc::new(PeerTable::default());
        let tracked = table.clone();
        tokio::spawn(async move {
            while let Ok(event) = events.recv_async().await {
                if !tracked.apply(event) {
                    break;
                }
            }
        });

        tables.insert(service.to_string(), table.clone());
        Ok(table)
    }
}

impl Drop for MdnsDiscovery {
    fn drop(&mut self) {
        if let Err(e) = self.daemon.shutdown() {
            tracing::debug!("mDNS daemon shutdown: {}", e);
        }
    }
}

struct HttpBody(reqwest::Response);

#[async_trait]
impl ResponseBody for HttpBody {
    async fn text(self: Box<Self>) -> Result<String, DiscoveryError> {
        self.0
            .text()
            .await
            .map_err(|e| DiscoveryError::Read(e.to_string()))
    }
}

#[async_trait]
impl Discovery for MdnsDiscovery {
    async fn wait_for(&self, service: &str) -> Result<(), DiscoveryError> {
        let table = self.table(service)?;
        table.wait_until_reachable().await;
        Ok(())
    }

    async fn get(&self, request: &DiscoveryRequest) -> Result<Box<dyn ResponseBody>, DiscoveryError> {
        let table = self.table(&request.service)?;
        let peer = table.next_peer().ok_or_else(|| {
            DiscoveryError::Transport(format!("no '{}' peer is reachable", request.service))
        })?;
        let ip = peer
            .preferred_address()
            .ok_or_else(|| DiscoveryError::Transport("peer announced no address".to_string()))?;

        let url = format!("http://{}/{}", SocketAddr::new(ip, peer.port), request.path);
        tracing::debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| DiscoveryError::Transport(format!("{}: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(DiscoveryError::Transport(format!(
                "{} answered {}",
                url,
                response.status()
            )));
        }

        Ok(Box::new(HttpBody(response)))
    }
}
