//! Registry of live streaming sessions

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::protocol::PeerAddress;

/// Snapshot of one live session
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub id: Uuid,
    pub address: PeerAddress,
    pub url: String,
    pub pid: Option<u32>,
    pub started_at: DateTime<Utc>,
}

/// Thread-safe set of live sessions, keyed by session id
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<Uuid, SessionInfo>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, info: SessionInfo) {
        self.sessions.insert(info.id, info);
    }

    pub fn remove(&self, id: &Uuid) -> Option<SessionInfo> {
        self.sessions.remove(id).map(|(_, info)| info)
    }

    /// Whether any live session streams to `address`
    pub fn is_streaming_to(&self, address: &PeerAddress) -> bool {
        self.sessions.iter().any(|entry| &entry.address == address)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// All live sessions, oldest first
    pub fn snapshot(&self) -> Vec<SessionInfo> {
        let mut sessions: Vec<SessionInfo> =
            self.sessions.iter().map(|entry| entry.value().clone()).collect();
        sessions.sort_by_key(|s| s.started_at);
        sessions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(address: &str) -> SessionInfo {
        SessionInfo {
            id: Uuid::new_v4(),
            address: PeerAddress::parse(address).unwrap(),
            url: format!("rtsp://{}:7843", address),
            pid: None,
            started_at: Utc::now(),
        }
    }

    #[test]
    fn test_registry_tracks_addresses() {
        let registry = SessionRegistry::new();
        let a = info("10.0.0.1");
        let b = info("10.0.0.2");
        let a_id = a.id;

        registry.insert(a);
        registry.insert(b);
        assert_eq!(registry.len(), 2);
        assert!(registry.is_streaming_to(&PeerAddress::parse("10.0.0.1").unwrap()));

        let removed = registry.remove(&a_id).unwrap();
        assert_eq!(removed.address.as_str(), "10.0.0.1");
        assert!(!registry.is_streaming_to(&PeerAddress::parse("10.0.0.1").unwrap()));
        assert_eq!(registry.snapshot().len(), 1);
    }
}
