//! Receiver-side beacon
//!
//! Announces the discovery service over mDNS and answers the address
//! request, so a machine running an RTSP receiver can be found by the
//! sender. By default the answer is the address the sender used to reach
//! the beacon, taken from the request's `Host` header.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use axum_extra::headers::Host;
use axum_extra::TypedHeader;
use mdns_sd::{ServiceDaemon, ServiceInfo};
use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::constants::*;
use crate::discovery::mdns::{service_type, start_daemon};
use crate::error::{DiscoveryError, Result};

/// Beacon settings
#[derive(Debug, Clone)]
pub struct BeaconConfig {
    pub service_name: String,
    pub path: String,
    pub port: u16,
    /// Interface to announce on (empty means all)
    pub interface: String,
    /// Address to hand out instead of the one in `Host`
    pub advertise: Option<String>,
    pub instance_name: String,
}

impl Default for BeaconConfig {
    fn default() -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        Self {
            service_name: DISCOVERY_SERVICE.to_string(),
            path: DISCOVERY_PATH.to_string(),
            port: DEFAULT_BEACON_PORT,
            interface: String::new(),
            advertise: None,
            instance_name: format!("streamcast-{}", &suffix[..8]),
        }
    }
}

struct BeaconState {
    advertise: Option<String>,
}

/// Router answering `GET /{path}` with a plain-text address
pub fn router(path: &str, advertise: Option<String>) -> Router {
    let route = format!("/{}", path.trim_start_matches('/'));
    Router::new()
        .route(&route, get(answer_address))
        .with_state(Arc::new(BeaconState { advertise }))
}

async fn answer_address(
    State(state): State<Arc<BeaconState>>,
    host: Option<TypedHeader<Host>>,
) -> std::result::Result<String, StatusCode> {
    if let Some(address) = &state.advertise {
        return Ok(address.clone());
    }

    let TypedHeader(host) = host.ok_or(StatusCode::BAD_REQUEST)?;
    let hostname = host.hostname().trim_start_matches('[').trim_end_matches(']');
    if hostname.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    tracing::info!("Address requested, answering {}", hostname);
    Ok(hostname.to_string())
}

/// Register the service with mDNS.
///
/// The returned daemon keeps the announcement alive until it is dropped or
/// shut down.
pub fn announce(config: &BeaconConfig) -> std::result::Result<ServiceDaemon, DiscoveryError> {
    let init = |e: mdns_sd::Error| DiscoveryError::Init(e.to_string());

    let daemon = start_daemon(&config.interface)?;

    let service_type = service_type(&config.service_name);
    let host_name = format!("{}.local.", config.instance_name);
    let ip = config.advertise.clone().unwrap_or_default();

    let mut info = ServiceInfo::new(
        &service_type,
        &config.instance_name,
        &host_name,
        ip.as_str(),
        config.port,
        HashMap::<String, String>::new(),
    )
    .map_err(init)?;
    if config.advertise.is_none() {
        info = info.enable_addr_auto();
    }

    daemon.register(info).map_err(init)?;
    tracing::info!(
        "Announcing {} as {} on port {}",
        service_type,
        config.instance_name,
        config.port
    );
    Ok(daemon)
}

/// Announce and serve until `shutdown` is cancelled.
pub async fn run(config: BeaconConfig, shutdown: CancellationToken) -> Result<()> {
    let listener =
        tokio::net::TcpListener::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.port))).await?;
    let daemon = announce(&config)?;

    tracing::info!("Beacon answering on http://{}/{}", listener.local_addr()?, config.path);
    axum::serve(listener, router(&config.path, config.advertise.clone()))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    if let Err(e) = daemon.shutdown() {
        tracing::debug!("mDNS daemon shutdown: {}", e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    async fn ask(app: Router, uri: &str, host: Option<&str>) -> (StatusCode, String) {
        let mut request = Request::builder().uri(uri);
        if let Some(host) = host {
            request = request.header("host", host);
        }
        let response = app.oneshot(request.body(Body::empty()).unwrap()).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_answers_with_host_header() {
        let (status, body) = ask(router("ip", None), "/ip", Some("192.168.1.50:9872")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "192.168.1.50");
    }

    #[tokio::test]
    async fn test_ipv6_host_is_unbracketed() {
        let (_, body) = ask(router("ip", None), "/ip", Some("[fe80::2]:9872")).await;
        assert_eq!(body, "fe80::2");
    }

    #[tokio::test]
    async fn test_advertised_address_wins() {
        let app = router("/ip", Some("10.9.8.7".to_string()));
        let (status, body) = ask(app, "/ip", Some("192.168.1.50:9872")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "10.9.8.7");
    }

    #[tokio::test]
    async fn test_missing_host_is_rejected() {
        let (status, _) = ask(router("ip", None), "/ip", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_announce_rejects_unknown_interface() {
        let config = BeaconConfig {
            interface: "no-such-iface0".to_string(),
            ..Default::default()
        };
        assert!(matches!(announce(&config), Err(DiscoveryError::Init(_))));
    }

    #[test]
    fn test_default_instance_name() {
        let config = BeaconConfig::default();
        assert!(config.instance_name.starts_with("streamcast-"));
        assert_eq!(config.instance_name.len(), "streamcast-".len() + 8);
        assert_eq!(config.port, 9872);
    }
}
