//! Receiver Beacon Application
//!
//! Makes this machine discoverable by the sender: announces the service over
//! mDNS and answers the address request. The RTSP receiver itself runs
//! separately.

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use streamcast::{
    beacon::{self, BeaconConfig},
    constants::*,
};

#[derive(Parser, Debug)]
#[command(name = "beacon", about = "Announce a stream receiver on the LAN")]
struct Cli {
    /// Network interface to announce on (all when omitted)
    #[arg(long)]
    iface: Option<String>,

    /// Port for the address request
    #[arg(long, default_value_t = DEFAULT_BEACON_PORT)]
    port: u16,

    /// Address to hand out instead of the one the sender connected to
    #[arg(long)]
    advertise: Option<String>,

    /// Service name to announce
    #[arg(long, default_value = DISCOVERY_SERVICE)]
    service: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = BeaconConfig {
        service_name: cli.service,
        port: cli.port,
        interface: cli.iface.unwrap_or_default(),
        advertise: cli.advertise,
        ..Default::default()
    };

    tracing::info!("Starting receiver beacon");

    let shutdown = CancellationToken::new();
    let mut server = tokio::spawn(beacon::run(config, shutdown.clone()));

    tokio::select! {
        result = &mut server => result??,
        result = tokio::signal::ctrl_c() => {
            result?;
            tracing::info!("Shutting down");
            shutdown.cancel();
            server.await??;
        }
    }

    Ok(())
}
