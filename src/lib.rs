//! # streamcast
//!
//! Finds stream receivers on the LAN and pushes a live capture to each of them.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │                                SENDER PC                                 │
//! │                                                                          │
//! │  ┌────────────────────────────┐          ┌────────────────────────────┐  │
//! │  │ Discovery Loop             │          │ Dispatch Loop              │  │
//! │  │ (discovery::worker)        │          │ (dispatch)                 │  │
//! │  │                            │  mpsc(1) │                            │  │
//! │  │ wait_for("streamplay-ip")  │ ───────▶ │ StreamTarget               │  │
//! │  │ settle, GET /ip, publish   │ Peer     │ TranscodeCommand           │  │
//! │  │                            │ Address  │ Launcher::launch           │  │
//! │  └─────────────┬──────────────┘          └─────────────┬──────────────┘  │
//! │                │ mDNS / HTTP                           │ spawn           │
//! │                │                        ┌──────────────┼─────────────┐   │
//! │                │                        ▼              ▼             ▼   │
//! │                │                   ┌─────────┐    ┌─────────┐   ┌──────┐ │
//! │                │                   │ ffmpeg  │    │ ffmpeg  │   │ ...  │ │
//! │                │                   │ session │    │ session │   │      │ │
//! │                │                   └────┬────┘    └────┬────┘   └──────┘ │
//! └────────────────┼────────────────────────┼──────────────┼─────────────────┘
//!                  │                        │ RTSP/TCP     │
//!                  ▼                        ▼              ▼
//! ┌──────────────────────────┐     ┌────────────────────────────────────────┐
//! │ Receiver beacon          │     │ Receiver                               │
//! │ _streamplay-ip._tcp      │     │ rtsp://{ip}:7843[/live.sdp]            │
//! └──────────────────────────┘     └────────────────────────────────────────┘
//! ```

pub mod beacon;
pub mod config;
pub mod devices;
pub mod discovery;
pub mod dispatch;
pub mod error;
pub mod protocol;
pub mod streamer;
pub mod transcode;
pub mod ui;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    use std::time::Duration;

    /// RTSP port the receivers listen on
    pub const STREAM_PORT: &str = "7843";

    /// Service name receivers advertise
    pub const DISCOVERY_SERVICE: &str = "streamplay-ip";

    /// Path a receiver answers with its own address
    pub const DISCOVERY_PATH: &str = "ip";

    /// Port the beacon serves the address request on
    pub const DEFAULT_BEACON_PORT: u16 = 9872;

    /// Default network interface used for discovery
    pub const DEFAULT_INTERFACE: &str = "Wi-Fi";

    /// Time a receiver gets to finish starting up after it becomes reachable
    pub const SETTLE_INTERVAL: Duration = Duration::from_secs(1);

    /// Wait after a failed address request before trying again
    pub const TRANSPORT_COOLDOWN: Duration = Duration::from_secs(1);

    /// Pause between discovery iterations
    pub const DISCOVERY_INTERVAL: Duration = Duration::from_secs(1);

    /// Upper bound on a single address request
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

    /// Default transcoder executable
    pub const DEFAULT_FFMPEG: &str = "ffmpeg";

    /// Default port for the status API
    pub const DEFAULT_STATUS_PORT: u16 = 8080;
}
