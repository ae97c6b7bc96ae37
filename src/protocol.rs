//! Shared data model: capture source selection, peer addresses and stream targets

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ConfigError, DiscoveryError};

/// Capture devices requested by the user
///
/// Empty strings count as unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSelection {
    #[serde(default)]
    pub audio_device: Option<String>,
    #[serde(default)]
    pub video_device: Option<String>,
}

impl SourceSelection {
    pub fn new(audio_device: Option<String>, video_device: Option<String>) -> Self {
        Self {
            audio_device,
            video_device,
        }
    }

    /// Resolve the selection into the source a session captures from.
    ///
    /// Without a video device this is an audio-only source. With one, the
    /// audio device falls back to the video device when none was given.
    pub fn resolve(&self) -> Result<StreamSource, ConfigError> {
        let audio = non_empty(&self.audio_device);
        let video = non_empty(&self.video_device);

        match (audio, video) {
            (None, None) => Err(ConfigError::NoSource),
            (Some(audio), None) => Ok(StreamSource::Audio {
                audio: audio.to_string(),
            }),
            (audio, Some(video)) => Ok(StreamSource::AudioVideo {
                video: video.to_string(),
                audio: audio.unwrap_or(video).to_string(),
            }),
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Session type, which receivers tell apart by the URL path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamMode {
    Audio,
    AudioVideo,
}

impl fmt::Display for StreamMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamMode::Audio => write!(f, "audio"),
            StreamMode::AudioVideo => write!(f, "audio+video"),
        }
    }
}

/// Resolved capture source, fixed for the lifetime of the streamer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamSource {
    Audio { audio: String },
    AudioVideo { video: String, audio: String },
}

impl StreamSource {
    pub fn mode(&self) -> StreamMode {
        match self {
            StreamSource::Audio { .. } => StreamMode::Audio,
            StreamSource::AudioVideo { .. } => StreamMode::AudioVideo,
        }
    }

    /// Audio device actually captured
    pub fn audio_device(&self) -> &str {
        match self {
            StreamSource::Audio { audio } => audio,
            StreamSource::AudioVideo { audio, .. } => audio,
        }
    }

    pub fn video_device(&self) -> Option<&str> {
        match self {
            StreamSource::Audio { .. } => None,
            StreamSource::AudioVideo { video, .. } => Some(video),
        }
    }
}

/// Network address of a discovered receiver
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerAddress(String);

impl PeerAddress {
    /// Parse the body of an address response.
    pub fn parse(body: &str) -> Result<Self, DiscoveryError> {
        let address = body.trim();
        if address.is_empty() {
            return Err(DiscoveryError::Read("empty address".to_string()));
        }
        if address.chars().any(char::is_whitespace) {
            return Err(DiscoveryError::Read(format!(
                "malformed address {:?}",
                address
            )));
        }
        Ok(Self(address.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Host part as it must appear in a URL.
    ///
    /// Any IPv6 literal is bracketed, including zone-scoped ones such as
    /// `fe80::1%eth0`, which ffmpeg hands to the resolver unchanged.
    pub fn url_host(&self) -> String {
        if self.0.contains(':') && !self.0.starts_with('[') {
            format!("[{}]", self.0)
        } else {
            self.0.clone()
        }
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Destination of one streaming session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamTarget {
    pub address: PeerAddress,
    pub port: String,
    pub mode: StreamMode,
}

impl StreamTarget {
    pub fn new(address: PeerAddress, port: impl Into<String>, mode: StreamMode) -> Self {
        Self {
            address,
            port: port.into(),
            mode,
        }
    }

    /// RTSP URL handed to the transcoder
    pub fn url(&self) -> String {
        let base = format!("rtsp://{}:{}", self.address.url_host(), self.port);
        match self.mode {
            StreamMode::Audio => base,
            StreamMode::AudioVideo => format!("{}/live.sdp", base),
        }
    }
}

impl fmt::Display for StreamTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url())
    }
}
