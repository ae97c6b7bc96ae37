//! Transcoder argument construction
//!
//! The encoding parameters are a contract with the receivers and must not
//! drift: MP3 audio at 128 kbps / 44.1 kHz, H.264 video tuned for zero
//! latency at 24 fps, 1 Mbps cap with a 3000 KB buffer, RTSP over TCP.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;
use crate::protocol::{StreamSource, StreamTarget};

/// Video encoder options, only used for audio+video sessions
pub const VIDEO_ARGS: &[&str] = &[
    "-preset", "ultrafast", "-vcodec", "libx264", "-tune", "zerolatency", "-r", "24", "-async", "1",
];

/// Audio encoder options
pub const AUDIO_ARGS: &[&str] = &["-acodec", "libmp3lame", "-ab", "128k", "-ar", "44100"];

/// Rate control and transport options, followed by the destination URL
pub const OUTPUT_ARGS: &[&str] = &[
    "-maxrate", "1m", "-bufsize", "3000k", "-f", "rtsp", "-rtsp_transport", "tcp",
];

/// Capture backend of the host platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaptureFormat {
    /// DirectShow (Windows)
    #[serde(rename = "dshow")]
    DirectShow,
    /// AVFoundation (macOS)
    #[serde(rename = "avfoundation")]
    AvFoundation,
    /// Video4Linux for video plus PulseAudio for audio (Linux)
    #[serde(rename = "v4l2")]
    Video4Linux,
}

impl CaptureFormat {
    /// Capture format for the platform this binary was built for
    pub fn host() -> Self {
        if cfg!(target_os = "windows") {
            CaptureFormat::DirectShow
        } else if cfg!(target_os = "macos") {
            CaptureFormat::AvFoundation
        } else {
            CaptureFormat::Video4Linux
        }
    }

    /// Input arguments selecting the capture devices
    pub fn input_args(&self, source: &StreamSource) -> Vec<String> {
        let args: Vec<String> = match (self, source) {
            (CaptureFormat::DirectShow, StreamSource::Audio { audio }) => {
                vec!["-f".into(), "dshow".into(), "-i".into(), format!("audio={}", audio)]
            }
            (CaptureFormat::DirectShow, StreamSource::AudioVideo { video, audio }) => vec![
                "-f".into(),
                "dshow".into(),
                "-i".into(),
                format!("video={}:audio={}", video, audio),
            ],
            (CaptureFormat::AvFoundation, StreamSource::Audio { audio }) => {
                vec!["-f".into(), "avfoundation".into(), "-i".into(), format!(":{}", audio)]
            }
            (CaptureFormat::AvFoundation, StreamSource::AudioVideo { video, audio }) => vec![
                "-f".into(),
                "avfoundation".into(),
                "-i".into(),
                format!("{}:{}", video, audio),
            ],
            (CaptureFormat::Video4Linux, StreamSource::Audio { audio }) => {
                vec!["-f".into(), "pulse".into(), "-i".into(), audio.clone()]
            }
            (CaptureFormat::Video4Linux, StreamSource::AudioVideo { video, audio }) => vec![
                "-f".into(),
                "v4l2".into(),
                "-i".into(),
                video.clone(),
                "-f".into(),
                "pulse".into(),
                "-i".into(),
                audio.clone(),
            ],
        };
        args
    }
}

impl FromStr for CaptureFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dshow" => Ok(CaptureFormat::DirectShow),
            "avfoundation" => Ok(CaptureFormat::AvFoundation),
            "v4l2" => Ok(CaptureFormat::Video4Linux),
            _ => Err(ConfigError::InvalidCaptureFormat(s.to_string())),
        }
    }
}

impl fmt::Display for CaptureFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CaptureFormat::DirectShow => "dshow",
            CaptureFormat::AvFoundation => "avfoundation",
            CaptureFormat::Video4Linux => "v4l2",
        };
        f.write_str(name)
    }
}

/// Fully built transcoder invocation for one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeCommand {
    pub program: String,
    pub args: Vec<String>,
    pub target: StreamTarget,
}

impl TranscodeCommand {
    /// Build the argument list for `source` streaming to `target`.
    pub fn build(
        program: impl Into<String>,
        format: CaptureFormat,
        source: &StreamSource,
        target: StreamTarget,
    ) -> Self {
        let mut args = format.input_args(source);

        if let StreamSource::AudioVideo { .. } = source {
            args.extend(VIDEO_ARGS.iter().map(|s| s.to_string()));
        }
        args.extend(AUDIO_ARGS.iter().map(|s| s.to_string()));
        args.extend(OUTPUT_ARGS.iter().map(|s| s.to_string()));
        args.push(target.url());

        Self {
            program: program.into(),
            args,
            target,
        }
    }

    /// Destination URL (always the last argument)
    pub fn url(&self) -> &str {
        self.args.last().map(String::as_str).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{PeerAddress, SourceSelection};

    fn target(source: &StreamSource) -> StreamTarget {
        StreamTarget::new(PeerAddress::parse("192.168.0.12").unwrap(), "7843", source.mode())
    }

    #[test]
    fn test_audio_only_dshow() {
        let source = SourceSelection::new(Some("Mic1".into()), None).resolve().unwrap();
        let cmd = TranscodeCommand::build("ffmpeg", CaptureFormat::DirectShow, &source, target(&source));

        let expected: Vec<String> = [
            "-f", "dshow", "-i", "audio=Mic1",
            "-acodec", "libmp3lame", "-ab", "128k", "-ar", "44100",
            "-maxrate", "1m", "-bufsize", "3000k", "-f", "rtsp", "-rtsp_transport", "tcp",
            "rtsp://192.168.0.12:7843",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        assert_eq!(cmd.program, "ffmpeg");
        assert_eq!(cmd.args, expected);
        assert_eq!(cmd.url(), "rtsp://192.168.0.12:7843");
    }

    #[test]
    fn test_audio_video_dshow() {
        let source = SourceSelection::new(Some("Mic1".into()), Some("Cam1".into()))
            .resolve()
            .unwrap();
        let cmd = TranscodeCommand::build("ffmpeg", CaptureFormat::DirectShow, &source, target(&source));

        let expected: Vec<String> = [
            "-f", "dshow", "-i", "video=Cam1:audio=Mic1",
            "-preset", "ultrafast", "-vcodec", "libx264", "-tune", "zerolatency",
            "-r", "24", "-async", "1",
            "-acodec", "libmp3lame", "-ab", "128k", "-ar", "44100",
            "-maxrate", "1m", "-bufsize", "3000k", "-f", "rtsp", "-rtsp_transport", "tcp",
            "rtsp://192.168.0.12:7843/live.sdp",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        assert_eq!(cmd.args, expected);
    }

    #[test]
    fn test_shared_capture_source() {
        let source = SourceSelection::new(None, Some("Cam1".into())).resolve().unwrap();
        let cmd = TranscodeCommand::build("ffmpeg", CaptureFormat::DirectShow, &source, target(&source));
        assert_eq!(cmd.args[3], "video=Cam1:audio=Cam1");
        assert!(cmd.url().ends_with("/live.sdp"));
    }

    #[test]
    fn test_other_platform_inputs() {
        let audio = SourceSelection::new(Some("1".into()), None).resolve().unwrap();
        let av = SourceSelection::new(Some("1".into()), Some("0".into())).resolve().unwrap();

        assert_eq!(
            CaptureFormat::AvFoundation.input_args(&audio),
            vec!["-f", "avfoundation", "-i", ":1"]
        );
        assert_eq!(
            CaptureFormat::AvFoundation.input_args(&av),
            vec!["-f", "avfoundation", "-i", "0:1"]
        );
        assert_eq!(
            CaptureFormat::Video4Linux.input_args(&av),
            vec!["-f", "v4l2", "-i", "0", "-f", "pulse", "-i", "1"]
        );
    }

    #[test]
    fn test_capture_format_names() {
        for format in [
            CaptureFormat::DirectShow,
            CaptureFormat::AvFoundation,
            CaptureFormat::Video4Linux,
        ] {
            assert_eq!(format.to_string().parse::<CaptureFormat>().unwrap(), format);
        }
        assert!("alsa".parse::<CaptureFormat>().is_err());
    }
}
