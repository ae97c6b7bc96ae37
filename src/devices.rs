//! Capture device enumeration
//!
//! Asks ffmpeg which devices the capture backend can see and scrapes the
//! device names out of its diagnostic output.

use regex::Regex;
use std::fmt;
use std::sync::OnceLock;
use tokio::process::Command;

use crate::error::Result;
use crate::transcode::CaptureFormat;

/// Devices available to the capture backend
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceList {
    /// Video devices (on DirectShow some of them carry audio too)
    pub video: Vec<String>,
    pub audio: Vec<String>,
}

impl fmt::Display for DeviceList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Available video devices (may support audio as well):")?;
        for name in &self.video {
            writeln!(f, "  \"{}\"", name)?;
        }
        writeln!(f)?;
        writeln!(f, "Available audio devices:")?;
        for name in &self.audio {
            writeln!(f, "  \"{}\"", name)?;
        }
        Ok(())
    }
}

/// List devices by running `ffmpeg` for the given capture backend.
pub async fn list_devices(ffmpeg: &str, format: CaptureFormat) -> Result<DeviceList> {
    match format {
        CaptureFormat::DirectShow => {
            let output = run(ffmpeg, &["-hide_banner", "-list_devices", "true", "-f", "dshow", "-i", "dummy"]).await?;
            Ok(parse_dshow(&output))
        }
        CaptureFormat::AvFoundation => {
            let output = run(ffmpeg, &["-hide_banner", "-f", "avfoundation", "-list_devices", "true", "-i", ""]).await?;
            Ok(parse_avfoundation(&output))
        }
        CaptureFormat::Video4Linux => {
            let video = run(ffmpeg, &["-hide_banner", "-sources", "v4l2"]).await?;
            let audio = run(ffmpeg, &["-hide_banner", "-sources", "pulse"]).await?;
            Ok(DeviceList {
                video: parse_sources(&video),
                audio: parse_sources(&audio),
            })
        }
    }
}

/// Run ffmpeg and return stdout and stderr together.
///
/// Listing always makes ffmpeg exit with an error, so the status is ignored.
async fn run(ffmpeg: &str, args: &[&str]) -> Result<String> {
    let output = Command::new(ffmpeg).args(args).output().await?;
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    Ok(text)
}

fn quoted_name() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Alternative names start with '@' and are skipped.
    RE.get_or_init(|| Regex::new(r#""([A-Za-z][^"]*)"(?:\s*\((video|audio|none)\))?"#).expect("valid regex"))
}

fn indexed_name() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\] \[\d+\] (.+?)\s*$").expect("valid regex"))
}

fn source_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*\*?\s*(\S+) \[.*\]\s*$").expect("valid regex"))
}

/// Parse `-list_devices` output of the DirectShow backend.
///
/// Handles both the sectioned layout and the newer one that tags each
/// device with `(video)` / `(audio)`.
pub fn parse_dshow(output: &str) -> DeviceList {
    let mut devices = DeviceList::default();
    let mut in_audio_section = false;

    for line in output.lines() {
        if line.contains("DirectShow audio devices") {
            in_audio_section = true;
            continue;
        }
        if line.contains("DirectShow video devices") {
            in_audio_section = false;
            continue;
        }

        if let Some(caps) = quoted_name().captures(line) {
            let name = caps[1].to_string();
            match caps.get(2).map(|m| m.as_str()) {
                Some("video") => devices.video.push(name),
                Some("audio") => devices.audio.push(name),
                Some(_) => {}
                None if in_audio_section => devices.audio.push(name),
                None => devices.video.push(name),
            }
        }
    }

    devices
}

/// Parse `-list_devices` output of the AVFoundation backend.
pub fn parse_avfoundation(output: &str) -> DeviceList {
    let mut devices = DeviceList::default();
    let mut in_audio_section = false;

    for line in output.lines() {
        if line.contains("AVFoundation audio devices") {
            in_audio_section = true;
            continue;
        }
        if line.contains("AVFoundation video devices") {
            in_audio_section = false;
            continue;
        }

        if let Some(caps) = indexed_name().captures(line) {
            let name = caps[1].to_string();
            if in_audio_section {
                devices.audio.push(name);
            } else {
                devices.video.push(name);
            }
        }
    }

    devices
}

/// Parse `-sources <device>` output.
pub fn parse_sources(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| source_line().captures(line))
        .map(|caps| caps[1].to_string())
        .collect()
}
