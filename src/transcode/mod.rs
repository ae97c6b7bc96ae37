//! External transcoder invocation
//!
//! Builds the ffmpeg argument list for a session and starts the process
//! detached from the dispatch loop.

pub mod command;
pub mod launcher;

pub use command::{CaptureFormat, TranscodeCommand};
pub use launcher::{FfmpegLauncher, Launcher, RunningSession, SessionExit};
