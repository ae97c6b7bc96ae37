//! Transcoder process launching
//!
//! Starting a session never waits for it to finish: `launch` returns as soon
//! as the process exists, handing back a future that resolves on exit.

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use std::process::Stdio;
use tokio::process::Command;

use crate::error::SessionError;
use crate::transcode::TranscodeCommand;

/// How a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionExit {
    /// Process exited; `None` when killed by a signal
    Exited(Option<i32>),
    /// Waiting on the process failed
    Failed(String),
}

/// A started session
///
/// Dropping it before `exit` resolves terminates the process.
pub struct RunningSession {
    pub pid: Option<u32>,
    pub exit: BoxFuture<'static, SessionExit>,
}

impl RunningSession {
    pub fn new(pid: Option<u32>, exit: BoxFuture<'static, SessionExit>) -> Self {
        Self { pid, exit }
    }
}

/// Starts transcoder processes
pub trait Launcher: Send + Sync + 'static {
    fn launch(&self, command: &TranscodeCommand) -> Result<RunningSession, SessionError>;
}

/// Launches the real ffmpeg binary
///
/// Output is inherited so ffmpeg's diagnostics land on our own stdout/stderr.
#[derive(Debug, Clone, Default)]
pub struct FfmpegLauncher;

impl FfmpegLauncher {
    pub fn new() -> Self {
        Self
    }
}

impl Launcher for FfmpegLauncher {
    fn launch(&self, command: &TranscodeCommand) -> Result<RunningSession, SessionError> {
        let mut child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SessionError::Start {
                program: command.program.clone(),
                reason: e.to_string(),
            })?;

        let pid = child.id();
        let exit = async move {
            match child.wait().await {
                Ok(status) => SessionExit::Exited(status.code()),
                Err(e) => SessionExit::Failed(e.to_string()),
            }
        }
        .boxed();

        Ok(RunningSession::new(pid, exit))
    }
}
