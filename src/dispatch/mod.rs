//! Dispatch loop
//!
//! Takes peer addresses off the hand-off channel in arrival order and starts
//! one transcoder session per address. Sessions are supervised by their own
//! task, so a long-running session never holds up the next address, and a
//! failed start only costs that one address.

pub mod registry;

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::StreamConfig;
use crate::error::SessionError;
use crate::protocol::{PeerAddress, StreamSource, StreamTarget};
use crate::transcode::{CaptureFormat, Launcher, RunningSession, SessionExit, TranscodeCommand};

pub use registry::{SessionInfo, SessionRegistry};

/// Limits applied before starting a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionPolicy {
    /// Skip an address that already has a live session
    pub dedupe_live: bool,
    /// Maximum number of simultaneous sessions
    pub max_sessions: Option<usize>,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            dedupe_live: true,
            max_sessions: None,
        }
    }
}

impl SessionPolicy {
    /// Start a session for every address received
    pub fn unrestricted() -> Self {
        Self {
            dedupe_live: false,
            max_sessions: None,
        }
    }
}

/// What happened to one dispatched address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Started(Uuid),
    AlreadyStreaming,
    AtCapacity,
}

/// Consumer side of the peer address channel
pub struct DispatchLoop<L: Launcher> {
    source: StreamSource,
    program: String,
    format: CaptureFormat,
    port: String,
    policy: SessionPolicy,
    launcher: Arc<L>,
    registry: SessionRegistry,
    shutdown: CancellationToken,
}

impl<L: Launcher> DispatchLoop<L> {
    pub fn new(
        source: StreamSource,
        config: &StreamConfig,
        launcher: Arc<L>,
        registry: SessionRegistry,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            source,
            program: config.ffmpeg.clone(),
            format: config.capture_format(),
            port: config.port.clone(),
            policy: config.session_policy(),
            launcher,
            registry,
            shutdown,
        }
    }

    /// Run until the channel closes or shutdown is requested.
    pub async fn run(self, mut addresses: mpsc::Receiver<PeerAddress>) {
        tracing::info!(
            "Dispatch loop started ({} via {}, port {})",
            self.source.mode(),
            self.format,
            self.port
        );

        loop {
            let address = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                received = addresses.recv() => match received {
                    Some(address) => address,
                    None => {
                        tracing::info!("Peer address channel closed");
                        break;
                    }
                },
            };

            if let Err(e) = self.dispatch(address) {
                tracing::error!("{}", e);
            }
        }

        tracing::info!("Dispatch loop stopped");
    }

    /// Start a session for one address, subject to the session policy.
    pub fn dispatch(&self, address: PeerAddress) -> Result<DispatchOutcome, SessionError> {
        tracing::info!("Streaming to {}:{}", address, self.port);

        if self.policy.dedupe_live && self.registry.is_streaming_to(&address) {
            tracing::info!("Session to {} still running, not starting another", address);
            return Ok(DispatchOutcome::AlreadyStreaming);
        }

        if let Some(max) = self.policy.max_sessions {
            if self.registry.len() >= max {
                tracing::warn!("{} sessions running (max {}), skipping {}", self.registry.len(), max, address);
                return Ok(DispatchOutcome::AtCapacity);
            }
        }

        let target = StreamTarget::new(address.clone(), self.port.clone(), self.source.mode());
        let command = TranscodeCommand::build(self.program.clone(), self.format, &self.source, target);
        tracing::debug!("{} {}", command.program, command.args.join(" "));

        let session = self.launcher.launch(&command)?;

        let id = Uuid::new_v4();
        self.registry.insert(SessionInfo {
            id,
            address: address.clone(),
            url: command.url().to_string(),
            pid: session.pid,
            started_at: Utc::now(),
        });
        tracing::info!("Session {} started (pid {:?}) -> {}", id, session.pid, command.url());

        self.supervise(id, address, session);
        Ok(DispatchOutcome::Started(id))
    }

    fn supervise(&self, id: Uuid, address: PeerAddress, session: RunningSession) {
        let registry = self.registry.clone();
        let shutdown = self.shutdown.clone();
        let RunningSession { exit, .. } = session;

        tokio::spawn(async move {
            tokio::select! {
                status = exit => match status {
                    SessionExit::Exited(Some(0)) => {
                        tracing::info!("Session {} to {} finished", id, address);
                    }
                    SessionExit::Exited(code) => {
                        tracing::warn!("Session {} to {} exited with code {:?}", id, address, code);
                    }
                    SessionExit::Failed(e) => {
                        tracing::warn!("Lost track of session {} to {}: {}", id, address, e);
                    }
                },
                _ = shutdown.cancelled() => {
                    tracing::info!("Stopping session {} to {}", id, address);
                }
            }

            registry.remove(&id);
        });
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::FutureExt;
    use parking_lot::Mutex;
    use std::collections::HashSet;
    use tokio::sync::oneshot;

    /// Records launches; fails for selected addresses; sessions live until
    /// their exit sender is used or dropped.
    #[derive(Default)]
    struct RecordingLauncher {
        launched: Mutex<Vec<TranscodeCommand>>,
        failing: HashSet<String>,
        exits: Mutex<Vec<oneshot::Sender<SessionExit>>>,
    }

    impl RecordingLauncher {
        fn failing(addresses: &[&str]) -> Self {
            Self {
                failing: addresses.iter().map(|s| s.to_string()).collect(),
                ..Default::default()
            }
        }

        fn addresses(&self) -> Vec<String> {
            self.launched
                .lock()
                .iter()
                .map(|c| c.target.address.to_string())
                .collect()
        }

        fn finish_all(&self) {
            for tx in self.exits.lock().drain(..) {
                let _ = tx.send(SessionExit::Exited(Some(0)));
            }
        }
    }

    impl Launcher for RecordingLauncher {
        fn launch(&self, command: &TranscodeCommand) -> Result<RunningSession, SessionError> {
            if self.failing.contains(command.target.address.as_str()) {
                return Err(SessionError::Start {
                    program: command.program.clone(),
                    reason: "refused".to_string(),
                });
            }
            self.launched.lock().push(command.clone());

            let (tx, rx) = oneshot::channel();
            self.exits.lock().push(tx);
            let exit = async move { rx.await.unwrap_or(SessionExit::Exited(None)) }.boxed();
            Ok(RunningSession::new(Some(4242), exit))
        }
    }

    fn audio_source() -> StreamSource {
        StreamSource::Audio {
            audio: "Mic1".to_string(),
        }
    }

    fn dispatch_loop(
        launcher: Arc<RecordingLauncher>,
        policy: SessionPolicy,
    ) -> DispatchLoop<RecordingLauncher> {
        let config = StreamConfig {
            capture_format: Some(CaptureFormat::DirectShow),
            dedupe_live: policy.dedupe_live,
            max_sessions: policy.max_sessions,
            ..Default::default()
        };
        DispatchLoop::new(
            audio_source(),
            &config,
            launcher,
            SessionRegistry::new(),
            CancellationToken::new(),
        )
    }

    fn addr(s: &str) -> PeerAddress {
        PeerAddress::parse(s).unwrap()
    }

    async fn wait_until_empty(registry: &SessionRegistry) {
        for _ in 0..100 {
            if registry.is_empty() {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("sessions were not deregistered");
    }

    #[tokio::test]
    async fn test_sessions_started_in_order() {
        let launcher = Arc::new(RecordingLauncher::default());
        let dispatcher = dispatch_loop(launcher.clone(), SessionPolicy::unrestricted());
        let (tx, rx) = mpsc::channel(1);

        let handle = tokio::spawn(dispatcher.run(rx));
        for ip in ["10.0.0.1", "10.0.0.2", "10.0.0.1", "10.0.0.3"] {
            tx.send(addr(ip)).await.unwrap();
        }
        drop(tx);
        handle.await.unwrap();

        assert_eq!(
            launcher.addresses(),
            vec!["10.0.0.1", "10.0.0.2", "10.0.0.1", "10.0.0.3"]
        );
        let launched = launcher.launched.lock();
        assert_eq!(launched[0].url(), "rtsp://10.0.0.1:7843");
        assert_eq!(launched[0].args[3], "audio=Mic1");
    }

    #[tokio::test]
    async fn test_start_failure_does_not_block_next_address() {
        let launcher = Arc::new(RecordingLauncher::failing(&["10.0.0.1"]));
        let dispatcher = dispatch_loop(launcher.clone(), SessionPolicy::default());
        let (tx, rx) = mpsc::channel(1);

        let handle = tokio::spawn(dispatcher.run(rx));
        tx.send(addr("10.0.0.1")).await.unwrap();
        tx.send(addr("10.0.0.2")).await.unwrap();
        drop(tx);
        handle.await.unwrap();

        assert_eq!(launcher.addresses(), vec!["10.0.0.2"]);
    }

    #[tokio::test]
    async fn test_start_failure_is_reported() {
        let launcher = Arc::new(RecordingLauncher::failing(&["10.0.0.1"]));
        let dispatcher = dispatch_loop(launcher, SessionPolicy::default());

        let result = dispatcher.dispatch(addr("10.0.0.1"));
        assert!(matches!(result, Err(SessionError::Start { .. })));
        assert!(dispatcher.registry().is_empty());
    }

    #[tokio::test]
    async fn test_live_address_is_deduplicated() {
        let launcher = Arc::new(RecordingLauncher::default());
        let dispatcher = dispatch_loop(launcher.clone(), SessionPolicy::default());

        let first = dispatcher.dispatch(addr("10.0.0.5")).unwrap();
        assert!(matches!(first, DispatchOutcome::Started(_)));
        assert_eq!(
            dispatcher.dispatch(addr("10.0.0.5")).unwrap(),
            DispatchOutcome::AlreadyStreaming
        );
        assert_eq!(dispatcher.registry().len(), 1);

        // Once the session exits the peer can be streamed to again.
        launcher.finish_all();
        wait_until_empty(dispatcher.registry()).await;

        let again = dispatcher.dispatch(addr("10.0.0.5")).unwrap();
        assert!(matches!(again, DispatchOutcome::Started(_)));
        assert_eq!(launcher.addresses().len(), 2);
    }

    #[tokio::test]
    async fn test_session_cap() {
        let launcher = Arc::new(RecordingLauncher::default());
        let policy = SessionPolicy {
            dedupe_live: true,
            max_sessions: Some(2),
        };
        let dispatcher = dispatch_loop(launcher.clone(), policy);

        assert!(matches!(dispatcher.dispatch(addr("10.0.0.1")), Ok(DispatchOutcome::Started(_))));
        assert!(matches!(dispatcher.dispatch(addr("10.0.0.2")), Ok(DispatchOutcome::Started(_))));
        assert_eq!(
            dispatcher.dispatch(addr("10.0.0.3")).unwrap(),
            DispatchOutcome::AtCapacity
        );
        assert_eq!(launcher.addresses(), vec!["10.0.0.1", "10.0.0.2"]);
    }

    #[tokio::test]
    async fn test_shutdown_stops_loop_and_sessions() {
        let launcher = Arc::new(RecordingLauncher::default());
        let dispatcher = dispatch_loop(launcher.clone(), SessionPolicy::default());
        let shutdown = dispatcher.shutdown.clone();
        let registry = dispatcher.registry().clone();
        let (tx, rx) = mpsc::channel(1);

        let handle = tokio::spawn(dispatcher.run(rx));
        tx.send(addr("10.0.0.9")).await.unwrap();
        while registry.is_empty() {
            tokio::task::yield_now().await;
        }

        shutdown.cancel();
        handle.await.unwrap();
        wait_until_empty(&registry).await;
        assert!(tx.is_closed());
    }

    mod ordering {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn test_every_address_dispatched_once_in_order(
                ips in prop::collection::vec("10\\.0\\.[0-9]{1,2}\\.[0-9]{1,3}", 0..24)
            ) {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .unwrap();

                let launcher = Arc::new(RecordingLauncher::default());
                let dispatcher = dispatch_loop(launcher.clone(), SessionPolicy::unrestricted());

                runtime.block_on(async {
                    let (tx, rx) = mpsc::channel(1);
                    let handle = tokio::spawn(dispatcher.run(rx));
                    for ip in &ips {
                        tx.send(addr(ip)).await.unwrap();
                    }
                    drop(tx);
                    handle.await.unwrap();
                });

                prop_assert_eq!(launcher.addresses(), ips);
            }
        }
    }
}
