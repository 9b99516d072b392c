//! PairingSession: one out-of-band bootstrap from code to verified reply.
//!
//! # Session lifecycle (for beginners)
//!
//! ```text
//! Created ──► Rendering ──► AwaitingPeer ──► Replied ──► Verified
//!                 │              │              │
//!                 └──────────────┴──────────────┴──────► Mismatched / Failed
//! ```
//!
//! - `Rendering`: the endpoint's header is wrapped in an [`OobCode`] and
//!   handed to the [`CodeRenderer`] so the user can scan it.
//! - `AwaitingPeer`: the only long wait.  It ends when a companion connects
//!   and answers the session's command.
//! - `Replied`: a well-formed reply arrived and is being verified.
//!
//! The last three states are terminal.  A session is single-use: calling
//! [`PairingSession::run`] again returns [`SessionError::AlreadyResolved`].
//! Whatever the outcome, the rendered code is dismissed before `run` returns.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use lockall_core::{ChannelError, Command, CommandKind, OobCode, Reply};

use crate::infrastructure::network::{ListenerError, PeerEndpoint};
use crate::infrastructure::render::{CodeRenderer, RenderError};

/// Errors that end a session without a reply.
#[derive(Debug, Error)]
pub enum SessionError {
    /// `run` was called on a session that already produced a result.
    #[error("pairing session already resolved")]
    AlreadyResolved,

    #[error("endpoint failed: {0}")]
    Endpoint(#[from] ListenerError),

    #[error("could not show pairing code: {0}")]
    Render(#[from] RenderError),

    #[error("exchange failed: {0}")]
    Channel(#[from] ChannelError),
}

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Rendering,
    AwaitingPeer,
    Replied,
    Verified,
    Mismatched,
    Failed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Verified | Self::Mismatched | Self::Failed)
    }
}

/// A completed exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The reply passed verification, or no verification was requested.
    Verified(Reply),

    /// The companion answered with an identity other than the expected one.
    /// Never treated as success.
    Mismatched { expected: String, received: String },
}

impl SessionOutcome {
    pub fn is_verified(&self) -> bool {
        matches!(self, Self::Verified(_))
    }
}

/// Deadlines for the two waits inside a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTimeouts {
    /// Until a companion connects.
    pub accept: Duration,
    /// Until the connected companion answers.
    pub reply: Duration,
}

/// Title shown above the code, by command.
pub fn code_title(kind: CommandKind) -> &'static str {
    match kind {
        CommandKind::Pairing => "Pair a device",
        CommandKind::Otp => "Send one-time password",
        CommandKind::Pull => "Send credential",
        CommandKind::Store => "Save credential",
    }
}

/// One bootstrap attempt.
pub struct PairingSession {
    command: Command,
    expectation: Option<String>,
    renderer: Arc<dyn CodeRenderer>,
    timeouts: SessionTimeouts,
    state: SessionState,
}

impl fmt::Debug for PairingSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PairingSession")
            .field("command", &self.command.kind())
            .field("expectation", &self.expectation)
            .field("state", &self.state)
            .finish()
    }
}

impl PairingSession {
    /// Creates a session that sends `command` to whichever companion connects.
    ///
    /// With `expectation` set, the reply's identity must equal it exactly.
    pub fn new(
        command: Command,
        expectation: Option<String>,
        renderer: Arc<dyn CodeRenderer>,
        timeouts: SessionTimeouts,
    ) -> Self {
        Self {
            command,
            expectation,
            renderer,
            timeouts,
            state: SessionState::Created,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Renders the code, waits for a companion, exchanges the command and
    /// verifies the reply.
    ///
    /// The endpoint is not disposed here; its owner does that.
    ///
    /// # Errors
    ///
    /// [`SessionError::AlreadyResolved`] on reuse.  Setup, accept and
    /// exchange failures leave the session `Failed`.
    pub async fn run(
        &mut self,
        endpoint: &dyn PeerEndpoint,
        cancel: &CancellationToken,
    ) -> Result<SessionOutcome, SessionError> {
        if self.state != SessionState::Created {
            return Err(SessionError::AlreadyResolved);
        }

        let title = code_title(self.command.kind());
        let result = self.exchange(endpoint, cancel, title).await;
        if self.state != SessionState::Rendering {
            self.renderer.dismiss(title);
        }

        match result {
            Ok(reply) => Ok(self.verify(reply)),
            Err(e) => {
                self.state = SessionState::Failed;
                warn!("{} session failed: {e}", self.command.kind());
                Err(e)
            }
        }
    }

    async fn exchange(
        &mut self,
        endpoint: &dyn PeerEndpoint,
        cancel: &CancellationToken,
        title: &str,
    ) -> Result<Reply, SessionError> {
        // ── Step 1: Render the code ──────────────────────────────────────────
        self.state = SessionState::Rendering;
        let code = OobCode::new(self.command.kind(), endpoint.header()?);
        self.renderer.render(title, &code.to_text())?;
        debug!("{} code rendered for {:?}", self.command.kind(), code.header);

        // ── Step 2: Wait for the companion ───────────────────────────────────
        self.state = SessionState::AwaitingPeer;
        let channel = endpoint.accept_next(self.timeouts.accept, cancel).await?;

        // ── Step 3: One command, one reply ───────────────────────────────────
        let reply = tokio::select! {
            _ = cancel.cancelled() => Err(ChannelError::Cancelled),
            reply = channel.request(&self.command, self.timeouts.reply) => reply,
        };
        channel.close().await;
        let reply = reply?;
        self.state = SessionState::Replied;
        Ok(reply)
    }

    fn verify(&mut self, reply: Reply) -> SessionOutcome {
        let Some(expected) = self.expectation.clone() else {
            self.state = SessionState::Verified;
            return SessionOutcome::Verified(reply);
        };

        let received = reply.peer_name().unwrap_or_default();
        if received == expected {
            info!("companion verified as {received:?}");
            self.state = SessionState::Verified;
            SessionOutcome::Verified(reply)
        } else {
            warn!("companion identity mismatch: expected {expected:?}, got {received:?}");
            self.state = SessionState::Mismatched;
            SessionOutcome::Mismatched {
                expected,
                received: received.to_string(),
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::render::mock::RecordingRenderer;
    use crate::infrastructure::render::MockCodeRenderer;
    use async_trait::async_trait;
    use lockall_core::{Channel, Header, NameMessage, PasswordReply, ResourceRequest};
    use std::net::Ipv4Addr;
    use std::sync::Mutex;

    // ── In-memory collaborators ──────────────────────────────────────────────

    /// Answers every request with a fixed result.
    struct CannedChannel {
        reply: Mutex<Option<Result<Reply, ChannelError>>>,
        sent: Mutex<Vec<Command>>,
    }

    impl CannedChannel {
        fn new(reply: Result<Reply, ChannelError>) -> Self {
            Self {
                reply: Mutex::new(Some(reply)),
                sent: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Channel for CannedChannel {
        async fn send(&self, command: &Command) -> Result<(), ChannelError> {
            self.sent.lock().unwrap().push(command.clone());
            Ok(())
        }

        async fn receive(&self, _expected: CommandKind) -> Result<Reply, ChannelError> {
            self.reply.lock().unwrap().take().unwrap_or(Err(ChannelError::Closed))
        }

        async fn request(&self, command: &Command, _deadline: Duration) -> Result<Reply, ChannelError> {
            self.send(command).await?;
            self.receive(command.kind()).await
        }

        async fn close(&self) {}

        fn describe(&self) -> String {
            "canned".to_string()
        }
    }

    /// Hands out one prepared channel.
    struct ScriptedEndpoint {
        header: Option<Header>,
        channel: Mutex<Option<Arc<dyn Channel>>>,
    }

    impl ScriptedEndpoint {
        fn with_reply(reply: Result<Reply, ChannelError>) -> Self {
            Self {
                header: Some(Header::Socket {
                    address: Ipv4Addr::new(192, 168, 0, 10),
                    port: 40000,
                }),
                channel: Mutex::new(Some(Arc::new(CannedChannel::new(reply)))),
            }
        }
    }

    #[async_trait]
    impl PeerEndpoint for ScriptedEndpoint {
        fn header(&self) -> Result<Header, ListenerError> {
            self.header.ok_or(ListenerError::NoInterfaceFound)
        }

        async fn accept_next(
            &self,
            _deadline: Duration,
            cancel: &CancellationToken,
        ) -> Result<Arc<dyn Channel>, ListenerError> {
            if let Some(channel) = self.channel.lock().unwrap().take() {
                return Ok(channel);
            }
            cancel.cancelled().await;
            Err(ListenerError::Cancelled)
        }

        fn dispose(&self) {}
    }

    fn timeouts() -> SessionTimeouts {
        SessionTimeouts {
            accept: Duration::from_secs(1),
            reply: Duration::from_secs(1),
        }
    }

    fn pairing_command() -> Command {
        Command::Pairing(NameMessage {
            name: "DESKTOP/alice".to_string(),
        })
    }

    fn name_reply(name: &str) -> Reply {
        Reply::Pairing(NameMessage {
            name: name.to_string(),
        })
    }

    // ── Verification ─────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_matching_identity_is_verified() {
        // Arrange
        let renderer = Arc::new(RecordingRenderer::new());
        let endpoint = ScriptedEndpoint::with_reply(Ok(name_reply("DESKTOP/alice")));
        let mut session = PairingSession::new(
            pairing_command(),
            Some("DESKTOP/alice".to_string()),
            renderer.clone(),
            timeouts(),
        );

        // Act
        let outcome = session.run(&endpoint, &CancellationToken::new()).await.unwrap();

        // Assert
        assert_eq!(outcome, SessionOutcome::Verified(name_reply("DESKTOP/alice")));
        assert_eq!(session.state(), SessionState::Verified);
    }

    #[tokio::test]
    async fn test_distinct_identities_are_never_verified() {
        let cases = [
            ("DESKTOP/alice", "DESKTOP/bob"),
            ("DESKTOP/alice", "desktop/alice"),
            ("DESKTOP/alice", "DESKTOP/alice "),
            ("DESKTOP/alice", ""),
        ];

        for (expected, received) in cases {
            let endpoint = ScriptedEndpoint::with_reply(Ok(name_reply(received)));
            let mut session = PairingSession::new(
                pairing_command(),
                Some(expected.to_string()),
                Arc::new(RecordingRenderer::new()),
                timeouts(),
            );

            let outcome = session.run(&endpoint, &CancellationToken::new()).await.unwrap();

            assert_eq!(
                outcome,
                SessionOutcome::Mismatched {
                    expected: expected.to_string(),
                    received: received.to_string(),
                }
            );
            assert!(!outcome.is_verified());
            assert_eq!(session.state(), SessionState::Mismatched);
        }
    }

    #[tokio::test]
    async fn test_without_expectation_reply_is_accepted() {
        let reply = Reply::Otp(PasswordReply {
            password: "123456".to_string(),
        });
        let endpoint = ScriptedEndpoint::with_reply(Ok(reply.clone()));
        let mut session = PairingSession::new(
            Command::Otp(ResourceRequest::default()),
            None,
            Arc::new(RecordingRenderer::new()),
            timeouts(),
        );

        let outcome = session.run(&endpoint, &CancellationToken::new()).await.unwrap();

        assert_eq!(outcome, SessionOutcome::Verified(reply));
    }

    // ── Lifecycle ────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_second_run_is_already_resolved() {
        let endpoint = ScriptedEndpoint::with_reply(Ok(name_reply("x")));
        let mut session =
            PairingSession::new(pairing_command(), None, Arc::new(RecordingRenderer::new()), timeouts());
        session.run(&endpoint, &CancellationToken::new()).await.unwrap();

        let again = session.run(&endpoint, &CancellationToken::new()).await;

        assert!(matches!(again, Err(SessionError::AlreadyResolved)));
        assert_eq!(session.state(), SessionState::Verified);
    }

    #[tokio::test]
    async fn test_failed_session_cannot_be_rerun() {
        let endpoint = ScriptedEndpoint::with_reply(Err(ChannelError::Closed));
        let mut session =
            PairingSession::new(pairing_command(), None, Arc::new(RecordingRenderer::new()), timeouts());

        let first = session.run(&endpoint, &CancellationToken::new()).await;
        let second = session.run(&endpoint, &CancellationToken::new()).await;

        assert!(matches!(first, Err(SessionError::Channel(ChannelError::Closed))));
        assert!(matches!(second, Err(SessionError::AlreadyResolved)));
        assert_eq!(session.state(), SessionState::Failed);
    }

    #[tokio::test]
    async fn test_code_is_rendered_then_dismissed() {
        // Arrange
        let renderer = Arc::new(RecordingRenderer::new());
        let endpoint = ScriptedEndpoint::with_reply(Ok(name_reply("x")));
        let mut session = PairingSession::new(pairing_command(), None, renderer.clone(), timeouts());

        // Act
        session.run(&endpoint, &CancellationToken::new()).await.unwrap();

        // Assert
        let rendered = renderer.rendered();
        assert_eq!(rendered.len(), 1);
        assert_eq!(rendered[0].0, "Pair a device");
        let code = OobCode::from_text(&rendered[0].1).unwrap();
        assert_eq!(code.kind, CommandKind::Pairing);
        assert_eq!(code.header, endpoint.header().unwrap());
        assert_eq!(renderer.dismissed(), vec!["Pair a device".to_string()]);
    }

    #[tokio::test]
    async fn test_code_is_dismissed_when_cancelled() {
        // Arrange
        let mut renderer = MockCodeRenderer::new();
        renderer.expect_render().times(1).returning(|_, _| Ok(()));
        renderer
            .expect_dismiss()
            .withf(|title| title == "Save credential")
            .times(1)
            .return_const(());
        let endpoint = ScriptedEndpoint {
            header: Some(Header::Socket {
                address: Ipv4Addr::LOCALHOST,
                port: 1,
            }),
            channel: Mutex::new(None),
        };
        let mut session = PairingSession::new(
            Command::Store(lockall_core::StoreRequest {
                resource_id: "example.com".to_string(),
                credential: "p@ss".to_string(),
            }),
            None,
            Arc::new(renderer),
            timeouts(),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();

        // Act
        let result = session.run(&endpoint, &cancel).await;

        // Assert
        assert!(matches!(
            result,
            Err(SessionError::Endpoint(ListenerError::Cancelled))
        ));
        assert_eq!(session.state(), SessionState::Failed);
    }

    #[tokio::test]
    async fn test_render_failure_fails_without_dismiss() {
        // Arrange
        let mut renderer = MockCodeRenderer::new();
        renderer
            .expect_render()
            .returning(|_, _| Err(RenderError::Display("no display".to_string())));
        renderer.expect_dismiss().never();
        let endpoint = ScriptedEndpoint::with_reply(Ok(name_reply("x")));
        let mut session = PairingSession::new(pairing_command(), None, Arc::new(renderer), timeouts());

        // Act
        let result = session.run(&endpoint, &CancellationToken::new()).await;

        // Assert
        assert!(matches!(result, Err(SessionError::Render(_))));
        assert_eq!(session.state(), SessionState::Failed);
    }

    #[tokio::test]
    async fn test_missing_interface_fails_before_rendering() {
        let renderer = Arc::new(RecordingRenderer::new());
        let endpoint = ScriptedEndpoint {
            header: None,
            channel: Mutex::new(None),
        };
        let mut session = PairingSession::new(pairing_command(), None, renderer.clone(), timeouts());

        let result = session.run(&endpoint, &CancellationToken::new()).await;

        assert!(matches!(
            result,
            Err(SessionError::Endpoint(ListenerError::NoInterfaceFound))
        ));
        assert_eq!(renderer.render_count(), 0);
        assert!(renderer.dismissed().is_empty());
    }

    #[test]
    fn test_every_command_has_a_title() {
        for kind in CommandKind::ALL {
            assert!(!code_title(kind).is_empty());
        }
    }
}
