//! Dispatcher: picks a channel for each command and returns its reply.
//!
//! # Routing policy
//!
//! ```text
//!                      ┌─ bridge registered and window in scope ─► bridge channel
//! fast-path eligible ──┤
//!                      └─ otherwise ─┐
//! PAIRING ───────────────────────────┴─► fresh endpoint ─► PairingSession ─► dispose
//! ```
//!
//! The bridge is the browser extension's persistent connection.  It only
//! serves windows whose title ends with the bridge's scope suffix, so a
//! command triggered from another application always goes through a code
//! the user scans with their phone.
//!
//! Failures reach the caller as [`DispatchError`]; nothing here panics or
//! ends the process.  [`DispatchError::is_degraded`] separates "pairing is
//! unavailable on this host" from "this one exchange failed".

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use lockall_bridge::BridgeRegistry;
use lockall_core::{
    ChannelError, Command, CommandKind, NameMessage, Reply, ResourceRequest, StatusReply,
    StoreRequest,
};

use crate::application::pairing::{
    PairingSession, SessionError, SessionOutcome, SessionTimeouts,
};
use crate::infrastructure::network::{EndpointFactory, ListenerError};
use crate::infrastructure::render::CodeRenderer;

/// Errors returned to the caller of a dispatch.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No endpoint could be opened.
    #[error("cannot open pairing endpoint: {0}")]
    Endpoint(#[from] ListenerError),

    #[error(transparent)]
    Session(#[from] SessionError),

    /// The bridge exchange failed.
    #[error("bridge exchange failed: {0}")]
    Bridge(#[from] ChannelError),

    /// The companion paired, but as someone else.
    #[error("companion identified as {received:?}, expected {expected:?}")]
    Mismatched { expected: String, received: String },

    /// The reply was well formed but for a different command.
    #[error("expected a {expected} reply, got {actual}")]
    UnexpectedReply {
        expected: CommandKind,
        actual: CommandKind,
    },
}

impl DispatchError {
    /// `true` when code-based pairing is unavailable on this host (no
    /// interface to advertise, or no port to bind).
    pub fn is_degraded(&self) -> bool {
        match self {
            Self::Endpoint(e) | Self::Session(SessionError::Endpoint(e)) => e.is_degraded(),
            _ => false,
        }
    }
}

/// Deadlines for every wait a dispatch can perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Until a companion connects to a rendered code.
    pub accept: Duration,
    /// Until a connected companion answers.
    pub reply: Duration,
    /// Until the browser extension answers.
    pub bridge_reply: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            accept: Duration::from_secs(120),
            reply: Duration::from_secs(60),
            bridge_reply: Duration::from_secs(120),
        }
    }
}

impl Timeouts {
    fn session(&self) -> SessionTimeouts {
        SessionTimeouts {
            accept: self.accept,
            reply: self.reply,
        }
    }
}

/// Routes commands to the bridge or to a fresh pairing session.
pub struct Dispatcher {
    registry: Arc<BridgeRegistry>,
    endpoints: Arc<dyn EndpointFactory>,
    renderer: Arc<dyn CodeRenderer>,
    timeouts: Timeouts,
    identity: String,
}

impl Dispatcher {
    /// `identity` is this host's device name, sent with PAIRING and expected
    /// back from the companion.
    pub fn new(
        registry: Arc<BridgeRegistry>,
        endpoints: Arc<dyn EndpointFactory>,
        renderer: Arc<dyn CodeRenderer>,
        timeouts: Timeouts,
        identity: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            endpoints,
            renderer,
            timeouts,
            identity: identity.into(),
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    // ── Typed operations ─────────────────────────────────────────────────────

    /// Pairs a companion device.  Always uses a scanned code.
    ///
    /// A mismatched identity is returned as [`SessionOutcome::Mismatched`],
    /// not as an error.
    ///
    /// # Errors
    ///
    /// Endpoint, render and exchange failures.
    pub async fn pair(&self, cancel: &CancellationToken) -> Result<SessionOutcome, DispatchError> {
        let command = Command::Pairing(NameMessage {
            name: self.identity.clone(),
        });
        self.run_session(command, Some(self.identity.clone()), cancel)
            .await
    }

    /// Asks for a one-time password.  The request carries no resource id;
    /// the companion decides which code to return.
    ///
    /// # Errors
    ///
    /// As [`Dispatcher::dispatch`].
    pub async fn fetch_otp(
        &self,
        window_title: &str,
        cancel: &CancellationToken,
    ) -> Result<String, DispatchError> {
        let command = Command::Otp(ResourceRequest::default());
        let reply = self.dispatch(&command, window_title, cancel).await?;
        password_of(CommandKind::Otp, reply)
    }

    /// Asks for the credential stored for `window_title`.
    ///
    /// The title is the resource id on both transports, so a command means
    /// the same thing whichever way it travels.
    ///
    /// # Errors
    ///
    /// As [`Dispatcher::dispatch`].
    pub async fn pull(
        &self,
        window_title: &str,
        cancel: &CancellationToken,
    ) -> Result<String, DispatchError> {
        let command = Command::Pull(ResourceRequest {
            resource_id: window_title.to_string(),
        });
        let reply = self.dispatch(&command, window_title, cancel).await?;
        password_of(CommandKind::Pull, reply)
    }

    /// Asks the peer to store `credential` for `window_title`.  As with
    /// [`Dispatcher::pull`], the title is the resource id on both transports.
    ///
    /// # Errors
    ///
    /// As [`Dispatcher::dispatch`].
    pub async fn store(
        &self,
        window_title: &str,
        credential: &str,
        cancel: &CancellationToken,
    ) -> Result<StatusReply, DispatchError> {
        let command = Command::Store(StoreRequest {
            resource_id: window_title.to_string(),
            credential: credential.to_string(),
        });
        match self.dispatch(&command, window_title, cancel).await? {
            Reply::Store(status) => Ok(status),
            other => Err(DispatchError::UnexpectedReply {
                expected: CommandKind::Store,
                actual: other.kind(),
            }),
        }
    }

    // ── Generic dispatch ─────────────────────────────────────────────────────

    /// Sends `command` over the bridge when it is eligible and the bridge
    /// covers `window_title`, otherwise through a freshly rendered code.
    /// The command is forwarded unchanged on either path.
    ///
    /// # Errors
    ///
    /// [`DispatchError::Bridge`] for bridge failures; endpoint and session
    /// failures on the slow path.  PAIRING through this entry point is sent
    /// without identity verification.
    pub async fn dispatch(
        &self,
        command: &Command,
        window_title: &str,
        cancel: &CancellationToken,
    ) -> Result<Reply, DispatchError> {
        let kind = command.kind();
        if kind.fast_path_eligible() {
            if let Some(entry) = self.registry.current() {
                if entry.covers(window_title) {
                    info!("{kind} via bridge {}", entry.channel.describe());
                    let reply = tokio::select! {
                        _ = cancel.cancelled() => Err(ChannelError::Cancelled),
                        reply = entry.channel.request(command, self.timeouts.bridge_reply) => reply,
                    };
                    return Ok(reply?);
                }
                debug!("bridge scope {:?} does not cover {window_title:?}", entry.scope);
            }
        }

        info!("{kind} via pairing code");
        match self.run_session(command.clone(), None, cancel).await? {
            SessionOutcome::Verified(reply) => Ok(reply),
            SessionOutcome::Mismatched { expected, received } => {
                Err(DispatchError::Mismatched { expected, received })
            }
        }
    }

    /// Opens an endpoint, runs one session on it, and disposes it.
    async fn run_session(
        &self,
        command: Command,
        expectation: Option<String>,
        cancel: &CancellationToken,
    ) -> Result<SessionOutcome, DispatchError> {
        let endpoint = self.endpoints.open().await?;
        let mut session = PairingSession::new(
            command,
            expectation,
            Arc::clone(&self.renderer),
            self.timeouts.session(),
        );
        let outcome = session.run(endpoint.as_ref(), cancel).await;
        endpoint.dispose();
        Ok(outcome?)
    }
}

fn password_of(expected: CommandKind, reply: Reply) -> Result<String, DispatchError> {
    let actual = reply.kind();
    match reply {
        Reply::Otp(p) | Reply::Pull(p) if actual == expected => Ok(p.password),
        _ => Err(DispatchError::UnexpectedReply { expected, actual }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lockall_core::PasswordReply;

    #[test]
    fn test_setup_failures_are_degraded() {
        assert!(DispatchError::Endpoint(ListenerError::NoInterfaceFound).is_degraded());
        assert!(
            DispatchError::Session(SessionError::Endpoint(ListenerError::NoInterfaceFound))
                .is_degraded()
        );
        assert!(DispatchError::Endpoint(ListenerError::BindFailure {
            addr: "0.0.0.0:0".parse().unwrap(),
            source: std::io::Error::other("denied"),
        })
        .is_degraded());
    }

    #[test]
    fn test_exchange_failures_are_not_degraded() {
        assert!(!DispatchError::Bridge(ChannelError::Closed).is_degraded());
        assert!(!DispatchError::Session(SessionError::Channel(ChannelError::Busy)).is_degraded());
        assert!(!DispatchError::Endpoint(ListenerError::Cancelled).is_degraded());
        assert!(!DispatchError::Mismatched {
            expected: "a".to_string(),
            received: "b".to_string(),
        }
        .is_degraded());
    }

    #[test]
    fn test_password_of_checks_reply_kind() {
        let otp = Reply::Otp(PasswordReply {
            password: "123456".to_string(),
        });

        assert_eq!(password_of(CommandKind::Otp, otp.clone()).unwrap(), "123456");
        assert!(matches!(
            password_of(CommandKind::Pull, otp),
            Err(DispatchError::UnexpectedReply {
                expected: CommandKind::Pull,
                actual: CommandKind::Otp,
            })
        ));
    }

    #[test]
    fn test_default_timeouts() {
        let timeouts = Timeouts::default();
        assert_eq!(timeouts.accept, Duration::from_secs(120));
        assert_eq!(timeouts.reply, Duration::from_secs(60));
        assert_eq!(timeouts.bridge_reply, Duration::from_secs(120));
    }
}
