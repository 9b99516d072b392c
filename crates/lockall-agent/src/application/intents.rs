//! User intents: what the person at the keyboard asked for, and what came of it.
//!
//! Hotkeys, tray menus and the stdin source all reduce to a [`UserIntent`]
//! sent over a `tokio::sync::mpsc` channel.  [`run_intent_loop`] turns each
//! intent into a dispatcher call on its own task, so a slow pairing never
//! blocks an OTP request issued meanwhile.
//!
//! Results go to an [`OutcomeSink`]: the desktop shell types the password
//! into the focused field or shows a message box; the console sink prints.

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::dispatch::Dispatcher;
use crate::application::pairing::SessionOutcome;

/// Something the user asked the agent to do.
#[derive(Clone, PartialEq, Eq)]
pub enum UserIntent {
    PairDevice,
    FetchOtp { window_title: String },
    PullCredential { window_title: String },
    StoreCredential { window_title: String, credential: String },
}

impl UserIntent {
    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::PairDevice => "pair",
            Self::FetchOtp { .. } => "otp",
            Self::PullCredential { .. } => "pull",
            Self::StoreCredential { .. } => "store",
        }
    }
}

impl fmt::Debug for UserIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PairDevice => f.write_str("PairDevice"),
            Self::FetchOtp { window_title } => f
                .debug_struct("FetchOtp")
                .field("window_title", window_title)
                .finish(),
            Self::PullCredential { window_title } => f
                .debug_struct("PullCredential")
                .field("window_title", window_title)
                .finish(),
            Self::StoreCredential { window_title, .. } => f
                .debug_struct("StoreCredential")
                .field("window_title", window_title)
                .field("credential", &"<redacted>")
                .finish(),
        }
    }
}

/// What came of one intent.
#[derive(Clone, PartialEq, Eq)]
pub enum IntentOutcome {
    /// The companion paired and echoed this host's identity.
    Paired { device_name: String },
    /// The companion answered with someone else's identity.
    PairingRejected { expected: String, received: String },
    /// A secret to type into `window_title`.
    Password { window_title: String, password: String },
    /// The peer's answer to a store request.
    Stored { window_title: String, status: String },
    /// The intent failed.  `degraded` means pairing is unavailable on this host.
    Failed {
        intent: &'static str,
        reason: String,
        degraded: bool,
    },
}

impl fmt::Debug for IntentOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Paired { device_name } => f
                .debug_struct("Paired")
                .field("device_name", device_name)
                .finish(),
            Self::PairingRejected { expected, received } => f
                .debug_struct("PairingRejected")
                .field("expected", expected)
                .field("received", received)
                .finish(),
            Self::Password { window_title, .. } => f
                .debug_struct("Password")
                .field("window_title", window_title)
                .field("password", &"<redacted>")
                .finish(),
            Self::Stored {
                window_title,
                status,
            } => f
                .debug_struct("Stored")
                .field("window_title", window_title)
                .field("status", status)
                .finish(),
            Self::Failed {
                intent,
                reason,
                degraded,
            } => f
                .debug_struct("Failed")
                .field("intent", intent)
                .field("reason", reason)
                .field("degraded", degraded)
                .finish(),
        }
    }
}

/// Receives intent outcomes.
#[cfg_attr(test, mockall::automock)]
pub trait OutcomeSink: Send + Sync {
    fn deliver(&self, outcome: IntentOutcome);
}

/// Runs one intent to completion.
pub async fn handle_intent(
    dispatcher: &Dispatcher,
    intent: UserIntent,
    cancel: &CancellationToken,
) -> IntentOutcome {
    let label = intent.label();
    let result = match intent {
        UserIntent::PairDevice => dispatcher.pair(cancel).await.map(|outcome| match outcome {
            SessionOutcome::Verified(reply) => IntentOutcome::Paired {
                device_name: reply.peer_name().unwrap_or_default().to_string(),
            },
            SessionOutcome::Mismatched { expected, received } => {
                IntentOutcome::PairingRejected { expected, received }
            }
        }),
        UserIntent::FetchOtp { window_title } => dispatcher
            .fetch_otp(&window_title, cancel)
            .await
            .map(|password| IntentOutcome::Password {
                window_title,
                password,
            }),
        UserIntent::PullCredential { window_title } => dispatcher
            .pull(&window_title, cancel)
            .await
            .map(|password| IntentOutcome::Password {
                window_title,
                password,
            }),
        UserIntent::StoreCredential {
            window_title,
            credential,
        } => dispatcher
            .store(&window_title, &credential, cancel)
            .await
            .map(|status| IntentOutcome::Stored {
                window_title,
                status: status.status,
            }),
    };

    result.unwrap_or_else(|e| {
        let degraded = e.is_degraded();
        if degraded {
            warn!("{label}: pairing unavailable on this host: {e}");
        } else {
            warn!("{label} failed: {e}");
        }
        IntentOutcome::Failed {
            intent: label,
            reason: e.to_string(),
            degraded,
        }
    })
}

/// Consumes intents until the sender is dropped or `cancel` fires.
///
/// Each intent runs on its own task with a child token, so cancelling the
/// loop also abandons in-flight sessions.  Returns once every spawned task
/// has finished.
pub async fn run_intent_loop(
    dispatcher: Arc<Dispatcher>,
    mut intents: mpsc::Receiver<UserIntent>,
    sink: Arc<dyn OutcomeSink>,
    cancel: CancellationToken,
) {
    let mut tasks = JoinSet::new();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("shutdown requested; stopping intent loop");
                break;
            }
            next = intents.recv() => match next {
                Some(intent) => {
                    debug!("intent received: {intent:?}");
                    let dispatcher = Arc::clone(&dispatcher);
                    let sink = Arc::clone(&sink);
                    let cancel = cancel.child_token();
                    tasks.spawn(async move {
                        let outcome = handle_intent(&dispatcher, intent, &cancel).await;
                        sink.deliver(outcome);
                    });
                }
                None => {
                    debug!("intent source closed");
                    break;
                }
            },
            Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                if let Err(e) = joined {
                    warn!("intent task ended abnormally: {e}");
                }
            }
        }
    }

    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            warn!("intent task ended abnormally: {e}");
        }
    }
}
