//! Intent sources: where [`UserIntent`]s come from.
//!
//! The desktop shell turns hotkeys and tray clicks into intents; the
//! headless agent reads them from stdin.  Either way the application sees
//! only a `tokio::sync::mpsc::Receiver<UserIntent>`.
//!
//! # Testability
//!
//! The [`IntentSource`] trait lets tests inject intents with
//! [`mock::MockIntentSource`] instead of typing them.

use tokio::sync::mpsc;

use crate::application::intents::UserIntent;

pub mod mock;
pub mod stdin;

pub use stdin::{parse_intent_line, StdinIntentSource};

/// Capacity of the intent channel.
pub const INTENT_QUEUE_DEPTH: usize = 32;

/// Error type for intent sources.
#[derive(Debug, thiserror::Error)]
pub enum IntentSourceError {
    #[error("intent source already started")]
    AlreadyStarted,

    #[error("intent source has been stopped")]
    Stopped,
}

/// Produces user intents.
pub trait IntentSource: Send + Sync {
    /// Starts producing and returns the receiving end.
    ///
    /// # Errors
    ///
    /// [`IntentSourceError::AlreadyStarted`] on a second call.
    fn start(&self) -> Result<mpsc::Receiver<UserIntent>, IntentSourceError>;

    /// Stops producing; the receiver sees the channel close.
    fn stop(&self);
}
