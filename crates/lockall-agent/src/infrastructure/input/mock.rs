//! Mock intent source for tests.
//!
//! Lets tests push [`UserIntent`]s as if the user had pressed a hotkey.

use std::sync::{Mutex, PoisonError};

use tokio::sync::mpsc;

use crate::application::intents::UserIntent;

use super::{IntentSource, IntentSourceError, INTENT_QUEUE_DEPTH};

/// An [`IntentSource`] driven by [`MockIntentSource::inject`].
#[derive(Default)]
pub struct MockIntentSource {
    sender: Mutex<Option<mpsc::Sender<UserIntent>>>,
}

impl MockIntentSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `intent`.
    ///
    /// # Errors
    ///
    /// [`IntentSourceError::Stopped`] before `start()`, after `stop()`, or
    /// once the receiver is gone.
    pub async fn inject(&self, intent: UserIntent) -> Result<(), IntentSourceError> {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(IntentSourceError::Stopped)?;
        sender
            .send(intent)
            .await
            .map_err(|_| IntentSourceError::Stopped)
    }
}

impl IntentSource for MockIntentSource {
    fn start(&self) -> Result<mpsc::Receiver<UserIntent>, IntentSourceError> {
        let mut sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        if sender.is_some() {
            return Err(IntentSourceError::AlreadyStarted);
        }
        let (tx, rx) = mpsc::channel(INTENT_QUEUE_DEPTH);
        *sender = Some(tx);
        Ok(rx)
    }

    fn stop(&self) {
        // Dropping the sender closes the channel.
        *self.sender.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}
