//! Line-oriented intent source for headless use.
//!
//! One command per line:
//!
//! ```text
//! pair
//! otp [window title]
//! pull <window title>
//! store <credential> [window title]
//! ```
//!
//! The window title stands in for the foreground window the desktop shell
//! would report; it decides whether the browser bridge can serve the request.

use std::sync::{Mutex, PoisonError};

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::application::intents::UserIntent;

use super::{IntentSource, IntentSourceError, INTENT_QUEUE_DEPTH};

/// A line that is not a recognised command.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseIntentError {
    #[error("unknown command {0:?}; expected pair, otp, pull or store")]
    UnknownVerb(String),

    #[error("{0} needs {1}")]
    MissingArgument(&'static str, &'static str),
}

/// Parses one input line.  Blank lines yield `Ok(None)`.
///
/// # Errors
///
/// Returns [`ParseIntentError`] for unknown verbs or missing arguments.
pub fn parse_intent_line(line: &str) -> Result<Option<UserIntent>, ParseIntentError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };

    let intent = match verb.to_ascii_lowercase().as_str() {
        "pair" => UserIntent::PairDevice,
        "otp" => UserIntent::FetchOtp {
            window_title: rest.to_string(),
        },
        "pull" if rest.is_empty() => {
            return Err(ParseIntentError::MissingArgument("pull", "a window title"))
        }
        "pull" => UserIntent::PullCredential {
            window_title: rest.to_string(),
        },
        "store" => {
            let (credential, title) = match rest.split_once(char::is_whitespace) {
                Some((credential, title)) => (credential, title.trim()),
                None => (rest, ""),
            };
            if credential.is_empty() {
                return Err(ParseIntentError::MissingArgument("store", "a credential"));
            }
            UserIntent::StoreCredential {
                window_title: title.to_string(),
                credential: credential.to_string(),
            }
        }
        other => return Err(ParseIntentError::UnknownVerb(other.to_string())),
    };
    Ok(Some(intent))
}

/// Reads intents from the process's standard input.
#[derive(Default)]
pub struct StdinIntentSource {
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl StdinIntentSource {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IntentSource for StdinIntentSource {
    fn start(&self) -> Result<mpsc::Receiver<UserIntent>, IntentSourceError> {
        let mut reader = self.reader.lock().unwrap_or_else(PoisonError::into_inner);
        if reader.is_some() {
            return Err(IntentSourceError::AlreadyStarted);
        }

        let (tx, rx) = mpsc::channel(INTENT_QUEUE_DEPTH);
        *reader = Some(tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => match parse_intent_line(&line) {
                        Ok(Some(intent)) => {
                            if tx.send(intent).await.is_err() {
                                break;
                            }
                        }
                        Ok(None) => {}
                        Err(e) => warn!("{e}"),
                    },
                    Ok(None) => {
                        debug!("stdin closed");
                        break;
                    }
                    Err(e) => {
                        warn!("stdin read failed: {e}");
                        break;
                    }
                }
            }
        }));
        Ok(rx)
    }

    fn stop(&self) {
        if let Some(handle) = self
            .reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pair() {
        assert_eq!(parse_intent_line("pair"), Ok(Some(UserIntent::PairDevice)));
        assert_eq!(parse_intent_line("  PAIR  "), Ok(Some(UserIntent::PairDevice)));
    }

    #[test]
    fn test_parse_otp_with_and_without_title() {
        assert_eq!(
            parse_intent_line("otp"),
            Ok(Some(UserIntent::FetchOtp {
                window_title: String::new()
            }))
        );
        assert_eq!(
            parse_intent_line("otp Sign in - Google Chrome"),
            Ok(Some(UserIntent::FetchOtp {
                window_title: "Sign in - Google Chrome".to_string()
            }))
        );
    }

    #[test]
    fn test_parse_pull_requires_title() {
        assert_eq!(
            parse_intent_line("pull"),
            Err(ParseIntentError::MissingArgument("pull", "a window title"))
        );
        assert_eq!(
            parse_intent_line("pull Mail - Outlook"),
            Ok(Some(UserIntent::PullCredential {
                window_title: "Mail - Outlook".to_string()
            }))
        );
    }

    #[test]
    fn test_parse_store_splits_credential_from_title() {
        // Arrange / Act
        let parsed = parse_intent_line("store p@ss example.com - Google Chrome");

        // Assert
        assert_eq!(
            parsed,
            Ok(Some(UserIntent::StoreCredential {
                window_title: "example.com - Google Chrome".to_string(),
                credential: "p@ss".to_string(),
            }))
        );
    }

    #[test]
    fn test_parse_store_requires_credential() {
        assert_eq!(
            parse_intent_line("store"),
            Err(ParseIntentError::MissingArgument("store", "a credential"))
        );
    }

    #[test]
    fn test_parse_blank_and_unknown() {
        assert_eq!(parse_intent_line("   "), Ok(None));
        assert_eq!(
            parse_intent_line("launch rockets"),
            Err(ParseIntentError::UnknownVerb("launch".to_string()))
        );
    }
}
