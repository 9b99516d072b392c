//! Console outcome sink.
//!
//! Prints each [`IntentOutcome`] for headless use.  Secrets are printed
//! because the console is the only place the user can read them; logs never
//! carry them.

use tracing::info;

use crate::application::intents::{IntentOutcome, OutcomeSink};

/// Writes outcomes to standard output.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleSink;

impl ConsoleSink {
    /// The line printed for `outcome`.
    pub fn format(outcome: &IntentOutcome) -> String {
        match outcome {
            IntentOutcome::Paired { device_name } => format!("paired with {device_name}"),
            IntentOutcome::PairingRejected { expected, received } => {
                format!("pairing rejected: device answered {received:?}, expected {expected:?}")
            }
            IntentOutcome::Password {
                window_title,
                password,
            } if window_title.is_empty() => format!("password: {password}"),
            IntentOutcome::Password {
                window_title,
                password,
            } => format!("password for {window_title}: {password}"),
            IntentOutcome::Stored {
                window_title,
                status,
            } => format!("store for {window_title:?}: {status}"),
            IntentOutcome::Failed {
                intent,
                reason,
                degraded: true,
            } => format!("{intent} unavailable: {reason}"),
            IntentOutcome::Failed { intent, reason, .. } => format!("{intent} failed: {reason}"),
        }
    }
}

impl OutcomeSink for ConsoleSink {
    fn deliver(&self, outcome: IntentOutcome) {
        info!("outcome: {outcome:?}");
        println!("{}", Self::format(&outcome));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_password_with_and_without_title() {
        let untitled = IntentOutcome::Password {
            window_title: String::new(),
            password: "123456".to_string(),
        };
        let titled = IntentOutcome::Password {
            window_title: "Bank".to_string(),
            password: "123456".to_string(),
        };

        assert_eq!(ConsoleSink::format(&untitled), "password: 123456");
        assert_eq!(ConsoleSink::format(&titled), "password for Bank: 123456");
    }

    #[test]
    fn test_format_degraded_failure() {
        let outcome = IntentOutcome::Failed {
            intent: "pair",
            reason: "no IPv4 network interface available to advertise".to_string(),
            degraded: true,
        };

        assert_eq!(
            ConsoleSink::format(&outcome),
            "pair unavailable: no IPv4 network interface available to advertise"
        );
    }

    #[test]
    fn test_format_mismatch() {
        let outcome = IntentOutcome::PairingRejected {
            expected: "A".to_string(),
            received: "B".to_string(),
        };
        assert_eq!(
            ConsoleSink::format(&outcome),
            "pairing rejected: device answered \"B\", expected \"A\""
        );
    }
}
