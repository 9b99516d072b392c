//! Presentation of the out-of-band pairing code.
//!
//! Drawing an actual QR image belongs to the desktop shell.  The agent only
//! needs two operations: show a code under a title, and take it down again
//! once the session resolves.
//!
//! # Testability
//!
//! The [`CodeRenderer`] trait lets tests capture rendered codes with
//! [`mock::RecordingRenderer`] and feed them to a simulated companion.

use thiserror::Error;
use tracing::info;

pub mod mock;

/// Error type for rendering operations.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to display code: {0}")]
    Display(String),
}

/// Shows and hides pairing codes.
#[cfg_attr(test, mockall::automock)]
pub trait CodeRenderer: Send + Sync {
    /// Displays `code` under `title`.
    fn render(&self, title: &str, code: &str) -> Result<(), RenderError>;

    /// Removes the code shown under `title`, if any.
    fn dismiss(&self, title: &str);
}

/// Writes codes to standard output for headless use.
///
/// The printed text is what a QR encoder would be given; pasting it into a
/// companion has the same effect as scanning.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleRenderer;

impl CodeRenderer for ConsoleRenderer {
    fn render(&self, title: &str, code: &str) -> Result<(), RenderError> {
        println!("┌─ {title}");
        println!("│ scan with your phone: {code}");
        println!("└─");
        Ok(())
    }

    fn dismiss(&self, title: &str) {
        info!("{title}: code dismissed");
    }
}
