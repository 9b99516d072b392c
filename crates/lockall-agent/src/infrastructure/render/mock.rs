//! Recording renderer for tests.
//!
//! Keeps every rendered and dismissed title, and optionally forwards each
//! rendered code over a tokio channel so a simulated companion can "scan" it.

use std::sync::{Mutex, PoisonError};

use tokio::sync::mpsc;

use super::{CodeRenderer, RenderError};

/// A [`CodeRenderer`] that records calls instead of drawing anything.
#[derive(Default)]
pub struct RecordingRenderer {
    rendered: Mutex<Vec<(String, String)>>,
    dismissed: Mutex<Vec<String>>,
    feed: Option<mpsc::UnboundedSender<String>>,
    fail_with: Option<String>,
}

impl RecordingRenderer {
    /// Creates a renderer that only records.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a renderer that also forwards each code's text.
    pub fn with_feed() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let renderer = Self {
            feed: Some(tx),
            ..Self::default()
        };
        (renderer, rx)
    }

    /// Creates a renderer whose `render` always fails.
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            fail_with: Some(reason.into()),
            ..Self::default()
        }
    }

    /// `(title, code)` pairs in render order.
    pub fn rendered(&self) -> Vec<(String, String)> {
        self.rendered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Titles in dismissal order.
    pub fn dismissed(&self) -> Vec<String> {
        self.dismissed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn render_count(&self) -> usize {
        self.rendered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl CodeRenderer for RecordingRenderer {
    fn render(&self, title: &str, code: &str) -> Result<(), RenderError> {
        if let Some(reason) = &self.fail_with {
            return Err(RenderError::Display(reason.clone()));
        }
        self.rendered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((title.to_string(), code.to_string()));
        if let Some(feed) = &self.feed {
            // The test may have stopped listening; recording still counts.
            let _ = feed.send(code.to_string());
        }
        Ok(())
    }

    fn dismiss(&self, title: &str) {
        self.dismissed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(title.to_string());
    }
}
