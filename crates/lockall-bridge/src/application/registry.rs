//! The process-wide registry of the live bridge connection.
//!
//! At most one browser extension is attached at a time.  The registry is
//! owned by the application root and handed around as `Arc<BridgeRegistry>`;
//! the WebSocket server writes to it on connect and disconnect, the
//! dispatcher reads it on every command.
//!
//! # Concurrency (for beginners)
//!
//! The entry sits behind a `std::sync::RwLock`.  Readers clone the entry out
//! (cheap: an id, a short string, and an `Arc`), so the lock is never held
//! across an `.await` and a reader never sees a half-written entry.
//!
//! `clear` takes the id of the entry to remove.  A connection that closes
//! *after* a newer one replaced it therefore cannot remove the newer entry.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, info};
use uuid::Uuid;

use lockall_core::Channel;

/// One attached bridge connection.
#[derive(Clone)]
pub struct BridgeEntry {
    /// Identifies this connection for [`BridgeRegistry::clear`].
    pub id: Uuid,
    /// Window-title suffix of the browser this connection lives in.
    pub scope: String,
    /// The connection itself.
    pub channel: Arc<dyn Channel>,
}

impl BridgeEntry {
    /// Creates an entry with a fresh id.
    pub fn new(scope: impl Into<String>, channel: Arc<dyn Channel>) -> Self {
        Self {
            id: Uuid::new_v4(),
            scope: scope.into(),
            channel,
        }
    }

    /// `true` when a window with this title belongs to the entry's browser.
    pub fn covers(&self, window_title: &str) -> bool {
        !self.scope.is_empty() && window_title.ends_with(&self.scope)
    }
}

impl fmt::Debug for BridgeEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeEntry")
            .field("id", &self.id)
            .field("scope", &self.scope)
            .field("channel", &self.channel.describe())
            .finish()
    }
}

/// Holds zero or one [`BridgeEntry`].
#[derive(Debug, Default)]
pub struct BridgeRegistry {
    active: RwLock<Option<BridgeEntry>>,
}

impl BridgeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `entry` as the active bridge and returns the one it replaced.
    ///
    /// The caller is responsible for closing the returned entry's channel.
    pub fn set_active(&self, entry: BridgeEntry) -> Option<BridgeEntry> {
        info!(id = %entry.id, scope = %entry.scope, "bridge attached");
        let mut slot = self.active.write().unwrap_or_else(PoisonError::into_inner);
        slot.replace(entry)
    }

    /// Removes the active entry if its id is `id`.
    ///
    /// Returns `true` when an entry was removed.
    pub fn clear(&self, id: Uuid) -> bool {
        let mut slot = self.active.write().unwrap_or_else(PoisonError::into_inner);
        match slot.as_ref() {
            Some(entry) if entry.id == id => {
                *slot = None;
                info!(%id, "bridge detached");
                true
            }
            _ => {
                debug!(%id, "ignoring clear for a bridge that is no longer active");
                false
            }
        }
    }

    /// Snapshot of the active entry.
    pub fn current(&self) -> Option<BridgeEntry> {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use lockall_core::{ChannelError, Command, CommandKind, Reply};
    use std::time::Duration;

    struct IdleChannel(&'static str);

    #[async_trait]
    impl Channel for IdleChannel {
        async fn send(&self, _command: &Command) -> Result<(), ChannelError> {
            Err(ChannelError::Closed)
        }
        async fn receive(&self, _expected: CommandKind) -> Result<Reply, ChannelError> {
            Err(ChannelError::Closed)
        }
        async fn request(&self, _c: &Command, _d: Duration) -> Result<Reply, ChannelError> {
            Err(ChannelError::Closed)
        }
        async fn close(&self) {}
        fn describe(&self) -> String {
            self.0.to_string()
        }
    }

    fn entry(name: &'static str) -> BridgeEntry {
        BridgeEntry::new("Google Chrome", Arc::new(IdleChannel(name)))
    }

    #[test]
    fn test_new_registry_is_empty() {
        assert!(BridgeRegistry::new().current().is_none());
    }

    #[test]
    fn test_set_active_returns_previous_entry() {
        // Arrange
        let registry = BridgeRegistry::new();
        let first = entry("first");
        let first_id = first.id;

        // Act
        assert!(registry.set_active(first).is_none());
        let replaced = registry.set_active(entry("second"));

        // Assert
        assert_eq!(replaced.map(|e| e.id), Some(first_id));
        assert_eq!(
            registry.current().map(|e| e.channel.describe()),
            Some("second".to_string())
        );
    }

    #[test]
    fn test_clear_with_matching_id_removes_entry() {
        let registry = BridgeRegistry::new();
        let e = entry("only");
        let id = e.id;
        registry.set_active(e);

        assert!(registry.clear(id));
        assert!(registry.current().is_none());
    }

    #[test]
    fn test_late_clear_of_superseded_entry_keeps_newer_one() {
        // Arrange
        let registry = BridgeRegistry::new();
        let old = entry("old");
        let old_id = old.id;
        registry.set_active(old);
        let newer = entry("newer");
        let newer_id = newer.id;
        registry.set_active(newer);

        // Act
        let removed = registry.clear(old_id);

        // Assert
        assert!(!removed);
        assert_eq!(registry.current().map(|e| e.id), Some(newer_id));
    }

    #[test]
    fn test_covers_matches_window_title_suffix() {
        let e = entry("x");
        assert!(e.covers("Inbox - Mail - Google Chrome"));
        assert!(!e.covers("Inbox - Mail - Mozilla Firefox"));
        assert!(!e.covers("Google Chrome - notes.txt"));
    }

    #[test]
    fn test_empty_scope_covers_nothing() {
        let e = BridgeEntry::new("", Arc::new(IdleChannel("x")));
        assert!(!e.covers("anything"));
    }
}
