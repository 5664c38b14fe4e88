//! notify
//!
//! Change Notification Sink.
//!
//! Every mutation either engine makes to the project filesystem is reported
//! through a [`ChangeSink`]. Consumers get at-least-once "something changed
//! here" signals, not a precise diff. A whole-directory change is reported
//! as path `.` with [`ChangeKind::Folder`].
//!
//! # Implementations
//!
//! - [`RecordingSink`] - keeps every event in order, for tests
//! - [`TracingSink`] - emits each event as a `tracing` record
//! - [`NullSink`] - discards everything

use std::fmt;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

/// What changed at a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// A file was created or rewritten
    File,
    /// A directory was created or its contents changed wholesale
    Folder,
    /// A file was removed
    Delete,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChangeKind::File => "file",
            ChangeKind::Folder => "folder",
            ChangeKind::Delete => "delete",
        };
        f.write_str(s)
    }
}

/// A single change notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub path: String,
    pub kind: ChangeKind,
    /// New content, for file writes that carry it
    pub content: Option<String>,
    /// Set when executed code (not the user or a tool) made the change
    pub runtime_originated: bool,
}

impl ChangeEvent {
    /// Path used to signal "the whole working tree changed".
    pub const WHOLE_TREE: &'static str = ".";

    pub fn file(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: ChangeKind::File,
            content: Some(content.into()),
            runtime_originated: false,
        }
    }

    pub fn folder(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: ChangeKind::Folder,
            content: None,
            runtime_originated: false,
        }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: ChangeKind::Delete,
            content: None,
            runtime_originated: false,
        }
    }

    /// The single event emitted after a checkout-style bulk change.
    pub fn whole_tree() -> Self {
        Self::folder(Self::WHOLE_TREE)
    }

    /// Mark the event as produced by executed code.
    pub fn from_runtime(mut self) -> Self {
        self.runtime_originated = true;
        self
    }
}

/// Receiver of filesystem change notifications.
#[async_trait]
pub trait ChangeSink: Send + Sync {
    async fn notify(&self, event: ChangeEvent);
}

/// Records every event, in delivery order.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<ChangeEvent>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all events received so far.
    pub fn events(&self) -> Vec<ChangeEvent> {
        self.events
            .lock()
            .map(|e| e.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    pub fn clear(&self) {
        match self.events.lock() {
            Ok(mut e) => e.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
    }
}

#[async_trait]
impl ChangeSink for RecordingSink {
    async fn notify(&self, event: ChangeEvent) {
        match self.events.lock() {
            Ok(mut e) => e.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

/// Logs each event at `info`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

#[async_trait]
impl ChangeSink for TracingSink {
    async fn notify(&self, event: ChangeEvent) {
        tracing::info!(
            path = %event.path,
            kind = %event.kind,
            runtime = event.runtime_originated,
            "filesystem changed"
        );
    }
}

/// Drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

#[async_trait]
impl ChangeSink for NullSink {
    async fn notify(&self, _event: ChangeEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn recording_sink_keeps_order() {
        let sink = RecordingSink::new();
        sink.notify(ChangeEvent::file("/a.txt", "1")).await;
        sink.notify(ChangeEvent::delete("/b.txt")).await;
        sink.notify(ChangeEvent::whole_tree()).await;

        let kinds: Vec<_> = sink.events().iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![ChangeKind::File, ChangeKind::Delete, ChangeKind::Folder]
        );
        assert_eq!(sink.events()[2].path, ".");
    }

    #[tokio::test]
    async fn clones_share_the_log() {
        let sink = RecordingSink::new();
        let other = sink.clone();
        other.notify(ChangeEvent::folder("/src")).await;
        assert_eq!(sink.events().len(), 1);
        sink.clear();
        assert!(other.events().is_empty());
    }

    #[test]
    fn runtime_flag() {
        let event = ChangeEvent::file("/a.txt", "hi").from_runtime();
        assert!(event.runtime_originated);
        assert_eq!(event.content.as_deref(), Some("hi"));
        assert_eq!(event.kind.to_string(), "file");
    }
}
