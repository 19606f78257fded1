//! User-visible, dismissible notifications kept at `app.messages`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use crate::store::{paths, StateTree};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Severity {
    #[default]
    Info,
    Success,
    Warning,
    Error,
    InProgress,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    #[serde(rename = "type")]
    pub severity: Severity,
    pub content: String,
    pub id: String,
    pub dismissible: bool,
    pub loading: bool,
}

impl Notification {
    pub fn new(content: impl Into<String>, severity: Severity) -> Self {
        Self {
            severity,
            content: content.into(),
            id: Uuid::new_v4().to_string(),
            dismissible: true,
            loading: false,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn dismissible(mut self, dismissible: bool) -> Self {
        self.dismissible = dismissible;
        self
    }

    pub fn loading(mut self, loading: bool) -> Self {
        self.loading = loading;
        self
    }
}

/// Stored entries, kept as raw JSON so that one unreadable entry never
/// costs the others on the next write.
fn entries(current: Option<Value>) -> Vec<Value> {
    match current {
        Some(Value::Array(items)) => items,
        Some(other) => {
            warn!(found = %other, "notifications: app.messages is not a list, resetting");
            Vec::new()
        }
        None => Vec::new(),
    }
}

fn entry_id(entry: &Value) -> Option<&str> {
    entry.get("id").and_then(Value::as_str)
}

/// Replaces the entry with the same id in place, or appends.
fn upsert(entries: &mut Vec<Value>, notification: &Notification) {
    let encoded = match serde_json::to_value(notification) {
        Ok(encoded) => encoded,
        Err(err) => {
            warn!("notifications: failed to encode message: {err}");
            return;
        }
    };
    match entries
        .iter_mut()
        .find(|entry| entry_id(entry) == Some(notification.id.as_str()))
    {
        Some(existing) => *existing = encoded,
        None => entries.push(encoded),
    }
}

#[derive(Debug, Clone)]
pub struct Notifier {
    store: StateTree,
}

impl Notifier {
    pub fn new(store: StateTree) -> Self {
        Self { store }
    }

    /// Returns the id of the inserted or replaced notification.
    pub fn push(&self, notification: Notification) -> String {
        self.store.update(paths::messages(), |current| {
            let mut entries = entries(current);
            upsert(&mut entries, &notification);
            Value::Array(entries)
        });
        notification.id
    }

    pub fn notify(&self, content: impl Into<String>, severity: Severity) -> String {
        self.push(Notification::new(content, severity))
    }

    pub fn error(&self, content: impl Into<String>) -> String {
        self.notify(content, Severity::Error)
    }

    pub fn success(&self, content: impl Into<String>) -> String {
        self.notify(content, Severity::Success)
    }

    pub fn dismiss(&self, id: &str) {
        self.store.update(paths::messages(), |current| {
            let mut entries = entries(current);
            entries.retain(|entry| entry_id(entry) != Some(id));
            Value::Array(entries)
        });
    }

    /// Readable notifications in order; unreadable entries are skipped.
    pub fn messages(&self) -> Vec<Notification> {
        entries(self.store.get(paths::messages()))
            .into_iter()
            .filter_map(|entry| match serde_json::from_value(entry) {
                Ok(message) => Some(message),
                Err(err) => {
                    warn!("notifications: skipping unreadable entry: {err}");
                    None
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_id_updates_in_place() {
        let notifier = Notifier::new(StateTree::new());
        notifier.notify("first", Severity::Info);
        notifier.push(
            Notification::new("Stopping fleet", Severity::Info)
                .with_id("x")
                .loading(true),
        );
        notifier.notify("last", Severity::Warning);

        notifier.push(Notification::new("Fleet stopped", Severity::Success).with_id("x"));

        let messages = notifier.messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1].id, "x");
        assert_eq!(messages[1].content, "Fleet stopped");
        assert_eq!(messages[1].severity, Severity::Success);
        assert!(!messages[1].loading);
    }

    #[test]
    fn dismiss_removes_exactly_one_entry() {
        let notifier = Notifier::new(StateTree::new());
        notifier.notify("keep", Severity::Info);
        notifier.push(Notification::new("drop", Severity::Error).with_id("x"));
        notifier.push(Notification::new("drop again", Severity::Error).with_id("x"));

        notifier.dismiss("x");

        let messages = notifier.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "keep");
    }

    #[test]
    fn generated_ids_are_distinct() {
        let notifier = Notifier::new(StateTree::new());
        let a = notifier.error("a");
        let b = notifier.error("b");
        assert_ne!(a, b);
        assert_eq!(notifier.messages().len(), 2);
    }

    #[test]
    fn stored_shape_uses_type_field() {
        let store = StateTree::new();
        let notifier = Notifier::new(store.clone());
        notifier.push(Notification::new("boom", Severity::Error).with_id("e1"));
        assert_eq!(
            store.get(["app", "messages", "0", "type"]),
            Some(serde_json::json!("error"))
        );
    }

    #[test]
    fn unreadable_entry_survives_writes() {
        let store = StateTree::new();
        store.set(
            paths::messages(),
            serde_json::json!([{"id": "legacy", "text": "no content field"}]),
        );
        let notifier = Notifier::new(store.clone());

        notifier.push(Notification::new("fresh", Severity::Info).with_id("n1"));

        let messages = notifier.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "fresh");
        assert_eq!(
            store.get(["app", "messages", "0", "id"]),
            Some(serde_json::json!("legacy"))
        );

        notifier.dismiss("legacy");
        assert_eq!(
            store.get(["app", "messages", "0", "id"]),
            Some(serde_json::json!("n1"))
        );
    }
}
