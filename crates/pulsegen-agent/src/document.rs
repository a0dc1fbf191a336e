//! The page the agent mutates.
//!
//! [`Document`] is the only way the agent touches the host page. A browser
//! build implements it over the real DOM; [`MemoryDocument`] keeps the same
//! state in memory.

use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Kind of element injected under `<head>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    Style,
    Script,
}

impl ElementKind {
    pub fn tag(&self) -> &'static str {
        match self {
            ElementKind::Style => "style",
            ElementKind::Script => "script",
        }
    }
}

/// A failed DOM mutation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DomError {
    #[error("document is unavailable")]
    Unavailable,
    #[error("failed to create <{tag}> element: {message}")]
    Create { tag: &'static str, message: String },
    #[error("failed to insert #{id}: {message}")]
    Insert { id: String, message: String },
}

/// DOM operations the agent needs.
pub trait Document {
    /// Create or replace the single `<head>` element with `id`.
    ///
    /// Inserting a script element runs it.
    fn upsert_head_element(&mut self, id: &str, kind: ElementKind, text: &str)
    -> Result<(), DomError>;

    /// Remove the element with `id`. Returns false if it was not present.
    fn remove_element(&mut self, id: &str) -> bool;

    fn add_body_class(&mut self, class: &str);

    fn remove_body_class(&mut self, class: &str);

    /// Fire an in-page event for local listeners.
    fn dispatch_event(&mut self, name: &str, detail: Value);

    /// Current page URL.
    fn location(&self) -> String;
}

/// A head element held by [`MemoryDocument`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryElement {
    pub kind: ElementKind,
    pub text: String,
}

/// In-memory [`Document`].
#[derive(Debug, Clone, Default)]
pub struct MemoryDocument {
    url: String,
    head: BTreeMap<String, MemoryElement>,
    body_classes: BTreeSet<String>,
    events: Vec<(String, Value)>,
    executed_scripts: Vec<String>,
    fail_next_insert: Option<(Option<String>, String)>,
}

impl MemoryDocument {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Make the next insertion fail with `message`.
    pub fn fail_next_insert(&mut self, message: impl Into<String>) {
        self.fail_next_insert = Some((None, message.into()));
    }

    /// Make the next insertion of `id` fail with `message`.
    pub fn fail_insert_of(&mut self, id: impl Into<String>, message: impl Into<String>) {
        self.fail_next_insert = Some((Some(id.into()), message.into()));
    }

    pub fn element(&self, id: &str) -> Option<&MemoryElement> {
        self.head.get(id)
    }

    /// Number of elements under `<head>`.
    pub fn head_len(&self) -> usize {
        self.head.len()
    }

    pub fn has_body_class(&self, class: &str) -> bool {
        self.body_classes.contains(class)
    }

    /// Events dispatched so far, oldest first.
    pub fn events(&self) -> &[(String, Value)] {
        &self.events
    }

    /// Script texts in the order they ran.
    pub fn executed_scripts(&self) -> &[String] {
        &self.executed_scripts
    }
}

impl Document for MemoryDocument {
    fn upsert_head_element(
        &mut self,
        id: &str,
        kind: ElementKind,
        text: &str,
    ) -> Result<(), DomError> {
        let fails = self
            .fail_next_insert
            .as_ref()
            .is_some_and(|(target, _)| target.as_deref().is_none_or(|target| target == id));
        if fails && let Some((_, message)) = self.fail_next_insert.take() {
            return Err(DomError::Insert {
                id: id.to_string(),
                message,
            });
        }
        self.head.insert(
            id.to_string(),
            MemoryElement {
                kind,
                text: text.to_string(),
            },
        );
        if kind == ElementKind::Script {
            self.executed_scripts.push(text.to_string());
        }
        Ok(())
    }

    fn remove_element(&mut self, id: &str) -> bool {
        self.head.remove(id).is_some()
    }

    fn add_body_class(&mut self, class: &str) {
        self.body_classes.insert(class.to_string());
    }

    fn remove_body_class(&mut self, class: &str) {
        self.body_classes.remove(class);
    }

    fn dispatch_event(&mut self, name: &str, detail: Value) {
        self.events.push((name.to_string(), detail));
    }

    fn location(&self) -> String {
        self.url.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_replaces_by_id() {
        let mut doc = MemoryDocument::new("https://crm.test/");
        doc.upsert_head_element("a", ElementKind::Style, "x").unwrap();
        doc.upsert_head_element("a", ElementKind::Style, "y").unwrap();
        assert_eq!(doc.head_len(), 1);
        assert_eq!(doc.element("a").unwrap().text, "y");
    }

    #[test]
    fn injected_failure_is_one_shot() {
        let mut doc = MemoryDocument::default();
        doc.fail_next_insert("quota exceeded");
        assert!(doc.upsert_head_element("a", ElementKind::Script, "1").is_err());
        assert!(doc.executed_scripts().is_empty());
        doc.upsert_head_element("a", ElementKind::Script, "1").unwrap();
        assert_eq!(doc.executed_scripts(), ["1".to_string()]);
    }
}
