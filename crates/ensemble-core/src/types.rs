//! Shared types for ensemble-core

use serde::{Deserialize, Serialize};

/// Who authored a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

/// One entry of an agent's conversation history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Extra key/value context rendered ahead of a task, in insertion order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskContext {
    entries: Vec<(String, String)>,
}

impl TaskContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry; a repeated key replaces the earlier value in place
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// `key: value` lines joined with newlines
    pub fn render(&self) -> String {
        self.iter()
            .map(|(k, v)| format!("{}: {}", k, v))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_display_and_serde() {
        assert_eq!(Role::User.to_string(), "user");
        assert_eq!(Role::Assistant.to_string(), "assistant");
        assert_eq!(serde_json::to_string(&Role::Assistant).unwrap(), "\"assistant\"");
    }

    #[test]
    fn test_turn_constructors() {
        let turn = ConversationTurn::user("hi");
        assert_eq!(turn.role, Role::User);
        assert_eq!(turn.content, "hi");
        assert_eq!(ConversationTurn::assistant("yo").role, Role::Assistant);
    }

    #[test]
    fn test_context_render_keeps_order() {
        let ctx = TaskContext::new()
            .with("language", "rust")
            .with("audience", "beginners");
        assert_eq!(ctx.render(), "language: rust\naudience: beginners");
    }

    #[test]
    fn test_context_repeated_key_replaces() {
        let ctx = TaskContext::new().with("a", "1").with("b", "2").with("a", "3");
        assert_eq!(ctx.render(), "a: 3\nb: 2");
        assert!(!ctx.is_empty());
        assert!(TaskContext::new().is_empty());
    }
}
