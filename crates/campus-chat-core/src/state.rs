//! UI-agnostic session state types
//!
//! This module contains data structures that are shared between the terminal
//! front-end and the HTML renderer and don't depend on any UI framework.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::scroll::ScrollTracker;

/// Shown in place of an answer when a request fails for any reason.
pub const ERROR_TEXT: &str = "Error: Could not get a response. Please try again.";

/// The role of a chat message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

/// A rendered chat message. Never mutated after it is pushed to the list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: ChatRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<String>>,
    #[serde(default)]
    pub is_follow_up: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follow_up_id: Option<String>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
            sources: None,
            is_follow_up: false,
            follow_up_id: None,
        }
    }

    pub fn assistant(content: impl Into<String>, sources: Option<Vec<String>>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
            sources,
            is_follow_up: false,
            follow_up_id: None,
        }
    }

    /// A server-suggested next question.
    pub fn follow_up(content: impl Into<String>, follow_up_id: Option<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
            sources: None,
            is_follow_up: true,
            follow_up_id,
        }
    }

    /// Styling class; follow-ups take precedence over the role.
    pub fn css_class(&self) -> &'static str {
        if self.is_follow_up {
            "follow-up-message"
        } else {
            match self.role {
                ChatRole::User => "user-message",
                ChatRole::Assistant => "assistant-message",
            }
        }
    }

    /// Sources that get a numbered list under the message. Follow-ups never list any.
    pub fn listed_sources(&self) -> &[String] {
        match &self.sources {
            Some(sources) if !self.is_follow_up => sources,
            _ => &[],
        }
    }
}

/// Identifies one outgoing request and its loading placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "loading-{}", self.0)
    }
}

/// One row of the message list
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    Message(Message),
    /// Transient "Thinking" row shown while `RequestId` is in flight
    Loading(RequestId),
    /// The fixed [`ERROR_TEXT`] row
    Error,
}

impl Entry {
    pub fn as_message(&self) -> Option<&Message> {
        match self {
            Entry::Message(message) => Some(message),
            _ => None,
        }
    }
}

/// A follow-up id waiting to be echoed back on the next send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingFollowUp {
    pub id: String,
    pub original_question: Option<String>,
}

/// Which panel is showing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum View {
    #[default]
    Welcome,
    Conversation,
}

/// Ephemeral per-session state, reset by the welcome screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub follow_up: Option<PendingFollowUp>,
    pub scroll: ScrollTracker,
}

impl SessionState {
    pub fn new(near_bottom_threshold: u32) -> Self {
        Self {
            follow_up: None,
            scroll: ScrollTracker::new(near_bottom_threshold),
        }
    }

    pub fn current_follow_up_id(&self) -> Option<&str> {
        self.follow_up.as_ref().map(|f| f.id.as_str())
    }

    pub fn user_has_scrolled_away(&self) -> bool {
        self.scroll.user_has_scrolled_away()
    }

    pub fn reset(&mut self) {
        self.follow_up = None;
        self.scroll.reset();
    }
}
