//! Chat history and the chat input box
//!
//! Lines travel as `SendChat` (input authority to state authority), get
//! prefixed with the sender's display name by the host, and come back to
//! every replica as `ReceiveChat`.

use std::collections::VecDeque;

use crate::game::input::FocusGate;
use crate::game::rpc::RpcCall;

/// Lines kept in the visible history
pub const CHAT_HISTORY_LEN: usize = 20;

/// Longest accepted chat line, in characters
pub const CHAT_MAX_CHARS: usize = 200;

/// Trim and cap an outgoing line. `None` for empty or whitespace-only text.
pub fn clean_line(text: &str) -> Option<String> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    Some(text.chars().take(CHAT_MAX_CHARS).collect())
}

/// Line as stamped by the state authority
pub fn format_line(sender_name: &str, text: &str) -> String {
    format!("{sender_name}: {text}")
}

/// Bounded, ordered chat history
#[derive(Debug, Clone)]
pub struct ChatHistory {
    lines: VecDeque<String>,
    capacity: usize,
}

impl Default for ChatHistory {
    fn default() -> Self {
        Self::with_capacity(CHAT_HISTORY_LEN)
    }
}

impl ChatHistory {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Append a line, evicting the oldest when full
    pub fn push(&mut self, line: impl Into<String>) {
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line.into());
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Oldest first
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    /// Joined for display, oldest first
    pub fn render(&self) -> String {
        self.lines().collect::<Vec<_>>().join("\n")
    }
}

/// Chat window state: open/closed, draft text and history
#[derive(Debug, Default)]
pub struct ChatBox {
    open: bool,
    draft: String,
    history: ChatHistory,
}

impl ChatBox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn history(&self) -> &ChatHistory {
        &self.history
    }

    /// Typed text; ignored while the box is closed
    pub fn type_text(&mut self, text: &str) {
        if self.open {
            self.draft.push_str(text);
        }
    }

    /// Enter key: opens a closed box, or closes an open one and returns the
    /// call to send if the draft held anything.
    pub fn press_enter(&mut self) -> Option<RpcCall> {
        if !self.open {
            self.open = true;
            return None;
        }

        self.open = false;
        let draft = std::mem::take(&mut self.draft);
        clean_line(&draft).map(|text| RpcCall::SendChat { text })
    }

    /// Escape: close and discard the draft
    pub fn cancel(&mut self) {
        self.open = false;
        self.draft.clear();
    }

    /// `ReceiveChat` delivery
    pub fn receive(&mut self, line: impl Into<String>) {
        self.history.push(line);
    }
}

impl FocusGate for ChatBox {
    fn is_input_focused(&self) -> bool {
        self.open
    }
}
