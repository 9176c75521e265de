use crate::models::{HistoryEntry, MemoryEntry, Role};
use std::collections::VecDeque;

/// Fixed number of exchanges kept as short-term context.
pub const MEMORY_CAPACITY: usize = 2;

pub const PREVIEW_CHARS: usize = 80;

#[derive(Debug, Clone, Default)]
pub struct ConversationMemory {
    entries: VecDeque<MemoryEntry>,
}

impl ConversationMemory {
    pub fn append(&mut self, question: impl Into<String>, answer: impl Into<String>) {
        self.entries.push_back(MemoryEntry {
            question: question.into(),
            answer: answer.into(),
        });
        while self.entries.len() > MEMORY_CAPACITY {
            self.entries.pop_front();
        }
    }

    /// The last `n` exchanges (at most the capacity), oldest first.
    pub fn recent(&self, n: usize) -> Vec<MemoryEntry> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// State for one conversation: the full display transcript plus the
/// bounded memory fed back into prompts.
#[derive(Debug, Clone, Default)]
pub struct Session {
    history: Vec<HistoryEntry>,
    memory: ConversationMemory,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_exchange(&mut self, question: &str, response: &str) {
        self.history.push(HistoryEntry {
            role: Role::You,
            message: question.to_string(),
        });
        self.history.push(HistoryEntry {
            role: Role::Bot,
            message: response.to_string(),
        });
        self.memory.append(question, response);
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    /// Empties the transcript. Memory is left alone.
    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// `Role: message` lines with each message cut to `width` characters.
    pub fn previews(&self, width: usize) -> Vec<String> {
        self.history
            .iter()
            .map(|entry| {
                let preview = truncate_preview(&entry.message, width);
                format!("{}: {preview}", entry.role.label())
            })
            .collect()
    }
}

pub fn truncate_preview(message: &str, width: usize) -> String {
    if message.chars().count() > width {
        let head: String = message.chars().take(width).collect();
        format!("{head}...")
    } else {
        message.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_keeps_only_the_last_two_oldest_first() {
        let mut memory = ConversationMemory::default();
        for index in 1..=5 {
            memory.append(format!("q{index}"), format!("a{index}"));
        }

        let recent = memory.recent(MEMORY_CAPACITY);
        assert_eq!(memory.len(), 2);
        assert_eq!(recent[0].question, "q4");
        assert_eq!(recent[1].question, "q5");
    }

    #[test]
    fn recent_never_exceeds_capacity() {
        let mut memory = ConversationMemory::default();
        memory.append("q1", "a1");
        memory.append("q2", "a2");
        memory.append("q3", "a3");

        assert_eq!(memory.recent(10).len(), 2);
        assert_eq!(memory.recent(1)[0].answer, "a3");
        assert!(memory.recent(0).is_empty());
    }

    #[test]
    fn clearing_history_keeps_memory() {
        let mut session = Session::new();
        session.record_exchange("Where is the VPN guide?", "On the intranet.");
        session.clear_history();

        assert!(session.history().is_empty());
        assert_eq!(session.memory().len(), 1);
    }

    #[test]
    fn history_is_unbounded_and_ordered() {
        let mut session = Session::new();
        for index in 0..4 {
            session.record_exchange(&format!("q{index}"), &format!("a{index}"));
        }

        assert_eq!(session.history().len(), 8);
        assert_eq!(session.history()[0].role, Role::You);
        assert_eq!(session.history()[7].message, "a3");
    }

    #[test]
    fn previews_truncate_long_messages() {
        let mut session = Session::new();
        session.record_exchange("short", &"z".repeat(100));

        let previews = session.previews(PREVIEW_CHARS);
        assert_eq!(previews[0], "You: short");
        assert_eq!(previews[1], format!("Bot: {}...", "z".repeat(80)));
    }
}
