use chatdocs_core::{Role, Turn};
use serde::{Deserialize, Serialize};

/// Append-only turn log for one session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationMemory {
    turns: Vec<Turn>,
}

impl ConversationMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    /// Oldest first.
    pub fn history(&self) -> &[Turn] {
        &self.turns
    }

    /// The last `n` turns, oldest first.
    pub fn recent(&self, n: usize) -> &[Turn] {
        let start = self.turns.len().saturating_sub(n);
        &self.turns[start..]
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Number of completed user/assistant exchanges.
    pub fn exchanges(&self) -> usize {
        self.turns.iter().filter(|t| t.role == Role::Assistant).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_keeps_append_order() {
        let mut memory = ConversationMemory::new();
        memory.append(Turn::user("q1"));
        memory.append(Turn::assistant("a1"));
        memory.append(Turn::user("q2"));

        let texts: Vec<_> = memory.history().iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, ["q1", "a1", "q2"]);
        assert_eq!(memory.exchanges(), 1);
    }

    #[test]
    fn recent_returns_tail() {
        let mut memory = ConversationMemory::new();
        for i in 0..5 {
            memory.append(Turn::user(format!("q{}", i)));
        }
        let tail: Vec<_> = memory.recent(2).iter().map(|t| t.text.as_str()).collect();
        assert_eq!(tail, ["q3", "q4"]);
        assert_eq!(memory.recent(10).len(), 5);
        assert!(memory.recent(0).is_empty());
    }

    #[test]
    fn clear_empties_memory() {
        let mut memory = ConversationMemory::new();
        memory.append(Turn::user("q"));
        memory.clear();
        assert!(memory.is_empty());
        assert_eq!(memory.len(), 0);
    }
}
