use crate::llm_provider::Message;
use crate::memory::ConversationMemory;
use chatdocs_core::{RetrievalConfig, Role, Turn};
use chatdocs_vector::RetrievedChunk;
use std::fmt::Write;

const CONDENSE_INSTRUCTION: &str = "Given the following conversation and a follow up question, \
rephrase the follow up question to be a standalone question, in its original language.";

/// Assembles chat messages from retrieved context and conversation history.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    system_prompt: String,
    history_window: Option<usize>,
}

impl PromptBuilder {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            history_window: None,
        }
    }

    pub fn from_config(config: &RetrievalConfig) -> Self {
        Self {
            system_prompt: config.system_prompt.clone(),
            history_window: config.history_window,
        }
    }

    /// Render at most `turns` of the most recent history.
    pub fn history_window(mut self, turns: Option<usize>) -> Self {
        self.history_window = turns;
        self
    }

    /// System instruction with numbered context, then history, then the question.
    pub fn build(
        &self,
        question: &str,
        context: &[RetrievedChunk],
        memory: &ConversationMemory,
    ) -> Vec<Message> {
        let history = self.visible_history(memory);
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(Message::system(self.system_message(context)));
        messages.extend(history.iter().map(turn_message));
        messages.push(Message::user(question));
        messages
    }

    /// Single-message prompt asking the model to make `question` self-contained.
    pub fn condense(&self, question: &str, memory: &ConversationMemory) -> Vec<Message> {
        let mut prompt = String::from(CONDENSE_INSTRUCTION);
        prompt.push_str("\n\nChat History:\n");
        for turn in self.visible_history(memory) {
            let speaker = match turn.role {
                Role::User => "Human",
                Role::Assistant => "Assistant",
            };
            let _ = writeln!(prompt, "{}: {}", speaker, turn.text);
        }
        let _ = write!(prompt, "Follow Up Input: {}\nStandalone question:", question);
        vec![Message::user(prompt)]
    }

    fn visible_history<'m>(&self, memory: &'m ConversationMemory) -> &'m [Turn] {
        match self.history_window {
            Some(n) => memory.recent(n),
            None => memory.history(),
        }
    }

    fn system_message(&self, context: &[RetrievedChunk]) -> String {
        let mut out = self.system_prompt.trim_end().to_string();
        out.push_str("\n\nContext:\n");
        if context.is_empty() {
            out.push_str("(no relevant passages were found)");
        }
        for (rank, hit) in context.iter().enumerate() {
            if rank > 0 {
                out.push_str("\n\n");
            }
            let _ = write!(out, "[{}] {}", rank + 1, hit.chunk.text.trim());
        }
        out
    }
}

fn turn_message(turn: &Turn) -> Message {
    match turn.role {
        Role::User => Message::user(turn.text.clone()),
        Role::Assistant => Message::assistant(turn.text.clone()),
    }
}
