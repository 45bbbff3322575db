use crate::memory::ConversationMemory;
use chatdocs_vector::{BuildReport, BuiltIndex};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// No index built yet
    Idle,
    /// Index built, waiting for a question
    Ready,
    /// A turn is in flight
    Answering,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Ready => write!(f, "ready"),
            SessionState::Answering => write!(f, "answering"),
        }
    }
}

/// Everything one user interaction owns: the current index, its
/// conversation memory and the bookkeeping for in-flight turns.
///
/// The orchestrator mutates a session only through `&mut Session`, so two
/// operations on the same session never overlap.
#[derive(Debug)]
pub struct Session {
    id: Uuid,
    created_at: DateTime<Utc>,
    index: Option<BuiltIndex>,
    fingerprint: Option<String>,
    memory: ConversationMemory,
    state: SessionState,
    generation: u64,
    in_flight: Option<CancellationToken>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            index: None,
            fingerprint: None,
            memory: ConversationMemory::new(),
            state: SessionState::Idle,
            generation: 0,
            in_flight: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state != SessionState::Idle
    }

    /// Bumped by every index build and every started turn.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    pub fn index(&self) -> Option<&BuiltIndex> {
        self.index.as_ref()
    }

    pub fn build_report(&self) -> Option<&BuildReport> {
        self.index.as_ref().map(|built| &built.report)
    }

    /// Fingerprint of the document set behind the current index.
    pub fn fingerprint(&self) -> Option<&str> {
        self.fingerprint.as_deref()
    }

    pub fn clear_memory(&mut self) {
        self.memory.clear();
    }

    /// Cancel the in-flight turn, if any. Its completion will be rejected.
    pub fn cancel_pending(&mut self) -> bool {
        match self.in_flight.take() {
            Some(token) => {
                token.cancel();
                if self.state == SessionState::Answering {
                    self.state = SessionState::Ready;
                }
                debug!("Cancelled turn {} of session {}", self.generation, self.id);
                true
            }
            None => false,
        }
    }

    pub(crate) fn install_index(&mut self, built: BuiltIndex, fingerprint: String) {
        self.cancel_pending();
        self.generation += 1;
        self.index = Some(built);
        self.fingerprint = Some(fingerprint);
        self.state = SessionState::Ready;
    }

    pub(crate) fn start_turn(&mut self) -> (u64, CancellationToken) {
        self.cancel_pending();
        self.generation += 1;
        let token = CancellationToken::new();
        self.in_flight = Some(token.clone());
        self.state = SessionState::Answering;
        (self.generation, token)
    }

    /// Return to `Ready` if `generation` is still the current turn.
    pub(crate) fn settle(&mut self, generation: u64) {
        if generation == self.generation && self.state == SessionState::Answering {
            self.state = SessionState::Ready;
            self.in_flight = None;
        }
    }

    pub(crate) fn memory_mut(&mut self) -> &mut ConversationMemory {
        &mut self.memory
    }
}
