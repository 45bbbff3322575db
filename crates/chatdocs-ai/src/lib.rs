pub mod llm_factory;
pub mod llm_provider;
pub mod memory;
pub mod openai_compatible_provider;
pub mod orchestrator;
pub mod prompt;
pub mod session;
pub mod turn;

pub use llm_factory::LLMProviderFactory;
pub use llm_provider::{
    response_stream, GenerationConfig, LLMProvider, LLMResponse, Message, MessageRole,
    StreamEvent, TokenStream,
};
pub use memory::ConversationMemory;
pub use openai_compatible_provider::{OpenAICompatibleConfig, OpenAICompatibleProvider};
pub use orchestrator::{RAGOrchestrator, SyncOutcome};
pub use prompt::PromptBuilder;
pub use session::{Session, SessionState};
pub use turn::PendingTurn;
