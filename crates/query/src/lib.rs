pub mod fusion;
pub mod llm;
pub mod rag;
pub mod registry;
pub mod retrieval;
pub mod retry;

pub use fusion::{fuse, keyword_score};
pub use llm::{ChatMessage, ChatProvider, Completion, LlmError, OllamaChat, OpenAiCompatible, Usage};
pub use rag::{Answer, RagEngine, RagError, SUMMARY_LENGTH_RANGE, Source, Summary, format_context};
pub use registry::{CATALOGUE, CurrentProvider, ProviderInfo, ProviderRegistry, ProviderSpec, TestOutcome};
pub use retrieval::Retriever;
pub use retry::{RetryConfig, RetryPolicy};
