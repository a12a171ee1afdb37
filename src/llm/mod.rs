pub mod provider;
pub mod ollama;
pub mod client;
pub mod prompts;
pub mod parser;
pub mod batcher;

pub use provider::LLMProvider;
pub use ollama::OllamaProvider;
pub use client::{InferenceClient, RetryPolicy};
pub use parser::{parse_llm_response, ParseWarning, ParsedResponse};
pub use batcher::CommitBatcher;
