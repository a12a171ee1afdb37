pub mod config;
pub mod error;
pub mod models;
pub mod git;
pub mod llm;
pub mod changelog;
pub mod pipeline;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{Config, PipelineConfig};
pub use error::{Error, Result};
pub use git::{CommitSource, GitCommitSource};
pub use llm::{InferenceClient, LLMProvider, OllamaProvider};
pub use changelog::{ChangelogAssembler, OutputFormat};
pub use pipeline::{ChangelogPipeline, PipelineOutcome};
