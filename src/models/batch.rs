use serde::{Deserialize, Serialize};

use super::changelog::BatchFailure;
use super::commit::CommitRecord;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    pub index: usize,
    pub commits: Vec<CommitRecord>,
    pub estimated_tokens: usize,
    /// Set when a commit had to be cut down to fit the budget.
    pub truncated: bool,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.commits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commits.is_empty()
    }
}

/// Parameters sent alongside a prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub context_window: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRequest {
    pub batch_index: usize,
    pub system: String,
    pub prompt: String,
    pub params: GenerationParams,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelOutcome {
    Generated(String),
    Failed(BatchFailure),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelResponse {
    pub batch_index: usize,
    pub attempts: u32,
    pub outcome: ModelOutcome,
}

impl ModelResponse {
    pub fn success(batch_index: usize, attempts: u32, text: String) -> Self {
        Self {
            batch_index,
            attempts,
            outcome: ModelOutcome::Generated(text),
        }
    }

    pub fn failure(batch_index: usize, attempts: u32, reason: impl Into<String>) -> Self {
        Self {
            batch_index,
            attempts,
            outcome: ModelOutcome::Failed(BatchFailure {
                batch_index,
                attempts,
                reason: reason.into(),
            }),
        }
    }

    pub fn text(&self) -> Option<&str> {
        match &self.outcome {
            ModelOutcome::Generated(text) => Some(text),
            ModelOutcome::Failed(_) => None,
        }
    }

    pub fn failure_details(&self) -> Option<&BatchFailure> {
        match &self.outcome {
            ModelOutcome::Generated(_) => None,
            ModelOutcome::Failed(failure) => Some(failure),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ModelOutcome::Generated(_))
    }
}
