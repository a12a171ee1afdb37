use async_trait::async_trait;
use crate::error::Result;
use crate::models::ModelRequest;

#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Returns the raw generated text for one request.
    async fn generate(&self, request: &ModelRequest) -> Result<String>;
    async fn health_check(&self) -> Result<()>;
    /// Largest context window (prompt plus reply) the model accepts.
    fn max_context_tokens(&self) -> usize;
    fn name(&self) -> &str;
}
