pub mod orchestrator;
pub mod output;

pub use orchestrator::{ChangelogPipeline, PipelineOutcome, PipelineState};
pub use output::{write_atomic, write_stream};
