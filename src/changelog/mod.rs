pub mod assembler;
pub mod render;

pub use assembler::ChangelogAssembler;
pub use render::{MarkdownRenderer, OutputFormat, PlainTextRenderer, Renderer};
