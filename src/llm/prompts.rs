use crate::models::{Batch, CommitRecord, GenerationParams, ModelRequest};

pub const SYSTEM_PROMPT: &str = r#"You are a release notes writer turning git commits into changelog entries.

Respond with changelog entries only, one entry per line, in exactly this form:

<category>: <description> [<commit>, <commit>]

Rules:
- <category> is one of: breaking, feature, fix, chore, other.
- breaking: changes that require users to update their code or configuration.
- feature: new user-facing capabilities or improvements.
- fix: resolved bugs.
- chore: maintenance, refactoring, tests, documentation, build and CI changes.
- other: anything that fits none of the above.
- <description> is a single concise sentence written for users, without a trailing period.
- The bracketed list holds the short hashes of the commits the entry summarizes.
- Related commits may be collapsed into one entry that lists all their hashes.
- Do not add headings, summaries, blank lines, commentary or code fences."#;

/// Tokens reserved in the context window for the system prompt and framing.
pub const PROMPT_OVERHEAD_TOKENS: usize = 512;

pub(crate) const FILES_LABEL: &str = "  Files: ";

impl ModelRequest {
    /// The context window is sized from the rendered prompt, so it always
    /// holds the whole prompt plus the reply.
    pub fn from_batch(batch: &Batch, model: &str, temperature: f32, max_tokens: u32) -> Self {
        let mut request = Self {
            batch_index: batch.index,
            system: SYSTEM_PROMPT.to_string(),
            prompt: render_batch(batch),
            params: GenerationParams {
                model: model.to_string(),
                temperature,
                max_tokens,
                context_window: 0,
            },
        };
        request.params.context_window = batch_context_window(request.estimate_tokens(), max_tokens);
        request
    }

    /// Rough estimate: ~4 characters per token.
    pub fn estimate_tokens(&self) -> usize {
        (self.system.len() + self.prompt.len()) / 4
    }
}

/// Context size needed for a prompt of `prompt_tokens` plus the reply.
pub fn batch_context_window(prompt_tokens: usize, max_tokens: u32) -> usize {
    prompt_tokens + max_tokens as usize
}

pub fn render_batch(batch: &Batch) -> String {
    let mut prompt = format!(
        "Write changelog entries for the following {} commit(s):\n\n",
        batch.commits.len()
    );

    for commit in &batch.commits {
        prompt.push_str(&render_commit(commit));
    }

    prompt.push_str("\nEntries:\n");
    prompt
}

/// The block one commit occupies in the prompt.
pub fn render_commit(commit: &CommitRecord) -> String {
    let mut block = format!("- [{}] {}\n", commit.short_hash(), commit.subject);
    for line in commit.body.lines().filter(|l| !l.trim().is_empty()) {
        block.push_str(&format!("  {}\n", line.trim_end()));
    }
    if let Some(files) = commit.files_changed.as_ref().filter(|f| !f.is_empty()) {
        block.push_str(&format!("{}{}\n", FILES_LABEL, files.join(", ")));
    }
    block
}
