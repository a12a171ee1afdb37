use crate::llm::prompts::{render_commit, FILES_LABEL};
use crate::models::{Batch, CommitRecord};

/// Per-commit slack on top of the rendered size, for tokenizer variance.
const COMMIT_OVERHEAD_TOKENS: usize = 16;
const TRUNCATION_MARKER: &str = "\n... [truncated]";

pub struct CommitBatcher {
    max_tokens: usize,
}

impl CommitBatcher {
    pub fn new(max_tokens: usize) -> Self {
        Self { max_tokens }
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    /// Splits `commits` into contiguous batches whose estimate stays within
    /// the budget. Input order is preserved across and within batches.
    pub fn create_batches(&self, commits: Vec<CommitRecord>) -> Vec<Batch> {
        let mut batches = Vec::new();
        let mut current_batch = Vec::new();
        let mut current_tokens = 0;

        for commit in commits {
            let commit_tokens = estimate_commit_tokens(&commit);

            // A single commit over budget gets cut down and travels alone
            if commit_tokens > self.max_tokens {
                let truncated = self.truncate_commit(commit);
                if !current_batch.is_empty() {
                    push_batch(&mut batches, std::mem::take(&mut current_batch), current_tokens, false);
                    current_tokens = 0;
                }
                let tokens = estimate_commit_tokens(&truncated);
                tracing::debug!(
                    "Truncated commit {} from {} to {} tokens",
                    truncated.short_hash(),
                    commit_tokens,
                    tokens
                );
                push_batch(&mut batches, vec![truncated], tokens, true);
                continue;
            }

            if current_tokens + commit_tokens > self.max_tokens && !current_batch.is_empty() {
                push_batch(&mut batches, std::mem::take(&mut current_batch), current_tokens, false);
                current_tokens = 0;
            }

            current_tokens += commit_tokens;
            current_batch.push(commit);
        }

        if !current_batch.is_empty() {
            push_batch(&mut batches, current_batch, current_tokens, false);
        }

        batches
    }

    /// Keeps the subject, then as much of the body head and as many changed
    /// paths as the budget allows, measured on the rendered prompt block.
    fn truncate_commit(&self, mut commit: CommitRecord) -> CommitRecord {
        let files = commit.files_changed.take();
        commit.files_changed = files.as_ref().map(|_| Vec::new());
        let body = std::mem::take(&mut commit.body);

        while !self.fits(&commit) && !commit.subject.is_empty() {
            let keep = commit.subject.len().saturating_sub(self.excess_chars(&commit).max(1));
            commit.subject = head_within(&commit.subject, keep).to_string();
        }

        let mut keep = body.len();
        loop {
            commit.body = if keep >= body.len() {
                body.clone()
            } else if keep == 0 {
                String::new()
            } else {
                format!("{}{}", head_within(&body, keep), TRUNCATION_MARKER)
            };
            if keep == 0 || self.fits(&commit) {
                break;
            }
            let cut = self.excess_chars(&commit).max(1);
            keep = head_within(&body, keep.saturating_sub(cut)).len();
        }

        if let Some(files) = files {
            let mut rendered = render_commit(&commit).len();
            let mut kept = Vec::new();
            for file in files {
                let cost = if kept.is_empty() {
                    FILES_LABEL.len() + file.len() + 1
                } else {
                    file.len() + 2
                };
                if tokens_for(rendered + cost) > self.max_tokens {
                    break;
                }
                rendered += cost;
                kept.push(file);
            }
            commit.files_changed = Some(kept);
        }

        commit
    }

    fn fits(&self, commit: &CommitRecord) -> bool {
        estimate_commit_tokens(commit) <= self.max_tokens
    }

    fn excess_chars(&self, commit: &CommitRecord) -> usize {
        estimate_commit_tokens(commit).saturating_sub(self.max_tokens) * 4
    }
}

impl Default for CommitBatcher {
    fn default() -> Self {
        // Leaves room in an 8k window for instructions and the reply
        Self::new(6_000)
    }
}

/// Rough estimate of the tokens `commit` adds to a prompt: ~4 characters
/// per token of its rendered block.
pub fn estimate_commit_tokens(commit: &CommitRecord) -> usize {
    tokens_for(render_commit(commit).len())
}

fn tokens_for(rendered_chars: usize) -> usize {
    rendered_chars / 4 + COMMIT_OVERHEAD_TOKENS
}

fn push_batch(batches: &mut Vec<Batch>, commits: Vec<CommitRecord>, tokens: usize, truncated: bool) {
    batches.push(Batch {
        index: batches.len(),
        commits,
        estimated_tokens: tokens,
        truncated,
    });
}

/// Longest prefix of `s` no longer than `max_bytes`, cut on a char boundary.
fn head_within(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
