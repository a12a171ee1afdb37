use std::collections::HashMap;

use crate::llm::parse_llm_response;
use crate::models::{
    Category, ChangelogDocument, ChangelogEntry, ChangelogSection, CommitRecord, ModelResponse,
};

/// Merges per-batch model output into one ordered, deduplicated document.
#[derive(Debug, Clone, Default)]
pub struct ChangelogAssembler {
    release: Option<String>,
}

impl ChangelogAssembler {
    pub fn new(release: Option<String>) -> Self {
        Self { release }
    }

    /// Never fails: failed batches are recorded and skipped, unparseable
    /// lines are logged and skipped.
    pub fn assemble(&self, responses: &[ModelResponse], truncated_batches: &[usize]) -> ChangelogDocument {
        let mut ordered: Vec<&ModelResponse> = responses.iter().collect();
        ordered.sort_by_key(|r| r.batch_index);

        let mut entries = Vec::new();
        let mut failed_batches = Vec::new();

        for response in ordered {
            if let Some(failure) = response.failure_details() {
                failed_batches.push(failure.clone());
                continue;
            }
            let Some(text) = response.text() else {
                continue;
            };

            let parsed = parse_llm_response(text, response.batch_index);
            for warning in &parsed.warnings {
                tracing::warn!("Skipping unparseable model output, {}", warning);
            }
            entries.extend(parsed.entries);
        }

        let mut truncated_batches = truncated_batches.to_vec();
        truncated_batches.sort_unstable();
        truncated_batches.dedup();

        ChangelogDocument {
            release: self.release.clone(),
            sections: group_entries(entries),
            truncated_batches,
            failed_batches,
        }
    }

    /// Builds a document straight from conventional-commit subjects, without
    /// any model involvement.
    pub fn assemble_from_commits(&self, commits: &[CommitRecord]) -> ChangelogDocument {
        let entries = commits
            .iter()
            .enumerate()
            .filter_map(|(i, commit)| {
                ChangelogEntry::new(
                    commit.heuristic_category(),
                    commit.clean_subject(),
                    vec![commit.short_hash().to_string()],
                    (0, i),
                )
            })
            .collect();

        ChangelogDocument {
            release: self.release.clone(),
            sections: group_entries(entries),
            ..Default::default()
        }
    }
}

/// Drops case-insensitive duplicates (folding their commit refs into the
/// first occurrence) and groups by category in display order.
fn group_entries(entries: Vec<ChangelogEntry>) -> Vec<ChangelogSection> {
    let mut unique: Vec<ChangelogEntry> = Vec::new();
    let mut seen: HashMap<String, usize> = HashMap::new();

    for entry in entries {
        match seen.get(&entry.dedup_key()) {
            Some(&idx) => {
                let kept = &mut unique[idx];
                for commit in entry.commits {
                    if !kept.commits.contains(&commit) {
                        kept.commits.push(commit);
                    }
                }
            }
            None => {
                seen.insert(entry.dedup_key(), unique.len());
                unique.push(entry);
            }
        }
    }

    Category::ALL
        .iter()
        .filter_map(|category| {
            let mut section: Vec<ChangelogEntry> = unique
                .iter()
                .filter(|e| e.category == *category)
                .cloned()
                .collect();
            section.sort_by_key(|e| e.position);
            (!section.is_empty()).then(|| ChangelogSection {
                category: *category,
                entries: section,
            })
        })
        .collect()
}
