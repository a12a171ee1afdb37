use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::changelog::Category;

/// Conventional-commit types recognised in subject prefixes.
const CONVENTIONAL_TYPES: &[&str] = &[
    "feat", "fix", "perf", "docs", "refactor", "chore", "test", "style", "build", "ci",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
    pub hash: String,
    pub author: String,
    pub timestamp: DateTime<Utc>,
    pub subject: String,
    pub body: String,
    pub files_changed: Option<Vec<String>>,
}

impl CommitRecord {
    pub fn short_hash(&self) -> &str {
        short_hash(&self.hash)
    }

    /// The conventional-commit type of the subject, or `"other"`.
    pub fn conventional_prefix(&self) -> &'static str {
        conventional_prefix(&self.subject)
    }

    pub fn is_breaking(&self) -> bool {
        let head = self.subject.split(':').next().unwrap_or("");
        (self.subject.contains(':') && head.ends_with('!'))
            || self.body.contains("BREAKING CHANGE")
            || self.body.contains("BREAKING-CHANGE")
    }

    /// Category derived purely from the subject prefix, used when no model
    /// output is available.
    pub fn heuristic_category(&self) -> Category {
        if self.is_breaking() {
            return Category::Breaking;
        }
        Category::from_label(self.conventional_prefix()).unwrap_or(Category::Other)
    }

    /// Subject with any `type(scope):` prefix removed.
    pub fn clean_subject(&self) -> &str {
        match self.subject.find(':') {
            Some(idx) => {
                let cleaned = self.subject[idx + 1..].trim();
                if cleaned.is_empty() {
                    &self.subject
                } else {
                    cleaned
                }
            }
            None => &self.subject,
        }
    }
}

pub fn short_hash(hash: &str) -> &str {
    match hash.char_indices().nth(7) {
        Some((idx, _)) => &hash[..idx],
        None => hash,
    }
}

pub fn conventional_prefix(subject: &str) -> &'static str {
    let Some(colon) = subject.find(':') else {
        return "other";
    };
    let head = &subject[..colon];
    let head = head.strip_suffix('!').unwrap_or(head);
    let kind = match head.find('(') {
        Some(paren) if head.ends_with(')') => &head[..paren],
        Some(_) => return "other",
        None => head,
    };

    CONVENTIONAL_TYPES
        .iter()
        .find(|t| **t == kind)
        .copied()
        .unwrap_or("other")
}
