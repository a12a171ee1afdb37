use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Breaking,
    Feature,
    Fix,
    Chore,
    Other,
}

impl Category {
    /// Display order of sections in a changelog.
    pub const ALL: [Category; 5] = [
        Category::Breaking,
        Category::Feature,
        Category::Fix,
        Category::Chore,
        Category::Other,
    ];

    /// Resolves a category token as written by a model or a commit prefix.
    pub fn from_label(label: &str) -> Option<Self> {
        let normalized = label.trim().to_lowercase();
        let category = match normalized.as_str() {
            "breaking" | "breaking change" | "breaking changes" | "break" => Category::Breaking,
            "feature" | "features" | "feat" | "added" | "add" | "perf" | "performance" => {
                Category::Feature
            }
            "fix" | "fixes" | "bugfix" | "bug fix" | "bug fixes" | "bug" => Category::Fix,
            "chore" | "chores" | "docs" | "doc" | "refactor" | "test" | "tests" | "style"
            | "build" | "ci" | "maintenance" => Category::Chore,
            "other" | "others" | "misc" => Category::Other,
            _ => return None,
        };
        Some(category)
    }

    pub fn title(&self) -> &'static str {
        match self {
            Category::Breaking => "Breaking Changes",
            Category::Feature => "Features",
            Category::Fix => "Bug Fixes",
            Category::Chore => "Chores",
            Category::Other => "Other",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Category::Breaking => write!(f, "breaking"),
            Category::Feature => write!(f, "feature"),
            Category::Fix => write!(f, "fix"),
            Category::Chore => write!(f, "chore"),
            Category::Other => write!(f, "other"),
        }
    }
}

/// Where an entry came from: batch index, then line within the response.
pub type EntryPosition = (usize, usize);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangelogEntry {
    pub category: Category,
    pub description: String,
    pub commits: Vec<String>,
    pub position: EntryPosition,
}

impl ChangelogEntry {
    /// Returns `None` for a blank description.
    pub fn new(
        category: Category,
        description: &str,
        commits: Vec<String>,
        position: EntryPosition,
    ) -> Option<Self> {
        let description = description.trim();
        if description.is_empty() {
            return None;
        }
        Some(Self {
            category,
            description: description.to_string(),
            commits,
            position,
        })
    }

    /// Key used for duplicate detection.
    pub fn dedup_key(&self) -> String {
        self.description.trim().to_lowercase()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchFailure {
    pub batch_index: usize,
    pub attempts: u32,
    pub reason: String,
}

impl std::fmt::Display for BatchFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "batch {} failed after {} attempt(s): {}",
            self.batch_index + 1,
            self.attempts,
            self.reason
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangelogSection {
    pub category: Category,
    pub entries: Vec<ChangelogEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangelogDocument {
    pub release: Option<String>,
    pub sections: Vec<ChangelogSection>,
    pub truncated_batches: Vec<usize>,
    pub failed_batches: Vec<BatchFailure>,
}

impl ChangelogDocument {
    pub fn empty(release: Option<String>) -> Self {
        Self {
            release,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sections.iter().all(|s| s.entries.is_empty())
    }

    pub fn entry_count(&self) -> usize {
        self.sections.iter().map(|s| s.entries.len()).sum()
    }

    pub fn entries(&self) -> impl Iterator<Item = &ChangelogEntry> {
        self.sections.iter().flat_map(|s| s.entries.iter())
    }
}
