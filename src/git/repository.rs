use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{TimeZone, Utc};
use git2::{Commit, Oid, Repository, Sort};

use crate::error::{Error, Result};
use crate::git::source::{CommitOrder, CommitSource, RevisionRange};
use crate::models::CommitRecord;

/// Reads history from an on-disk repository through libgit2.
pub struct GitCommitSource {
    path: PathBuf,
}

impl GitCommitSource {
    /// The repository is opened on each read, searching parent
    /// directories of `path` like `git` does.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn discover(path: &Path) -> Result<Repository> {
        Repository::discover(path)
            .map_err(|e| Error::Repository(format!("{}: {}", path.display(), e.message())))
    }

    fn resolve(repo: &Repository, rev: &str) -> Result<Oid> {
        repo.revparse_single(rev)
            .and_then(|object| object.peel_to_commit())
            .map(|commit| commit.id())
            .map_err(|_| Error::RevisionNotFound(rev.to_string()))
    }

    fn to_record(repo: &Repository, commit: &Commit<'_>) -> Result<CommitRecord> {
        let author = commit.author();
        let timestamp = Utc
            .timestamp_opt(commit.time().seconds(), 0)
            .single()
            .unwrap_or_default();

        let message = String::from_utf8_lossy(commit.message_bytes());
        let (subject, body) = split_message(&message);

        Ok(CommitRecord {
            hash: commit.id().to_string(),
            author: String::from_utf8_lossy(author.name_bytes()).into_owned(),
            timestamp,
            subject,
            body,
            files_changed: Some(Self::changed_paths(repo, commit)?),
        })
    }

    fn changed_paths(repo: &Repository, commit: &Commit<'_>) -> Result<Vec<String>> {
        let tree = commit.tree()?;
        let parent_tree = if commit.parent_count() > 0 {
            Some(commit.parent(0)?.tree()?)
        } else {
            None
        };
        let diff = repo.diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), None)?;

        Ok(diff
            .deltas()
            .filter_map(|delta| {
                delta
                    .new_file()
                    .path()
                    .or_else(|| delta.old_file().path())
                    .map(|p| p.to_string_lossy().into_owned())
            })
            .collect())
    }
}

impl CommitSource for GitCommitSource {
    fn read_range(&self, range: &RevisionRange) -> Result<Vec<CommitRecord>> {
        let repo = Self::discover(&self.path)?;
        let to = Self::resolve(&repo, &range.to)?;
        let from = range
            .from
            .as_deref()
            .map(|rev| Self::resolve(&repo, rev))
            .transpose()?;

        let mut revwalk = repo.revwalk()?;
        let sorting = match range.order {
            CommitOrder::OldestFirst => Sort::TOPOLOGICAL | Sort::TIME | Sort::REVERSE,
            CommitOrder::NewestFirst => Sort::TOPOLOGICAL | Sort::TIME,
        };
        revwalk.set_sorting(sorting)?;
        revwalk.push(to)?;
        if let Some(from) = from {
            revwalk.hide(from)?;
        }

        let mut seen = HashSet::new();
        let mut records = Vec::new();
        for oid in revwalk {
            let oid = oid?;
            if !seen.insert(oid) {
                continue;
            }
            let commit = repo.find_commit(oid)?;
            records.push(Self::to_record(&repo, &commit)?);
        }

        tracing::debug!("Read {} commits in range {}", records.len(), range);
        Ok(records)
    }
}

/// Subject is the first paragraph folded onto one line; the rest is the body.
fn split_message(message: &str) -> (String, String) {
    let message = message.trim_start();
    let (head, body) = match message.find("\n\n") {
        Some(idx) => (&message[..idx], &message[idx + 2..]),
        None => (message, ""),
    };
    let subject = head
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    (subject, body.trim().to_string())
}
