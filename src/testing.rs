//! Deterministic stand-ins for the endpoint and the repository.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use crate::error::{Error, Result};
use crate::git::{CommitOrder, CommitSource, RevisionRange};
use crate::llm::LLMProvider;
use crate::models::{CommitRecord, ModelRequest};

pub fn commit(n: usize, subject: &str) -> CommitRecord {
    CommitRecord {
        hash: format!("{:07x}{:033x}", 0xabc0000 + n, n),
        author: "Alice".to_string(),
        timestamp: Utc.timestamp_opt(1_706_745_600 + n as i64 * 3600, 0).unwrap(),
        subject: subject.to_string(),
        body: String::new(),
        files_changed: None,
    }
}

pub enum Scripted {
    Reply(String),
    Fail(Error),
    Slow(Duration, String),
    Hang,
}

/// Replies per batch index from a queue; an empty queue answers with an
/// entry per commit line of the prompt.
#[derive(Default)]
pub struct ScriptedProvider {
    scripts: Mutex<HashMap<usize, VecDeque<Scripted>>>,
    calls: AtomicUsize,
    healthy: bool,
    context_tokens: usize,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            healthy: true,
            context_tokens: 8_192,
            ..Default::default()
        }
    }

    pub fn unhealthy() -> Self {
        Self {
            healthy: false,
            ..Self::new()
        }
    }

    pub fn with_context_limit(mut self, context_tokens: usize) -> Self {
        self.context_tokens = context_tokens;
        self
    }

    pub fn script(self, batch_index: usize, steps: Vec<Scripted>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(batch_index, steps.into_iter().collect());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LLMProvider for ScriptedProvider {
    async fn generate(&self, request: &ModelRequest) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&request.batch_index)
            .and_then(VecDeque::pop_front);

        match step {
            Some(Scripted::Reply(text)) => Ok(text),
            Some(Scripted::Fail(err)) => Err(err),
            Some(Scripted::Slow(delay, text)) => {
                tokio::time::sleep(delay).await;
                Ok(text)
            }
            Some(Scripted::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(Error::Timeout(Duration::from_secs(3600)))
            }
            None => Ok(echo_entries(&request.prompt)),
        }
    }

    async fn health_check(&self) -> Result<()> {
        if self.healthy {
            Ok(())
        } else {
            Err(Error::EndpointUnavailable("connection refused".to_string()))
        }
    }

    fn max_context_tokens(&self) -> usize {
        self.context_tokens
    }

    fn name(&self) -> &str {
        "Scripted"
    }
}

/// Turns each `- [hash] type: subject` prompt line into `type: subject [hash]`.
fn echo_entries(prompt: &str) -> String {
    prompt
        .lines()
        .filter_map(|line| line.strip_prefix("- ["))
        .filter_map(|rest| rest.split_once("] "))
        .map(|(hash, subject)| format!("{} [{}]", subject, hash))
        .collect::<Vec<_>>()
        .join("\n")
}

pub struct InMemoryCommitSource {
    commits: Vec<CommitRecord>,
}

impl InMemoryCommitSource {
    /// `commits` oldest-first, as a linear history.
    pub fn new(commits: Vec<CommitRecord>) -> Self {
        Self { commits }
    }

    fn position(&self, rev: &str) -> Result<usize> {
        if rev == "HEAD" {
            return Ok(self.commits.len());
        }
        self.commits
            .iter()
            .position(|c| c.hash.starts_with(rev))
            .map(|i| i + 1)
            .ok_or_else(|| Error::RevisionNotFound(rev.to_string()))
    }
}

impl CommitSource for InMemoryCommitSource {
    fn read_range(&self, range: &RevisionRange) -> Result<Vec<CommitRecord>> {
        let end = self.position(&range.to)?;
        let start = match &range.from {
            Some(from) => self.position(from)?,
            None => 0,
        };
        let mut commits = self.commits[start.min(end)..end].to_vec();
        if range.order == CommitOrder::NewestFirst {
            commits.reverse();
        }
        Ok(commits)
    }
}
