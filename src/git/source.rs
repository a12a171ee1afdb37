use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::CommitRecord;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommitOrder {
    #[default]
    OldestFirst,
    NewestFirst,
}

/// Commits reachable from `to` but not from `from`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionRange {
    pub from: Option<String>,
    pub to: String,
    pub order: CommitOrder,
}

impl RevisionRange {
    pub fn new(from: Option<String>, to: impl Into<String>) -> Self {
        Self {
            from,
            to: to.into(),
            order: CommitOrder::default(),
        }
    }

    pub fn with_order(mut self, order: CommitOrder) -> Self {
        self.order = order;
        self
    }
}

impl std::fmt::Display for RevisionRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.from {
            Some(from) => write!(f, "{}..{}", from, self.to),
            None => write!(f, "{}", self.to),
        }
    }
}

pub trait CommitSource: Send + Sync {
    fn read_range(&self, range: &RevisionRange) -> Result<Vec<CommitRecord>>;
}
