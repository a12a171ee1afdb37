pub mod source;
pub mod repository;

pub use source::{CommitOrder, CommitSource, RevisionRange};
pub use repository::GitCommitSource;
