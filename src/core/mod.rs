//! Core types and collaborator traits.
//!
//! The pipeline never talks to git or the issue tracker directly. It is
//! handed implementations of the traits below, which lets tests drive it
//! with in-memory data.

mod error;
pub mod progress;
#[cfg(test)]
pub(crate) mod testing;

pub use error::{Error, Result};

use crate::estimator::IssueDescriptor;
use crate::history::CommitDescriptor;
use crate::timeline::RawRelease;

/// Source of commit history.
pub trait VersionControl {
    /// Every commit of the repository, oldest first.
    fn commit_history(&self) -> Result<Vec<CommitDescriptor>>;
}

/// Source of file contents at a given commit.
///
/// Implementations must be usable from several threads at once.
pub trait ContentProvider: Send + Sync {
    /// Lines of `path` as of commit `sha`.
    fn file_content_at(&self, sha: &str, path: &str) -> Result<Vec<String>>;
}

/// Source of releases and resolved defects.
pub trait IssueTracker {
    /// Versions of `project`, in any order.
    fn releases(&self, project: &str) -> Result<Vec<RawRelease>>;

    /// Resolved, fixed defects of `project`.
    fn resolved_bug_issues(&self, project: &str) -> Result<Vec<IssueDescriptor>>;
}
