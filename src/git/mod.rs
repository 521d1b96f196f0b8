//! Git-backed version-control collaborator.

mod content;
mod log;

use std::path::{Path, PathBuf};

use gix::ThreadSafeRepository;

use crate::core::{ContentProvider, Error, Result, VersionControl};
use crate::history::CommitDescriptor;

pub use log::{expand_rename_path, parse_log};

/// Git repository wrapper for history mining.
pub struct GitRepo {
    /// Shared gix repository handle.
    repo: ThreadSafeRepository,
    /// Repository root path.
    root: PathBuf,
}

impl GitRepo {
    /// Open a git repository at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let repo =
            gix::open(path).map_err(|e| Error::git(format!("Failed to open repository: {e}")))?;
        let root = repo
            .work_dir()
            .ok_or_else(|| Error::git("Not a work tree"))?
            .to_path_buf();

        Ok(Self {
            repo: repo.into_sync(),
            root,
        })
    }
}

impl VersionControl for GitRepo {
    fn commit_history(&self) -> Result<Vec<CommitDescriptor>> {
        log::commit_history(&self.root)
    }
}

impl ContentProvider for GitRepo {
    fn file_content_at(&self, sha: &str, path: &str) -> Result<Vec<String>> {
        content::read_lines(&self.repo, sha, path)
    }
}
