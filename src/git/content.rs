//! Historical file contents read straight from git's object store.

use gix::ThreadSafeRepository;

use crate::core::{Error, Result};

/// Lines of `path` in the tree of commit `sha`.
///
/// Invalid UTF-8 is replaced rather than rejected.
pub fn read_lines(repo: &ThreadSafeRepository, sha: &str, path: &str) -> Result<Vec<String>> {
    let repo = repo.to_thread_local();

    let commit_id = repo
        .rev_parse_single(sha.as_bytes())
        .map_err(|e| Error::git(format!("Failed to parse commit {sha}: {e}")))?
        .detach();

    let commit = repo
        .find_object(commit_id)
        .map_err(|e| Error::git(format!("Failed to find commit: {e}")))?
        .try_into_commit()
        .map_err(|e| Error::git(format!("Not a commit: {e}")))?;

    let tree_id = commit
        .tree_id()
        .map_err(|e| Error::git(format!("Failed to get tree id: {e}")))?;

    let tree = repo
        .find_object(tree_id)
        .map_err(|e| Error::git(format!("Failed to find tree: {e}")))?
        .try_into_tree()
        .map_err(|e| Error::git(format!("Not a tree: {e}")))?;

    let entry = tree
        .lookup_entry_by_path(path)
        .map_err(|e| Error::git(format!("Failed to lookup {path}: {e}")))?
        .ok_or_else(|| Error::git(format!("{path} not found at {sha}")))?;

    let blob = entry
        .object()
        .map_err(|e| Error::git(format!("Failed to get object: {e}")))?
        .try_into_blob()
        .map_err(|_| Error::git(format!("Not a blob: {path}")))?;

    Ok(String::from_utf8_lossy(&blob.data)
        .lines()
        .map(str::to_string)
        .collect())
}
