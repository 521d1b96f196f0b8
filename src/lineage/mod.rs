//! File lineage registry.
//!
//! Tracks the identity of every source file across releases. Each release
//! has a map from canonical path to the [`FileState`] living at that path
//! in that release. File histories are append-only series keyed by release
//! index: a rename closes the old file's series and opens a new one linked
//! back through [`FileState::predecessor`], so no accumulated history is
//! ever copied or lost.
//!
//! After [`Registry::seal`], every file has a registry entry for each
//! release in `[since, retirement)` (or up to the last release when never
//! retired). Releases without a touching commit carry a zero delta.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::history::CommitId;

/// Stable identifier of a file state in the registry arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileId(pub usize);

/// Content of a file as of the last commit touching it in a release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Commit the content was taken at.
    pub commit: CommitId,
    /// Path of the file in that commit.
    pub path: String,
    /// File lines, once hydrated.
    pub lines: Option<Arc<[String]>>,
}

/// Changes accumulated by one file within one release.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleaseDelta {
    /// Lines added.
    pub additions: u64,
    /// Largest addition made by a single commit.
    pub max_addition: u64,
    /// Lines deleted.
    pub deletions: u64,
    /// Commits touching the file, in replay order.
    pub revisions: Vec<CommitId>,
    /// Latest content snapshot.
    pub snapshot: Option<Snapshot>,
}

impl ReleaseDelta {
    /// Lines added plus lines deleted.
    pub fn touched(&self) -> u64 {
        self.additions + self.deletions
    }

    fn absorb(&mut self, other: &ReleaseDelta) {
        self.additions += other.additions;
        self.max_addition = self.max_addition.max(other.max_addition);
        self.deletions += other.deletions;
        let mut revisions = other.revisions.clone();
        revisions.extend(self.revisions.drain(..));
        self.revisions = revisions;
        if self.snapshot.is_none() {
            self.snapshot = other.snapshot.clone();
        }
    }
}

/// Release at which a file was renamed, and the file that continues it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rename {
    pub release: usize,
    pub target: FileId,
}

/// One file identity under one canonical path.
#[derive(Debug, Clone)]
pub struct FileState {
    /// Arena identifier.
    pub id: FileId,
    /// Canonical path.
    pub path: String,
    /// Release in which the lineage was first created (inherited on rename).
    pub origin: usize,
    /// First release under this path.
    pub since: usize,
    /// Release of deletion.
    pub deleted: Option<usize>,
    /// Rename that retired this path.
    pub renamed: Option<Rename>,
    /// File this one continues after a rename.
    pub predecessor: Option<FileId>,
    series: BTreeMap<usize, ReleaseDelta>,
    present: BTreeSet<usize>,
}

impl FileState {
    fn new(id: FileId, path: &str, origin: usize, since: usize) -> Self {
        Self {
            id,
            path: path.to_string(),
            origin,
            since,
            deleted: None,
            renamed: None,
            predecessor: None,
            series: BTreeMap::new(),
            present: BTreeSet::new(),
        }
    }

    /// Delta recorded under this path in `release`.
    pub fn delta(&self, release: usize) -> Option<&ReleaseDelta> {
        self.series.get(&release)
    }

    /// Releases with a recorded delta under this path.
    pub fn series(&self) -> impl Iterator<Item = (usize, &ReleaseDelta)> {
        self.series.iter().map(|(r, d)| (*r, d))
    }

    /// Releases in which the registry lists this file.
    pub fn releases(&self) -> impl Iterator<Item = usize> + '_ {
        self.present.iter().copied()
    }

    /// Whether the registry lists this file in `release`.
    pub fn is_present(&self, release: usize) -> bool {
        self.present.contains(&release)
    }

    /// Release from which the path no longer exists.
    pub fn retired_at(&self) -> Option<usize> {
        match (self.deleted, self.renamed) {
            (Some(d), Some(r)) => Some(d.min(r.release)),
            (Some(d), None) => Some(d),
            (None, Some(r)) => Some(r.release),
            (None, None) => None,
        }
    }

    /// Whether the path was deleted or renamed.
    pub fn is_retired(&self) -> bool {
        self.retired_at().is_some()
    }
}

/// A snapshot that still needs its content fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotRequest {
    pub file: FileId,
    pub release: usize,
    pub commit: CommitId,
    pub path: String,
}

/// Per-release path maps plus the arena of file states.
#[derive(Debug, Clone)]
pub struct Registry {
    maps: Vec<HashMap<String, FileId>>,
    files: Vec<FileState>,
}

impl Registry {
    /// Create an empty registry for releases `1..=release_count`.
    pub fn new(release_count: usize) -> Self {
        Self {
            maps: vec![HashMap::new(); release_count],
            files: Vec::new(),
        }
    }

    /// Number of releases covered.
    pub fn release_count(&self) -> usize {
        self.maps.len()
    }

    /// File state by id.
    pub fn file(&self, id: FileId) -> &FileState {
        &self.files[id.0]
    }

    /// All file states ever created.
    pub fn files(&self) -> &[FileState] {
        &self.files
    }

    /// Files listed in `release`, sorted by path.
    pub fn entries(&self, release: usize) -> Vec<(&str, FileId)> {
        let mut entries: Vec<_> = self
            .map(release)
            .map(|m| m.iter().map(|(p, id)| (p.as_str(), *id)).collect())
            .unwrap_or_default();
        entries.sort_unstable_by(|a, b| a.0.cmp(b.0));
        entries
    }

    /// File listed at `path` in `release`.
    pub fn lookup(&self, release: usize, path: &str) -> Option<FileId> {
        self.map(release).and_then(|m| m.get(path).copied())
    }

    /// Return the file at `path` in `release`, creating or continuing it.
    ///
    /// A live file last seen in an earlier release is continued and listed
    /// in every release in between. A path never seen, or whose previous
    /// file was retired, starts a new lineage.
    pub fn get_or_create(&mut self, release: usize, path: &str) -> FileId {
        if let Some(id) = self.lookup(release, path) {
            return id;
        }

        match self.find_prior(release, path) {
            Some((prior, id)) if !self.file(id).is_retired() => {
                self.span(id, prior + 1, release);
                id
            }
            _ => {
                let id = self.push(path, release, release);
                self.span(id, release, release);
                id
            }
        }
    }

    /// Rename `old_path` to `new_path` in `release`.
    ///
    /// The new file continues the old one's lineage; the old path leaves
    /// the registry from `release` onward. A deletion of `old_path` in the
    /// same release is overridden by the rename.
    pub fn rename(&mut self, release: usize, old_path: &str, new_path: &str) -> FileId {
        if old_path == new_path {
            return self.get_or_create(release, new_path);
        }

        let Some(old_id) = self.locate(release, old_path, true) else {
            tracing::debug!(old_path, new_path, release, "rename of untracked path");
            return self.get_or_create(release, new_path);
        };
        if self.file(old_id).deleted == Some(release) {
            self.files[old_id.0].deleted = None;
        }

        if let Some(existing) = self.locate(release, new_path, false) {
            if existing != old_id {
                self.files[existing.0].deleted = Some(release);
                self.evict(existing, release);
            }
        }

        let origin = self.file(old_id).origin;
        let new_id = self.push(new_path, origin, release);
        self.files[new_id.0].predecessor = Some(old_id);
        self.files[old_id.0].renamed = Some(Rename {
            release,
            target: new_id,
        });
        self.evict(old_id, release);
        self.span(new_id, release, release);
        new_id
    }

    /// Delete `path` in `release`. Returns the retired file, if tracked.
    pub fn delete(&mut self, release: usize, path: &str) -> Option<FileId> {
        let Some(id) = self.locate(release, path, false) else {
            tracing::debug!(path, release, "deletion of untracked path");
            return None;
        };
        self.files[id.0].deleted = Some(release);
        self.evict(id, release);
        Some(id)
    }

    /// Accumulate one commit's change to a file in `release`.
    pub fn record_change(
        &mut self,
        id: FileId,
        release: usize,
        commit: CommitId,
        added: u64,
        deleted: u64,
    ) {
        let delta = self.files[id.0].series.entry(release).or_default();
        delta.additions += added;
        delta.max_addition = delta.max_addition.max(added);
        delta.deletions += deleted;
        if delta.revisions.last() != Some(&commit) {
            delta.revisions.push(commit);
        }
    }

    /// Remember the content of a file as of `commit` in `release`.
    pub fn record_snapshot(
        &mut self,
        id: FileId,
        release: usize,
        commit: CommitId,
        path: &str,
        lines: Option<Vec<String>>,
    ) {
        let delta = self.files[id.0].series.entry(release).or_default();
        delta.snapshot = Some(Snapshot {
            commit,
            path: path.to_string(),
            lines: lines.map(Arc::from),
        });
    }

    /// List every live file up to the last release.
    pub fn seal(&mut self) {
        let last = self.release_count();
        for i in 0..self.files.len() {
            let file = &self.files[i];
            if file.is_retired() {
                continue;
            }
            if let Some(&seen) = file.present.iter().next_back() {
                if seen < last {
                    self.span(FileId(i), seen + 1, last);
                }
            }
        }
    }

    /// Member of `id`'s lineage listed in `release`, following renames
    /// backwards first, then forwards.
    pub fn alias_at(&self, id: FileId, release: usize) -> Option<FileId> {
        let mut cur = Some(id);
        while let Some(c) = cur {
            if self.file(c).is_present(release) {
                return Some(c);
            }
            cur = self.file(c).predecessor;
        }

        let mut cur = self.file(id).renamed.map(|r| r.target);
        while let Some(c) = cur {
            if self.file(c).is_present(release) {
                return Some(c);
            }
            cur = self.file(c).renamed.map(|r| r.target);
        }
        None
    }

    /// Delta of `id` in `release`, including changes made under the
    /// previous path when the rename happened in that same release.
    pub fn merged_delta(&self, id: FileId, release: usize) -> ReleaseDelta {
        let file = self.file(id);
        let mut delta = file.delta(release).cloned().unwrap_or_default();
        if let Some(pred) = file.predecessor {
            if self.file(pred).renamed.map(|r| r.release) == Some(release) {
                delta.absorb(&self.merged_delta(pred, release));
            }
        }
        delta
    }

    /// Lineage-wide history of `id`, oldest release first.
    pub fn history(&self, id: FileId) -> Vec<(usize, &ReleaseDelta)> {
        let file = self.file(id);
        let mut history = match file.predecessor {
            Some(pred) => self.history(pred),
            None => Vec::new(),
        };
        history.extend(file.series());
        history
    }

    /// Lines touched across the lineage in releases up to `release`.
    pub fn touched_until(&self, id: FileId, release: usize) -> u64 {
        self.history(id)
            .into_iter()
            .filter(|(r, _)| *r <= release)
            .map(|(_, d)| d.touched())
            .sum()
    }

    /// Latest hydrated content of the lineage at or before `release`.
    pub fn content_at(&self, id: FileId, release: usize) -> Option<Arc<[String]>> {
        let file = self.file(id);
        let own = file
            .series
            .range(..=release)
            .rev()
            .find_map(|(_, d)| d.snapshot.as_ref().and_then(|s| s.lines.clone()));
        own.or_else(|| file.predecessor.and_then(|p| self.content_at(p, release)))
    }

    /// Snapshots whose content has not been fetched yet.
    pub fn pending_snapshots(&self) -> Vec<SnapshotRequest> {
        self.files
            .iter()
            .flat_map(|f| {
                f.series.iter().filter_map(move |(r, d)| {
                    d.snapshot
                        .as_ref()
                        .filter(|s| s.lines.is_none())
                        .map(|s| SnapshotRequest {
                            file: f.id,
                            release: *r,
                            commit: s.commit,
                            path: s.path.clone(),
                        })
                })
            })
            .collect()
    }

    /// Attach fetched content to a pending snapshot.
    pub fn hydrate(&mut self, request: &SnapshotRequest, lines: Vec<String>) {
        if let Some(snapshot) = self.files[request.file.0]
            .series
            .get_mut(&request.release)
            .and_then(|d| d.snapshot.as_mut())
        {
            snapshot.lines = Some(Arc::from(lines));
        }
    }

    fn map(&self, release: usize) -> Option<&HashMap<String, FileId>> {
        release.checked_sub(1).and_then(|i| self.maps.get(i))
    }

    fn push(&mut self, path: &str, origin: usize, since: usize) -> FileId {
        let id = FileId(self.files.len());
        self.files.push(FileState::new(id, path, origin, since));
        id
    }

    /// Most recent release before `release` listing `path`.
    fn find_prior(&self, release: usize, path: &str) -> Option<(usize, FileId)> {
        (1..release)
            .rev()
            .find_map(|r| self.lookup(r, path).map(|id| (r, id)))
    }

    /// Current file at `path` without listing it in `release` itself.
    ///
    /// Gaps before `release` are filled. With `allow_deleted_here`, a file
    /// deleted exactly in `release` is still returned.
    fn locate(&mut self, release: usize, path: &str, allow_deleted_here: bool) -> Option<FileId> {
        if let Some(id) = self.lookup(release, path) {
            return Some(id);
        }
        let (prior, id) = self.find_prior(release, path)?;
        let file = self.file(id);
        let deleted_here = allow_deleted_here
            && file.renamed.is_none()
            && file.deleted == Some(release);
        if file.is_retired() && !deleted_here {
            return None;
        }
        if prior + 1 < release {
            self.span(id, prior + 1, release - 1);
        }
        Some(id)
    }

    /// List `id` at its path in releases `from..=to`.
    fn span(&mut self, id: FileId, from: usize, to: usize) {
        let path = self.files[id.0].path.clone();
        for r in from..=to.min(self.maps.len()) {
            self.maps[r - 1].insert(path.clone(), id);
            self.files[id.0].present.insert(r);
        }
    }

    /// Remove `id` from the registry from `release` onward.
    fn evict(&mut self, id: FileId, release: usize) {
        let path = self.files[id.0].path.clone();
        for r in release..=self.maps.len() {
            if self.maps[r - 1].get(&path) == Some(&id) {
                self.maps[r - 1].remove(&path);
            }
        }
        self.files[id.0].present.retain(|r| *r < release);
    }
}
