//! History ingestion.
//!
//! Replays commit descriptors in date order against the lineage registry,
//! attributing each commit to the release that ships it and accumulating
//! per-release file deltas. Also extracts ticket tags from commit messages
//! so issues can find their fixing commits.

use std::collections::HashMap;
use std::time::Instant;

use chrono::{DateTime, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::Verbosity;
use crate::core::{Error, Result};
use crate::lineage::{FileId, Registry};
use crate::timeline::Timeline;

/// Sequence number of an ingested commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CommitId(pub usize);

/// Kind of change a commit made to one path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
    Renamed,
}

/// One file entry of a commit descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub kind: ChangeKind,
    /// Path before the change (deletions and renames).
    pub old_path: Option<String>,
    /// Path after the change (additions, modifications and renames).
    pub new_path: Option<String>,
    pub added: u64,
    pub deleted: u64,
}

impl FileEntry {
    /// Entry for an added file.
    pub fn added(path: &str, added: u64) -> Self {
        Self {
            kind: ChangeKind::Added,
            old_path: None,
            new_path: Some(path.to_string()),
            added,
            deleted: 0,
        }
    }

    /// Entry for a modified file.
    pub fn modified(path: &str, added: u64, deleted: u64) -> Self {
        Self {
            kind: ChangeKind::Modified,
            old_path: None,
            new_path: Some(path.to_string()),
            added,
            deleted,
        }
    }

    /// Entry for a deleted file.
    pub fn deleted(path: &str, deleted: u64) -> Self {
        Self {
            kind: ChangeKind::Deleted,
            old_path: Some(path.to_string()),
            new_path: None,
            added: 0,
            deleted,
        }
    }

    /// Entry for a renamed file.
    pub fn renamed(old_path: &str, new_path: &str, added: u64, deleted: u64) -> Self {
        Self {
            kind: ChangeKind::Renamed,
            old_path: Some(old_path.to_string()),
            new_path: Some(new_path.to_string()),
            added,
            deleted,
        }
    }

    fn path(&self) -> Option<&str> {
        match self.kind {
            ChangeKind::Deleted => self.old_path.as_deref().or(self.new_path.as_deref()),
            _ => self.new_path.as_deref().or(self.old_path.as_deref()),
        }
    }

    /// Renames and deletions are applied before additions so a commit that
    /// moves a file away and creates a new one at the old path keeps both.
    fn replay_rank(&self) -> u8 {
        match self.kind {
            ChangeKind::Renamed => 0,
            ChangeKind::Deleted => 1,
            ChangeKind::Added | ChangeKind::Modified => 2,
        }
    }
}

/// A commit as reported by the version-control collaborator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitDescriptor {
    pub sha: String,
    pub author: String,
    pub date: Option<DateTime<Utc>>,
    pub message: String,
    pub files: Vec<FileEntry>,
}

/// Lines changed in one tracked file by one commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub file: FileId,
    pub added: u64,
    pub deleted: u64,
}

impl FileChange {
    /// Lines added minus lines deleted.
    pub fn churn(&self) -> i64 {
        self.added as i64 - self.deleted as i64
    }
}

/// An ingested commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Commit {
    pub id: CommitId,
    pub sha: String,
    pub author: String,
    pub date: DateTime<Utc>,
    pub message: String,
    /// Index of the release shipping this commit.
    pub release: usize,
    /// Ticket keys referenced in the message.
    pub tickets: Vec<String>,
    /// Tracked files changed by this commit.
    pub changes: Vec<FileChange>,
}

impl Commit {
    /// Number of other tracked files changed alongside any one of them.
    pub fn co_changed(&self) -> u64 {
        self.changes.len().saturating_sub(1) as u64
    }
}

/// Counts of what ingestion skipped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestStats {
    /// Commits replayed into the registry.
    pub commits: usize,
    /// Commit descriptors without a date.
    pub malformed_commits: usize,
    /// File entries without a path.
    pub malformed_entries: usize,
    /// Commits dated after the last release.
    pub after_last_release: usize,
    /// File entries outside the tracked path set.
    pub untracked_entries: usize,
}

/// Include/exclude glob filter over repository paths.
#[derive(Debug, Clone)]
pub struct PathFilter {
    include: Option<GlobSet>,
    exclude: GlobSet,
}

impl PathFilter {
    /// Build a filter. An empty include list tracks every path.
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self> {
        let include = if include.is_empty() {
            None
        } else {
            Some(build_globset(include)?)
        };
        Ok(Self {
            include,
            exclude: build_globset(exclude)?,
        })
    }

    /// Filter that tracks every path.
    pub fn all() -> Self {
        Self {
            include: None,
            exclude: GlobSet::empty(),
        }
    }

    /// Whether `path` is tracked.
    pub fn matches(&self, path: &str) -> bool {
        let included = self.include.as_ref().is_none_or(|set| set.is_match(path));
        included && !self.exclude.is_match(path)
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| Error::config(format!("invalid glob '{pattern}': {e}")))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| Error::config(format!("invalid glob set: {e}")))
}

/// Finds `KEY-<digits>` ticket tags in commit messages.
#[derive(Debug, Clone)]
pub struct TicketMatcher {
    pattern: Regex,
}

impl TicketMatcher {
    /// Matcher for tickets of `project` (e.g. `BOOKKEEPER`).
    pub fn new(project: &str) -> Result<Self> {
        let pattern = Regex::new(&format!(r"{}-\d+", regex::escape(project)))
            .map_err(|e| Error::config(format!("invalid project key '{project}': {e}")))?;
        Ok(Self { pattern })
    }

    /// Distinct ticket keys referenced in `message`, in order of appearance.
    ///
    /// A tag must not be glued to surrounding letters or digits:
    /// `XPROJ-12` and `PROJ-12a` are not tags of `PROJ`.
    pub fn tickets(&self, message: &str) -> Vec<String> {
        let mut tickets: Vec<String> = Vec::new();
        for m in self.pattern.find_iter(message) {
            let before = message[..m.start()].chars().next_back();
            let after = message[m.end()..].chars().next();
            let bounded = |c: Option<char>| c.is_none_or(|c| !c.is_alphanumeric());
            if bounded(before) && bounded(after) && !tickets.iter().any(|t| t == m.as_str()) {
                tickets.push(m.as_str().to_string());
            }
        }
        tickets
    }
}

/// Ingested commits plus the ticket index.
#[derive(Debug, Clone, Default)]
pub struct History {
    commits: Vec<Commit>,
    by_ticket: HashMap<String, Vec<CommitId>>,
    stats: IngestStats,
}

impl History {
    /// Ingested commits in replay order.
    pub fn commits(&self) -> &[Commit] {
        &self.commits
    }

    /// Commit by id.
    pub fn commit(&self, id: CommitId) -> &Commit {
        &self.commits[id.0]
    }

    /// Commits whose message references `ticket`.
    pub fn fixing_commits(&self, ticket: &str) -> &[CommitId] {
        self.by_ticket.get(ticket).map(Vec::as_slice).unwrap_or(&[])
    }

    /// What ingestion skipped.
    pub fn stats(&self) -> IngestStats {
        self.stats
    }
}

/// Replays commit descriptors into a lineage registry.
pub struct Ingestor<'a> {
    timeline: &'a Timeline,
    filter: PathFilter,
    tickets: TicketMatcher,
    verbosity: Verbosity,
}

impl<'a> Ingestor<'a> {
    pub fn new(
        timeline: &'a Timeline,
        filter: PathFilter,
        tickets: TicketMatcher,
        verbosity: Verbosity,
    ) -> Self {
        Self {
            timeline,
            filter,
            tickets,
            verbosity,
        }
    }

    /// Replay `descriptors` in date order.
    ///
    /// Descriptors are stably sorted by date first. Commits without a date
    /// or dated after the last release are skipped and counted.
    pub fn ingest(
        &self,
        descriptors: impl IntoIterator<Item = CommitDescriptor>,
        registry: &mut Registry,
    ) -> History {
        let start = Instant::now();
        let mut history = History::default();

        let mut dated: Vec<(DateTime<Utc>, CommitDescriptor)> = Vec::new();
        for descriptor in descriptors {
            match descriptor.date {
                Some(date) => dated.push((date, descriptor)),
                None => {
                    tracing::debug!(sha = %descriptor.sha, "skipping commit without date");
                    history.stats.malformed_commits += 1;
                }
            }
        }
        dated.sort_by_key(|(date, _)| *date);

        for (date, descriptor) in dated {
            let Some(release) = self.timeline.resolve(date).map(|r| r.index) else {
                tracing::debug!(sha = %descriptor.sha, %date, "commit after last release");
                history.stats.after_last_release += 1;
                continue;
            };
            self.replay(&mut history, registry, descriptor, date, release);
        }

        history.stats.commits = history.commits.len();
        let stats = history.stats;
        let malformed = stats.malformed_commits + stats.malformed_entries;
        if self.verbosity.summaries() {
            tracing::info!(
                commits = stats.commits,
                after_last_release = stats.after_last_release,
                malformed,
                "history ingestion completed in {:?}",
                start.elapsed()
            );
        } else {
            tracing::debug!(
                commits = stats.commits,
                after_last_release = stats.after_last_release,
                malformed,
                "history ingestion completed in {:?}",
                start.elapsed()
            );
        }
        history
    }

    fn replay(
        &self,
        history: &mut History,
        registry: &mut Registry,
        descriptor: CommitDescriptor,
        date: DateTime<Utc>,
        release: usize,
    ) {
        let id = CommitId(history.commits.len());
        let tickets = self.tickets.tickets(&descriptor.message);
        for ticket in &tickets {
            history.by_ticket.entry(ticket.clone()).or_default().push(id);
        }

        let mut entries = descriptor.files;
        entries.sort_by_key(FileEntry::replay_rank);

        let mut changes = Vec::with_capacity(entries.len());
        for entry in &entries {
            if entry.path().is_none() {
                history.stats.malformed_entries += 1;
                continue;
            }
            match self.apply(registry, entry, id, release) {
                Some(file) => changes.push(FileChange {
                    file,
                    added: entry.added,
                    deleted: entry.deleted,
                }),
                None => history.stats.untracked_entries += 1,
            }
        }

        if self.verbosity.detailed() {
            tracing::info!(
                sha = %descriptor.sha,
                release,
                files = changes.len(),
                "replayed commit"
            );
        }

        history.commits.push(Commit {
            id,
            sha: descriptor.sha,
            author: descriptor.author,
            date,
            message: descriptor.message,
            release,
            tickets,
            changes,
        });
    }

    /// Apply one entry to the registry. Returns the file the change belongs
    /// to, or `None` when the entry does not touch a tracked file.
    fn apply(
        &self,
        registry: &mut Registry,
        entry: &FileEntry,
        commit: CommitId,
        release: usize,
    ) -> Option<FileId> {
        let (file, path) = match entry.kind {
            ChangeKind::Added | ChangeKind::Modified => {
                let path = self.tracked(entry.path())?;
                (registry.get_or_create(release, path), Some(path))
            }
            ChangeKind::Deleted => {
                let path = self.tracked(entry.path())?;
                (registry.delete(release, path)?, None)
            }
            ChangeKind::Renamed => {
                let old = self.tracked(entry.old_path.as_deref());
                let new = self.tracked(entry.new_path.as_deref());
                match (old, new) {
                    (Some(old), Some(new)) => (registry.rename(release, old, new), Some(new)),
                    (Some(old), None) => (registry.delete(release, old)?, None),
                    (None, Some(new)) => (registry.get_or_create(release, new), Some(new)),
                    (None, None) => return None,
                }
            }
        };

        registry.record_change(file, release, commit, entry.added, entry.deleted);
        if let Some(path) = path {
            registry.record_snapshot(file, release, commit, path, None);
        }
        Some(file)
    }

    fn tracked<'p>(&self, path: Option<&'p str>) -> Option<&'p str> {
        path.filter(|p| self.filter.matches(p))
    }
}
