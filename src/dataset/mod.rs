//! Dataset assembly.
//!
//! Produces one [`Record`] per (release, file) from the sealed lineage
//! registry, then labels records as buggy from the settled issues. Metric
//! computation only reads shared state, so records are built in parallel.

use std::collections::{BTreeSet, HashSet};
use std::time::Instant;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::Verbosity;
use crate::estimator::ResolvedIssue;
use crate::history::{CommitId, History};
use crate::lineage::{FileId, Registry};
use crate::timeline::Timeline;

/// One row of the dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub release: usize,
    pub path: String,
    /// Lines of code, excluding comment lines.
    pub size: u64,
    pub loc_touched: u64,
    pub loc_added: u64,
    pub max_loc_added: u64,
    pub loc_deleted: u64,
    pub num_revisions: usize,
    pub num_authors: usize,
    pub churn: i64,
    pub max_churn: i64,
    pub chg_set_size: u64,
    pub max_chg_set_size: u64,
    pub num_fix: usize,
    /// Whole weeks since the file's lineage was created.
    pub age: i64,
    pub weighted_age: f64,
    pub buggy: bool,
}

/// Records ordered by (release, path).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    records: Vec<Record>,
}

impl Dataset {
    /// All records.
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of records labeled buggy.
    pub fn buggy_count(&self) -> usize {
        self.records.iter().filter(|r| r.buggy).count()
    }

    /// Record at (release, path).
    pub fn get(&self, release: usize, path: &str) -> Option<&Record> {
        self.position(release, path).map(|i| &self.records[i])
    }

    /// Highest release index with at least one record.
    pub fn last_release(&self) -> usize {
        self.records.last().map_or(0, |r| r.release)
    }

    fn position(&self, release: usize, path: &str) -> Option<usize> {
        self.records
            .binary_search_by(|r| (r.release, r.path.as_str()).cmp(&(release, path)))
            .ok()
    }

    /// Mark records touched by the issues' fixing commits in their affected
    /// releases. Labels only ever flip from clean to buggy.
    pub fn label(&mut self, registry: &Registry, history: &History, issues: &[ResolvedIssue]) -> usize {
        let mut flipped = 0;
        for issue in issues {
            let files: BTreeSet<FileId> = history
                .fixing_commits(&issue.key)
                .iter()
                .flat_map(|&c| history.commit(c).changes.iter().map(|ch| ch.file))
                .collect();

            for &release in &issue.affected {
                for &file in &files {
                    let Some(alias) = registry.alias_at(file, release) else {
                        continue;
                    };
                    let path = &registry.file(alias).path;
                    if let Some(i) = self.position(release, path) {
                        if !self.records[i].buggy {
                            self.records[i].buggy = true;
                            flipped += 1;
                        }
                    }
                }
            }
        }
        flipped
    }
}

/// Joins lineage, history and settled issues into a dataset.
pub struct Assembler<'a> {
    timeline: &'a Timeline,
    registry: &'a Registry,
    history: &'a History,
    verbosity: Verbosity,
}

impl<'a> Assembler<'a> {
    pub fn new(
        timeline: &'a Timeline,
        registry: &'a Registry,
        history: &'a History,
        verbosity: Verbosity,
    ) -> Self {
        Self {
            timeline,
            registry,
            history,
            verbosity,
        }
    }

    /// Build and label records for releases `1..=through`.
    pub fn assemble(&self, issues: &[ResolvedIssue], through: usize) -> Dataset {
        let start = Instant::now();
        let through = through.min(self.registry.release_count());

        let fixes: HashSet<CommitId> = issues
            .iter()
            .flat_map(|i| self.history.fixing_commits(&i.key).iter().copied())
            .collect();

        let slots: Vec<(usize, &str, FileId)> = (1..=through)
            .flat_map(|release| {
                self.registry
                    .entries(release)
                    .into_iter()
                    .filter(move |(_, id)| {
                        self.registry
                            .file(*id)
                            .renamed
                            .is_none_or(|r| r.release > release)
                    })
                    .map(move |(path, id)| (release, path, id))
            })
            .collect();

        let records: Vec<Record> = slots
            .par_iter()
            .map(|&(release, path, id)| self.record(release, path, id, &fixes))
            .collect();

        let mut dataset = Dataset { records };
        let flipped = dataset.label(self.registry, self.history, issues);

        if self.verbosity.summaries() {
            tracing::info!(
                records = dataset.len(),
                buggy = flipped,
                releases = through,
                "dataset assembly completed in {:?}",
                start.elapsed()
            );
        } else {
            tracing::debug!(
                records = dataset.len(),
                buggy = flipped,
                releases = through,
                "dataset assembly completed in {:?}",
                start.elapsed()
            );
        }
        dataset
    }

    fn record(&self, release: usize, path: &str, id: FileId, fixes: &HashSet<CommitId>) -> Record {
        let delta = self.registry.merged_delta(id, release);
        let lineage = self.lineage_ids(id);

        let mut authors = HashSet::new();
        let mut max_churn: Option<i64> = None;
        let mut chg_set_size = 0;
        let mut max_chg_set_size = 0;
        let mut num_fix = 0;
        for &c in &delta.revisions {
            let commit = self.history.commit(c);
            authors.insert(commit.author.as_str());
            if let Some(change) = commit.changes.iter().find(|ch| lineage.contains(&ch.file)) {
                max_churn = Some(max_churn.map_or(change.churn(), |m| m.max(change.churn())));
            }
            chg_set_size += commit.co_changed();
            max_chg_set_size = max_chg_set_size.max(commit.co_changed());
            if fixes.contains(&c) {
                num_fix += 1;
            }
        }

        let size = self
            .registry
            .content_at(id, release)
            .map_or(0, |lines| count_code_lines(&lines));
        let age = self
            .timeline
            .weeks_between(self.registry.file(id).origin, release);
        let touched = self.registry.touched_until(id, release);
        let weighted_age = if touched == 0 {
            0.0
        } else {
            age as f64 / touched as f64
        };

        if self.verbosity.detailed() {
            tracing::info!(release, path, revisions = delta.revisions.len(), "assembled record");
        }

        Record {
            release,
            path: path.to_string(),
            size,
            loc_touched: delta.touched(),
            loc_added: delta.additions,
            max_loc_added: delta.max_addition,
            loc_deleted: delta.deletions,
            num_revisions: delta.revisions.len(),
            num_authors: authors.len(),
            churn: delta.additions as i64 - delta.deletions as i64,
            max_churn: max_churn.unwrap_or(0),
            chg_set_size,
            max_chg_set_size,
            num_fix,
            age,
            weighted_age,
            buggy: false,
        }
    }

    /// `id` and every file it continues.
    fn lineage_ids(&self, id: FileId) -> Vec<FileId> {
        let mut ids = vec![id];
        let mut cur = self.registry.file(id).predecessor;
        while let Some(p) = cur {
            ids.push(p);
            cur = self.registry.file(p).predecessor;
        }
        ids
    }
}

/// Count lines that are not comments.
///
/// Lines whose trimmed text starts with `//` or `/*`, and lines inside
/// `/* */` blocks, are dropped. A block may open after code on the same
/// line; that line still counts. Blank lines count.
pub fn count_code_lines(lines: &[String]) -> u64 {
    let mut in_block = false;
    let mut count = 0;
    for line in lines {
        let trimmed = line.trim();
        if in_block {
            if let Some(end) = trimmed.find("*/") {
                in_block = opens_block(&trimmed[end + 2..]);
            }
            continue;
        }
        if trimmed.starts_with("//") {
            continue;
        }
        in_block = opens_block(trimmed);
        if !trimmed.starts_with("/*") {
            count += 1;
        }
    }
    count
}

/// Whether `text` leaves a `/*` comment unterminated.
fn opens_block(text: &str) -> bool {
    text.rfind("/*")
        .is_some_and(|start| !text[start + 2..].contains("*/"))
}
