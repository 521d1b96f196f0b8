//! Git log ingestion.
//!
//! Runs `git log --raw --numstat` once over the whole history and parses
//! it into commit descriptors. Raw lines carry the change status and paths;
//! numstat lines carry line counts and are matched to raw lines by path.

use std::collections::HashMap;
use std::path::Path;
use std::process::Command;

use chrono::{DateTime, Utc};

use crate::core::{Error, Result};
use crate::history::{ChangeKind, CommitDescriptor, FileEntry};

const RECORD_SEP: char = '\u{1e}';
const UNIT_SEP: char = '\u{1f}';

/// Read the full commit history of the repository at `root`, oldest first.
pub fn commit_history(root: &Path) -> Result<Vec<CommitDescriptor>> {
    let output = Command::new("git")
        .args([
            "-c",
            "core.quotePath=false",
            "log",
            "--reverse",
            "--date-order",
            "--full-history",
            "-M",
            "--raw",
            "--numstat",
            "--format=%x1e%H%x1f%an%x1f%cI%x1f%s",
        ])
        .current_dir(root)
        .output()
        .map_err(|e| Error::git(format!("Failed to run git log: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::git(format!("git log failed: {}", stderr.trim())));
    }

    Ok(parse_log(&String::from_utf8_lossy(&output.stdout)))
}

/// Parse the output of [`commit_history`]'s git invocation.
///
/// Commits with an unparseable date keep `date: None` and are skipped by
/// ingestion. Unknown raw statuses are ignored.
pub fn parse_log(output: &str) -> Vec<CommitDescriptor> {
    output
        .split(RECORD_SEP)
        .filter(|chunk| !chunk.trim().is_empty())
        .map(parse_commit)
        .collect()
}

fn parse_commit(chunk: &str) -> CommitDescriptor {
    let mut lines = chunk.lines();
    let header = lines.next().unwrap_or_default();
    let mut fields = header.splitn(4, UNIT_SEP);
    let sha = fields.next().unwrap_or_default().trim().to_string();
    let author = fields.next().unwrap_or_default().to_string();
    let date = fields
        .next()
        .and_then(|d| DateTime::parse_from_rfc3339(d.trim()).ok())
        .map(|d| d.with_timezone(&Utc));
    let message = fields.next().unwrap_or_default().to_string();

    let mut raw = Vec::new();
    let mut counts: HashMap<String, (u64, u64)> = HashMap::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        if let Some(rest) = line.strip_prefix(':') {
            if let Some(entry) = parse_raw(rest) {
                raw.push(entry);
            }
        } else if let Some((path, added, deleted)) = parse_numstat(line) {
            counts.insert(path, (added, deleted));
        }
    }

    let files = raw
        .into_iter()
        .map(|mut entry| {
            let key = match entry.kind {
                ChangeKind::Deleted => entry.old_path.as_deref(),
                _ => entry.new_path.as_deref(),
            };
            if let Some(&(added, deleted)) = key.and_then(|k| counts.get(k)) {
                entry.added = added;
                entry.deleted = deleted;
            }
            entry
        })
        .collect();

    CommitDescriptor {
        sha,
        author,
        date,
        message,
        files,
    }
}

/// Parse a raw line without its leading colon:
/// `100644 100644 abc1234 def5678 M\tpath`.
fn parse_raw(line: &str) -> Option<FileEntry> {
    let mut parts = line.split('\t');
    let meta = parts.next()?;
    let status = meta.split_whitespace().nth(4)?;
    let first = parts.next().map(str::to_string);
    let second = parts.next().map(str::to_string);

    let entry = match status.chars().next()? {
        'A' => FileEntry {
            kind: ChangeKind::Added,
            old_path: None,
            new_path: first,
            added: 0,
            deleted: 0,
        },
        'M' | 'T' => FileEntry {
            kind: ChangeKind::Modified,
            old_path: None,
            new_path: first,
            added: 0,
            deleted: 0,
        },
        'D' => FileEntry {
            kind: ChangeKind::Deleted,
            old_path: first,
            new_path: None,
            added: 0,
            deleted: 0,
        },
        'R' => FileEntry {
            kind: ChangeKind::Renamed,
            old_path: first,
            new_path: second,
            added: 0,
            deleted: 0,
        },
        // A copy leaves the source in place.
        'C' => FileEntry {
            kind: ChangeKind::Added,
            old_path: None,
            new_path: second,
            added: 0,
            deleted: 0,
        },
        _ => return None,
    };
    Some(entry)
}

/// Parse `added\tdeleted\tpath`. Binary files (`-`) count as zero lines.
/// Returns the post-change path.
fn parse_numstat(line: &str) -> Option<(String, u64, u64)> {
    let mut parts = line.splitn(3, '\t');
    let added = parts.next()?;
    let deleted = parts.next()?;
    let path = parts.next()?;
    let count = |s: &str| match s {
        "-" => Some(0),
        _ => s.parse::<u64>().ok(),
    };
    let (_, new_path) = expand_rename_path(path);
    Some((new_path, count(added)?, count(deleted)?))
}

/// Expand numstat rename notation into `(old, new)` paths.
///
/// Handles `old => new` and `prefix/{old => new}/suffix`, where either side
/// of the braces may be empty. Plain paths map to themselves.
pub fn expand_rename_path(path: &str) -> (String, String) {
    if let (Some(open), Some(close)) = (path.find('{'), path.rfind('}')) {
        if open < close {
            let inner = &path[open + 1..close];
            if let Some((old, new)) = inner.split_once(" => ") {
                let prefix = &path[..open];
                let suffix = &path[close + 1..];
                let join = |mid: &str| format!("{prefix}{mid}{suffix}").replace("//", "/");
                return (join(old), join(new));
            }
        }
    }
    match path.split_once(" => ") {
        Some((old, new)) => (old.to_string(), new.to_string()),
        None => (path.to_string(), path.to_string()),
    }
}
