//! Semicolon-separated exports.

use std::io::Write;

use crate::core::Result;
use crate::dataset::Dataset;
use crate::estimator::{ResolvedIssue, Source};
use crate::history::History;
use crate::timeline::Timeline;

/// Field separator.
pub const SEPARATOR: char = ';';

/// A header plus rows of already-formatted cells.
#[derive(Debug, Clone, Default)]
pub struct Table {
    pub headers: Vec<&'static str>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    fn new(headers: &[&'static str]) -> Self {
        Self {
            headers: headers.to_vec(),
            rows: Vec::new(),
        }
    }

    /// Write the table as CSV.
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        write_row(writer, self.headers.iter().copied())?;
        for row in &self.rows {
            write_row(writer, row.iter().map(String::as_str))?;
        }
        Ok(())
    }
}

fn write_row<'a, W: Write>(writer: &mut W, cells: impl Iterator<Item = &'a str>) -> Result<()> {
    let line: Vec<String> = cells.map(escape).collect();
    writeln!(writer, "{}", line.join(&SEPARATOR.to_string()))?;
    Ok(())
}

/// Quote a cell containing the separator, a quote or a line break.
fn escape(cell: &str) -> String {
    if cell.contains([SEPARATOR, '"', '\n', '\r']) {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell.to_string()
    }
}

fn day(date: &chrono::DateTime<chrono::Utc>) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// One row per release.
pub fn versions(timeline: &Timeline) -> Table {
    let mut table = Table::new(&["Index", "Version ID", "Version Name", "Date"]);
    for release in timeline.releases() {
        table.rows.push(vec![
            release.index.to_string(),
            release.id.clone(),
            release.name.clone(),
            day(&release.date),
        ]);
    }
    table
}

/// One row per settled issue.
pub fn tickets(issues: &[ResolvedIssue], history: &History) -> Table {
    let mut table = Table::new(&[
        "Ticket",
        "Created",
        "Opening",
        "Injected",
        "Fixed",
        "Proportion",
        "Source",
        "Fix Commits",
        "Affected",
    ]);
    for issue in issues {
        let affected: Vec<String> = issue.affected.iter().map(usize::to_string).collect();
        table.rows.push(vec![
            issue.key.clone(),
            day(&issue.created),
            issue.opening.to_string(),
            issue.injected.to_string(),
            issue.fixed.to_string(),
            format!("{:.4}", issue.proportion),
            match issue.source {
                Source::Tracker => "tracker",
                Source::Proportion => "proportion",
            }
            .to_string(),
            history.fixing_commits(&issue.key).len().to_string(),
            affected.join(" "),
        ]);
    }
    table
}

/// One row per commit referencing at least one ticket.
pub fn commits(history: &History) -> Table {
    let mut table = Table::new(&["Sha", "Date", "Author", "Ticket", "Release", "Files"]);
    for commit in history.commits().iter().filter(|c| !c.tickets.is_empty()) {
        table.rows.push(vec![
            commit.sha.clone(),
            day(&commit.date),
            commit.author.clone(),
            commit.tickets.join(" "),
            commit.release.to_string(),
            commit.changes.len().to_string(),
        ]);
    }
    table
}

/// Column names of the dataset export, shared with ARFF.
pub const DATASET_HEADERS: [&str; 17] = [
    "Release",
    "File",
    "Size",
    "LOC_touched",
    "LOC_added",
    "MAX_LOC_added",
    "LOC_deleted",
    "NR",
    "NAuth",
    "Churn",
    "MAX_Churn",
    "ChgSetSize",
    "MAX_ChgSetSize",
    "NFix",
    "Age",
    "WeightedAge",
    "Buggy",
];

/// One row per record.
pub fn dataset(dataset: &Dataset) -> Table {
    let mut table = Table::new(&DATASET_HEADERS);
    for r in dataset.records() {
        table.rows.push(vec![
            r.release.to_string(),
            r.path.clone(),
            r.size.to_string(),
            r.loc_touched.to_string(),
            r.loc_added.to_string(),
            r.max_loc_added.to_string(),
            r.loc_deleted.to_string(),
            r.num_revisions.to_string(),
            r.num_authors.to_string(),
            r.churn.to_string(),
            r.max_churn.to_string(),
            r.chg_set_size.to_string(),
            r.max_chg_set_size.to_string(),
            r.num_fix.to_string(),
            r.age.to_string(),
            format!("{:.6}", r.weighted_age),
            if r.buggy { "yes" } else { "no" }.to_string(),
        ]);
    }
    table
}
