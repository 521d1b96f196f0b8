//! Defect injection estimator.
//!
//! Assigns every resolved issue a range of affected releases. Tracker data
//! is trusted when it is internally consistent; otherwise the injected
//! release is estimated with the Proportion method:
//!
//! ```text
//! IV = FV - (FV - OV) * P
//! ```
//!
//! where `OV` is the opening release, `FV` the fixed release and `P` the
//! mean proportion over a moving window of the most recently resolved
//! issues. Issues are processed in resolution order since the window is
//! defined over that order.

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::Verbosity;
use crate::core::{Error, Result};
use crate::timeline::Timeline;

/// A version as reported by the issue tracker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerVersion {
    pub id: Option<String>,
    pub name: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub released: bool,
}

/// A resolved defect as reported by the issue tracker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueDescriptor {
    pub key: String,
    pub id: Option<String>,
    pub created: Option<DateTime<Utc>>,
    pub resolved: Option<DateTime<Utc>>,
    /// Versions the tracker lists as affected.
    pub affected: Vec<TrackerVersion>,
    /// Versions the tracker lists as fixed.
    pub fixed: Vec<TrackerVersion>,
}

/// How an issue's affected releases were obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// Consistent tracker data.
    Tracker,
    /// Proportion estimate.
    Proportion,
}

/// An issue with its affected releases settled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedIssue {
    pub key: String,
    pub created: DateTime<Utc>,
    pub resolved: DateTime<Utc>,
    /// Opening release index.
    pub opening: usize,
    /// Fixed release index.
    pub fixed: usize,
    /// Injected release index (lowest affected release).
    pub injected: usize,
    /// Proportion factor of this issue.
    pub proportion: f64,
    /// Affected release indices, ascending.
    pub affected: Vec<usize>,
    pub source: Source,
}

/// Counts of estimator outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EstimateStats {
    pub from_tracker: usize,
    pub from_proportion: usize,
    /// Issues missing a creation or resolution date.
    pub malformed: usize,
    /// Issues opened after the last release.
    pub unresolvable: usize,
}

/// Estimator output.
#[derive(Debug, Clone, Default)]
pub struct Estimate {
    /// Issues in resolution order.
    pub issues: Vec<ResolvedIssue>,
    pub stats: EstimateStats,
}

/// Proportion estimator over one release timeline.
pub struct Estimator<'a> {
    timeline: &'a Timeline,
    window_fraction: f64,
    cold_start: f64,
    verbosity: Verbosity,
}

impl<'a> Estimator<'a> {
    pub fn new(
        timeline: &'a Timeline,
        window_fraction: f64,
        cold_start: f64,
        verbosity: Verbosity,
    ) -> Self {
        Self {
            timeline,
            window_fraction,
            cold_start,
            verbosity,
        }
    }

    /// Settle the affected releases of every usable issue.
    pub fn estimate(&self, descriptors: impl IntoIterator<Item = IssueDescriptor>) -> Estimate {
        let start = Instant::now();
        let mut estimate = Estimate::default();

        let mut dated = Vec::new();
        for descriptor in descriptors {
            match (descriptor.created, descriptor.resolved) {
                (Some(created), Some(resolved)) => dated.push((created, resolved, descriptor)),
                _ => {
                    tracing::debug!(key = %descriptor.key, "skipping issue without dates");
                    estimate.stats.malformed += 1;
                }
            }
        }
        dated.sort_by_key(|(_, resolved, _)| *resolved);

        for (created, resolved, descriptor) in dated {
            let Some(opening) = self.timeline.resolve(created).map(|r| r.index) else {
                tracing::debug!(key = %descriptor.key, "issue opened after last release");
                estimate.stats.unresolvable += 1;
                continue;
            };

            let issue = self.settle(&estimate.issues, descriptor, created, resolved, opening);
            match issue.source {
                Source::Tracker => estimate.stats.from_tracker += 1,
                Source::Proportion => estimate.stats.from_proportion += 1,
            }
            if self.verbosity.detailed() {
                tracing::info!(
                    key = %issue.key,
                    opening = issue.opening,
                    injected = issue.injected,
                    fixed = issue.fixed,
                    source = ?issue.source,
                    "settled issue"
                );
            }
            estimate.issues.push(issue);
        }

        let stats = &estimate.stats;
        let skipped = stats.malformed + stats.unresolvable;
        if self.verbosity.summaries() {
            tracing::info!(
                tracker = stats.from_tracker,
                proportion = stats.from_proportion,
                skipped,
                "defect injection estimate completed in {:?}",
                start.elapsed()
            );
        } else {
            tracing::debug!(
                tracker = stats.from_tracker,
                proportion = stats.from_proportion,
                skipped,
                "defect injection estimate completed in {:?}",
                start.elapsed()
            );
        }
        estimate
    }

    fn settle(
        &self,
        prior: &[ResolvedIssue],
        descriptor: IssueDescriptor,
        created: DateTime<Utc>,
        resolved: DateTime<Utc>,
        opening: usize,
    ) -> ResolvedIssue {
        let mut affected = self.release_indices(&descriptor.affected);
        let mut fixed = self.release_indices(&descriptor.fixed);
        collapse_fixed(&mut affected, &mut fixed);
        let fixed = fixed.first().copied();

        // Consistent tracker data is kept as-is, even when OV == FV.
        if let Some(fv) = fixed.filter(|_| is_consistent(&affected, fixed)) {
            affected.sort_unstable();
            affected.dedup();
            let injected = affected[0];
            return ResolvedIssue {
                key: descriptor.key,
                created,
                resolved,
                opening,
                fixed: fv,
                injected,
                proportion: proportion_of(opening, fv, injected),
                affected,
                source: Source::Tracker,
            };
        }

        let (mut ov, mut fv) = (opening, fixed.unwrap_or(opening));
        if ov > fv {
            std::mem::swap(&mut ov, &mut fv);
        }
        let proportion = if ov == fv {
            1.0
        } else {
            self.window_proportion(prior, ov, fv)
        };
        let injected = injected_index(ov, fv, proportion);

        ResolvedIssue {
            key: descriptor.key,
            created,
            resolved,
            opening: ov,
            fixed: fv,
            injected,
            proportion,
            affected: (injected..=fv).collect(),
            source: Source::Proportion,
        }
    }

    /// Mean proportion over the last `ceil(fraction * k)` resolved issues,
    /// each recomputed against the current issue's `ov` and `fv`.
    fn window_proportion(&self, prior: &[ResolvedIssue], ov: usize, fv: usize) -> f64 {
        let size = (self.window_fraction * prior.len() as f64).ceil() as usize;
        let window = &prior[prior.len() - size.min(prior.len())..];
        if window.is_empty() {
            return self.cold_start;
        }

        let span = (fv - ov) as f64;
        let total: f64 = window
            .iter()
            .map(|j| match j.affected.first() {
                None => self.cold_start,
                Some(&iv) => (fv as f64 - iv as f64) / span,
            })
            .sum();
        total / window.len() as f64
    }

    /// Timeline indices of released, dated tracker versions.
    fn release_indices(&self, versions: &[TrackerVersion]) -> Vec<usize> {
        versions
            .iter()
            .filter(|v| v.released && v.date.is_some())
            .filter_map(|v| {
                v.id.as_deref()
                    .and_then(|id| self.timeline.by_id(id))
                    .or_else(|| v.date.and_then(|d| self.timeline.resolve(d)))
                    .map(|r| r.index)
            })
            .collect()
    }
}

/// Move superseded fixed releases into the affected set until at most one
/// fixed release remains.
pub fn collapse_fixed(affected: &mut Vec<usize>, fixed: &mut Vec<usize>) {
    fixed.sort_unstable();
    fixed.dedup();
    while fixed.len() > 1 {
        let lowest = fixed.remove(0);
        if !affected.contains(&lowest) {
            affected.push(lowest);
        }
    }
}

/// Whether tracker-reported affected releases can be trusted.
///
/// The set must be non-empty and no release in it may come after the fixed
/// release. Without a fixed release nothing is consistent.
pub fn is_consistent(affected: &[usize], fixed: Option<usize>) -> bool {
    let bound = fixed.map_or(-1, |fv| fv as i64);
    !affected.is_empty() && affected.iter().all(|&a| a as i64 <= bound)
}

/// `floor(fv - (fv - ov) * p)`, clamped to `[1, ov]`.
pub fn injected_index(ov: usize, fv: usize, p: f64) -> usize {
    let raw = (fv as f64 - (fv as f64 - ov as f64) * p).floor();
    if raw.is_nan() || raw < 1.0 {
        1
    } else {
        (raw as usize).clamp(1, ov.max(1))
    }
}

/// `(fv - iv) / (fv - ov)`, or 1 for a single-release window.
pub fn proportion_of(ov: usize, fv: usize, iv: usize) -> f64 {
    if fv == ov {
        1.0
    } else {
        (fv as f64 - iv as f64) / (fv as f64 - ov as f64)
    }
}

/// Issues of one reference project, ready for estimation.
pub struct ReferenceRun {
    pub project: String,
    pub timeline: Timeline,
    pub issues: Vec<IssueDescriptor>,
}

/// Cold-start proportion: the mean `P` of every tracker-settled issue with
/// `FV > OV` across the reference projects.
pub fn cold_start_proportion(runs: &[ReferenceRun], window_fraction: f64) -> Result<f64> {
    let mut sum = 0.0;
    let mut count = 0usize;
    for run in runs {
        let estimator = Estimator::new(&run.timeline, window_fraction, 1.0, Verbosity::Quiet);
        let estimate = estimator.estimate(run.issues.iter().cloned());
        let usable: Vec<f64> = estimate
            .issues
            .iter()
            .filter(|i| i.source == Source::Tracker && i.fixed > i.opening)
            .map(|i| i.proportion)
            .collect();
        if usable.is_empty() {
            tracing::warn!(project = %run.project, "reference project contributes no proportion");
            continue;
        }
        tracing::debug!(project = %run.project, issues = usable.len(), "reference proportion");
        sum += usable.iter().sum::<f64>();
        count += usable.len();
    }

    if count == 0 {
        return Err(Error::config(
            "no reference issue with tracker data to compute a cold-start proportion",
        ));
    }
    Ok(sum / count as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::{parse_day, RawRelease};

    fn day(s: &str) -> DateTime<Utc> {
        parse_day(s).unwrap()
    }

    /// Releases 1..=5 on the first of January..May 2020.
    fn timeline() -> Timeline {
        Timeline::new((1..=5).map(|m| RawRelease {
            id: Some(m.to_string()),
            name: Some(format!("1.{m}")),
            date: Some(day(&format!("2020-0{m}-01"))),
        }))
    }

    fn version(index: usize) -> TrackerVersion {
        TrackerVersion {
            id: Some(index.to_string()),
            name: None,
            date: Some(day(&format!("2020-0{index}-01"))),
            released: true,
        }
    }

    fn issue(key: &str, created: &str, resolved: &str, av: &[usize], fv: &[usize]) -> IssueDescriptor {
        IssueDescriptor {
            key: key.to_string(),
            id: None,
            created: Some(day(created)),
            resolved: Some(day(resolved)),
            affected: av.iter().map(|&i| version(i)).collect(),
            fixed: fv.iter().map(|&i| version(i)).collect(),
        }
    }

    fn estimator(timeline: &Timeline, cold_start: f64) -> Estimator<'_> {
        Estimator::new(timeline, 0.01, cold_start, Verbosity::Quiet)
    }

    #[test]
    fn test_collapse_fixed_moves_lower_fixes_to_affected() {
        let mut affected = vec![1];
        let mut fixed = vec![4, 2, 3];
        collapse_fixed(&mut affected, &mut fixed);
        assert_eq!(fixed, vec![4]);
        assert_eq!(affected, vec![1, 2, 3]);

        let mut affected = vec![];
        let mut fixed = vec![2];
        collapse_fixed(&mut affected, &mut fixed);
        assert_eq!(fixed, vec![2]);
        assert!(affected.is_empty());
    }

    #[test]
    fn test_is_consistent() {
        assert!(is_consistent(&[1, 2], Some(2)));
        assert!(!is_consistent(&[1, 3], Some(2)));
        assert!(!is_consistent(&[], Some(2)));
        assert!(!is_consistent(&[1], None));
    }

    #[test]
    fn test_injected_index_truncates_and_clamps() {
        assert_eq!(injected_index(1, 2, 0.42), 1);
        assert_eq!(injected_index(3, 5, 0.5), 3);
        assert_eq!(injected_index(2, 5, 0.5), 2);
        assert_eq!(injected_index(3, 9, 0.5), 3);
        assert_eq!(injected_index(3, 9, 10.0), 1);
        assert_eq!(injected_index(3, 9, -1.0), 3);
    }

    #[test]
    fn test_consistent_tracker_data_accepted() {
        let timeline = timeline();
        let estimate = estimator(&timeline, 0.42).estimate(vec![issue(
            "PROJ-1",
            "2020-02-15",
            "2020-03-15",
            &[2, 3],
            &[4],
        )]);
        let resolved = &estimate.issues[0];
        assert_eq!(resolved.source, Source::Tracker);
        assert_eq!(resolved.affected, vec![2, 3]);
        assert_eq!(resolved.injected, 2);
        assert_eq!(resolved.fixed, 4);
        assert_eq!(resolved.opening, 3);
        assert_eq!(estimate.stats.from_tracker, 1);
    }

    #[test]
    fn test_tracker_data_kept_when_opening_equals_fix() {
        let timeline = timeline();
        let estimate = estimator(&timeline, 0.42).estimate(vec![issue(
            "PROJ-1",
            "2020-02-15",
            "2020-02-20",
            &[1],
            &[3],
        )]);
        let resolved = &estimate.issues[0];
        // Consistent tracker data wins over the single-release window rule.
        assert_eq!(resolved.source, Source::Tracker);
        assert_eq!(resolved.opening, 3);
        assert_eq!(resolved.fixed, 3);
        assert_eq!(resolved.injected, 1);
        assert_eq!(resolved.affected, vec![1]);
        assert_eq!(resolved.proportion, 1.0);
    }

    #[test]
    fn test_cold_start_when_window_empty() {
        let timeline = timeline();
        let estimate = estimator(&timeline, 0.42).estimate(vec![issue(
            "PROJ-1",
            "2019-12-01",
            "2020-01-20",
            &[],
            &[2],
        )]);
        let resolved = &estimate.issues[0];
        assert_eq!(resolved.source, Source::Proportion);
        assert_eq!(resolved.opening, 1);
        assert_eq!(resolved.fixed, 2);
        assert_eq!(resolved.proportion, 0.42);
        // floor(2 - 1 * 0.42) = 1
        assert_eq!(resolved.injected, 1);
        assert_eq!(resolved.affected, vec![1, 2]);
    }

    #[test]
    fn test_single_release_window() {
        let timeline = timeline();
        let estimate = estimator(&timeline, 0.42).estimate(vec![issue(
            "PROJ-1",
            "2020-02-15",
            "2020-02-20",
            &[],
            &[3],
        )]);
        let resolved = &estimate.issues[0];
        assert_eq!(resolved.affected, vec![3]);
        assert_eq!(resolved.proportion, 1.0);
    }

    #[test]
    fn test_missing_fixed_release_uses_opening() {
        let timeline = timeline();
        let estimate =
            estimator(&timeline, 0.42).estimate(vec![issue("PROJ-1", "2020-02-15", "2020-02-20", &[1], &[])]);
        let resolved = &estimate.issues[0];
        assert_eq!(resolved.source, Source::Proportion);
        assert_eq!(resolved.affected, vec![3]);
    }

    #[test]
    fn test_inconsistent_tracker_data_replaced() {
        let timeline = timeline();
        let estimate = estimator(&timeline, 0.5).estimate(vec![issue(
            "PROJ-1",
            "2020-01-15",
            "2020-03-15",
            &[5],
            &[4],
        )]);
        let resolved = &estimate.issues[0];
        assert_eq!(resolved.source, Source::Proportion);
        // OV = 2, FV = 4, IV = floor(4 - 2 * 0.5) = 3, clamped to 2
        assert_eq!(resolved.injected, 2);
        assert_eq!(resolved.affected, vec![2, 3, 4]);
    }

    #[test]
    fn test_opening_after_fix_is_swapped() {
        let timeline = timeline();
        let estimate = estimator(&timeline, 1.0).estimate(vec![issue(
            "PROJ-1",
            "2020-04-15",
            "2020-04-20",
            &[],
            &[2],
        )]);
        let resolved = &estimate.issues[0];
        assert_eq!(resolved.opening, 2);
        assert_eq!(resolved.fixed, 5);
        assert_eq!(resolved.injected, 2);
        assert_eq!(resolved.affected, vec![2, 3, 4, 5]);
    }

    #[test]
    fn test_window_recomputes_against_current_issue() {
        let timeline = timeline();
        let estimate = estimator(&timeline, 9.0).estimate(vec![
            // Tracker-settled: IV = 1.
            issue("PROJ-1", "2020-01-15", "2020-02-10", &[1], &[3]),
            // Window = [PROJ-1]; OV = 3, FV = 5: P = (5 - 1) / (5 - 3) = 2.
            issue("PROJ-2", "2020-02-15", "2020-03-10", &[], &[5]),
        ]);
        let second = &estimate.issues[1];
        assert_eq!(second.source, Source::Proportion);
        assert_eq!(second.proportion, 2.0);
        // floor(5 - 2 * 2) = 1
        assert_eq!(second.injected, 1);
    }

    #[test]
    fn test_skips_malformed_and_unresolvable_issues() {
        let timeline = timeline();
        let mut undated = issue("PROJ-1", "2020-01-01", "2020-01-02", &[], &[]);
        undated.resolved = None;
        let late = issue("PROJ-2", "2020-06-01", "2020-06-02", &[], &[]);
        let estimate = estimator(&timeline, 0.5).estimate(vec![undated, late]);
        assert!(estimate.issues.is_empty());
        assert_eq!(estimate.stats.malformed, 1);
        assert_eq!(estimate.stats.unresolvable, 1);
    }

    #[test]
    fn test_unreleased_versions_ignored() {
        let timeline = timeline();
        let mut descriptor = issue("PROJ-1", "2020-01-15", "2020-02-10", &[1], &[3]);
        descriptor.fixed[0].released = false;
        let estimate = estimator(&timeline, 0.5).estimate(vec![descriptor]);
        assert_eq!(estimate.issues[0].source, Source::Proportion);
    }

    #[test]
    fn test_issues_processed_in_resolution_order() {
        let timeline = timeline();
        let estimate = estimator(&timeline, 0.5).estimate(vec![
            issue("PROJ-2", "2020-01-15", "2020-03-10", &[], &[3]),
            issue("PROJ-1", "2020-01-15", "2020-02-10", &[], &[3]),
        ]);
        let keys: Vec<_> = estimate.issues.iter().map(|i| i.key.as_str()).collect();
        assert_eq!(keys, vec!["PROJ-1", "PROJ-2"]);
    }

    #[test]
    fn test_cold_start_proportion_pools_reference_issues() {
        let timeline = timeline();
        let runs = vec![
            ReferenceRun {
                project: "A".to_string(),
                timeline: timeline.clone(),
                issues: vec![
                    // OV = 3, FV = 5, IV = 1: P = 2
                    issue("A-1", "2020-02-15", "2020-04-10", &[1], &[5]),
                    // OV = FV: excluded
                    issue("A-2", "2020-02-15", "2020-02-20", &[2], &[3]),
                ],
            },
            ReferenceRun {
                project: "B".to_string(),
                timeline,
                issues: vec![
                    // OV = 2, FV = 4, IV = 2: P = 1
                    issue("B-1", "2020-01-15", "2020-03-10", &[2], &[4]),
                ],
            },
        ];
        let p = cold_start_proportion(&runs, 0.01).unwrap();
        assert!((p - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_cold_start_proportion_without_data() {
        let runs = vec![ReferenceRun {
            project: "A".to_string(),
            timeline: timeline(),
            issues: Vec::new(),
        }];
        assert!(cold_start_proportion(&runs, 0.01).is_err());
    }

    #[test]
    fn test_quiet_summary_logged_at_debug() {
        use crate::core::testing::{capture_logs, level_of};

        let timeline = timeline();
        let issues = || vec![issue("PROJ-1", "2020-02-15", "2020-03-15", &[2], &[4])];
        let summary = "defect injection estimate completed";

        let (estimate, logs) = capture_logs(|| estimator(&timeline, 1.0).estimate(issues()));
        assert_eq!(estimate.issues.len(), 1);
        assert_eq!(level_of(&logs, summary), Some("DEBUG"));

        let normal = Estimator::new(&timeline, 0.01, 1.0, Verbosity::Normal);
        let (_, logs) = capture_logs(|| normal.estimate(issues()));
        assert_eq!(level_of(&logs, summary), Some("INFO"));
    }
}
