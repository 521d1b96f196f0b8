//! Staged dataset build.
//!
//! timeline -> history ingestion -> snapshot hydration -> defect injection
//! estimate -> assembly. Every collaborator failure aborts the build before
//! anything is exported.

use std::time::Instant;

use rayon::prelude::*;
use serde::Serialize;

use crate::config::Config;
use crate::core::progress::{create_progress, create_spinner};
use crate::core::{ContentProvider, Error, IssueTracker, Result, VersionControl};
use crate::dataset::{Assembler, Dataset};
use crate::estimator::{cold_start_proportion, Estimate, Estimator, ReferenceRun};
use crate::history::{History, Ingestor, PathFilter, TicketMatcher};
use crate::lineage::{Registry, SnapshotRequest};
use crate::timeline::Timeline;

/// Everything a finished build produced.
pub struct BuildOutput {
    pub project: String,
    pub timeline: Timeline,
    pub registry: Registry,
    pub history: History,
    pub estimate: Estimate,
    /// Cold-start proportion the estimator ran with.
    pub cold_start: f64,
    /// Number of leading releases exported.
    pub selected_releases: usize,
    pub dataset: Dataset,
}

/// Run counters for terminal output.
#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub project: String,
    pub releases: usize,
    pub selected_releases: usize,
    pub commits: usize,
    pub commits_after_last_release: usize,
    pub malformed_commits: usize,
    pub files: usize,
    pub issues: usize,
    pub issues_from_tracker: usize,
    pub issues_from_proportion: usize,
    pub issues_skipped: usize,
    pub cold_start: f64,
    pub records: usize,
    pub buggy: usize,
    pub buggy_ratio: f64,
}

impl BuildOutput {
    pub fn summary(&self) -> Summary {
        let ingest = self.history.stats();
        let estimate = self.estimate.stats;
        let records = self.dataset.len();
        let buggy = self.dataset.buggy_count();
        Summary {
            project: self.project.clone(),
            releases: self.timeline.len(),
            selected_releases: self.selected_releases,
            commits: ingest.commits,
            commits_after_last_release: ingest.after_last_release,
            malformed_commits: ingest.malformed_commits,
            files: self.registry.files().len(),
            issues: self.estimate.issues.len(),
            issues_from_tracker: estimate.from_tracker,
            issues_from_proportion: estimate.from_proportion,
            issues_skipped: estimate.malformed + estimate.unresolvable,
            cold_start: self.cold_start,
            records,
            buggy,
            buggy_ratio: if records == 0 {
                0.0
            } else {
                buggy as f64 / records as f64
            },
        }
    }
}

/// Fetch the release timeline of `project`.
pub fn load_timeline(tracker: &dyn IssueTracker, project: &str) -> Result<Timeline> {
    let spinner = create_spinner("releases", &format!("Fetching {project} versions..."));
    let timeline = Timeline::new(tracker.releases(project)?);
    spinner.finish_and_clear();
    if timeline.is_empty() {
        return Err(Error::EmptyTimeline {
            project: project.to_string(),
        });
    }
    tracing::info!(project, releases = timeline.len(), "release timeline loaded");
    Ok(timeline)
}

/// Compute the cold-start proportion from reference projects.
pub fn compute_cold_start(
    tracker: &dyn IssueTracker,
    projects: &[String],
    window_fraction: f64,
) -> Result<f64> {
    if projects.is_empty() {
        return Err(Error::config(
            "no cold-start proportion configured and no reference projects given",
        ));
    }
    let mut runs = Vec::with_capacity(projects.len());
    for project in projects {
        let timeline = match load_timeline(tracker, project) {
            Ok(timeline) => timeline,
            Err(Error::EmptyTimeline { project }) => {
                tracing::warn!(%project, "reference project has no dated releases");
                continue;
            }
            Err(e) => return Err(e),
        };
        let spinner = create_spinner("cold start", &format!("Fetching {project} issues..."));
        let issues = tracker.resolved_bug_issues(project)?;
        spinner.finish_and_clear();
        runs.push(ReferenceRun {
            project: project.clone(),
            timeline,
            issues,
        });
    }
    let p = cold_start_proportion(&runs, window_fraction)?;
    tracing::info!(projects = runs.len(), proportion = p, "cold-start proportion computed");
    Ok(p)
}

/// Full dataset build over injected collaborators.
pub struct Pipeline<'a> {
    config: &'a Config,
    vcs: &'a dyn VersionControl,
    content: &'a dyn ContentProvider,
    tracker: &'a dyn IssueTracker,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        config: &'a Config,
        vcs: &'a dyn VersionControl,
        content: &'a dyn ContentProvider,
        tracker: &'a dyn IssueTracker,
    ) -> Self {
        Self {
            config,
            vcs,
            content,
            tracker,
        }
    }

    pub fn run(&self) -> Result<BuildOutput> {
        let start = Instant::now();
        let config = self.config;
        config.validate()?;
        let project = config.project.as_str();
        let verbosity = config.verbosity;

        let timeline = load_timeline(self.tracker, project)?;
        let cold_start = match config.estimator.cold_start {
            Some(p) => p,
            None => compute_cold_start(
                self.tracker,
                &config.estimator.reference_projects,
                config.estimator.window_fraction,
            )?,
        };
        let selected = timeline.leading_count(config.releases.percentage);

        let spinner = create_spinner("history", "Reading commit history...");
        let descriptors = self.vcs.commit_history()?;
        spinner.finish_and_clear();

        let mut registry = Registry::new(timeline.len());
        let ingestor = Ingestor::new(
            &timeline,
            PathFilter::new(&config.include, &config.exclude)?,
            TicketMatcher::new(project)?,
            verbosity,
        );
        let history = ingestor.ingest(descriptors, &mut registry);
        registry.seal();

        self.hydrate(&mut registry, &history, selected)?;

        let spinner = create_spinner("issues", &format!("Fetching {project} issues..."));
        let issues = self.tracker.resolved_bug_issues(project)?;
        spinner.finish_and_clear();

        let estimator = Estimator::new(
            &timeline,
            config.estimator.window_fraction,
            cold_start,
            verbosity,
        );
        let estimate = estimator.estimate(issues);

        let dataset =
            Assembler::new(&timeline, &registry, &history, verbosity).assemble(&estimate.issues, selected);

        tracing::info!(
            project,
            records = dataset.len(),
            "dataset build completed in {:?}",
            start.elapsed()
        );

        Ok(BuildOutput {
            project: project.to_string(),
            timeline,
            registry,
            history,
            estimate,
            cold_start,
            selected_releases: selected,
            dataset,
        })
    }

    /// Fetch the content snapshots the exported releases need.
    fn hydrate(&self, registry: &mut Registry, history: &History, through: usize) -> Result<()> {
        let start = Instant::now();
        let mut pending = registry.pending_snapshots();
        pending.retain(|p| p.release <= through);

        let bar = create_progress(pending.len(), "snapshots");
        let content = self.content;
        let fetched = pending
            .into_par_iter()
            .map(|request| -> Result<(SnapshotRequest, Vec<String>)> {
                let sha = &history.commit(request.commit).sha;
                let lines = content.file_content_at(sha, &request.path)?;
                bar.inc(1);
                Ok((request, lines))
            })
            .collect::<Result<Vec<_>>>()?;
        bar.finish_and_clear();

        let count = fetched.len();
        for (request, lines) in fetched {
            registry.hydrate(&request, lines);
        }
        tracing::info!(snapshots = count, "snapshot hydration completed in {:?}", start.elapsed());
        Ok(())
    }
}
