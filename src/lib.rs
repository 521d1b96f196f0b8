//! Defectset - release-level defect prediction datasets from git history
//! and an issue tracker.
//!
//! A build orders the project's releases, replays the commit history into a
//! rename-aware file lineage, estimates the releases each resolved defect
//! affected (falling back to the proportion method when tracker data is
//! missing or inconsistent), and emits one labeled record per file and
//! release.
//!
//! # Example
//!
//! ```no_run
//! use defectset::config::Config;
//! use defectset::git::GitRepo;
//! use defectset::pipeline::Pipeline;
//! use defectset::tracker::JiraClient;
//!
//! let mut config = Config::default();
//! config.project = "BOOKKEEPER".to_string();
//! config.estimator.cold_start = Some(1.8);
//! let repo = GitRepo::open(".").unwrap();
//! let tracker = JiraClient::new(&config.tracker);
//! let build = Pipeline::new(&config, &repo, &repo, &tracker).run().unwrap();
//! println!("{} records, {} buggy", build.dataset.len(), build.dataset.buggy_count());
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod dataset;
pub mod estimator;
pub mod git;
pub mod history;
pub mod lineage;
pub mod output;
pub mod pipeline;
pub mod timeline;
pub mod tracker;

pub use core::{ContentProvider, Error, IssueTracker, Result, VersionControl};
