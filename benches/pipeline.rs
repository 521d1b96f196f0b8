//! Benchmarks for the dataset build stages over synthetic histories.
//!
//! Run with: cargo bench
//! Run one stage: cargo bench -- ingest

use chrono::{DateTime, Duration, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use defectset::config::Verbosity;
use defectset::dataset::Assembler;
use defectset::estimator::{Estimator, IssueDescriptor, TrackerVersion};
use defectset::history::{CommitDescriptor, FileEntry, Ingestor, PathFilter, TicketMatcher};
use defectset::lineage::Registry;
use defectset::timeline::{parse_day, RawRelease, Timeline};

const RELEASES: usize = 20;

fn base() -> DateTime<Utc> {
    parse_day("2015-01-01").expect("valid date")
}

/// Releases every 30 days.
fn timeline() -> Timeline {
    Timeline::new((1..=RELEASES).map(|i| RawRelease {
        id: Some(i.to_string()),
        name: Some(format!("1.{i}")),
        date: Some(base() + Duration::days(30 * i as i64)),
    }))
}

/// Deterministic mix of adds, modifications, renames and deletions.
fn commits(count: usize, files: usize) -> Vec<CommitDescriptor> {
    let span = 30 * RELEASES as i64;
    (0..count)
        .map(|i| {
            let path = format!("src/pkg{}/File{}.java", i % 7, i % files);
            let entry = match i % 23 {
                0 => FileEntry::renamed(&path, &format!("src/moved/File{}.java", i % files), 2, 1),
                11 => FileEntry::deleted(&path, 10),
                n if n % 5 == 0 => FileEntry::added(&path, 40),
                _ => FileEntry::modified(&path, (i % 17) as u64, (i % 5) as u64),
            };
            CommitDescriptor {
                sha: format!("{i:040x}"),
                author: format!("dev{}", i % 11),
                date: Some(base() + Duration::days(i as i64 * span / count as i64)),
                message: format!("PROJ-{} change", i % 200 + 1),
                files: vec![entry],
            }
        })
        .collect()
}

fn issues(count: usize) -> Vec<IssueDescriptor> {
    (0..count)
        .map(|i| {
            let created = base() + Duration::days((i * 7 % 550) as i64);
            let fixed = (i * 7 % 550) / 30 + 2;
            IssueDescriptor {
                key: format!("PROJ-{}", i + 1),
                id: None,
                created: Some(created),
                resolved: Some(created + Duration::days(20)),
                affected: Vec::new(),
                fixed: vec![TrackerVersion {
                    id: Some(fixed.min(RELEASES).to_string()),
                    name: None,
                    date: Some(base() + Duration::days(30 * fixed.min(RELEASES) as i64)),
                    released: true,
                }],
            }
        })
        .collect()
}

fn bench_ingest(c: &mut Criterion) {
    let timeline = timeline();
    let mut group = c.benchmark_group("ingest");
    for count in [1_000, 10_000] {
        let descriptors = commits(count, count / 10);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &descriptors, |b, d| {
            b.iter(|| {
                let mut registry = Registry::new(timeline.len());
                let ingestor = Ingestor::new(
                    &timeline,
                    PathFilter::all(),
                    TicketMatcher::new("PROJ").expect("valid project"),
                    Verbosity::Quiet,
                );
                let history = ingestor.ingest(d.clone(), &mut registry);
                registry.seal();
                black_box(history.commits().len())
            })
        });
    }
    group.finish();
}

fn bench_estimate(c: &mut Criterion) {
    let timeline = timeline();
    let mut group = c.benchmark_group("estimate");
    for count in [200, 2_000] {
        let descriptors = issues(count);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &descriptors, |b, d| {
            b.iter(|| {
                let estimator = Estimator::new(&timeline, 0.01, 1.5, Verbosity::Quiet);
                black_box(estimator.estimate(d.clone()).issues.len())
            })
        });
    }
    group.finish();
}

fn bench_assemble(c: &mut Criterion) {
    let timeline = timeline();
    let mut registry = Registry::new(timeline.len());
    let ingestor = Ingestor::new(
        &timeline,
        PathFilter::all(),
        TicketMatcher::new("PROJ").expect("valid project"),
        Verbosity::Quiet,
    );
    let history = ingestor.ingest(commits(10_000, 1_000), &mut registry);
    registry.seal();
    let estimate = Estimator::new(&timeline, 0.01, 1.5, Verbosity::Quiet).estimate(issues(200));

    c.bench_function("assemble", |b| {
        b.iter(|| {
            let assembler = Assembler::new(&timeline, &registry, &history, Verbosity::Quiet);
            black_box(assembler.assemble(&estimate.issues, RELEASES).len())
        })
    });
}

criterion_group!(benches, bench_ingest, bench_estimate, bench_assemble);
criterion_main!(benches);
