//! Release timeline.
//!
//! Releases are sorted by date and numbered `1..=N`. Every other stage
//! attributes commits and issues to releases through [`Timeline::resolve`]:
//! a timestamp belongs to the earliest release dated at or after it, i.e.
//! the first release that would ship the change.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A release as reported by the issue tracker, before indexing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRelease {
    /// Tracker identifier.
    pub id: Option<String>,
    /// Human-readable name (e.g. `4.2.0`).
    pub name: Option<String>,
    /// Release date.
    pub date: Option<DateTime<Utc>>,
}

/// An indexed release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    /// 1-based chronological index.
    pub index: usize,
    /// Tracker identifier.
    pub id: String,
    /// Release name.
    pub name: String,
    /// Release date.
    pub date: DateTime<Utc>,
}

/// Ordered, immutable list of releases.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Timeline {
    releases: Vec<Release>,
}

impl Timeline {
    /// Build a timeline from tracker releases.
    ///
    /// Undated releases cannot be placed and are dropped, as are releases
    /// sharing a date with an earlier one so that dates strictly increase
    /// with the index.
    pub fn new(raw: impl IntoIterator<Item = RawRelease>) -> Self {
        let mut dated: Vec<(DateTime<Utc>, String, String)> = raw
            .into_iter()
            .filter_map(|r| {
                let date = r.date?;
                let id = r.id.unwrap_or_default();
                let name = r.name.unwrap_or_else(|| id.clone());
                Some((date, id, name))
            })
            .collect();

        dated.sort_by_key(|(date, _, _)| *date);
        dated.dedup_by_key(|(date, _, _)| *date);

        let releases = dated
            .into_iter()
            .enumerate()
            .map(|(i, (date, id, name))| Release {
                index: i + 1,
                id,
                name,
                date,
            })
            .collect();

        Self { releases }
    }

    /// Number of releases.
    pub fn len(&self) -> usize {
        self.releases.len()
    }

    /// Whether the timeline has no releases.
    pub fn is_empty(&self) -> bool {
        self.releases.is_empty()
    }

    /// All releases in index order.
    pub fn releases(&self) -> &[Release] {
        &self.releases
    }

    /// Earliest release dated at or after `timestamp`.
    ///
    /// Returns `None` for timestamps after the last release.
    pub fn resolve(&self, timestamp: DateTime<Utc>) -> Option<&Release> {
        let pos = self.releases.partition_point(|r| r.date < timestamp);
        self.releases.get(pos)
    }

    /// Release with the given 1-based index.
    pub fn by_index(&self, index: usize) -> Option<&Release> {
        index.checked_sub(1).and_then(|i| self.releases.get(i))
    }

    /// Release with the given tracker id.
    pub fn by_id(&self, id: &str) -> Option<&Release> {
        self.releases.iter().find(|r| r.id == id)
    }

    /// Whole weeks elapsed between two releases (0 if either is unknown or
    /// `to` precedes `from`).
    pub fn weeks_between(&self, from: usize, to: usize) -> i64 {
        match (self.by_index(from), self.by_index(to)) {
            (Some(a), Some(b)) => (b.date - a.date).num_weeks().max(0),
            _ => 0,
        }
    }

    /// Number of leading releases covered by `percentage` of the timeline.
    ///
    /// Always at least one release for a non-empty timeline.
    pub fn leading_count(&self, percentage: u8) -> usize {
        if self.releases.is_empty() {
            return 0;
        }
        let count = (f64::from(percentage) / 100.0 * self.releases.len() as f64) as usize;
        count.clamp(1, self.releases.len())
    }
}

/// Midnight UTC of a calendar day.
pub fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc())
        .unwrap_or_default()
}

/// Parse the `YYYY-MM-DD` prefix of a tracker timestamp.
pub fn parse_day(value: &str) -> Option<DateTime<Utc>> {
    let day = value.get(..10)?;
    NaiveDate::parse_from_str(day, "%Y-%m-%d")
        .ok()
        .map(start_of_day)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> DateTime<Utc> {
        parse_day(s).unwrap()
    }

    fn raw(id: &str, name: &str, date: &str) -> RawRelease {
        RawRelease {
            id: Some(id.to_string()),
            name: Some(name.to_string()),
            date: Some(day(date)),
        }
    }

    fn sample() -> Timeline {
        Timeline::new(vec![
            raw("3", "1.2", "2020-03-01"),
            raw("1", "1.0", "2020-01-01"),
            raw("2", "1.1", "2020-02-01"),
        ])
    }

    #[test]
    fn test_indices_follow_dates() {
        let timeline = sample();
        let names: Vec<_> = timeline.releases().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["1.0", "1.1", "1.2"]);
        let indices: Vec<_> = timeline.releases().iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![1, 2, 3]);
    }

    #[test]
    fn test_undated_releases_dropped() {
        let timeline = Timeline::new(vec![
            raw("1", "1.0", "2020-01-01"),
            RawRelease {
                id: Some("2".to_string()),
                name: Some("next".to_string()),
                date: None,
            },
            RawRelease::default(),
        ]);
        assert_eq!(timeline.len(), 1);
    }

    #[test]
    fn test_missing_name_falls_back_to_id() {
        let timeline = Timeline::new(vec![RawRelease {
            id: Some("10010".to_string()),
            name: None,
            date: Some(day("2020-01-01")),
        }]);
        assert_eq!(timeline.by_index(1).unwrap().name, "10010");
    }

    #[test]
    fn test_same_day_releases_collapse() {
        let timeline = Timeline::new(vec![
            raw("1", "4.0.0", "2020-01-01"),
            raw("2", "3.9.1", "2020-01-01"),
            raw("3", "4.1.0", "2020-02-01"),
        ]);
        assert_eq!(timeline.len(), 2);
        assert_eq!(timeline.by_index(1).unwrap().name, "4.0.0");
        assert_eq!(timeline.by_index(2).unwrap().name, "4.1.0");
    }

    #[test]
    fn test_resolve_picks_earliest_release_on_or_after() {
        let timeline = sample();
        assert_eq!(timeline.resolve(day("2019-12-15")).unwrap().index, 1);
        assert_eq!(timeline.resolve(day("2020-01-01")).unwrap().index, 1);
        assert_eq!(timeline.resolve(day("2020-01-02")).unwrap().index, 2);
        assert_eq!(timeline.resolve(day("2020-03-01")).unwrap().index, 3);
        assert!(timeline.resolve(day("2020-03-02")).is_none());
    }

    #[test]
    fn test_by_index_bounds() {
        let timeline = sample();
        assert!(timeline.by_index(0).is_none());
        assert_eq!(timeline.by_index(3).unwrap().name, "1.2");
        assert!(timeline.by_index(4).is_none());
        assert_eq!(timeline.by_id("2").unwrap().index, 2);
    }

    #[test]
    fn test_weeks_between() {
        let timeline = Timeline::new(vec![
            raw("1", "a", "2020-01-01"),
            raw("2", "b", "2020-01-31"),
        ]);
        assert_eq!(timeline.weeks_between(1, 2), 4);
        assert_eq!(timeline.weeks_between(2, 1), 0);
        assert_eq!(timeline.weeks_between(1, 9), 0);
    }

    #[test]
    fn test_leading_count() {
        let timeline = sample();
        assert_eq!(timeline.leading_count(50), 1);
        assert_eq!(timeline.leading_count(67), 2);
        assert_eq!(timeline.leading_count(100), 3);
        assert_eq!(Timeline::default().leading_count(50), 0);
    }

    #[test]
    fn test_parse_day_accepts_tracker_timestamps() {
        let ts = parse_day("2012-05-03T10:11:12.000+0000").unwrap();
        assert_eq!(ts, day("2012-05-03"));
        assert!(parse_day("05/03/2012").is_none());
        assert!(parse_day("2012").is_none());
    }
}
