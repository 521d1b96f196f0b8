//! Jira-backed issue-tracker collaborator.
//!
//! Uses the Jira REST API v2: project versions become releases, and a
//! paginated JQL search yields the resolved defects.

use serde::Deserialize;

use crate::config::TrackerConfig;
use crate::core::{Error, IssueTracker, Result};
use crate::estimator::{IssueDescriptor, TrackerVersion};
use crate::timeline::{parse_day, RawRelease};

/// Blocking Jira REST client.
pub struct JiraClient {
    client: reqwest::blocking::Client,
    base_url: String,
    page_size: usize,
    issue_type: String,
}

impl JiraClient {
    pub fn new(config: &TrackerConfig) -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            page_size: config.page_size,
            issue_type: config.issue_type.clone(),
        }
    }

    fn get<T: for<'de> Deserialize<'de>>(&self, url: &str, query: &[(&str, String)]) -> Result<T> {
        let url = reqwest::Url::parse_with_params(url, query)
            .map_err(|e| Error::tracker(format!("Invalid Jira URL {url}: {e}")))?;
        let response = self
            .client
            .get(url.clone())
            .header("Accept", "application/json")
            .send()
            .map_err(|e| Error::tracker(format!("Jira request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(Error::tracker(format!(
                "Jira returned {status} for {url}: {body}"
            )));
        }

        response
            .json()
            .map_err(|e| Error::tracker(format!("Failed to parse Jira response: {e}")))
    }

    fn search_jql(&self, project: &str) -> String {
        format!(
            "project = \"{project}\" AND issuetype = \"{}\" AND status in (Closed, Resolved) \
             AND resolution = Fixed ORDER BY resolutiondate ASC",
            self.issue_type
        )
    }
}

impl IssueTracker for JiraClient {
    fn releases(&self, project: &str) -> Result<Vec<RawRelease>> {
        let url = format!("{}/rest/api/2/project/{project}", self.base_url);
        let project: JiraProject = self.get(&url, &[])?;
        Ok(project
            .versions
            .into_iter()
            .map(|v| RawRelease {
                id: v.id,
                name: v.name,
                date: v.release_date.as_deref().and_then(parse_day),
            })
            .collect())
    }

    fn resolved_bug_issues(&self, project: &str) -> Result<Vec<IssueDescriptor>> {
        let url = format!("{}/rest/api/2/search", self.base_url);
        let jql = self.search_jql(project);
        let mut issues = Vec::new();
        let mut start_at = 0;

        loop {
            let page: SearchPage = self.get(
                &url,
                &[
                    ("jql", jql.clone()),
                    ("fields", "key,resolutiondate,versions,fixVersions,created".to_string()),
                    ("startAt", start_at.to_string()),
                    ("maxResults", self.page_size.to_string()),
                ],
            )?;

            let fetched = page.issues.len();
            issues.extend(page.issues.into_iter().map(JiraIssue::into_descriptor));
            start_at += fetched;
            tracing::debug!(project, fetched = start_at, total = page.total, "fetched issue page");

            if fetched == 0 || start_at >= page.total {
                break;
            }
        }
        Ok(issues)
    }
}

#[derive(Debug, Deserialize)]
struct JiraProject {
    #[serde(default)]
    versions: Vec<JiraVersion>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JiraVersion {
    id: Option<String>,
    name: Option<String>,
    release_date: Option<String>,
    #[serde(default)]
    released: bool,
}

impl From<JiraVersion> for TrackerVersion {
    fn from(v: JiraVersion) -> Self {
        Self {
            id: v.id,
            name: v.name,
            date: v.release_date.as_deref().and_then(parse_day),
            released: v.released,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchPage {
    #[serde(default)]
    total: usize,
    #[serde(default)]
    issues: Vec<JiraIssue>,
}

#[derive(Debug, Deserialize)]
struct JiraIssue {
    key: String,
    id: Option<String>,
    fields: JiraFields,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JiraFields {
    created: Option<String>,
    resolutiondate: Option<String>,
    #[serde(default)]
    versions: Vec<JiraVersion>,
    #[serde(default)]
    fix_versions: Vec<JiraVersion>,
}

impl JiraIssue {
    fn into_descriptor(self) -> IssueDescriptor {
        IssueDescriptor {
            key: self.key,
            id: self.id,
            created: self.fields.created.as_deref().and_then(parse_day),
            resolved: self.fields.resolutiondate.as_deref().and_then(parse_day),
            affected: self.fields.versions.into_iter().map(Into::into).collect(),
            fixed: self.fields.fix_versions.into_iter().map(Into::into).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_project_versions() {
        let json = r#"{
            "key": "PROJ",
            "versions": [
                {"id": "10010", "name": "4.0.0", "releaseDate": "2012-06-06", "released": true},
                {"id": "10011", "name": "4.1.0", "released": false}
            ]
        }"#;
        let project: JiraProject = serde_json::from_str(json).unwrap();
        assert_eq!(project.versions.len(), 2);
        let version: TrackerVersion = project.versions.into_iter().next().unwrap().into();
        assert!(version.released);
        assert_eq!(version.date, parse_day("2012-06-06"));
    }

    #[test]
    fn test_parse_search_page() {
        let json = r#"{
            "startAt": 0,
            "maxResults": 1000,
            "total": 1,
            "issues": [{
                "id": "123",
                "key": "PROJ-7",
                "fields": {
                    "created": "2012-05-03T10:11:12.000+0000",
                    "resolutiondate": "2012-07-01T08:00:00.000+0000",
                    "versions": [{"id": "10010", "name": "4.0.0", "releaseDate": "2012-06-06", "released": true}],
                    "fixVersions": []
                }
            }]
        }"#;
        let page: SearchPage = serde_json::from_str(json).unwrap();
        assert_eq!(page.total, 1);
        let issue = page.issues.into_iter().next().unwrap().into_descriptor();
        assert_eq!(issue.key, "PROJ-7");
        assert_eq!(issue.created, parse_day("2012-05-03"));
        assert_eq!(issue.resolved, parse_day("2012-07-01"));
        assert_eq!(issue.affected.len(), 1);
        assert!(issue.fixed.is_empty());
    }

    #[test]
    fn test_search_jql() {
        let client = JiraClient::new(&TrackerConfig::default());
        let jql = client.search_jql("BOOKKEEPER");
        assert!(jql.starts_with("project = \"BOOKKEEPER\" AND issuetype = \"Bug\""));
        assert!(jql.contains("resolution = Fixed"));
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let config = TrackerConfig {
            base_url: "https://jira.example.org/".to_string(),
            ..TrackerConfig::default()
        };
        assert_eq!(JiraClient::new(&config).base_url, "https://jira.example.org");
    }

    #[test]
    fn test_unreachable_tracker_is_error() {
        let config = TrackerConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            ..TrackerConfig::default()
        };
        let result = JiraClient::new(&config).releases("PROJ");
        assert!(matches!(result, Err(Error::Tracker(_))));
    }
}
