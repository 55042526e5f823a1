use chrono::{DateTime, FixedOffset};

pub type Timestamp = DateTime<FixedOffset>;

#[derive(Debug, Clone, PartialEq)]
pub struct JiraIssue {
    pub key: String,
    pub title: String,
    pub status: String,
    pub assignee: Option<String>,
    pub issue_type: String,
    pub priority: String,
    pub created: Option<Timestamp>,
    pub story_points: Option<f64>,
    pub project_code: Option<String>,
    pub team: Option<String>,
    pub transitions: Vec<StatusTransition>,
    pub assignee_changes: Vec<AssigneeChange>,
}

/// One status change taken from the issue changelog.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusTransition {
    pub from: Option<String>,
    pub to: String,
    pub at: Timestamp,
    pub actor: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssigneeChange {
    pub from: Option<String>,
    pub to: Option<String>,
    pub at: Timestamp,
}

/// Changelog of a single issue, split by the fields the metrics care about.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IssueHistory {
    pub transitions: Vec<StatusTransition>,
    pub assignee_changes: Vec<AssigneeChange>,
}

/// Parses the timestamp formats Jira Cloud emits, e.g. `2024-01-15T10:30:00.000+0000`.
pub fn parse_jira_timestamp(raw: &str) -> Option<Timestamp> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z")
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .ok()
}
