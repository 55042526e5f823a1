use crate::config::FlowConfig;
use crate::jira::client::{JiraApi, JiraError, SearchRequest};
use crate::jira::issues::{
    AssigneeChange, IssueHistory, JiraIssue, StatusTransition, parse_jira_timestamp,
};
use serde_json::Value;

const PAGE_SIZE: u64 = 100;

/// Builds the sprint query. Numeric sprint ids are used verbatim, names are quoted.
pub fn build_jql(sprint: &str, statuses: &[String]) -> String {
    let sprint = sprint.trim();
    let sprint_clause = if !sprint.is_empty() && sprint.chars().all(|c| c.is_ascii_digit()) {
        sprint.to_string()
    } else {
        quote_jql(sprint)
    };

    if statuses.is_empty() {
        return format!("Sprint = {sprint_clause}");
    }

    let status_list = statuses
        .iter()
        .map(|s| quote_jql(s))
        .collect::<Vec<_>>()
        .join(", ");
    format!("Sprint = {sprint_clause} AND status IN ({status_list})")
}

fn quote_jql(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

pub fn search_fields(config: &FlowConfig) -> Vec<String> {
    let mut fields: Vec<String> = [
        "summary",
        "status",
        "assignee",
        "issuetype",
        "priority",
        "created",
    ]
    .iter()
    .map(|f| f.to_string())
    .collect();
    for custom in [
        &config.fields.story_points,
        &config.fields.project_code,
        &config.fields.team,
    ] {
        if !custom.is_empty() && !fields.contains(custom) {
            fields.push(custom.clone());
        }
    }
    fields
}

/// Reads a display string out of a Jira field that may be a plain string or an
/// object such as `{"name": ...}`, `{"value": ...}` or `{"displayName": ...}`.
fn field_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => Some(s.as_str()),
        Value::Object(map) => ["displayName", "name", "value"]
            .iter()
            .find_map(|k| map.get(*k).and_then(Value::as_str)),
        _ => None,
    }?;
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// Parses one search result. Results without a key are skipped by the caller.
pub fn parse_jira_issue(issue: &Value, config: &FlowConfig) -> Option<JiraIssue> {
    let key = issue["key"].as_str()?.to_string();
    let fields = &issue["fields"];

    let story_points = match &fields[config.fields.story_points.as_str()] {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    Some(JiraIssue {
        key,
        title: fields["summary"].as_str().unwrap_or_default().to_string(),
        status: field_text(&fields["status"]).unwrap_or_default(),
        assignee: field_text(&fields["assignee"]),
        issue_type: field_text(&fields["issuetype"]).unwrap_or_default(),
        priority: field_text(&fields["priority"]).unwrap_or_default(),
        created: fields["created"].as_str().and_then(parse_jira_timestamp),
        story_points,
        project_code: field_text(&fields[config.fields.project_code.as_str()]),
        team: field_text(&fields[config.fields.team.as_str()]),
        transitions: Vec::new(),
        assignee_changes: Vec::new(),
    })
}

pub fn parse_jira_issues(issues_json: &[Value], config: &FlowConfig) -> Vec<JiraIssue> {
    issues_json
        .iter()
        .filter_map(|issue| parse_jira_issue(issue, config))
        .collect()
}

/// Extracts status and assignee changes from changelog entries, in the order
/// Jira returned them. Entries without a readable timestamp are dropped.
pub fn parse_changelog(entries: &[Value]) -> IssueHistory {
    let mut history = IssueHistory::default();

    for entry in entries {
        let Some(at) = entry["created"].as_str().and_then(parse_jira_timestamp) else {
            continue;
        };
        let actor = field_text(&entry["author"]);
        let Some(items) = entry["items"].as_array() else {
            continue;
        };

        for item in items {
            let from = item["fromString"].as_str().map(str::to_string);
            let to = item["toString"].as_str().map(str::to_string);
            match item["field"].as_str() {
                Some("status") => {
                    if let Some(to) = to {
                        history.transitions.push(StatusTransition {
                            from,
                            to,
                            at,
                            actor: actor.clone(),
                        });
                    }
                }
                Some("assignee") => history.assignee_changes.push(AssigneeChange { from, to, at }),
                _ => {}
            }
        }
    }

    history
}

fn page_array<'a>(page: &'a Value, field: &str) -> Result<&'a Vec<Value>, JiraError> {
    page[field]
        .as_array()
        .ok_or_else(|| JiraError::Decode(format!("missing `{field}` array in page")))
}

pub async fn fetch_issue_values<A: JiraApi>(
    api: &A,
    jql: &str,
    fields: Vec<String>,
) -> Result<Vec<Value>, JiraError> {
    let mut request = SearchRequest {
        jql: jql.to_string(),
        fields,
        start_at: 0,
        max_results: PAGE_SIZE,
        next_page_token: None,
    };
    let mut all_issues = Vec::new();

    loop {
        let page = api.search_page(&request).await?;
        let issues = page_array(&page, "issues")?;
        let count = issues.len() as u64;
        all_issues.extend(issues.iter().cloned());
        tracing::debug!(fetched = all_issues.len(), "search page received");

        if count == 0 || page["isLast"].as_bool() == Some(true) {
            break;
        }
        let next_start = request.start_at + count;
        if let Some(token) = page["nextPageToken"].as_str() {
            request.next_page_token = Some(token.to_string());
            request.start_at = next_start;
            continue;
        }
        match page["total"].as_u64() {
            Some(total) if next_start < total => request.start_at = next_start,
            _ => break,
        }
    }

    Ok(all_issues)
}

pub async fn fetch_changelog_values<A: JiraApi>(
    api: &A,
    issue_key: &str,
) -> Result<Vec<Value>, JiraError> {
    let mut start_at = 0;
    let mut entries = Vec::new();

    loop {
        let page = api.changelog_page(issue_key, start_at, PAGE_SIZE).await?;
        let values = page_array(&page, "values")?;
        let count = values.len() as u64;
        entries.extend(values.iter().cloned());

        if count == 0 {
            break;
        }
        start_at += count;
        let more = match (page["isLast"].as_bool(), page["total"].as_u64()) {
            (Some(is_last), _) => !is_last,
            (None, Some(total)) => start_at < total,
            (None, None) => false,
        };
        if !more {
            break;
        }
    }

    Ok(entries)
}

/// Fetches the sprint's issues with their changelogs.
///
/// A changelog that cannot be read leaves that issue with an empty history;
/// credential and network failures abort the whole fetch.
pub async fn fetch_sprint_issues<A: JiraApi>(
    api: &A,
    config: &FlowConfig,
    sprint: &str,
) -> Result<Vec<JiraIssue>, JiraError> {
    let jql = build_jql(sprint, &config.statuses.filter);
    let issues_json = fetch_issue_values(api, &jql, search_fields(config)).await?;
    let mut issues = parse_jira_issues(&issues_json, config);
    tracing::info!(sprint, count = issues.len(), "fetched sprint issues");

    for issue in issues.iter_mut() {
        let history = match fetch_changelog_values(api, &issue.key).await {
            Ok(entries) => parse_changelog(&entries),
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => {
                tracing::warn!(
                    issue = %issue.key,
                    error = %err,
                    "changelog unavailable, using empty history"
                );
                IssueHistory::default()
            }
        };
        issue.transitions = history.transitions;
        issue.assignee_changes = history.assignee_changes;
    }

    Ok(issues)
}
