use crate::changelog::{ChangelogSummary, summarize};
use crate::config::FlowConfig;
use crate::jira::client::{JiraApi, JiraError};
use crate::jira::fetch::fetch_sprint_issues;
use crate::jira::issues::{JiraIssue, Timestamp};
use crate::metrics::{IssueMetrics, compute};

#[derive(Debug, Clone, PartialEq)]
pub struct IssueReport {
    pub issue: JiraIssue,
    pub changelog: ChangelogSummary,
    pub metrics: IssueMetrics,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportSummary {
    pub issue_count: usize,
    pub done_count: usize,
    /// Means over issues that reached a done status
    pub mean_cycle_time: Option<f64>,
    pub mean_lead_time: Option<f64>,
    /// Mean over issues whose flow efficiency is defined
    pub mean_flow_efficiency: Option<f64>,
    pub total_blocked_days: f64,
    pub total_story_points: f64,
}

/// Metrics of one sprint fetch. Periods still open were closed at `as_of`.
#[derive(Debug, Clone, PartialEq)]
pub struct SprintReport {
    pub sprint: String,
    pub as_of: Timestamp,
    pub issues: Vec<IssueReport>,
    pub summary: ReportSummary,
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}

pub fn summarize_report(issues: &[IssueReport]) -> ReportSummary {
    let done = || issues.iter().filter(|r| r.metrics.done.is_some());

    ReportSummary {
        issue_count: issues.len(),
        done_count: done().count(),
        mean_cycle_time: mean(done().map(|r| r.metrics.cycle_time)),
        mean_lead_time: mean(done().map(|r| r.metrics.lead_time)),
        mean_flow_efficiency: mean(issues.iter().filter_map(|r| r.metrics.flow_efficiency)),
        total_blocked_days: issues.iter().map(|r| r.metrics.blocked_days).sum(),
        total_story_points: issues.iter().filter_map(|r| r.issue.story_points).sum(),
    }
}

pub fn build_report(
    sprint: &str,
    issues: Vec<JiraIssue>,
    config: &FlowConfig,
    as_of: Timestamp,
) -> SprintReport {
    let issues: Vec<IssueReport> = issues
        .into_iter()
        .map(|issue| {
            let changelog = summarize(&issue, &config.statuses, as_of);
            let metrics = compute(&issue, &changelog, config);
            IssueReport {
                issue,
                changelog,
                metrics,
            }
        })
        .collect();

    SprintReport {
        sprint: sprint.trim().to_string(),
        as_of,
        summary: summarize_report(&issues),
        issues,
    }
}

/// Fetches the sprint from Jira and computes its report.
pub async fn fetch_report<A: JiraApi>(
    api: &A,
    config: &FlowConfig,
    sprint: &str,
    as_of: Timestamp,
) -> Result<SprintReport, JiraError> {
    let issues = fetch_sprint_issues(api, config, sprint).await?;
    let report = build_report(sprint, issues, config, as_of);
    tracing::info!(
        sprint = %report.sprint,
        issues = report.summary.issue_count,
        done = report.summary.done_count,
        "sprint report ready"
    );
    Ok(report)
}
