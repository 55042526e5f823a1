use crate::changelog::{
    ChangelogSummary, days_between, earliest_entry, round2, time_in_status, time_in_status_within,
};
use crate::config::FlowConfig;
use crate::jira::issues::{JiraIssue, Timestamp};
use chrono::{Datelike, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    Us,
    International,
}

impl Region {
    pub fn as_str(&self) -> &'static str {
        match self {
            Region::Us => "US",
            Region::International => "International",
        }
    }
}

/// Flow metrics of one issue. Durations are days rounded to two decimals and
/// are zero when an endpoint is missing.
#[derive(Debug, Clone, PartialEq)]
pub struct IssueMetrics {
    pub started: Option<Timestamp>,
    pub done: Option<Timestamp>,
    pub cycle_time: f64,
    pub lead_time: f64,
    pub ramp_time: f64,
    /// Started until the first entry into peer review
    pub in_progress_time: f64,
    pub pr_time: f64,
    pub unassigned_pr_time: f64,
    pub active_pr_time: f64,
    /// First entry into pending deployment until done
    pub pd_time: f64,
    pub blocked_days: f64,
    /// Blocked days between started and done
    pub blocked_in_cycle: f64,
    /// `None` when the cycle time is zero
    pub flow_efficiency: Option<f64>,
    pub region: Region,
    pub customer: String,
    pub year: Option<i32>,
}

fn span_days(start: Option<Timestamp>, end: Option<Timestamp>) -> f64 {
    match (start, end) {
        (Some(start), Some(end)) => round2(days_between(start, end)),
        _ => 0.0,
    }
}

/// Share of the cycle time that was not spent blocked, within `0..=1`.
pub fn flow_efficiency(cycle_time: f64, blocked_in_cycle: f64) -> Option<f64> {
    if cycle_time == 0.0 {
        None
    } else {
        Some((cycle_time - blocked_in_cycle.clamp(0.0, cycle_time)) / cycle_time)
    }
}

/// Issue-key prefix, e.g. `ABC` for `ABC-123`.
pub fn customer(key: &str) -> String {
    key.split_once('-')
        .map(|(prefix, _)| prefix.to_string())
        .unwrap_or_default()
}

pub fn region(team: Option<&str>, us_teams: &[String]) -> Region {
    match team {
        Some(team) if us_teams.iter().any(|t| t.eq_ignore_ascii_case(team)) => Region::Us,
        _ => Region::International,
    }
}

pub fn compute(issue: &JiraIssue, summary: &ChangelogSummary, config: &FlowConfig) -> IssueMetrics {
    let started = earliest_entry(&summary.first_entered, &config.statuses.in_progress);
    let done = earliest_entry(&summary.first_entered, &config.statuses.done);

    let peer_review = earliest_entry(
        &summary.first_entered,
        std::slice::from_ref(&config.statuses.peer_review),
    );
    let pending_deployment = earliest_entry(
        &summary.first_entered,
        std::slice::from_ref(&config.statuses.pending_deployment),
    );

    let cycle_time = span_days(started, done);
    let pr_time = round2(time_in_status(&summary.periods, &config.statuses.peer_review));
    let blocked_days = summary.blocked_days;
    let blocked_in_cycle = match (started, done) {
        (Some(started), Some(done)) => round2(time_in_status_within(
            &summary.periods,
            &config.statuses.blocked,
            started,
            done,
        )),
        _ => 0.0,
    };

    IssueMetrics {
        started,
        done,
        cycle_time,
        lead_time: span_days(issue.created, done),
        ramp_time: span_days(issue.created, started),
        in_progress_time: span_days(started, peer_review),
        pr_time,
        unassigned_pr_time: summary.unassigned_review_days,
        active_pr_time: round2(pr_time - summary.unassigned_review_days),
        pd_time: span_days(pending_deployment, done),
        blocked_days,
        blocked_in_cycle,
        flow_efficiency: flow_efficiency(cycle_time, blocked_in_cycle),
        region: region(issue.team.as_deref(), &config.us_teams),
        customer: customer(&issue.key),
        year: done.map(|d| d.with_timezone(&Utc).year()),
    }
}
