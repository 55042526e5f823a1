use crate::config::StatusNames;
use crate::jira::issues::{AssigneeChange, JiraIssue, StatusTransition, Timestamp};
use std::collections::BTreeMap;

const MILLIS_PER_DAY: f64 = 86_400_000.0;

fn round6(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}

/// Fractional days from `start` to `end`, kept to six decimals (under 0.1 s).
///
/// The exported workbook subtracts float date serials; `ROUND(end-start, 6)`
/// there yields the same figure.
pub fn days_between(start: Timestamp, end: Timestamp) -> f64 {
    round6((end - start).num_milliseconds() as f64 / MILLIS_PER_DAY)
}

/// Rounds to two decimals, half away from zero. Mirrors the workbook's
/// `ROUND(ROUND(x, 6), 2)`: the second rounding works on the six-decimal
/// figure, so `1.005` becomes `1.01` even though its binary value is below it.
pub fn round2(value: f64) -> f64 {
    let millionths = (value * 1_000_000.0).round() as i64;
    let half = if millionths < 0 { -5_000 } else { 5_000 };
    ((millionths + half) / 10_000) as f64 / 100.0
}

/// One continuous stay of an issue in a status.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusPeriod {
    pub status: String,
    pub start: Timestamp,
    pub end: Timestamp,
}

impl StatusPeriod {
    pub fn days(&self) -> f64 {
        days_between(self.start, self.end)
    }

    /// Days of this period that fall inside `[from, to]`.
    pub fn days_within(&self, from: Timestamp, to: Timestamp) -> f64 {
        let start = self.start.max(from);
        let end = self.end.min(to);
        if end > start {
            days_between(start, end)
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangelogSummary {
    pub periods: Vec<StatusPeriod>,
    /// Unrounded days spent per status name
    pub durations: BTreeMap<String, f64>,
    pub first_entered: BTreeMap<String, Timestamp>,
    pub blocked_days: f64,
    pub unassigned_review_days: f64,
}

/// Cuts the transition history into status periods.
///
/// Each transition opens a period in its target status that lasts until the next
/// transition; the last one is closed at `as_of`. When the first transition names
/// the status it left and `created` is known, the stay in that initial status is
/// included as well. Transitions are taken in the order given.
pub fn status_periods(
    transitions: &[StatusTransition],
    created: Option<Timestamp>,
    as_of: Timestamp,
) -> Vec<StatusPeriod> {
    let Some(first) = transitions.first() else {
        return Vec::new();
    };

    let leading = match (&first.from, created) {
        (Some(status), Some(created)) => Some(StatusPeriod {
            status: status.clone(),
            start: created,
            end: first.at,
        }),
        _ => None,
    };

    let ends = transitions
        .iter()
        .skip(1)
        .map(|t| t.at)
        .chain(std::iter::once(as_of));

    leading
        .into_iter()
        .chain(transitions.iter().zip(ends).map(|(t, end)| StatusPeriod {
            status: t.to.clone(),
            start: t.at,
            end,
        }))
        .collect()
}

/// Total unrounded days spent in `status` (case-insensitive).
pub fn time_in_status(periods: &[StatusPeriod], status: &str) -> f64 {
    periods
        .iter()
        .filter(|p| p.status.eq_ignore_ascii_case(status))
        .map(StatusPeriod::days)
        .sum()
}

/// Unrounded days spent in `status` between `from` and `to`.
pub fn time_in_status_within(
    periods: &[StatusPeriod],
    status: &str,
    from: Timestamp,
    to: Timestamp,
) -> f64 {
    periods
        .iter()
        .filter(|p| p.status.eq_ignore_ascii_case(status))
        .map(|p| p.days_within(from, to))
        .sum()
}

pub fn status_durations(periods: &[StatusPeriod]) -> BTreeMap<String, f64> {
    periods.iter().fold(BTreeMap::new(), |mut durations, period| {
        *durations.entry(period.status.clone()).or_insert(0.0) += period.days();
        durations
    })
}

/// Earliest entry into each status.
pub fn first_entered(transitions: &[StatusTransition]) -> BTreeMap<String, Timestamp> {
    transitions
        .iter()
        .fold(BTreeMap::new(), |mut entered, transition| {
            entered.entry(transition.to.clone()).or_insert(transition.at);
            entered
        })
}

/// Earliest first-entry among `statuses` (case-insensitive).
pub fn earliest_entry(
    first_entered: &BTreeMap<String, Timestamp>,
    statuses: &[String],
) -> Option<Timestamp> {
    first_entered
        .iter()
        .filter(|(status, _)| statuses.iter().any(|s| s.eq_ignore_ascii_case(status)))
        .map(|(_, at)| *at)
        .min()
}

fn assignee_at(
    start: Timestamp,
    changes: &[AssigneeChange],
    current_assignee: Option<&str>,
) -> Option<String> {
    let assignee = match changes.iter().rev().find(|c| c.at < start) {
        Some(change) => change.to.clone(),
        None => match changes.first() {
            Some(first) => first.from.clone(),
            None => current_assignee.map(str::to_string),
        },
    };
    assignee.filter(|a| !a.is_empty())
}

/// Unrounded days spent in `review_status` with nobody assigned.
pub fn unassigned_review_days(
    periods: &[StatusPeriod],
    review_status: &str,
    changes: &[AssigneeChange],
    current_assignee: Option<&str>,
) -> f64 {
    periods
        .iter()
        .filter(|p| p.status.eq_ignore_ascii_case(review_status))
        .map(|period| {
            let mut assignee = assignee_at(period.start, changes, current_assignee);
            let mut cursor = period.start;
            let mut unassigned = 0.0;

            for change in changes
                .iter()
                .filter(|c| period.start <= c.at && c.at <= period.end)
            {
                if assignee.is_none() {
                    unassigned += days_between(cursor, change.at);
                }
                cursor = change.at;
                assignee = change.to.clone().filter(|a| !a.is_empty());
            }
            if assignee.is_none() {
                unassigned += days_between(cursor, period.end);
            }
            unassigned
        })
        .sum()
}

pub fn summarize(issue: &JiraIssue, statuses: &StatusNames, as_of: Timestamp) -> ChangelogSummary {
    let periods = status_periods(&issue.transitions, issue.created, as_of);
    let blocked_days = round2(time_in_status(&periods, &statuses.blocked));
    let unassigned = round2(unassigned_review_days(
        &periods,
        &statuses.peer_review,
        &issue.assignee_changes,
        issue.assignee.as_deref(),
    ));

    ChangelogSummary {
        durations: status_durations(&periods),
        first_entered: first_entered(&issue.transitions),
        blocked_days,
        unassigned_review_days: unassigned,
        periods,
    }
}
