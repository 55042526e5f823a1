use crate::jira::issues::Timestamp;
use crate::report::SprintReport;
use chrono::Utc;
use pulldown_cmark::{Options, Parser, html};

const TABLE_HEADER: &[&str] = &[
    "Key",
    "Summary",
    "Type",
    "Status",
    "Started",
    "Done",
    "Cycle",
    "Lead",
    "Ramp",
    "In Progress",
    "PR",
    "Active PR",
    "Unassigned PR",
    "PD",
    "Blocked",
    "Flow eff.",
    "Region",
];

/// Backslash-escapes the characters that would change a Markdown table cell.
pub fn escape_markdown(text: &str) -> String {
    text.chars()
        .fold(String::with_capacity(text.len()), |mut out, c| {
            match c {
                '\\' | '|' | '*' | '_' | '`' | '[' | ']' | '<' | '>' | '&' | '~' => {
                    out.push('\\');
                    out.push(c);
                }
                '\r' | '\n' => out.push(' '),
                _ => out.push(c),
            }
            out
        })
}

pub fn format_days(days: f64) -> String {
    format!("{days:.2}")
}

pub fn format_percent(ratio: Option<f64>) -> String {
    ratio.map_or_else(|| "n/a".to_string(), |r| format!("{:.2}%", r * 100.0))
}

pub fn format_timestamp(at: Option<Timestamp>) -> String {
    at.map(|t| t.with_timezone(&Utc).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default()
}

fn format_points(points: f64) -> String {
    if points.fract() == 0.0 {
        format!("{points:.0}")
    } else {
        format!("{points:.1}")
    }
}

/// Renders the report as a Markdown document: summary list, then the issue table.
pub fn render_markdown(report: &SprintReport) -> String {
    let summary = &report.summary;
    let mean_days = |v: Option<f64>| {
        v.map_or_else(|| "n/a".to_string(), |d| format!("{} days", format_days(d)))
    };

    let mut lines = vec![
        format!("# Sprint {} flow metrics", escape_markdown(&report.sprint)),
        String::new(),
        format!(
            "- Issues: {} ({} done)",
            summary.issue_count, summary.done_count
        ),
        format!("- Mean cycle time: {}", mean_days(summary.mean_cycle_time)),
        format!("- Mean lead time: {}", mean_days(summary.mean_lead_time)),
        format!(
            "- Mean flow efficiency: {}",
            format_percent(summary.mean_flow_efficiency)
        ),
        format!("- Blocked days: {}", format_days(summary.total_blocked_days)),
        format!("- Story points: {}", format_points(summary.total_story_points)),
        format!("- As of: {} UTC", format_timestamp(Some(report.as_of))),
        String::new(),
    ];

    if report.issues.is_empty() {
        lines.push("_No issues matched the sprint filter._".to_string());
        return lines.join("\n") + "\n";
    }

    lines.push(format!("| {} |", TABLE_HEADER.join(" | ")));
    lines.push(format!("|{}", "---|".repeat(TABLE_HEADER.len())));

    for row in &report.issues {
        let m = &row.metrics;
        let cells = [
            escape_markdown(&row.issue.key),
            escape_markdown(&row.issue.title),
            escape_markdown(&row.issue.issue_type),
            escape_markdown(&row.issue.status),
            format_timestamp(m.started),
            format_timestamp(m.done),
            format_days(m.cycle_time),
            format_days(m.lead_time),
            format_days(m.ramp_time),
            format_days(m.in_progress_time),
            format_days(m.pr_time),
            format_days(m.active_pr_time),
            format_days(m.unassigned_pr_time),
            format_days(m.pd_time),
            format_days(m.blocked_days),
            format_percent(m.flow_efficiency),
            m.region.as_str().to_string(),
        ];
        lines.push(format!("| {} |", cells.join(" | ")));
    }

    lines.join("\n") + "\n"
}

pub fn markdown_to_html(markdown: &str) -> String {
    let parser = Parser::new_ext(markdown, Options::ENABLE_TABLES);
    let mut out = String::new();
    html::push_html(&mut out, parser);
    out
}

pub fn render_html(report: &SprintReport) -> String {
    markdown_to_html(&render_markdown(report))
}

/// Wraps a body fragment in the dashboard page shell.
pub fn html_page(title: &str, body: &str) -> String {
    format!(
        r#"<!doctype html>
<html><head><meta charset="utf-8"><title>{title}</title>
<style>
body {{ font-family: sans-serif; margin: 2rem; }}
table {{ border-collapse: collapse; font-size: 0.9rem; }}
th, td {{ border: 1px solid #ccc; padding: 0.25rem 0.5rem; text-align: left; }}
.error {{ color: #a00; border: 1px solid #a00; padding: 0.5rem; }}
</style></head>
<body>
<h1>Jira Sprint Metrics</h1>
<form method="post" action="/report">
  <label>Sprint ID <input type="text" name="sprint" /></label>
  <button type="submit">Fetch &amp; Build Excel</button>
</form>
{body}
</body></html>"#,
        title = htmlescape::encode_minimal(title),
    )
}

pub fn error_html(message: &str) -> String {
    format!(
        r#"<div class="error">Error: {}</div>"#,
        htmlescape::encode_minimal(message)
    )
}
