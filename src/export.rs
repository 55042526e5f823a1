use crate::changelog::earliest_entry;
use crate::config::FlowConfig;
use crate::jira::issues::Timestamp;
use crate::report::{IssueReport, SprintReport};
use rust_xlsxwriter::{Format, Formula, Workbook, Worksheet, XlsxError};

pub const EXPORT_FILE_NAME: &str = "flow_metrics_with_formulas.xlsx";
pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

const METRICS_SHEET: &str = "Flow Metrics";
const DATES_SHEET: &str = "Status Dates";
const PERIODS_SHEET: &str = "Status Periods";
const SUMMARY_SHEET: &str = "Summary";

/// Milliseconds between the spreadsheet date epoch (1899-12-30) and the Unix epoch
const EXCEL_EPOCH_OFFSET_MS: i64 = 2_209_161_600_000;
const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Columns of the metrics sheet
mod col {
    pub const KEY: u16 = 0;
    pub const SUMMARY: u16 = 1;
    pub const ISSUE_TYPE: u16 = 2;
    pub const STATUS: u16 = 3;
    pub const ASSIGNEE: u16 = 4;
    pub const PRIORITY: u16 = 5;
    pub const STORY_POINTS: u16 = 6;
    pub const PROJECT_CODE: u16 = 7;
    pub const TEAM: u16 = 8;
    pub const CREATED: u16 = 9;
    pub const STARTED: u16 = 10;
    pub const DONE: u16 = 11;
    pub const UNASSIGNED_PR: u16 = 12;
    pub const REGION: u16 = 13;
    pub const CUSTOMER: u16 = 14;
    pub const YEAR: u16 = 15;
    pub const CYCLE: u16 = 16;
    pub const LEAD: u16 = 17;
    pub const RAMP: u16 = 18;
    pub const PR: u16 = 19;
    pub const ACTIVE_PR: u16 = 20;
    pub const BLOCKED: u16 = 21;
    pub const FLOW_EFFICIENCY: u16 = 22;
    pub const IN_PROGRESS_TIME: u16 = 23;
    pub const PD_TIME: u16 = 24;
    pub const BLOCKED_IN_CYCLE: u16 = 25;
    pub const SPRINT: u16 = 26;
}

/// Columns of the status dates sheet referenced by metric formulas; the
/// order is set by `status_date_columns`
mod date_col {
    pub const PEER_REVIEW: u16 = 3;
    pub const PENDING_DEPLOYMENT: u16 = 4;
}

/// Columns of the status periods sheet
mod period_col {
    pub const KEY: u16 = 0;
    pub const STATUS: u16 = 1;
    pub const START: u16 = 2;
    pub const END: u16 = 3;
    pub const DAYS: u16 = 4;
    pub const DAYS_IN_CYCLE: u16 = 5;
}

const METRICS_HEADERS: [&str; 27] = [
    "Key",
    "Summary",
    "Issue Type",
    "Status",
    "Assignee",
    "Priority",
    "Story Points",
    "Project Code",
    "Team",
    "Created",
    "Started",
    "Done",
    "Unassigned PR Time",
    "Region",
    "Customer",
    "Year",
    "Cycle Time",
    "Lead Time",
    "Ramp Time",
    "PR Time",
    "Active PR Time",
    "Blocked Days",
    "Flow Efficiency",
    "In Progress Time",
    "PD Time",
    "Blocked Days In Cycle",
    "Sprint",
];

const PERIOD_HEADERS: [&str; 6] = ["Key", "Status", "Start", "End", "Days", "Days In Cycle"];

/// Spreadsheet date serial (days since 1899-12-30, UTC).
pub fn excel_serial(at: Timestamp) -> f64 {
    (at.timestamp_millis() + EXCEL_EPOCH_OFFSET_MS) as f64 / MILLIS_PER_DAY
}

/// Column letters for a zero-based column index: 0 -> A, 26 -> AA.
pub fn column_name(col: u16) -> String {
    let mut n = u32::from(col) + 1;
    let mut name = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        name.push(char::from(b'A' + rem as u8));
        n = (n - 1) / 26;
    }
    name.iter().rev().collect()
}

/// A1 reference for a zero-based row and column.
fn cell(col: u16, row: u32) -> String {
    format!("{}{}", column_name(col), row + 1)
}

fn quote_string(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

fn rounded(expr: &str) -> String {
    format!("ROUND(ROUND({expr},6),2)")
}

/// Days from the `start` cell to the `end` cell, zero when either is blank.
fn span_formula(start: &str, end: &str) -> String {
    format!(
        "=IF(OR({start}=\"\",{end}=\"\"),0,{})",
        rounded(&format!("{end}-{start}"))
    )
}

fn period_range(period_col: u16, last: u32) -> String {
    let name = column_name(period_col);
    format!("{}!${name}$2:${name}${last}", quote_sheet(PERIODS_SHEET))
}

/// Sum of a status periods column over the rows of this issue in `status`.
fn status_total_formula(sum_col: u16, status: &str, row: u32, period_count: u32) -> String {
    let last = period_count.max(1) + 1;
    format!(
        "={}",
        rounded(&format!(
            "SUMIFS({},{},{},{},{})",
            period_range(sum_col, last),
            period_range(period_col::KEY, last),
            cell(col::KEY, row),
            period_range(period_col::STATUS, last),
            quote_string(status)
        ))
    )
}

fn sheet_cell(sheet: &str, col: u16, row: u32) -> String {
    format!("{}!{}", quote_sheet(sheet), cell(col, row))
}

fn quote_sheet(name: &str) -> String {
    format!("'{}'", name.replace('\'', "''"))
}

fn region_formula(us_teams: &[String], row: u32) -> String {
    if us_teams.is_empty() {
        return "=\"International\"".to_string();
    }
    let team = cell(col::TEAM, row);
    let checks = us_teams
        .iter()
        .map(|t| format!("{team}={}", quote_string(t)))
        .collect::<Vec<_>>()
        .join(",");
    format!("=IF(OR({checks}),\"US\",\"International\")")
}

fn number_result(value: f64) -> String {
    format!("{value}")
}

/// A formula cell together with the value it evaluates to.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricCell {
    pub col: u16,
    pub formula: String,
    pub result: String,
}

/// Formula cells of one issue row. `row` is the zero-based sheet row and
/// `period_count` the number of rows in the status periods sheet.
pub fn metric_cells(
    report: &IssueReport,
    row: u32,
    period_count: u32,
    config: &FlowConfig,
) -> Vec<MetricCell> {
    let m = &report.metrics;
    let key = cell(col::KEY, row);
    let created = cell(col::CREATED, row);
    let started = cell(col::STARTED, row);
    let done = cell(col::DONE, row);
    let cycle = cell(col::CYCLE, row);
    let pr = cell(col::PR, row);
    let blocked_in_cycle = cell(col::BLOCKED_IN_CYCLE, row);
    let unassigned = cell(col::UNASSIGNED_PR, row);
    let statuses = &config.statuses;

    vec![
        MetricCell {
            col: col::REGION,
            formula: region_formula(&config.us_teams, row),
            result: m.region.as_str().to_string(),
        },
        MetricCell {
            col: col::CUSTOMER,
            formula: format!(
                "=IF(ISERROR(FIND(\"-\",{key})),\"\",LEFT({key},FIND(\"-\",{key})-1))"
            ),
            result: m.customer.clone(),
        },
        MetricCell {
            col: col::YEAR,
            formula: format!("=IF({done}=\"\",\"\",YEAR({done}))"),
            result: m.year.map(|y| y.to_string()).unwrap_or_default(),
        },
        MetricCell {
            col: col::CYCLE,
            formula: span_formula(&started, &done),
            result: number_result(m.cycle_time),
        },
        MetricCell {
            col: col::LEAD,
            formula: span_formula(&created, &done),
            result: number_result(m.lead_time),
        },
        MetricCell {
            col: col::RAMP,
            formula: span_formula(&created, &started),
            result: number_result(m.ramp_time),
        },
        MetricCell {
            col: col::IN_PROGRESS_TIME,
            formula: span_formula(
                &started,
                &sheet_cell(DATES_SHEET, date_col::PEER_REVIEW, row),
            ),
            result: number_result(m.in_progress_time),
        },
        MetricCell {
            col: col::PR,
            formula: status_total_formula(
                period_col::DAYS,
                &statuses.peer_review,
                row,
                period_count,
            ),
            result: number_result(m.pr_time),
        },
        MetricCell {
            col: col::ACTIVE_PR,
            formula: format!("={}", rounded(&format!("{pr}-{unassigned}"))),
            result: number_result(m.active_pr_time),
        },
        MetricCell {
            col: col::PD_TIME,
            formula: span_formula(
                &sheet_cell(DATES_SHEET, date_col::PENDING_DEPLOYMENT, row),
                &done,
            ),
            result: number_result(m.pd_time),
        },
        MetricCell {
            col: col::BLOCKED,
            formula: status_total_formula(
                period_col::DAYS,
                &statuses.blocked,
                row,
                period_count,
            ),
            result: number_result(m.blocked_days),
        },
        MetricCell {
            col: col::BLOCKED_IN_CYCLE,
            formula: status_total_formula(
                period_col::DAYS_IN_CYCLE,
                &statuses.blocked,
                row,
                period_count,
            ),
            result: number_result(m.blocked_in_cycle),
        },
        MetricCell {
            col: col::FLOW_EFFICIENCY,
            formula: format!(
                "=IF({cycle}=0,\"\",({cycle}-MIN({cycle},{blocked_in_cycle}))/{cycle})"
            ),
            result: m.flow_efficiency.map(number_result).unwrap_or_default(),
        },
    ]
}

struct Formats {
    header: Format,
    datetime: Format,
    days: Format,
    percent: Format,
}

impl Formats {
    fn new() -> Self {
        Formats {
            header: Format::new().set_bold(),
            datetime: Format::new().set_num_format("yyyy-mm-dd hh:mm"),
            days: Format::new().set_num_format("0.00"),
            percent: Format::new().set_num_format("0.00%"),
        }
    }
}

fn write_headers<S: AsRef<str>>(
    sheet: &mut Worksheet,
    headers: &[S],
    format: &Format,
) -> Result<(), XlsxError> {
    for (col, header) in headers.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, header.as_ref(), format)?;
    }
    sheet.set_freeze_panes(1, 0)?;
    Ok(())
}

fn write_text(
    sheet: &mut Worksheet,
    row: u32,
    col: u16,
    text: Option<&str>,
) -> Result<(), XlsxError> {
    if let Some(text) = text.filter(|t| !t.is_empty()) {
        sheet.write_string(row, col, text)?;
    }
    Ok(())
}

fn write_timestamp(
    sheet: &mut Worksheet,
    row: u32,
    col: u16,
    at: Option<Timestamp>,
    format: &Format,
) -> Result<(), XlsxError> {
    if let Some(at) = at {
        sheet.write_number_with_format(row, col, excel_serial(at), format)?;
    }
    Ok(())
}

fn write_metrics_sheet(
    sheet: &mut Worksheet,
    report: &SprintReport,
    period_count: u32,
    config: &FlowConfig,
    formats: &Formats,
) -> Result<(), XlsxError> {
    sheet.set_name(METRICS_SHEET)?;
    write_headers(sheet, METRICS_HEADERS.as_slice(), &formats.header)?;

    for (index, issue_report) in report.issues.iter().enumerate() {
        let row = index as u32 + 1;
        let issue = &issue_report.issue;

        sheet.write_string(row, col::KEY, &issue.key)?;
        write_text(sheet, row, col::SUMMARY, Some(&issue.title))?;
        write_text(sheet, row, col::ISSUE_TYPE, Some(&issue.issue_type))?;
        write_text(sheet, row, col::STATUS, Some(&issue.status))?;
        write_text(sheet, row, col::ASSIGNEE, issue.assignee.as_deref())?;
        write_text(sheet, row, col::PRIORITY, Some(&issue.priority))?;
        if let Some(points) = issue.story_points {
            sheet.write_number(row, col::STORY_POINTS, points)?;
        }
        write_text(sheet, row, col::PROJECT_CODE, issue.project_code.as_deref())?;
        write_text(sheet, row, col::TEAM, issue.team.as_deref())?;
        write_timestamp(sheet, row, col::CREATED, issue.created, &formats.datetime)?;
        let metrics = &issue_report.metrics;
        write_timestamp(sheet, row, col::STARTED, metrics.started, &formats.datetime)?;
        write_timestamp(sheet, row, col::DONE, metrics.done, &formats.datetime)?;
        write_text(sheet, row, col::SPRINT, Some(&report.sprint))?;
        sheet.write_number_with_format(
            row,
            col::UNASSIGNED_PR,
            metrics.unassigned_pr_time,
            &formats.days,
        )?;

        for metric in metric_cells(issue_report, row, period_count, config) {
            let formula = Formula::new(&metric.formula).set_result(&metric.result);
            match metric.col {
                col::REGION | col::CUSTOMER | col::YEAR => {
                    sheet.write_formula(row, metric.col, formula)?;
                }
                col::FLOW_EFFICIENCY => {
                    sheet.write_formula_with_format(row, metric.col, formula, &formats.percent)?;
                }
                _ => {
                    sheet.write_formula_with_format(row, metric.col, formula, &formats.days)?;
                }
            }
        }
    }

    sheet.set_column_width(col::SUMMARY, 40)?;
    for date_col in [col::CREATED, col::STARTED, col::DONE] {
        sheet.set_column_width(date_col, 17)?;
    }
    Ok(())
}

fn write_periods_sheet(
    sheet: &mut Worksheet,
    report: &SprintReport,
    formats: &Formats,
) -> Result<(), XlsxError> {
    sheet.set_name(PERIODS_SHEET)?;
    write_headers(sheet, PERIOD_HEADERS.as_slice(), &formats.header)?;

    let periods = report.issues.iter().enumerate().flat_map(|(index, r)| {
        r.changelog
            .periods
            .iter()
            .map(move |period| (index as u32 + 1, r, period))
    });
    for (index, (issue_row, issue_report, period)) in periods.enumerate() {
        let row = index as u32 + 1;
        let start = cell(period_col::START, row);
        let end = cell(period_col::END, row);
        sheet.write_string(row, period_col::KEY, &issue_report.issue.key)?;
        sheet.write_string(row, period_col::STATUS, &period.status)?;
        write_timestamp(sheet, row, period_col::START, Some(period.start), &formats.datetime)?;
        write_timestamp(sheet, row, period_col::END, Some(period.end), &formats.datetime)?;

        let days = Formula::new(format!("=ROUND({end}-{start},6)"))
            .set_result(number_result(period.days()));
        sheet.write_formula(row, period_col::DAYS, days)?;

        let started = sheet_cell(METRICS_SHEET, col::STARTED, issue_row);
        let done = sheet_cell(METRICS_SHEET, col::DONE, issue_row);
        let in_cycle = match (issue_report.metrics.started, issue_report.metrics.done) {
            (Some(started), Some(done)) => period.days_within(started, done),
            _ => 0.0,
        };
        let formula = Formula::new(format!(
            "=IF(OR({started}=\"\",{done}=\"\"),0,ROUND(MAX(0,MIN({end},{done})-MAX({start},{started})),6))"
        ))
        .set_result(number_result(in_cycle));
        sheet.write_formula(row, period_col::DAYS_IN_CYCLE, formula)?;
    }

    sheet.set_column_width(period_col::START, 17)?;
    sheet.set_column_width(period_col::END, 17)?;
    Ok(())
}

/// Status date columns: header and the statuses whose earliest entry fills it.
fn status_date_columns(config: &FlowConfig) -> Vec<(String, Vec<String>)> {
    let statuses = &config.statuses;
    let in_progress_header = statuses
        .in_progress
        .first()
        .cloned()
        .unwrap_or_else(|| "In Progress".to_string());

    [
        (statuses.backlog.clone(), vec![statuses.backlog.clone()]),
        (in_progress_header, statuses.in_progress.clone()),
        (statuses.peer_review.clone(), vec![statuses.peer_review.clone()]),
        (
            statuses.pending_deployment.clone(),
            vec![statuses.pending_deployment.clone()],
        ),
    ]
    .into_iter()
    .chain(statuses.done.iter().map(|s| (s.clone(), vec![s.clone()])))
    .collect()
}

/// First time each issue entered the workflow milestones, one row per issue in
/// the same order as the metrics sheet.
fn write_dates_sheet(
    sheet: &mut Worksheet,
    report: &SprintReport,
    config: &FlowConfig,
    formats: &Formats,
) -> Result<(), XlsxError> {
    sheet.set_name(DATES_SHEET)?;
    let columns = status_date_columns(config);
    let headers: Vec<&str> = std::iter::once("Key")
        .chain(columns.iter().map(|(header, _)| header.as_str()))
        .collect();
    write_headers(sheet, headers.as_slice(), &formats.header)?;

    for (index, issue_report) in report.issues.iter().enumerate() {
        let row = index as u32 + 1;
        sheet.write_string(row, 0, &issue_report.issue.key)?;
        for (offset, (_, statuses)) in columns.iter().enumerate() {
            let entered = earliest_entry(&issue_report.changelog.first_entered, statuses);
            write_timestamp(sheet, row, offset as u16 + 1, entered, &formats.datetime)?;
        }
    }

    for c in 1..headers.len() as u16 {
        sheet.set_column_width(c, 17)?;
    }
    Ok(())
}

fn write_summary_sheet(
    sheet: &mut Worksheet,
    report: &SprintReport,
    formats: &Formats,
) -> Result<(), XlsxError> {
    sheet.set_name(SUMMARY_SHEET)?;
    let summary = &report.summary;
    let metrics = quote_sheet(METRICS_SHEET);
    let last = report.issues.len() as u32 + 1;
    let range = |c: u16| {
        let name = column_name(c);
        format!("{metrics}!${name}$2:${name}${last}")
    };
    let optional = |v: Option<f64>| v.map(number_result).unwrap_or_default();

    sheet.write_string_with_format(0, 0, "Sprint", &formats.header)?;
    sheet.write_string(0, 1, &report.sprint)?;
    sheet.write_string_with_format(1, 0, "As of (UTC)", &formats.header)?;
    sheet.write_number_with_format(1, 1, excel_serial(report.as_of), &formats.datetime)?;

    let rows: Vec<(&str, String, String, Option<&Format>)> = if report.issues.is_empty() {
        vec![
            ("Issues", "=0".to_string(), "0".to_string(), None),
            ("Done issues", "=0".to_string(), "0".to_string(), None),
        ]
    } else {
        vec![
            (
                "Issues",
                format!("=COUNTA({})", range(col::KEY)),
                summary.issue_count.to_string(),
                None,
            ),
            (
                "Done issues",
                format!("=COUNT({})", range(col::DONE)),
                summary.done_count.to_string(),
                None,
            ),
            (
                "Mean cycle time",
                format!(
                    "=IFERROR(AVERAGEIFS({},{},\"<>\"),\"\")",
                    range(col::CYCLE),
                    range(col::DONE)
                ),
                optional(summary.mean_cycle_time),
                Some(&formats.days),
            ),
            (
                "Mean lead time",
                format!(
                    "=IFERROR(AVERAGEIFS({},{},\"<>\"),\"\")",
                    range(col::LEAD),
                    range(col::DONE)
                ),
                optional(summary.mean_lead_time),
                Some(&formats.days),
            ),
            (
                "Mean flow efficiency",
                format!("=IFERROR(AVERAGE({}),\"\")", range(col::FLOW_EFFICIENCY)),
                optional(summary.mean_flow_efficiency),
                Some(&formats.percent),
            ),
            (
                "Blocked days",
                format!("=SUM({})", range(col::BLOCKED)),
                number_result(summary.total_blocked_days),
                Some(&formats.days),
            ),
            (
                "Story points",
                format!("=SUM({})", range(col::STORY_POINTS)),
                number_result(summary.total_story_points),
                None,
            ),
        ]
    };

    for (offset, (label, formula, result, format)) in rows.into_iter().enumerate() {
        let row = offset as u32 + 2;
        sheet.write_string_with_format(row, 0, label, &formats.header)?;
        let formula = Formula::new(formula).set_result(result);
        match format {
            Some(format) => sheet.write_formula_with_format(row, 1, formula, format)?,
            None => sheet.write_formula(row, 1, formula)?,
        };
    }

    sheet.set_column_width(0, 22)?;
    sheet.set_column_width(1, 17)?;
    Ok(())
}

/// Builds the xlsx workbook for `report` and returns the file bytes.
pub fn export_workbook(report: &SprintReport, config: &FlowConfig) -> Result<Vec<u8>, XlsxError> {
    let formats = Formats::new();
    let period_count: usize = report.issues.iter().map(|r| r.changelog.periods.len()).sum();
    let mut workbook = Workbook::new();

    write_metrics_sheet(
        workbook.add_worksheet(),
        report,
        period_count as u32,
        config,
        &formats,
    )?;
    write_dates_sheet(workbook.add_worksheet(), report, config, &formats)?;
    write_periods_sheet(workbook.add_worksheet(), report, &formats)?;
    write_summary_sheet(workbook.add_worksheet(), report, &formats)?;

    let bytes = workbook.save_to_buffer()?;
    tracing::info!(
        sprint = %report.sprint,
        rows = report.issues.len(),
        periods = period_count,
        bytes = bytes.len(),
        "workbook exported"
    );
    Ok(bytes)
}
