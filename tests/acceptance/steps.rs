use crate::FlowWorld;
use crate::fake_jira::{self, FakeIssue};
use cucumber::{given, then, when};
use flowmetrics::config::FlowConfig;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

static EXPORT_COUNTER: AtomicUsize = AtomicUsize::new(0);

fn test_config(world: &FlowWorld) -> FlowConfig {
    let mut config = FlowConfig::default();
    config.jira.base_url = world
        .jira_url
        .clone()
        .expect("Jira site must be set up first");
    config.jira.email = "dev@example.com".to_string();
    config.jira.api_token = "test-token".to_string();
    config
}

fn with_issue(world: &FlowWorld, key: &str, update: impl FnOnce(&mut FakeIssue)) {
    let mut state = world.jira.lock().expect("fake jira lock");
    let issue = state
        .issues
        .iter_mut()
        .find(|issue| issue.key == key)
        .unwrap_or_else(|| panic!("Unknown issue {key}"));
    update(issue);
}

fn output_text(world: &FlowWorld) -> String {
    String::from_utf8(world.captured_output.clone()).expect("Invalid UTF-8")
}

#[given(regex = r#"^a Jira site with sprint "([^"]+)"$"#)]
async fn given_jira_site(world: &mut FlowWorld, sprint: String) {
    world.jira.lock().expect("fake jira lock").sprint = sprint;
    world.jira_url = Some(fake_jira::start(world.jira.clone()).await);
}

#[given(regex = r#"^issue "([^"]+)" "([^"]*)" was created at "([^"]+)" and is "([^"]+)"$"#)]
async fn given_issue(
    world: &mut FlowWorld,
    key: String,
    summary: String,
    created: String,
    status: String,
) {
    world
        .jira
        .lock()
        .expect("fake jira lock")
        .issues
        .push(FakeIssue {
            key,
            summary,
            status,
            created,
            assignee: Some("Ada".to_string()),
            team: None,
            story_points: None,
            history: Vec::new(),
            changelog_broken: false,
        });
}

#[given(regex = r#"^"([^"]+)" moved from "([^"]+)" to "([^"]+)" at "([^"]+)"$"#)]
async fn given_transition(
    world: &mut FlowWorld,
    key: String,
    from: String,
    to: String,
    at: String,
) {
    with_issue(world, &key, |issue| {
        let id = issue.history.len() + 1;
        issue.history.push(json!({
            "id": id.to_string(),
            "author": { "displayName": "Ada" },
            "created": at,
            "items": [{ "field": "status", "fromString": from, "toString": to }],
        }));
    });
}

#[given(regex = r#"^"([^"]+)" belongs to team "([^"]+)" with (\d+(?:\.\d+)?) story points$"#)]
async fn given_team(world: &mut FlowWorld, key: String, team: String, points: String) {
    let points: f64 = points.parse().expect("story points");
    with_issue(world, &key, |issue| {
        issue.team = Some(team);
        issue.story_points = Some(points);
    });
}

#[given(regex = r#"^the changelog of "([^"]+)" is unavailable$"#)]
async fn given_changelog_unavailable(world: &mut FlowWorld, key: String) {
    with_issue(world, &key, |issue| issue.changelog_broken = true);
}

#[given("Jira rejects the credentials")]
async fn given_rejected_credentials(world: &mut FlowWorld) {
    world.jira.lock().expect("fake jira lock").reject_credentials = true;
}

#[when(regex = r#"^I run `flowmetrics ?([^`]*)`$"#)]
async fn when_run_flowmetrics(world: &mut FlowWorld, arguments: String) {
    let mut args = vec!["flowmetrics".to_string()];
    for argument in arguments.split_whitespace() {
        if argument == "<export>" {
            let path = std::env::temp_dir().join(format!(
                "flowmetrics-acceptance-{}-{}.xlsx",
                std::process::id(),
                EXPORT_COUNTER.fetch_add(1, Ordering::SeqCst)
            ));
            let _ = std::fs::remove_file(&path);
            args.push(path.display().to_string());
            world.export_path = Some(path);
        } else {
            args.push(argument.to_string());
        }
    }

    let config = test_config(world);
    let mut buffer: Vec<u8> = Vec::new();
    let writer_option: Option<&mut dyn std::io::Write> = Some(&mut buffer);
    let result = flowmetrics::run::run(args, writer_option, Some(config)).await;

    world.captured_output = buffer;
    world.run_result = Some(result);
}

#[then("the command should succeed")]
async fn then_command_succeeds(world: &mut FlowWorld) {
    match &world.run_result {
        Some(Ok(())) => {}
        other => panic!("Command did not succeed: {other:?}"),
    }
}

#[then(regex = r#"^the command should fail with "(.*)"$"#)]
async fn then_command_fails_with(world: &mut FlowWorld, expected: String) {
    match &world.run_result {
        Some(Err(err)) => {
            let message = format!("{err:#}");
            assert!(
                message.contains(&expected),
                "Expected error containing '{}', but got:\n---\n{}\n---",
                expected,
                message
            );
        }
        other => panic!("Command should have failed but got: {other:?}"),
    }
}

#[then(regex = r#"^the output should contain "(.*)"$"#)]
async fn then_output_contains(world: &mut FlowWorld, expected: String) {
    let output = output_text(world);
    assert!(
        output.contains(&expected),
        "Expected output to contain '{}', but got:\n---\n{}\n---",
        expected,
        output
    );
}

fn table_cells(line: &str) -> Vec<String> {
    line.trim()
        .trim_start_matches('|')
        .trim_end_matches('|')
        .split(" | ")
        .map(|cell| cell.trim().to_string())
        .collect()
}

#[then(regex = r#"^the "([^"]+)" of "([^"]+)" should be "([^"]*)"$"#)]
async fn then_column_value(world: &mut FlowWorld, column: String, key: String, expected: String) {
    let output = output_text(world);
    let mut lines = output.lines().skip_while(|line| !line.starts_with("| Key |"));
    let header = table_cells(lines.next().expect("Metrics table not found in output"));
    let index = header
        .iter()
        .position(|name| *name == column)
        .unwrap_or_else(|| panic!("Column '{column}' not in {header:?}"));
    let row = lines
        .map(table_cells)
        .find(|cells| cells.first() == Some(&key))
        .unwrap_or_else(|| panic!("Row for {key} not found in:\n{output}"));
    assert_eq!(row[index], expected, "{column} of {key}");
}

#[then("the workbook file should be written")]
async fn then_workbook_written(world: &mut FlowWorld) {
    let path = world.export_path.as_ref().expect("No export path given");
    let bytes = std::fs::read(path).unwrap_or_else(|e| panic!("Failed to read {path:?}: {e}"));
    assert!(bytes.starts_with(b"PK"), "{path:?} is not an xlsx archive");
    let _ = std::fs::remove_file(path);
}

#[given("the dashboard is running")]
async fn given_dashboard_running(world: &mut FlowWorld) {
    let state = Arc::new(flowmetrics::web::AppState::new(test_config(world)));
    let app = flowmetrics::web::router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind dashboard");
    let addr = listener.local_addr().expect("dashboard address");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("dashboard server");
    });
    world.dashboard_url = Some(format!("http://{addr}"));
}

async fn record_response(world: &mut FlowWorld, response: reqwest::Response) {
    world.response_status = Some(response.status().as_u16());
    world.response_headers = response
        .headers()
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                value.to_str().unwrap_or_default().to_string(),
            )
        })
        .collect();
    world.response_body = response.bytes().await.expect("response body").to_vec();
}

fn dashboard_url(world: &FlowWorld, path: &str) -> String {
    format!(
        "{}{}",
        world.dashboard_url.as_ref().expect("Dashboard is not running"),
        path
    )
}

#[when(regex = r#"^I submit sprint "([^"]*)" on the dashboard$"#)]
async fn when_submit_sprint(world: &mut FlowWorld, sprint: String) {
    let body = format!("sprint={}", sprint.replace(' ', "+"));
    let response = reqwest::Client::new()
        .post(dashboard_url(world, "/report"))
        .header("Content-Type", "application/x-www-form-urlencoded")
        .body(body)
        .send()
        .await
        .expect("Request should succeed");
    record_response(world, response).await;
}

#[when(regex = r#"^I open "([^"]+)" on the dashboard$"#)]
async fn when_open_page(world: &mut FlowWorld, path: String) {
    let response = reqwest::get(dashboard_url(world, &path))
        .await
        .expect("Request should succeed");
    record_response(world, response).await;
}

#[then(regex = r#"^the dashboard should respond with status (\d+)$"#)]
async fn then_status(world: &mut FlowWorld, status: String) {
    let expected: u16 = status.parse().expect("status code");
    assert_eq!(world.response_status, Some(expected));
}

#[then(regex = r#"^the page should contain "(.*)"$"#)]
async fn then_page_contains(world: &mut FlowWorld, expected: String) {
    let page = String::from_utf8_lossy(&world.response_body);
    assert!(
        page.contains(&expected),
        "Expected page to contain '{}', but got:\n---\n{}\n---",
        expected,
        page
    );
}

#[then(regex = r#"^the download should be named "([^"]+)"$"#)]
async fn then_download_named(world: &mut FlowWorld, file_name: String) {
    let disposition = world
        .response_headers
        .iter()
        .find(|(name, _)| name == "content-disposition")
        .map(|(_, value)| value.clone())
        .unwrap_or_default();
    assert_eq!(disposition, format!("attachment; filename=\"{file_name}\""));
    assert!(world.response_body.starts_with(b"PK"));
}
