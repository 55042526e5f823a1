use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

#[derive(Debug, Clone)]
pub struct FakeIssue {
    pub key: String,
    pub summary: String,
    pub status: String,
    pub created: String,
    pub assignee: Option<String>,
    pub team: Option<String>,
    pub story_points: Option<f64>,
    pub history: Vec<Value>,
    pub changelog_broken: bool,
}

#[derive(Debug, Default)]
pub struct FakeJiraState {
    pub sprint: String,
    pub issues: Vec<FakeIssue>,
    pub reject_credentials: bool,
    pub queries: Vec<String>,
}

pub type SharedJira = Arc<Mutex<FakeJiraState>>;

fn authorized(state: &FakeJiraState, headers: &HeaderMap) -> bool {
    let basic = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("Basic "));
    basic && !state.reject_credentials
}

fn issue_json(issue: &FakeIssue) -> Value {
    json!({
        "key": issue.key,
        "fields": {
            "summary": issue.summary,
            "status": { "name": issue.status },
            "assignee": issue.assignee.as_ref().map(|name| json!({ "displayName": name })),
            "issuetype": { "name": "Story" },
            "priority": { "name": "Medium" },
            "created": issue.created,
            "customfield_10013": issue.story_points,
            "customfield_team": issue.team.as_ref().map(|team| json!({ "value": team })),
        }
    })
}

async fn search(
    State(jira): State<SharedJira>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let mut state = jira.lock().expect("fake jira lock");
    if !authorized(&state, &headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let jql = body["jql"].as_str().unwrap_or_default().to_string();
    state.queries.push(jql.clone());

    let issues: Vec<Value> = if jql.starts_with(&format!("Sprint = {} ", state.sprint)) {
        state.issues.iter().map(issue_json).collect()
    } else {
        Vec::new()
    };
    Json(json!({ "issues": issues, "isLast": true })).into_response()
}

async fn changelog(
    State(jira): State<SharedJira>,
    headers: HeaderMap,
    Path(key): Path<String>,
) -> Response {
    let state = jira.lock().expect("fake jira lock");
    if !authorized(&state, &headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    match state.issues.iter().find(|issue| issue.key == key) {
        Some(issue) if issue.changelog_broken => {
            (StatusCode::INTERNAL_SERVER_ERROR, "changelog unavailable").into_response()
        }
        Some(issue) => Json(json!({
            "values": issue.history,
            "total": issue.history.len(),
            "isLast": true,
        }))
        .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Starts the fake site on an ephemeral port and returns its base URL.
pub async fn start(jira: SharedJira) -> String {
    let app = Router::new()
        .route("/rest/api/3/search/jql", post(search))
        .route("/rest/api/3/issue/:key/changelog", get(changelog))
        .with_state(jira);

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind fake jira");
    let addr = listener.local_addr().expect("fake jira address");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("fake jira server");
    });
    format!("http://{addr}")
}
