use crate::config::FlowConfig;
use crate::export;
use crate::jira::client::{HttpJiraApi, JiraError};
use crate::render;
use crate::report::{self, SprintReport};
use axum::{
    Form, Router,
    extract::State,
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::RwLock;

/// Shared dashboard state: the configuration and the last report built.
pub struct AppState {
    pub config: FlowConfig,
    pub latest: RwLock<Option<SprintReport>>,
}

impl AppState {
    pub fn new(config: FlowConfig) -> Self {
        AppState {
            config,
            latest: RwLock::new(None),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ReportForm {
    #[serde(default)]
    pub sprint: String,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/report", get(latest_report).post(build_report))
        .route("/export", get(export_latest))
        .route("/health", get(health))
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

async fn index() -> Html<String> {
    Html(render::html_page("Jira Sprint Metrics", ""))
}

fn report_page(report: &SprintReport) -> Html<String> {
    let body = format!(
        "{}\n<p><a href=\"/export\">Download {}</a></p>",
        render::render_html(report),
        export::EXPORT_FILE_NAME
    );
    Html(render::html_page(
        &format!("Sprint {} flow metrics", report.sprint),
        &body,
    ))
}

fn error_page(status: StatusCode, message: &str) -> Response {
    (
        status,
        Html(render::html_page(
            "Jira Sprint Metrics",
            &render::error_html(message),
        )),
    )
        .into_response()
}

async fn latest_report(State(state): State<Arc<AppState>>) -> Response {
    match state.latest.read().await.as_ref() {
        Some(report) => report_page(report).into_response(),
        None => index().await.into_response(),
    }
}

async fn build_report(
    State(state): State<Arc<AppState>>,
    Form(form): Form<ReportForm>,
) -> Response {
    let sprint = form.sprint.trim();
    if sprint.is_empty() {
        return error_page(StatusCode::BAD_REQUEST, "Please enter a sprint ID.");
    }
    if let Err(err) = state.config.jira.ensure_credentials() {
        return error_page(StatusCode::BAD_REQUEST, &err.to_string());
    }

    let api = match HttpJiraApi::new(&state.config.jira) {
        Ok(api) => api,
        Err(err) => return error_page(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string()),
    };
    let as_of = chrono::Utc::now().fixed_offset();

    match report::fetch_report(&api, &state.config, sprint, as_of).await {
        Ok(report) => {
            let page = report_page(&report);
            *state.latest.write().await = Some(report);
            page.into_response()
        }
        Err(err) => {
            tracing::warn!(sprint, error = %err, "sprint fetch failed");
            let status = match err {
                JiraError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
                _ => StatusCode::BAD_GATEWAY,
            };
            error_page(status, &err.to_string())
        }
    }
}

async fn export_latest(State(state): State<Arc<AppState>>) -> Response {
    let latest = state.latest.read().await;
    let Some(report) = latest.as_ref() else {
        return error_page(
            StatusCode::NOT_FOUND,
            "No report yet. Fetch a sprint first.",
        );
    };

    match export::export_workbook(report, &state.config) {
        Ok(bytes) => (
            [
                (header::CONTENT_TYPE, export::XLSX_CONTENT_TYPE.to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", export::EXPORT_FILE_NAME),
                ),
            ],
            bytes,
        )
            .into_response(),
        Err(err) => {
            tracing::error!(error = %err, "workbook export failed");
            error_page(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string())
        }
    }
}

/// Serves the dashboard on `0.0.0.0:<config.port>` until the process stops.
pub async fn serve(config: FlowConfig) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let app = router(Arc::new(AppState::new(config)));

    let listener = TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}
