use cucumber::World;
use std::path::PathBuf;

#[derive(Debug, Default, World)]
pub struct FlowWorld {
    pub jira: fake_jira::SharedJira,
    pub jira_url: Option<String>,
    pub captured_output: Vec<u8>,
    pub run_result: Option<Result<(), anyhow::Error>>,
    pub export_path: Option<PathBuf>,
    pub dashboard_url: Option<String>,
    pub response_status: Option<u16>,
    pub response_headers: Vec<(String, String)>,
    pub response_body: Vec<u8>,
}

#[tokio::main]
async fn main() {
    FlowWorld::run("features").await;
}

mod fake_jira;
mod steps;
