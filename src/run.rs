use crate::cli;
use crate::config::FlowConfig;
use crate::export;
use crate::jira::client::HttpJiraApi;
use crate::output;
use crate::render;
use crate::report::{self, SprintReport};
use crate::web;
use anyhow::Context;

/// Runs one CLI invocation.
///
/// Output goes to stdout, and additionally to `stdout_additional` when given.
/// `config` replaces the configuration otherwise loaded from files and the
/// environment.
pub async fn run(
    args: Vec<String>,
    mut stdout_additional: Option<&mut dyn std::io::Write>,
    config: Option<FlowConfig>,
) -> anyhow::Result<()> {
    let command = cli::parser::parse_args(&args);
    if let cli::parser::Command::Help = command {
        output::println(cli::parser::USAGE, &mut stdout_additional)?;
        return Ok(());
    }
    if let cli::parser::Command::Unknown(text) = &command {
        output::println(
            &format!("Invalid command or arguments: {text}. Use --help for usage."),
            &mut stdout_additional,
        )?;
        return Ok(());
    }

    let mut config = match config {
        Some(config) => config,
        None => FlowConfig::load().context("Failed to load configuration")?,
    };

    match command {
        cli::parser::Command::Serve { port } => {
            if let Some(port) = port {
                config.port = port;
            }
            web::serve(config).await?;
        }
        cli::parser::Command::Report { sprint } => {
            let report = fetch(&config, &sprint).await?;
            output::println(
                render::render_markdown(&report).trim_end(),
                &mut stdout_additional,
            )?;
        }
        cli::parser::Command::Export { sprint, path } => {
            let report = fetch(&config, &sprint).await?;
            let bytes = export::export_workbook(&report, &config)
                .context("Failed to build the workbook")?;
            let path = path.unwrap_or_else(|| export::EXPORT_FILE_NAME.to_string());
            std::fs::write(&path, &bytes).with_context(|| format!("Failed to write {path}"))?;
            output::println(
                &format!("✓ Wrote {} issues to {}", report.issues.len(), path),
                &mut stdout_additional,
            )?;
        }
        cli::parser::Command::Help | cli::parser::Command::Unknown(_) => {}
    }
    Ok(())
}

async fn fetch(config: &FlowConfig, sprint: &str) -> anyhow::Result<SprintReport> {
    config.jira.ensure_credentials()?;
    let api = HttpJiraApi::new(&config.jira).context("Failed to create HTTP client")?;
    let as_of = chrono::Utc::now().fixed_offset();
    report::fetch_report(&api, config, sprint, as_of)
        .await
        .with_context(|| format!("Failed to fetch sprint {}", sprint.trim()))
}
