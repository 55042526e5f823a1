/// Enum representing CLI commands
#[derive(Debug, PartialEq)]
pub enum Command {
    Serve { port: Option<u16> },
    Report { sprint: String },
    Export { sprint: String, path: Option<String> },
    Help,
    Unknown(String),
}

pub const USAGE: &str = "Usage:
  flowmetrics [serve [<port>]]           Start the dashboard (default port 8501)
  flowmetrics report <sprint>            Print the sprint flow metrics
  flowmetrics export <sprint> [<file>]   Write the metrics workbook with formulas
  flowmetrics help                       Show this message";

fn missing_sprint(command: &str) -> Command {
    Command::Unknown(format!(
        "Missing sprint argument. Usage: flowmetrics {command} <sprint>"
    ))
}

/// Parse command line arguments and return a Command
///
/// # Arguments
/// * `args` - Command line arguments (including program name)
pub fn parse_args(args: &[String]) -> Command {
    let rest: Vec<&str> = args.iter().skip(1).map(String::as_str).collect();

    match rest.as_slice() {
        [] | ["serve"] => Command::Serve { port: None },
        ["serve", port] => match port.parse::<u16>() {
            Ok(port) => Command::Serve { port: Some(port) },
            Err(_) => Command::Unknown(format!("Invalid port: {port}")),
        },
        ["help" | "--help" | "-h"] => Command::Help,
        ["report"] => missing_sprint("report"),
        ["report", sprint] => Command::Report {
            sprint: sprint.to_string(),
        },
        ["export"] => missing_sprint("export"),
        ["export", sprint] => Command::Export {
            sprint: sprint.to_string(),
            path: None,
        },
        ["export", sprint, path] => Command::Export {
            sprint: sprint.to_string(),
            path: Some(path.to_string()),
        },
        _ => Command::Unknown(rest.join(" ")),
    }
}
