use anyhow::{Context, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Configuration keys enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigKey {
    BaseUrl,
    StoryPointsField,
    ProjectCodeField,
    TeamField,
    StatusFilter,
    InProgressStatuses,
    DoneStatuses,
    BacklogStatus,
    PeerReviewStatus,
    PendingDeploymentStatus,
    BlockedStatus,
    UsTeams,
    Port,
}

impl ConfigKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigKey::BaseUrl => "base_url",
            ConfigKey::StoryPointsField => "story_points_field",
            ConfigKey::ProjectCodeField => "project_code_field",
            ConfigKey::TeamField => "team_field",
            ConfigKey::StatusFilter => "status_filter",
            ConfigKey::InProgressStatuses => "in_progress_statuses",
            ConfigKey::DoneStatuses => "done_statuses",
            ConfigKey::BacklogStatus => "backlog_status",
            ConfigKey::PeerReviewStatus => "peer_review_status",
            ConfigKey::PendingDeploymentStatus => "pending_deployment_status",
            ConfigKey::BlockedStatus => "blocked_status",
            ConfigKey::UsTeams => "us_teams",
            ConfigKey::Port => "port",
        }
    }

    /// Get all config keys
    pub fn all() -> &'static [ConfigKey] {
        &[
            ConfigKey::BaseUrl,
            ConfigKey::StoryPointsField,
            ConfigKey::ProjectCodeField,
            ConfigKey::TeamField,
            ConfigKey::StatusFilter,
            ConfigKey::InProgressStatuses,
            ConfigKey::DoneStatuses,
            ConfigKey::BacklogStatus,
            ConfigKey::PeerReviewStatus,
            ConfigKey::PendingDeploymentStatus,
            ConfigKey::BlockedStatus,
            ConfigKey::UsTeams,
            ConfigKey::Port,
        ]
    }
}

/// Directory name for project-specific configuration.
pub const PROJECT_CONFIG_DIR: &str = ".flowmetrics";
/// Filename for the project-specific configuration within the .flowmetrics directory.
pub const PROJECT_CONFIG_FILENAME: &str = "config.json";

pub const DEFAULT_PORT: u16 = 8501;
const DEFAULT_JIRA_URL: &str = env!("FLOWMETRICS_DEFAULT_JIRA_URL");

/// Environment variable names read by [`FlowConfig::resolve`]
pub mod env_vars {
    pub const BASE_URL: &str = "JIRA_BASE_URL";
    pub const EMAIL: &str = "JIRA_EMAIL";
    pub const API_TOKEN: &str = "JIRA_API_TOKEN";
    pub const PORT: &str = "FLOWMETRICS_PORT";
    pub const CONFIG_PATH: &str = "FLOWMETRICS_CONFIG";
}

#[derive(Clone, PartialEq)]
pub struct JiraConfig {
    pub base_url: String,
    pub email: String,
    pub api_token: String,
}

impl std::fmt::Debug for JiraConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JiraConfig")
            .field("base_url", &self.base_url)
            .field("email", &self.email)
            .field("api_token", &"<redacted>")
            .finish()
    }
}

impl JiraConfig {
    /// Fails before any request is made when a connection setting is blank.
    pub fn ensure_credentials(&self) -> Result<()> {
        let missing: Vec<&str> = [
            (env_vars::BASE_URL, &self.base_url),
            (env_vars::EMAIL, &self.email),
            (env_vars::API_TOKEN, &self.api_token),
        ]
        .iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| *name)
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(anyhow::anyhow!(
                "Please provide the Jira base URL, email and API token (missing: {}).",
                missing.join(", ")
            ))
        }
    }
}

/// Jira custom field ids
#[derive(Debug, Clone, PartialEq)]
pub struct FieldIds {
    pub story_points: String,
    pub project_code: String,
    pub team: String,
}

/// Status vocabulary of the Jira workflow
#[derive(Debug, Clone, PartialEq)]
pub struct StatusNames {
    /// Statuses an issue must be in to be part of the sprint report
    pub filter: Vec<String>,
    pub in_progress: Vec<String>,
    pub done: Vec<String>,
    pub backlog: String,
    pub peer_review: String,
    pub pending_deployment: String,
    pub blocked: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlowConfig {
    pub jira: JiraConfig,
    pub fields: FieldIds,
    pub statuses: StatusNames,
    /// Teams reported under the "US" region
    pub us_teams: Vec<String>,
    pub port: u16,
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

impl Default for FlowConfig {
    fn default() -> Self {
        FlowConfig {
            jira: JiraConfig {
                base_url: DEFAULT_JIRA_URL.to_string(),
                email: String::new(),
                api_token: String::new(),
            },
            fields: FieldIds {
                story_points: "customfield_10013".to_string(),
                project_code: "customfield_14300".to_string(),
                team: "customfield_team".to_string(),
            },
            statuses: StatusNames {
                filter: strings(&["Testing", "Approved for Release", "Closed"]),
                in_progress: strings(&["In Progress", "InProgress"]),
                done: strings(&["Testing", "Approved for Release", "Closed"]),
                backlog: "Backlog".to_string(),
                peer_review: "Peer Review".to_string(),
                pending_deployment: "Pending Deployment".to_string(),
                blocked: "Blocked".to_string(),
            },
            us_teams: strings(&["Kraken", "TOS", "Argos", "Alchemy"]),
            port: DEFAULT_PORT,
        }
    }
}

/// Parses a JSON configuration file content into a map of configuration values.
///
/// - Returns an empty HashMap if the input `content` is empty or contains only whitespace.
/// - Unknown keys are ignored.
/// - Returns an `Err` if the content is not a JSON object.
pub fn parse_config(content: &[u8]) -> Result<HashMap<ConfigKey, Value>> {
    if content.iter().all(|b| b.is_ascii_whitespace()) {
        return Ok(HashMap::new());
    }

    let value: Value = serde_json::from_slice(content).context("Failed to parse config JSON")?;

    if let Value::Object(map) = &value {
        let config_map = ConfigKey::all()
            .iter()
            .filter_map(|key| map.get(key.as_str()).map(|val| (*key, val.clone())))
            .collect();
        return Ok(config_map);
    }

    Err(anyhow::anyhow!("Config must be a JSON object"))
}

/// Merges `updates` into `base_config` and returns a new configuration map.
///
/// If a key exists in both, the value from `updates` wins.
pub fn update_config(
    base_config: &HashMap<ConfigKey, Value>,
    updates: &HashMap<ConfigKey, Value>,
) -> HashMap<ConfigKey, Value> {
    let mut new_config = base_config.clone();
    for (key, value) in updates {
        new_config.insert(*key, value.clone());
    }
    new_config
}

/// Reads the config file at `path`; a missing file is an empty configuration.
pub fn load_config_file(path: &Path) -> Result<HashMap<ConfigKey, Value>> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let content = std::fs::read(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    parse_config(&content).with_context(|| format!("Invalid config file {}", path.display()))
}

fn expect_string(key: ConfigKey, value: &Value) -> Result<String> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("Config key `{}` must be a string", key.as_str()))
}

fn expect_string_list(key: ConfigKey, value: &Value) -> Result<Vec<String>> {
    value
        .as_array()
        .and_then(|items| {
            items
                .iter()
                .map(|item| item.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()
        })
        .ok_or_else(|| {
            anyhow::anyhow!("Config key `{}` must be an array of strings", key.as_str())
        })
}

fn parse_port(raw: &str) -> Result<u16> {
    raw.trim()
        .parse::<u16>()
        .with_context(|| format!("Invalid port `{raw}`"))
}

impl FlowConfig {
    /// Builds the configuration from defaults, then file values, then environment
    /// variables. `env` looks up a variable by name.
    pub fn resolve<F>(file: &HashMap<ConfigKey, Value>, env: F) -> Result<FlowConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = FlowConfig::default();

        for (key, value) in file {
            match key {
                ConfigKey::BaseUrl => config.jira.base_url = expect_string(*key, value)?,
                ConfigKey::StoryPointsField => {
                    config.fields.story_points = expect_string(*key, value)?
                }
                ConfigKey::ProjectCodeField => {
                    config.fields.project_code = expect_string(*key, value)?
                }
                ConfigKey::TeamField => config.fields.team = expect_string(*key, value)?,
                ConfigKey::StatusFilter => {
                    config.statuses.filter = expect_string_list(*key, value)?
                }
                ConfigKey::InProgressStatuses => {
                    config.statuses.in_progress = expect_string_list(*key, value)?
                }
                ConfigKey::DoneStatuses => config.statuses.done = expect_string_list(*key, value)?,
                ConfigKey::BacklogStatus => config.statuses.backlog = expect_string(*key, value)?,
                ConfigKey::PeerReviewStatus => {
                    config.statuses.peer_review = expect_string(*key, value)?
                }
                ConfigKey::PendingDeploymentStatus => {
                    config.statuses.pending_deployment = expect_string(*key, value)?
                }
                ConfigKey::BlockedStatus => config.statuses.blocked = expect_string(*key, value)?,
                ConfigKey::UsTeams => config.us_teams = expect_string_list(*key, value)?,
                ConfigKey::Port => {
                    config.port = match value {
                        Value::Number(n) => n
                            .as_u64()
                            .and_then(|p| u16::try_from(p).ok())
                            .ok_or_else(|| anyhow::anyhow!("Invalid port `{n}`"))?,
                        Value::String(s) => parse_port(s)?,
                        _ => return Err(anyhow::anyhow!("Config key `port` must be a number")),
                    }
                }
            }
        }

        let non_empty = |name: &str| env(name).filter(|v| !v.trim().is_empty());
        if let Some(base_url) = non_empty(env_vars::BASE_URL) {
            config.jira.base_url = base_url;
        }
        if let Some(email) = non_empty(env_vars::EMAIL) {
            config.jira.email = email;
        }
        if let Some(token) = non_empty(env_vars::API_TOKEN) {
            config.jira.api_token = token;
        }
        if let Some(port) = non_empty(env_vars::PORT) {
            config.port = parse_port(&port)?;
        }

        Ok(config)
    }

    /// Loads the process configuration.
    ///
    /// `~/.flowmetrics/config.json` is read first, then the project file
    /// (`$FLOWMETRICS_CONFIG` or `./.flowmetrics/config.json`) on top of it, then
    /// the process environment.
    pub fn load() -> Result<FlowConfig> {
        let user_file = match std::env::var_os("HOME") {
            Some(home) => load_config_file(
                &PathBuf::from(home)
                    .join(PROJECT_CONFIG_DIR)
                    .join(PROJECT_CONFIG_FILENAME),
            )?,
            None => HashMap::new(),
        };

        let project_path = std::env::var_os(env_vars::CONFIG_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(PROJECT_CONFIG_DIR).join(PROJECT_CONFIG_FILENAME));
        let project_file = load_config_file(&project_path)?;
        tracing::debug!(
            path = %project_path.display(),
            user_keys = user_file.len(),
            project_keys = project_file.len(),
            "loaded config files"
        );

        let merged = update_config(&user_file, &project_file);
        FlowConfig::resolve(&merged, |name| std::env::var(name).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn object_with_key_works() {
        let json = r#"{"us_teams": ["Kraken", "Argos"]}"#.as_bytes();
        let config = parse_config(json).unwrap();
        assert_eq!(
            config.get(&ConfigKey::UsTeams).unwrap(),
            &json!(["Kraken", "Argos"])
        );
    }

    #[test]
    fn empty_input_works() {
        assert!(parse_config(b"").unwrap().is_empty());
        assert!(parse_config(b"   ").unwrap().is_empty());
    }

    #[test]
    fn invalid_json_fails() {
        assert!(parse_config(br#"{"port": "#).is_err());
        assert!(parse_config(br#"["a"]"#).is_err());
    }

    #[test]
    fn unknown_key_skipped() {
        let config = parse_config(br#"{"unknown": "value"}"#).unwrap();
        assert!(config.is_empty());
    }

    #[test]
    fn test_update_config_overwrites_without_touching_base() {
        let mut base_config = HashMap::new();
        base_config.insert(ConfigKey::Port, json!(8000));
        let mut updates = HashMap::new();
        updates.insert(ConfigKey::Port, json!(9000));
        updates.insert(ConfigKey::BlockedStatus, json!("On Hold"));

        let original_base_clone = base_config.clone();
        let result_config = update_config(&base_config, &updates);

        assert_eq!(result_config.get(&ConfigKey::Port).unwrap(), &json!(9000));
        assert_eq!(
            result_config.get(&ConfigKey::BlockedStatus).unwrap(),
            &json!("On Hold")
        );
        assert_eq!(base_config, original_base_clone);
    }

    #[test]
    fn test_resolve_defaults() {
        let config = FlowConfig::resolve(&HashMap::new(), no_env).unwrap();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.statuses.peer_review, "Peer Review");
        assert_eq!(config.statuses.blocked, "Blocked");
        assert_eq!(config.statuses.pending_deployment, "Pending Deployment");
        assert_eq!(config.statuses.done.len(), 3);
        assert!(config.jira.email.is_empty());
    }

    #[test]
    fn test_resolve_file_then_env() {
        let file = parse_config(
            br#"{"base_url": "https://file.example", "port": 9000, "done_statuses": ["Done"]}"#,
        )
        .unwrap();
        let env = |name: &str| match name {
            "JIRA_BASE_URL" => Some("https://env.example".to_string()),
            "JIRA_EMAIL" => Some("dev@example.com".to_string()),
            "JIRA_API_TOKEN" => Some("token".to_string()),
            _ => None,
        };

        let config = FlowConfig::resolve(&file, env).unwrap();

        assert_eq!(config.jira.base_url, "https://env.example");
        assert_eq!(config.jira.email, "dev@example.com");
        assert_eq!(config.port, 9000);
        assert_eq!(config.statuses.done, vec!["Done".to_string()]);
        assert!(config.jira.ensure_credentials().is_ok());
    }

    #[test]
    fn test_resolve_env_port() {
        let env = |name: &str| (name == "FLOWMETRICS_PORT").then(|| "8600".to_string());
        assert_eq!(FlowConfig::resolve(&HashMap::new(), env).unwrap().port, 8600);

        let bad = |name: &str| (name == "FLOWMETRICS_PORT").then(|| "http".to_string());
        assert!(FlowConfig::resolve(&HashMap::new(), bad).is_err());
    }

    #[test]
    fn test_resolve_rejects_wrong_types() {
        let file = parse_config(br#"{"us_teams": "Kraken"}"#).unwrap();
        assert!(FlowConfig::resolve(&file, no_env).is_err());

        let file = parse_config(br#"{"port": 70000}"#).unwrap();
        assert!(FlowConfig::resolve(&file, no_env).is_err());
    }

    #[test]
    fn test_ensure_credentials_names_missing_values() {
        let config = FlowConfig::default();
        let err = config.jira.ensure_credentials().unwrap_err().to_string();
        assert!(err.contains("JIRA_EMAIL"));
        assert!(err.contains("JIRA_API_TOKEN"));
        assert!(!err.contains("JIRA_BASE_URL"));
    }

    #[test]
    fn test_debug_redacts_token() {
        let jira = JiraConfig {
            base_url: "https://x".to_string(),
            email: "a@b".to_string(),
            api_token: "super-secret".to_string(),
        };
        assert!(!format!("{jira:?}").contains("super-secret"));
    }

    #[test]
    fn test_load_config_file_missing_is_empty() {
        let path = std::env::temp_dir().join("flowmetrics-config-does-not-exist.json");
        assert!(load_config_file(&path).unwrap().is_empty());
    }
}
