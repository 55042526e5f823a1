use std::env;

fn main() {
    let base_url = env::var("JIRA_BASE_URL")
        .ok()
        .filter(|url| !url.trim().is_empty())
        .unwrap_or_else(|| "https://theplatform.jira.com".to_string());
    println!("cargo:rerun-if-env-changed=JIRA_BASE_URL");
    println!("cargo:rustc-env=FLOWMETRICS_DEFAULT_JIRA_URL={base_url}");
}
