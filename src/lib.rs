pub mod changelog;
pub mod cli {
    pub mod parser;
}
pub mod config;
pub mod export;
pub mod jira {
    pub mod client;
    pub mod fetch;
    pub mod issues;
}
pub mod metrics;
pub mod output;
pub mod render;
pub mod report;
pub mod run;
pub mod web;
