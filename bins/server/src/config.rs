use std::collections::HashSet;

use clap::{Args, Parser, Subcommand};
use serde::Deserialize;

use crate::error::ServerError;
use topic_engine::Grant;

#[derive(Parser)]
#[command(name = "reader-gateway", about = "WebSocket reader для topic'ов")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Запустить сервер
    Serve(ServeArgs),
}

#[derive(Args, Clone, Debug)]
pub struct ServeArgs {
    /// Путь к TOML конфиг файлу
    #[arg(long, default_value = "config.toml", env = "CONFIG_PATH")]
    pub config: String,
}

// ---- TOML Config ----

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_api_port")]
    pub api_port: u16,
    /// Период отчёта статистики reader'ов, 0: выключен.
    #[serde(default = "default_stats_interval")]
    pub stats_interval_secs: u64,
    #[serde(default)]
    pub topics: Vec<TopicConfig>,
    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Debug, Deserialize)]
pub struct TopicConfig {
    pub name: String,
    /// Retention in-memory лога.
    #[serde(default = "default_max_records")]
    pub max_records: usize,
}

#[derive(Debug, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_role_header")]
    pub role_header: String,
    #[serde(default)]
    pub grants: Vec<Grant>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            role_header: default_role_header(),
            grants: Vec::new(),
        }
    }
}

fn default_api_port() -> u16 {
    9200
}
fn default_stats_interval() -> u64 {
    60
}
fn default_max_records() -> usize {
    100_000
}
fn default_role_header() -> String {
    "x-auth-role".into()
}

impl ServerConfig {
    pub fn load(path: &str) -> Result<Self, ServerError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ServerError::Config { context: "read", detail: format!("'{path}': {e}") })?;
        Self::parse(&content)
            .map_err(|e| match e {
                ServerError::Config { context, detail } => ServerError::Config { context, detail: format!("'{path}': {detail}") },
                other => other,
            })
    }

    pub fn parse(content: &str) -> Result<Self, ServerError> {
        let config: Self = toml::from_str(content)
            .map_err(|e| ServerError::Config { context: "parse", detail: e.to_string() })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ServerError> {
        if self.topics.is_empty() {
            return Err(ServerError::NoComponents("[[topics]]"));
        }
        let mut seen = HashSet::new();
        for topic in &self.topics {
            if topic.name.is_empty() {
                return Err(ServerError::Config { context: "topics", detail: "empty topic name".into() });
            }
            if !seen.insert(topic.name.as_str()) {
                return Err(ServerError::Config { context: "topics", detail: format!("duplicate topic '{}'", topic.name) });
            }
        }
        Ok(())
    }
}
