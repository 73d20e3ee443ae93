//! Run configuration.
//!
//! Built once by the binary and passed to every component that needs it.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

pub const DEFAULT_PROJECT_REPO: &str = "https://github.com/damatjs/damat-starter-default";
pub const DEFAULT_MODULE_REPO: &str = "https://github.com/damatjs/damat-starter-module";

const LOCAL_ORIGINS: &str = "http://localhost:8000,http://localhost:5173,http://localhost:9000";
const DOCS_ORIGIN: &str = "https://docs.damat.com";

/// Configuration for a scaffold run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaffoldConfig {
    /// Template cloned for a project.
    pub project_repo: String,

    /// Template cloned for a module.
    pub module_repo: String,

    /// Dependencies with this prefix follow the `--version` override.
    pub namespace_prefix: String,

    /// Namespaced packages that keep their own versioning.
    pub version_exempt: Vec<String>,

    /// Stderr markers of a transient dependency resolution failure.
    pub transient_markers: Vec<String>,

    /// Refresh period of the progress tip.
    pub tip_interval: Duration,

    /// Lines appended to a new project's `.env`.
    pub env_defaults: Vec<(String, String)>,

    pub initial_branch: String,
    pub initial_commit_message: String,

    /// Script that runs the dev server of a project.
    pub dev_script: String,
}

impl Default for ScaffoldConfig {
    fn default() -> Self {
        ScaffoldConfig {
            project_repo: DEFAULT_PROJECT_REPO.to_string(),
            module_repo: DEFAULT_MODULE_REPO.to_string(),
            namespace_prefix: "@damatjs/".to_string(),
            version_exempt: vec!["@damatjs/ui".to_string()],
            transient_markers: damat_process::DEFAULT_TRANSIENT_MARKERS
                .iter()
                .map(|m| m.to_string())
                .collect(),
            tip_interval: Duration::from_secs(10),
            env_defaults: vec![
                (
                    "FRONTEND_CORS".to_string(),
                    format!("{LOCAL_ORIGINS},{DOCS_ORIGIN}"),
                ),
                (
                    "AUTH_CORS".to_string(),
                    format!("{LOCAL_ORIGINS},{DOCS_ORIGIN}"),
                ),
                ("REDIS_URL".to_string(), "redis://localhost:6379".to_string()),
                ("JWT_SECRET".to_string(), "supersecret".to_string()),
                ("COOKIE_SECRET".to_string(), "supersecret".to_string()),
            ],
            initial_branch: "main".to_string(),
            initial_commit_message: "chore: bootstrap project structure".to_string(),
            dev_script: "dev".to_string(),
        }
    }
}

impl ScaffoldConfig {
    /// Defaults overlaid with `DAMAT_PROJECT_REPO`, `DAMAT_MODULE_REPO` and
    /// `DAMAT_TIP_INTERVAL_SECS`.
    pub fn from_env() -> Self {
        Self::default().overlay(|key| std::env::var(key).ok())
    }

    fn overlay<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(repo) = lookup("DAMAT_PROJECT_REPO").filter(|v| !v.trim().is_empty()) {
            self.project_repo = repo;
        }
        if let Some(repo) = lookup("DAMAT_MODULE_REPO").filter(|v| !v.trim().is_empty()) {
            self.module_repo = repo;
        }
        if let Some(raw) = lookup("DAMAT_TIP_INTERVAL_SECS") {
            match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => self.tip_interval = Duration::from_secs(secs),
                _ => warn!(value = %raw, "Ignoring invalid DAMAT_TIP_INTERVAL_SECS"),
            }
        }
        self
    }

    pub fn with_tip_interval(mut self, interval: Duration) -> Self {
        self.tip_interval = interval;
        self
    }

    /// The `.env` block appended to a new project.
    pub fn env_block(&self) -> String {
        self.env_defaults
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = ScaffoldConfig::default();
        assert_eq!(config.project_repo, DEFAULT_PROJECT_REPO);
        assert_eq!(config.module_repo, DEFAULT_MODULE_REPO);
        assert_eq!(config.tip_interval, Duration::from_secs(10));
        assert_eq!(config.transient_markers, vec!["ERESOLVE".to_string()]);
    }

    #[test]
    fn test_env_overlay() {
        let vars: HashMap<&str, &str> = [
            ("DAMAT_PROJECT_REPO", "https://example.com/starter"),
            ("DAMAT_TIP_INTERVAL_SECS", "3"),
        ]
        .into_iter()
        .collect();
        let config =
            ScaffoldConfig::default().overlay(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.project_repo, "https://example.com/starter");
        assert_eq!(config.module_repo, DEFAULT_MODULE_REPO);
        assert_eq!(config.tip_interval, Duration::from_secs(3));
    }

    #[test]
    fn test_invalid_interval_keeps_default() {
        let config = ScaffoldConfig::default().overlay(|key| {
            (key == "DAMAT_TIP_INTERVAL_SECS").then(|| "soon".to_string())
        });
        assert_eq!(config.tip_interval, Duration::from_secs(10));
    }

    #[test]
    fn test_env_block() {
        let block = ScaffoldConfig::default().env_block();
        let lines: Vec<_> = block.lines().collect();
        assert_eq!(lines.len(), 5);
        assert_eq!(
            lines[0],
            "FRONTEND_CORS=http://localhost:8000,http://localhost:5173,http://localhost:9000,https://docs.damat.com"
        );
        assert!(lines.contains(&"REDIS_URL=redis://localhost:6379"));
        assert!(lines.contains(&"COOKIE_SECRET=supersecret"));
    }
}
