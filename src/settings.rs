use std::path::PathBuf;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

const CONFIG_FILE: &str = "scholar-alerts";
const ENV_PREFIX: &str = "SCHOLAR_ALERTS";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Host at which the redirect chain exposes the destination.
    pub terminal_host: String,
    /// Query parameter on the terminal URL holding the destination.
    pub target_param: String,
    pub max_hops: usize,
    pub timeout_secs: u64,
    pub user_agent: String,
    /// Relative paths are taken from the input directory.
    pub batches_dir: PathBuf,
    /// Relative paths are taken from the batch directory.
    pub quarantine_dir: PathBuf,
    pub dump_html: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            terminal_host: "scholar.google.com".into(),
            target_param: "url".into(),
            max_hops: 10,
            timeout_secs: 10,
            user_agent: concat!("scholar_alerts/", env!("CARGO_PKG_VERSION")).into(),
            batches_dir: "batches".into(),
            quarantine_dir: "failed".into(),
            dump_html: false,
        }
    }
}

impl Settings {
    /// Defaults, then `scholar-alerts.toml` if present, then `SCHOLAR_ALERTS_*` env vars.
    pub fn load() -> Result<Self> {
        let d = Settings::default();
        Config::builder()
            .set_default("terminal_host", d.terminal_host)?
            .set_default("target_param", d.target_param)?
            .set_default("max_hops", d.max_hops as i64)?
            .set_default("timeout_secs", d.timeout_secs as i64)?
            .set_default("user_agent", d.user_agent)?
            .set_default("batches_dir", d.batches_dir.to_string_lossy().into_owned())?
            .set_default("quarantine_dir", d.quarantine_dir.to_string_lossy().into_owned())?
            .set_default("dump_html", d.dump_html)?
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .context("Failed to load settings")?
            .try_deserialize()
            .context("Invalid settings")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let s = Settings::default();
        assert_eq!(s.terminal_host, "scholar.google.com");
        assert_eq!(s.target_param, "url");
        assert_eq!(s.max_hops, 10);
        assert!(s.timeout_secs > 0);
    }

    #[test]
    fn load_without_overrides_matches_defaults() {
        let s = Settings::load().unwrap();
        let d = Settings::default();
        assert_eq!(s.max_hops, d.max_hops);
        assert_eq!(s.batches_dir, d.batches_dir);
        assert_eq!(s.quarantine_dir, d.quarantine_dir);
    }
}
