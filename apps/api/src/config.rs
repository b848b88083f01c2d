use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_PDFLATEX_PATH: &str = "/usr/bin/pdflatex";
const DEFAULT_COMPILE_TIMEOUT_SECS: u64 = 30;

/// Application configuration loaded from environment variables.
/// Every variable has a default; malformed values abort startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub rust_log: String,
    /// Absolute path of the LaTeX compiler. Never resolved through `PATH`.
    pub pdflatex_path: PathBuf,
    pub compile_timeout: Duration,
    /// Parent directory for per-request workspaces.
    pub compile_workdir: PathBuf,
    /// Directory holding the browser editor bundle, if it should be served.
    pub static_dir: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = match lookup("PORT") {
            Some(raw) => raw
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            None => DEFAULT_PORT,
        };

        let timeout_secs = match lookup("COMPILE_TIMEOUT_SECS") {
            Some(raw) => raw
                .parse::<u64>()
                .context("COMPILE_TIMEOUT_SECS must be a whole number of seconds")?,
            None => DEFAULT_COMPILE_TIMEOUT_SECS,
        };
        if timeout_secs == 0 {
            anyhow::bail!("COMPILE_TIMEOUT_SECS must be greater than zero");
        }

        Ok(Config {
            port,
            rust_log: lookup("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            pdflatex_path: lookup("PDFLATEX_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_PDFLATEX_PATH)),
            compile_timeout: Duration::from_secs(timeout_secs),
            compile_workdir: lookup("COMPILE_WORKDIR")
                .map(PathBuf::from)
                .unwrap_or_else(std::env::temp_dir),
            static_dir: lookup("STATIC_DIR").map(PathBuf::from),
        })
    }
}
