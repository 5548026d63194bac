//! Server Configuration

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;

/// Environment-driven server settings
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// `BIND_ADDR`
    pub bind_addr: String,

    /// `SESSION_FILE`, chat assistant history
    pub session_file: PathBuf,

    /// `THREAD_FILE`, run assistant history and thread bindings
    pub thread_file: PathBuf,

    /// `COMPLETION_TIMEOUT_SECS`
    pub completion_timeout: Duration,

    /// `POLL_MAX_WAIT_SECS`
    pub poll_max_wait: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".into(),
            session_file: PathBuf::from("sessions.json"),
            thread_file: PathBuf::from("threads.json"),
            completion_timeout: Duration::from_secs(60),
            poll_max_wait: Duration::from_secs(120),
        }
    }
}

fn secs_var(name: &str, default: Duration) -> anyhow::Result<Duration> {
    match std::env::var(name) {
        Ok(raw) => {
            let secs: u64 = raw
                .trim()
                .parse()
                .with_context(|| format!("{} must be a whole number of seconds, got '{}'", name, raw))?;
            Ok(Duration::from_secs(secs))
        }
        Err(_) => Ok(default),
    }
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        Ok(Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or(defaults.bind_addr),
            session_file: std::env::var("SESSION_FILE").map_or(defaults.session_file, PathBuf::from),
            thread_file: std::env::var("THREAD_FILE").map_or(defaults.thread_file, PathBuf::from),
            completion_timeout: secs_var("COMPLETION_TIMEOUT_SECS", defaults.completion_timeout)?,
            poll_max_wait: secs_var("POLL_MAX_WAIT_SECS", defaults.poll_max_wait)?,
        })
    }
}
