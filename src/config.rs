use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Path of the append-only links file, e.g. "./links.csv".
    /// The file must already exist. `None` when LINKS_FILE is ":memory:",
    /// in which case links only live as long as the process.
    pub links_file: Option<String>,

    /// Host to bind the HTTP server to, e.g. "0.0.0.0"
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// fsync the links file after every appended record.
    /// Set LINKS_SYNC=false to trade durability for write latency.
    pub sync_writes: bool,
}

impl AppConfig {
    /// Load configuration from environment variables (populated by dotenvy before this is called).
    pub fn from_env() -> Result<Self> {
        let port = std::env::var("PORT")
            .unwrap_or_else(|_| "8080".into())
            .parse::<u16>()
            .context("PORT must be a valid port number (1–65535)")?;

        let sync_writes = match std::env::var("LINKS_SYNC") {
            Ok(v) => parse_bool(&v).context("LINKS_SYNC must be true or false")?,
            Err(_) => true,
        };

        Ok(Self {
            links_file: links_file_setting(std::env::var("LINKS_FILE").ok()),
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port,
            sync_writes,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn links_file_setting(raw: Option<String>) -> Option<String> {
    match raw {
        None => Some("links.csv".to_owned()),
        Some(path) if path == ":memory:" => None,
        Some(path) => Some(path),
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("unrecognised boolean '{other}'"),
    }
}
