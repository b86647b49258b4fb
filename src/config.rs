use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Upload endpoint suffix shared by every server URL.
pub const UPLOAD_PATH: &str = "/api/prompt/upload";

pub const DEV_SERVER_URL: &str = "http://localhost:7600/api/prompt/upload";
pub const PROD_SERVER_URL: &str = "https://cursorai.v8cloud.cn/api/prompt/upload";

/// Environment variable that selects the server environment.
pub const ENV_VAR: &str = "CURSOR_ENV";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub watch: WatchConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

fn default_store_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("prompt-relay")
        .join("config.db")
}

#[derive(Debug, Deserialize, Clone)]
pub struct WatchConfig {
    #[serde(default = "default_watch_root")]
    pub root: PathBuf,
    #[serde(default = "default_target_file")]
    pub target_file: String,
    #[serde(default = "default_descriptor_file")]
    pub descriptor_file: String,
    #[serde(default = "default_marker")]
    pub marker: String,
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            root: default_watch_root(),
            target_file: default_target_file(),
            descriptor_file: default_descriptor_file(),
            marker: default_marker(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

fn default_watch_root() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Cursor")
        .join("User")
        .join("workspaceStorage")
}
fn default_target_file() -> String {
    "state.vscdb".to_string()
}
fn default_descriptor_file() -> String {
    "workspace.json".to_string()
}
fn default_marker() -> String {
    "aiService.prompts".to_string()
}
fn default_channel_capacity() -> usize {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_env")]
    pub env: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            env: default_env(),
            url: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_env() -> String {
    "prod".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

/// Which collector the relay talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Prod,
    Dev,
}

impl Environment {
    /// Anything other than `prod` selects the development server.
    pub fn parse(value: &str) -> Self {
        if value.trim() == "prod" {
            Environment::Prod
        } else {
            Environment::Dev
        }
    }

    pub fn server_url(self) -> &'static str {
        match self {
            Environment::Prod => PROD_SERVER_URL,
            Environment::Dev => DEV_SERVER_URL,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Environment::Prod => "prod",
            Environment::Dev => "dev",
        }
    }
}

impl ServerConfig {
    /// `CURSOR_ENV` overrides the file setting when it is set and non-empty.
    pub fn environment(&self) -> Environment {
        match std::env::var(ENV_VAR) {
            Ok(v) if !v.is_empty() => Environment::parse(&v),
            _ => Environment::parse(&self.env),
        }
    }

    /// An explicit `url` wins over the environment's fixed URL.
    pub fn upload_url(&self) -> String {
        match &self.url {
            Some(url) => url.clone(),
            None => self.environment().server_url().to_string(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Load `path` if it exists, otherwise fall back to the built-in defaults.
pub fn load_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        Ok(Config::default())
    }
}

fn validate(config: &Config) -> Result<()> {
    if config.server.timeout_secs == 0 {
        anyhow::bail!("server.timeout_secs must be > 0");
    }

    if config.watch.channel_capacity == 0 {
        anyhow::bail!("watch.channel_capacity must be > 0");
    }

    for (name, value) in [
        ("watch.target_file", &config.watch.target_file),
        ("watch.descriptor_file", &config.watch.descriptor_file),
        ("watch.marker", &config.watch.marker),
    ] {
        if value.trim().is_empty() {
            anyhow::bail!("{} must not be empty", name);
        }
    }

    let url = config.server.upload_url();
    if !url.ends_with(UPLOAD_PATH) {
        anyhow::bail!(
            "server url '{}' must end with '{}'",
            url,
            UPLOAD_PATH
        );
    }

    Ok(())
}
