//! TOML configuration.
//!
//! Every section is optional; a missing file means built-in defaults. See
//! `config/bytebrief.example.toml` for a full example.
//!
//! The fixed document id can also come from the `GOOGLE_DOC_ID` environment
//! variable, which takes precedence over `archive.document_id`.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Title of the archive document when none is configured.
pub const DEFAULT_DOC_TITLE: &str = "ByteBrief- Thread Saver";

/// Environment variable holding the fixed document id.
pub const DOC_ID_ENV: &str = "GOOGLE_DOC_ID";

/// Config file used when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "./config/bytebrief.toml";

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub auth: AuthConfig,
    pub archive: ArchiveConfig,
    pub google: GoogleConfig,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AuthConfig {
    /// Durable credential file, rewritten after every mint or refresh.
    pub token_path: PathBuf,
    /// User-provisioned OAuth client secret file. Read-only.
    pub client_secret_path: PathBuf,
    pub scopes: Vec<String>,
    /// Loopback port for the consent redirect; 0 picks a free port.
    pub redirect_port: u16,
    pub consent_timeout_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_path: PathBuf::from("token.json"),
            client_secret_path: PathBuf::from("credentials.json"),
            scopes: default_scopes(),
            redirect_port: 0,
            consent_timeout_secs: 300,
        }
    }
}

fn default_scopes() -> Vec<String> {
    vec![
        "https://www.googleapis.com/auth/documents".to_string(),
        "https://www.googleapis.com/auth/drive".to_string(),
    ]
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ArchiveConfig {
    pub document_id: Option<String>,
    pub title: String,
    /// Heading written at the top of a newly created archive document.
    pub header_title: String,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            document_id: None,
            title: DEFAULT_DOC_TITLE.to_string(),
            header_title: "ByteBrief Tweet Archive".to_string(),
        }
    }
}

impl ArchiveConfig {
    /// The fixed document id, preferring `GOOGLE_DOC_ID` over the file.
    pub fn fixed_document_id(&self) -> Option<String> {
        pick_fixed_id(std::env::var(DOC_ID_ENV).ok(), self.document_id.clone())
    }
}

fn pick_fixed_id(env: Option<String>, configured: Option<String>) -> Option<String> {
    env.into_iter()
        .chain(configured)
        .map(|id| id.trim().to_string())
        .find(|id| !id.is_empty())
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GoogleConfig {
    pub docs_api_url: String,
    pub drive_api_url: String,
    /// Base of the document viewer URL; `/<id>/edit` is appended.
    pub viewer_url: String,
    pub timeout_secs: u64,
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            docs_api_url: "https://docs.googleapis.com/v1".to_string(),
            drive_api_url: "https://www.googleapis.com/drive/v3".to_string(),
            viewer_url: "https://docs.google.com/document/d".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PipelineConfig {
    /// Text fed to the first stage.
    pub seed: String,
    pub stages: Vec<StageConfig>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            seed: "Search the web for 3-5 trending tech topics today".to_string(),
            stages: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StageConfig {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_stage_timeout")]
    pub timeout_secs: u64,
}

fn default_stage_timeout() -> u64 {
    300
}

/// Load configuration.
///
/// An explicit path must exist. Without one, [`DEFAULT_CONFIG_PATH`] is used
/// when present and defaults otherwise.
pub fn load(explicit: Option<&Path>) -> Result<Config> {
    match explicit {
        Some(path) => load_config(path),
        None => {
            let default_path = Path::new(DEFAULT_CONFIG_PATH);
            if default_path.exists() {
                load_config(default_path)
            } else {
                Ok(Config::default())
            }
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let config = parse_config(&content)
        .with_context(|| format!("Invalid config file: {}", path.display()))?;
    Ok(config)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.archive.title.trim().is_empty() {
        bail!("archive.title must not be empty");
    }
    if config.auth.scopes.is_empty() {
        bail!("auth.scopes must list at least one scope");
    }
    if config.google.timeout_secs == 0 {
        bail!("google.timeout_secs must be > 0");
    }
    if config.auth.consent_timeout_secs == 0 {
        bail!("auth.consent_timeout_secs must be > 0");
    }

    let mut seen = HashSet::new();
    for stage in &config.pipeline.stages {
        if stage.name.trim().is_empty() {
            bail!("pipeline stage names must not be empty");
        }
        if !seen.insert(stage.name.as_str()) {
            bail!("duplicate pipeline stage: '{}'", stage.name);
        }
        if stage.command.trim().is_empty() {
            bail!("pipeline stage '{}' has an empty command", stage.name);
        }
        if stage.timeout_secs == 0 {
            bail!("pipeline stage '{}': timeout_secs must be > 0", stage.name);
        }
    }
    Ok(())
}
