//! Archive orchestration.
//!
//! [`Archiver`] wires the archive subsystem together:
//!
//! ```text
//! raw text ─▶ formatter ─▶ CredentialStore ─▶ DocumentResolver ─▶ AppendEngine
//!                           (auth stage)       (resolve stage)     (append stage)
//! ```
//!
//! The credential is obtained before any document call, so a missing client
//! secret or failed consent stops the run before anything touches the store.
//! Errors surface as [`ArchiveError`], which names the failing stage.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::io::AsyncReadExt;
use tracing::{info, warn};

use crate::append::AppendEngine;
use crate::config::Config;
use crate::credential::CredentialStore;
use crate::error::ArchiveError;
use crate::formatter;
use crate::google::GoogleDocsStore;
use crate::models::{viewer_url, Clock, Confirmation, DocumentId, SystemClock};
use crate::oauth::GoogleOAuth;
use crate::pipeline::Pipeline;
use crate::resolver::DocumentResolver;
use crate::store::DocumentStore;

/// Which document to archive into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveTarget {
    pub fixed_id: Option<String>,
    pub title: String,
    pub header_title: String,
    pub viewer_url: String,
}

impl ArchiveTarget {
    pub fn from_config(config: &Config) -> Self {
        Self {
            fixed_id: config.archive.fixed_document_id(),
            title: config.archive.title.clone(),
            header_title: config.archive.header_title.clone(),
            viewer_url: config.google.viewer_url.clone(),
        }
    }
}

pub struct Archiver {
    credentials: Arc<CredentialStore>,
    resolver: DocumentResolver,
    engine: AppendEngine,
    target: ArchiveTarget,
}

impl Archiver {
    pub fn new(
        credentials: Arc<CredentialStore>,
        store: Arc<dyn DocumentStore>,
        clock: Arc<dyn Clock>,
        target: ArchiveTarget,
    ) -> Self {
        let resolver = DocumentResolver::new(store.clone(), clock.clone(), &target.header_title);
        let engine = AppendEngine::new(store, clock, &target.viewer_url);
        Self {
            credentials,
            resolver,
            engine,
            target,
        }
    }

    pub fn target(&self) -> &ArchiveTarget {
        &self.target
    }

    pub fn document_url(&self, id: &DocumentId) -> String {
        viewer_url(&self.target.viewer_url, id)
    }

    /// Authenticate and resolve the canonical document.
    pub async fn resolve(&self) -> Result<DocumentId, ArchiveError> {
        self.credentials.obtain().await?;
        let id = self
            .resolver
            .resolve(self.target.fixed_id.as_deref(), &self.target.title)
            .await?;
        Ok(id)
    }

    /// Format `raw` and append it to the canonical document.
    pub async fn archive(&self, raw: &str) -> Result<Confirmation, ArchiveError> {
        if raw.trim().is_empty() {
            return Err(ArchiveError::EmptyContent);
        }
        let block = formatter::format(raw);
        for segment in block.oversized() {
            warn!(
                label = %segment.label,
                chars = segment.len(),
                "segment exceeds the tweet length limit"
            );
        }

        let id = self.resolve().await?;
        let confirmation = self.engine.append(&id, &block).await?;
        Ok(confirmation)
    }

    /// Run the generation pipeline from `seed` and archive its output.
    pub async fn archive_generated(
        &self,
        pipeline: &Pipeline,
        seed: &str,
    ) -> Result<Confirmation, ArchiveError> {
        let thread = pipeline.run(seed).await?;
        self.archive(&thread).await
    }
}

/// Credential store backed by Google's OAuth endpoints.
pub fn build_credential_store(config: &Config) -> Result<Arc<CredentialStore>> {
    let oauth = Arc::new(GoogleOAuth::new(
        Duration::from_secs(config.google.timeout_secs),
        config.auth.redirect_port,
        Duration::from_secs(config.auth.consent_timeout_secs),
    )?);
    Ok(Arc::new(CredentialStore::new(
        &config.auth.token_path,
        &config.auth.client_secret_path,
        config.auth.scopes.clone(),
        oauth.clone(),
        oauth,
    )))
}

/// Archiver talking to Google Docs and Drive.
pub fn build_archiver(config: &Config) -> Result<Archiver> {
    let credentials = build_credential_store(config)?;
    let store = Arc::new(GoogleDocsStore::new(&config.google, credentials.clone())?);
    Ok(Archiver::new(
        credentials,
        store,
        Arc::new(SystemClock),
        ArchiveTarget::from_config(config),
    ))
}

/// Read the thread text from `file`, or from stdin when no file is given.
pub async fn read_input(file: Option<&Path>) -> Result<String> {
    match file {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read input file: {}", path.display())),
        None => {
            let mut input = String::new();
            tokio::io::stdin()
                .read_to_string(&mut input)
                .await
                .context("Failed to read stdin")?;
            Ok(input)
        }
    }
}

/// `bytebrief archive`: archive text from a file or stdin.
pub async fn run_archive(
    config: &Config,
    file: Option<&Path>,
    doc_id: Option<String>,
) -> Result<()> {
    let input = read_input(file).await?;
    let mut archiver = build_archiver(config)?;
    if doc_id.is_some() {
        archiver.target.fixed_id = doc_id;
    }
    let confirmation = archiver.archive(&input).await?;
    println!("{}", confirmation);
    Ok(())
}

/// `bytebrief resolve`: print the canonical document id and URL.
pub async fn run_resolve(config: &Config, doc_id: Option<String>) -> Result<()> {
    let mut archiver = build_archiver(config)?;
    if doc_id.is_some() {
        archiver.target.fixed_id = doc_id;
    }
    let id = archiver.resolve().await?;
    println!("{}", id);
    println!("{}", archiver.document_url(&id));
    Ok(())
}

/// `bytebrief run`: generate a thread with the configured stages and
/// archive it. With `dry_run` the formatted thread is printed instead.
pub async fn run_pipeline(config: &Config, seed: Option<String>, dry_run: bool) -> Result<()> {
    let pipeline = Pipeline::from_config(&config.pipeline);
    if pipeline.is_empty() {
        bail!("no pipeline stages configured; add [[pipeline.stages]] to the config file");
    }
    let seed = seed.unwrap_or_else(|| config.pipeline.seed.clone());
    info!(stages = ?pipeline.stage_names(), "starting pipeline");

    if dry_run {
        let thread = pipeline.run(&seed).await.map_err(ArchiveError::from)?;
        println!("{}", formatter::format(&thread).serialize());
        return Ok(());
    }

    let archiver = build_archiver(config)?;
    let confirmation = archiver.archive_generated(&pipeline, &seed).await?;
    println!("{}", confirmation);
    Ok(())
}

/// `bytebrief format`: print the normalized thread without any network call.
pub async fn run_format(file: Option<&Path>) -> Result<()> {
    let input = read_input(file).await?;
    let block = formatter::format(&input);
    println!("{}", block.serialize());
    for segment in block.oversized() {
        eprintln!(
            "Warning: {} is {} characters (limit {})",
            segment.label,
            segment.len(),
            crate::models::TWEET_CHAR_LIMIT
        );
    }
    Ok(())
}
