//! Generation pipeline.
//!
//! The text-generation stages (search, summarize, draft) live outside this
//! crate. A [`Pipeline`] only chains them: each [`Stage`] receives the
//! previous stage's output and returns new text. The last stage's output is
//! the thread handed to the formatter.
//!
//! [`CommandStage`] runs an external program per stage, writing the input
//! to its stdin and reading the result from its stdout:
//!
//! ```toml
//! [[pipeline.stages]]
//! name = "search"
//! command = "./scripts/search.sh"
//!
//! [[pipeline.stages]]
//! name = "draft"
//! command = "llm"
//! args = ["-s", "Write a 2-tweet thread labeled 'Tweet 1:' and 'Tweet 2:'"]
//! timeout_secs = 120
//! ```

use std::process::Stdio;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::{PipelineConfig, StageConfig};
use crate::error::PipelineError;

/// One text-to-text step of the pipeline.
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, input: &str) -> Result<String>;
}

/// Stage backed by an external command.
pub struct CommandStage {
    name: String,
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandStage {
    pub fn new(config: &StageConfig) -> Self {
        Self {
            name: config.name.clone(),
            program: config.command.clone(),
            args: config.args.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

#[async_trait]
impl Stage for CommandStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, input: &str) -> Result<String> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to start '{}'", self.program))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("stdin of '{}' unavailable", self.program))?;
        let input = input.to_string();
        let writer = tokio::spawn(async move {
            let result = stdin.write_all(input.as_bytes()).await;
            drop(stdin);
            result
        });

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| anyhow!("timed out after {}s", self.timeout.as_secs()))??;
        // A command may exit without reading its input.
        match writer.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
            Ok(Err(e)) => debug!(stage = %self.name, error = %e, "stdin write failed"),
            Err(e) => debug!(stage = %self.name, error = %e, "stdin writer task failed"),
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "'{}' exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Ordered chain of stages.
pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
}

impl Pipeline {
    pub fn new(stages: Vec<Box<dyn Stage>>) -> Self {
        Self { stages }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            config
                .stages
                .iter()
                .map(|s| Box::new(CommandStage::new(s)) as Box<dyn Stage>)
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Run every stage in order. A stage that fails or produces only
    /// whitespace stops the pipeline.
    pub async fn run(&self, seed: &str) -> Result<String, PipelineError> {
        let mut text = seed.to_string();
        for stage in &self.stages {
            info!(stage = stage.name(), "running stage");
            let output = stage.run(&text).await.map_err(|e| PipelineError {
                stage: stage.name().to_string(),
                cause: format!("{:#}", e),
            })?;
            if output.trim().is_empty() {
                return Err(PipelineError {
                    stage: stage.name().to_string(),
                    cause: "produced no output".to_string(),
                });
            }
            text = output;
        }
        Ok(text)
    }
}
