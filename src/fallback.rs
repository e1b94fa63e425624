//! Generative model fallback.
//!
//! Consulted only when no intent clears the match threshold. Every failure on
//! this path (model missing, spawn error, non-zero exit, timeout, empty
//! output) is logged and reported as `None`; the caller supplies a canned reply.

use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("failed to start model process: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("I/O error while talking to model process: {0}")]
    Io(#[from] std::io::Error),

    #[error("model process did not finish within {0:?}")]
    Timeout(Duration),
}

/// Raw result of one model invocation, decoded lossily.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

/// An external text generator the assistant can fall back on.
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    async fn available(&self) -> bool;
    async fn run(&self, prompt: &str) -> Result<ModelOutput, ModelError>;
}

#[derive(Clone)]
pub struct FallbackResponder {
    model: Arc<dyn GenerativeModel>,
    max_words: usize,
}

impl FallbackResponder {
    pub fn new(model: Arc<dyn GenerativeModel>, max_words: usize) -> Self {
        Self { model, max_words }
    }

    pub async fn respond(&self, prompt: &str) -> Option<String> {
        if !self.model.available().await {
            log::warn!("Generative model is not available, skipping fallback");
            return None;
        }

        let wrapped = format!(
            "Please provide a concise response in under {} words to: {}",
            self.max_words, prompt
        );
        log::debug!("Sending prompt to model: {}", wrapped);

        let output = match self.model.run(&wrapped).await {
            Ok(output) => output,
            Err(e) => {
                log::warn!("Error calling model: {}", e);
                return None;
            }
        };
        if !output.success {
            log::warn!("Model process failed: {}", output.stderr.trim());
            return None;
        }
        if !output.stderr.trim().is_empty() {
            log::debug!("Model stderr output: {}", output.stderr.trim());
        }

        let response = output.stdout.trim();
        if response.is_empty() {
            log::warn!("No response received from model");
            return None;
        }
        Some(truncate_words(response, self.max_words))
    }
}

/// Keeps the first `max_words` whitespace-separated words, marking the cut with `...`.
pub fn truncate_words(text: &str, max_words: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() > max_words {
        format!("{}...", words[..max_words].join(" "))
    } else {
        text.to_string()
    }
}

/// Runs a local model through the `ollama` command line.
#[derive(Debug, Clone)]
pub struct OllamaCli {
    program: String,
    model: String,
    timeout: Duration,
}

impl OllamaCli {
    pub fn new(program: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            model: model.into(),
            timeout,
        }
    }

    /// Runs the CLI once. The child is killed if it outlives `timeout`, and the
    /// deadline also covers draining its pipes.
    async fn execute(&self, args: &[&str]) -> Result<ModelOutput, ModelError> {
        let child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(ModelError::Spawn)?;

        let output = timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| ModelError::Timeout(self.timeout))??;

        Ok(ModelOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[async_trait]
impl GenerativeModel for OllamaCli {
    async fn available(&self) -> bool {
        match self.execute(&["list"]).await {
            Ok(output) => output.success && output.stdout.contains(&self.model),
            Err(e) => {
                log::warn!("Error checking {} status: {}", self.program, e);
                false
            }
        }
    }

    async fn run(&self, prompt: &str) -> Result<ModelOutput, ModelError> {
        log::info!("Running {} {} ({} byte prompt)", self.program, self.model, prompt.len());
        self.execute(&["run", &self.model, prompt]).await
    }
}
