//! Label print client
//!
//! Sends the current surface text to the print server. Printing runs on its
//! own task and never touches the live stream.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::client::endpoint;

const PRINT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Serialize)]
struct PrintRequest<'a> {
    text: &'a str,
}

/// Reply from `POST /print`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PrintReply {
    pub status: String,
    #[serde(default)]
    pub chars: Option<usize>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Reply from `GET /health`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PrinterHealth {
    pub status: String,
    #[serde(default)]
    pub printer: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PrintClient {
    client: reqwest::Client,
    base_url: String,
}

impl PrintClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.to_string(),
        }
    }

    /// Print `text`, returning the number of characters sent
    pub async fn print(&self, text: &str) -> Result<usize> {
        if text.trim().is_empty() {
            anyhow::bail!("Nothing to print");
        }

        let response = self
            .client
            .post(endpoint(&self.base_url, "print"))
            .timeout(Duration::from_secs(PRINT_TIMEOUT_SECS))
            .json(&PrintRequest { text })
            .send()
            .await
            .context("Failed to reach print server")?;

        let status = response.status();
        let reply: PrintReply = response
            .json()
            .await
            .with_context(|| format!("Unreadable print reply ({})", status))?;

        interpret(reply)
    }

    pub async fn health(&self) -> Result<PrinterHealth> {
        let response = self
            .client
            .get(endpoint(&self.base_url, "health"))
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .context("Failed to reach print server")?;

        response
            .json()
            .await
            .context("Failed to parse print server health")
    }
}

fn interpret(reply: PrintReply) -> Result<usize> {
    match reply.status.as_str() {
        "ok" => Ok(reply.chars.unwrap_or(0)),
        other => anyhow::bail!(
            "Print {}: {}",
            other,
            reply.message.unwrap_or_else(|| "no details".to_string())
        ),
    }
}
