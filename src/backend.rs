use std::fmt;
use std::path::Path;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info};

use crate::lead::Lead;

pub const DEFAULT_API_BASE: &str = "http://localhost:3000/api";

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("HTTP {0}")]
    Status(reqwest::StatusCode),
    #[error("backend rejected batch: {0}")]
    Rejected(String),
}

/// Backend answer to a batch upload.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchReceipt {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

/// Hands novel leads to the collection service. Failures are returned, never
/// retried.
#[async_trait]
pub trait Uploader: Send + Sync {
    async fn upload(&self, leads: &[Lead]) -> Result<BatchReceipt, UploadError>;
}

#[derive(Serialize)]
struct BatchBody<'a> {
    leads: &'a [Lead],
}

/// `GET /leads/stats` payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadStats {
    pub total_leads: u64,
    pub verified_emails: u64,
    pub pending_leads: u64,
    pub conversion_rate: Rate,
}

/// The backend reports the rate either as a number or preformatted text.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Rate {
    Number(f64),
    Text(String),
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rate::Number(n) => write!(f, "{}", n),
            Rate::Text(s) => f.write_str(s),
        }
    }
}

pub struct BackendClient {
    client: reqwest::Client,
    api_base: String,
}

impl BackendClient {
    /// No request timeout: a hung upload holds the run until it resolves.
    pub fn new(api_base: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path)
    }

    pub async fn stats(&self) -> Result<LeadStats> {
        let url = self.endpoint("leads/stats");
        let response = self.client.get(&url).send().await.context("Stats request failed")?;
        let status = response.status();
        if !status.is_success() {
            bail!("HTTP {}", status);
        }
        response.json().await.context("Failed to decode stats")
    }

    /// Download the CSV export to `dest`, returning the number of bytes written.
    pub async fn export_csv(&self, dest: &Path) -> Result<usize> {
        let url = self.endpoint("export/csv");
        info!("Downloading {}", url);
        let response = self.client.get(&url).send().await.context("Export request failed")?;
        let status = response.status();
        if !status.is_success() {
            bail!("HTTP {}", status);
        }
        let body = response.bytes().await?;
        tokio::fs::write(dest, &body)
            .await
            .with_context(|| format!("Failed to write {}", dest.display()))?;
        Ok(body.len())
    }

    async fn send_batch(&self, url: &str, leads: &[Lead]) -> Result<BatchReceipt, UploadError> {
        let response = self.client.post(url).json(&BatchBody { leads }).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(UploadError::Status(status));
        }
        let receipt: BatchReceipt = response.json().await?;
        if !receipt.success {
            let reason = receipt.message.unwrap_or_else(|| "no success flag".into());
            return Err(UploadError::Rejected(reason));
        }
        Ok(receipt)
    }
}

#[async_trait]
impl Uploader for BackendClient {
    async fn upload(&self, leads: &[Lead]) -> Result<BatchReceipt, UploadError> {
        let url = self.endpoint("leads/batch");
        info!("Sending {} leads to backend: {}", leads.len(), url);

        let result = self.send_batch(&url, leads).await;
        if let Err(e) = &result {
            error!("Backend error: {}", e);
        }
        result
    }
}
