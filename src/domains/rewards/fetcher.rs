use anyhow::{bail, Context};
use async_trait::async_trait;
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use super::models::Reward;

/// Retrieves the downloadable file of a `pdf` reward after a claim.
#[async_trait]
pub trait RewardFileFetcher: Send + Sync {
    async fn fetch(&self, reward: &Reward, file_url: &str) -> anyhow::Result<()>;
}

/// Skips retrieval; the host opens `file_url` itself.
#[derive(Debug, Clone, Default)]
pub struct NoopFileFetcher;

#[async_trait]
impl RewardFileFetcher for NoopFileFetcher {
    async fn fetch(&self, reward: &Reward, file_url: &str) -> anyhow::Result<()> {
        debug!(reward_id = %reward.id, "Reward file left for the host: {}", file_url);
        Ok(())
    }
}

/// Downloads reward files over HTTP into a local directory.
#[derive(Clone)]
pub struct HttpFileFetcher {
    http_client: Client,
    download_dir: PathBuf,
}

impl HttpFileFetcher {
    pub fn new(download_dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http_client,
            download_dir: download_dir.into(),
        })
    }

    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    /// `<reward id>-<last url segment>`, falling back to `<reward id>.pdf`.
    pub fn file_name(reward: &Reward, file_url: &str) -> String {
        let segment = file_url
            .split(&['?', '#'][..])
            .next()
            .and_then(|path| path.rsplit('/').next())
            .filter(|name| !name.is_empty() && !name.contains(".."));

        match segment {
            Some(name) => format!("{}-{}", reward.id, name),
            None => format!("{}.pdf", reward.id),
        }
    }
}

#[async_trait]
impl RewardFileFetcher for HttpFileFetcher {
    async fn fetch(&self, reward: &Reward, file_url: &str) -> anyhow::Result<()> {
        let response = self
            .http_client
            .get(file_url)
            .send()
            .await
            .with_context(|| format!("Request for {} failed", file_url))?;

        if !response.status().is_success() {
            bail!("Reward file {} returned status {}", file_url, response.status());
        }

        let bytes = response.bytes().await?;
        tokio::fs::create_dir_all(&self.download_dir).await?;
        let path = self.download_dir.join(Self::file_name(reward, file_url));
        tokio::fs::write(&path, &bytes)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;

        info!(reward_id = %reward.id, bytes = bytes.len(), "Reward file saved to {}", path.display());
        Ok(())
    }
}
