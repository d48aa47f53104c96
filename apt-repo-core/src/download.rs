use std::path::Path;

use async_trait::async_trait;
use reqwest::Client;
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;

use crate::contract::{Artifact, Downloader};
use crate::error::{download_io, DownloadError};

/// Downloads release assets over HTTP(S).
///
/// The client is supplied by the caller so it can carry authentication and
/// a user agent; reqwest drops the `Authorization` header when a download
/// redirects to another host.
#[derive(Debug, Clone)]
pub struct HttpDownloader {
    client: Client,
}

impl HttpDownloader {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, DownloadError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| DownloadError::Request {
                url: url.to_owned(),
                source,
            })?;
        let status = response.status();
        if !status.is_success() {
            tracing::error!(url, status = %status, "Asset download returned error status");
            return Err(DownloadError::Status {
                url: url.to_owned(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }
}

impl Default for HttpDownloader {
    fn default() -> Self {
        Self::new(Client::new())
    }
}

#[async_trait]
impl Downloader for HttpDownloader {
    async fn download(&self, artifact: &Artifact, dest: &Path) -> Result<(), DownloadError> {
        tracing::info!(artifact = %artifact.name, url = %artifact.download_url, "Downloading {}", artifact.name);
        let mut response = self.get(&artifact.download_url).await?;

        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| download_io(dest, e))?;
        let mut hasher = Sha256::new();
        let mut size = 0usize;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|source| DownloadError::Request {
                url: artifact.download_url.clone(),
                source,
            })?
        {
            hasher.update(&chunk);
            size += chunk.len();
            file.write_all(&chunk)
                .await
                .map_err(|e| download_io(dest, e))?;
        }
        file.flush().await.map_err(|e| download_io(dest, e))?;

        let actual = format!("sha256:{}", hex::encode(hasher.finalize()));
        if let Some(expected) = artifact
            .digest
            .as_deref()
            .filter(|d| d.starts_with("sha256:"))
        {
            if !expected.eq_ignore_ascii_case(&actual) {
                tracing::error!(artifact = %artifact.name, expected, actual = %actual, "Downloaded asset does not match published digest");
                return Err(DownloadError::DigestMismatch {
                    name: artifact.name.clone(),
                    expected: expected.to_owned(),
                    actual,
                });
            }
        }

        tracing::debug!(
            artifact = %artifact.name,
            path = %dest.display(),
            bytes = size,
            digest = %actual,
            "Download complete"
        );
        Ok(())
    }

    async fn fetch_text(&self, artifact: &Artifact) -> Result<String, DownloadError> {
        tracing::debug!(artifact = %artifact.name, url = %artifact.download_url, "Fetching text asset");
        self.get(&artifact.download_url)
            .await?
            .text()
            .await
            .map_err(|source| DownloadError::Request {
                url: artifact.download_url.clone(),
                source,
            })
    }
}
