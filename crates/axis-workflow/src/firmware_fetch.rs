//! Firmware artifact fetching with a local file cache
//!
//! This module handles:
//! 1. Downloading the pinned artifact from the firmware object store
//! 2. Keeping it in a cache directory so repeated runs skip the download
//! 3. Verifying the artifact against an optional SHA256

use anyhow::Context;
use async_trait::async_trait;
use axis_core::{FirmwarePin, ProvisionError, Result};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Source of firmware images
#[async_trait]
pub trait FirmwareSource: Send + Sync {
    async fn fetch(&self, pin: &FirmwarePin) -> Result<Vec<u8>>;
}

/// Object store download with an on-disk cache
pub struct FirmwareCache {
    client: reqwest::Client,
    base_url: String,
    cache_dir: PathBuf,
}

impl FirmwareCache {
    pub fn new(base_url: impl Into<String>, cache_dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(Duration::from_secs(600))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            cache_dir: cache_dir.into(),
        })
    }

    /// `{base_url}/{filename}`
    pub fn artifact_url(base_url: &str, filename: &str) -> String {
        format!("{}/{}", base_url.trim_end_matches('/'), filename)
    }

    pub fn cached_path(&self, pin: &FirmwarePin) -> PathBuf {
        self.cache_dir.join(&pin.filename)
    }

    async fn download(&self, pin: &FirmwarePin, dest: &Path) -> Result<()> {
        let url = Self::artifact_url(&self.base_url, &pin.filename);
        info!(url = %url, release = %pin.release, "Downloading firmware artifact");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ProvisionError::Transport(format!("firmware download from {} failed: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(ProvisionError::Transport(format!(
                "firmware download from {} failed with status {}",
                url,
                response.status()
            )));
        }

        let data = response
            .bytes()
            .await
            .map_err(|e| ProvisionError::Transport(format!("failed to read firmware body: {}", e)))?;

        // Write next to the destination and rename so a partial download never
        // looks like a cached artifact
        tokio::fs::create_dir_all(&self.cache_dir).await?;
        let partial = self
            .cache_dir
            .join(format!(".{}.{}.part", pin.filename, uuid::Uuid::new_v4()));
        tokio::fs::write(&partial, &data).await?;
        if let Err(e) = tokio::fs::rename(&partial, dest).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e.into());
        }

        info!(path = %dest.display(), size = data.len(), "Firmware artifact cached");
        Ok(())
    }
}

#[async_trait]
impl FirmwareSource for FirmwareCache {
    async fn fetch(&self, pin: &FirmwarePin) -> Result<Vec<u8>> {
        let path = self.cached_path(pin);
        if tokio::fs::try_exists(&path).await? {
            debug!(path = %path.display(), "Using cached firmware artifact");
        } else {
            self.download(pin, &path).await?;
        }

        let data = tokio::fs::read(&path).await?;
        if let Some(expected) = &pin.sha256 {
            if let Err(e) = verify_sha256(&data, expected) {
                warn!(path = %path.display(), "Removing firmware artifact with bad checksum");
                let _ = tokio::fs::remove_file(&path).await;
                return Err(e);
            }
            debug!(sha256 = %expected, "Firmware artifact checksum verified");
        }
        Ok(data)
    }
}

pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn verify_sha256(data: &[u8], expected: &str) -> Result<()> {
    let computed = sha256_hex(data);
    if computed.eq_ignore_ascii_case(expected.trim()) {
        Ok(())
    } else {
        Err(ProvisionError::Validation(format!(
            "Firmware checksum mismatch: expected {}, got {}",
            expected, computed
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axis_core::ErrorKind;
    use tempfile::TempDir;

    fn pin(sha256: Option<String>) -> FirmwarePin {
        FirmwarePin {
            release: "10.12.166".to_string(),
            filename: "M3058-PLVE_10_12_166.bin".to_string(),
            sha256,
        }
    }

    #[test]
    fn test_artifact_url() {
        assert_eq!(
            FirmwareCache::artifact_url("https://fw.example.com/axis/", "M3058-PLVE_10_12_166.bin"),
            "https://fw.example.com/axis/M3058-PLVE_10_12_166.bin"
        );
        assert_eq!(
            FirmwareCache::artifact_url("https://fw.example.com", "a.bin"),
            "https://fw.example.com/a.bin"
        );
    }

    #[test]
    fn test_sha256_hex() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn test_cached_artifact_is_reused() {
        let dir = TempDir::new().unwrap();
        // Unroutable base URL: any download attempt would fail
        let cache = FirmwareCache::new("http://127.0.0.1:9", dir.path()).unwrap();
        std::fs::write(cache.cached_path(&pin(None)), b"image").unwrap();

        let data = cache.fetch(&pin(Some(sha256_hex(b"image")))).await.unwrap();
        assert_eq!(data, b"image");
    }

    #[tokio::test]
    async fn test_bad_checksum_removes_artifact() {
        let dir = TempDir::new().unwrap();
        let cache = FirmwareCache::new("http://127.0.0.1:9", dir.path()).unwrap();
        let path = cache.cached_path(&pin(None));
        std::fs::write(&path, b"corrupted").unwrap();

        let err = cache
            .fetch(&pin(Some(sha256_hex(b"image"))))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(!path.exists());
    }
}
