use std::{path::Path, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::config::{AvatarBackend, AvatarConfig};

mod s3;
mod webdav;

pub use s3::S3Uploader;
pub use webdav::WebDavUploader;

/// Where an uploaded avatar can be fetched from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AvatarLink {
    /// Public share link minted by the storage service.
    Public(String),
    /// Direct object URL, used when no public link could be created.
    Direct(String),
}

impl AvatarLink {
    pub fn url(&self) -> &str {
        match self {
            AvatarLink::Public(url) | AvatarLink::Direct(url) => url,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, AvatarLink::Direct(_))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("avatar storage is not configured")]
    NotConfigured,
    #[error("upload request failed: {0}")]
    Transfer(String),
    #[error("storage rejected the upload with status {0}")]
    Rejected(u16),
}

#[async_trait]
pub trait AvatarUploader: Send + Sync {
    async fn upload(
        &self,
        body: Bytes,
        original_name: &str,
        content_type: &str,
    ) -> Result<AvatarLink, UploadError>;
}

/// Stand-in used when credentials are missing; every upload fails.
pub struct UnconfiguredUploader;

#[async_trait]
impl AvatarUploader for UnconfiguredUploader {
    async fn upload(&self, _: Bytes, _: &str, _: &str) -> Result<AvatarLink, UploadError> {
        Err(UploadError::NotConfigured)
    }
}

pub async fn build_uploader(cfg: &AvatarConfig) -> anyhow::Result<Arc<dyn AvatarUploader>> {
    let uploader: Arc<dyn AvatarUploader> = match (cfg.backend, &cfg.webdav, &cfg.s3) {
        (AvatarBackend::WebDav, Some(webdav), _) => {
            info!(base_url = %webdav.base_url, "avatar storage: webdav");
            Arc::new(WebDavUploader::new(webdav.clone())?)
        }
        (AvatarBackend::S3, _, Some(s3)) => {
            info!(endpoint = %s3.endpoint, bucket = %s3.bucket, "avatar storage: s3");
            Arc::new(S3Uploader::new(s3).await?)
        }
        (backend, _, _) => {
            warn!(?backend, "avatar storage credentials missing; uploads will fail");
            Arc::new(UnconfiguredUploader)
        }
    };
    Ok(uploader)
}

/// `avatar_<unix nanos>_<random hex>.<ext>`; the extension comes from the
/// original file name, then the content type, then falls back to `bin`.
pub fn avatar_object_name(original_name: &str, content_type: &str, now: OffsetDateTime) -> String {
    let ext = extension_of(original_name)
        .or_else(|| ext_from_mime(content_type).map(str::to_string))
        .unwrap_or_else(|| "bin".to_string());
    let suffix: u16 = rand::random();
    format!("avatar_{}_{:04x}.{}", now.unix_timestamp_nanos(), suffix, ext)
}

fn extension_of(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .filter(|e| !e.is_empty() && e.len() <= 5 && e.chars().all(|c| c.is_ascii_alphanumeric()))
}

fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/gif" => Some("gif"),
        "image/heic" => Some("heic"),
        _ => None,
    }
}
