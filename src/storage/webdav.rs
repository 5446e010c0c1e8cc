use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::{header::CONTENT_TYPE, Client, Method};
use time::OffsetDateTime;
use tracing::{debug, warn};

use super::{avatar_object_name, AvatarLink, AvatarUploader, UploadError};
use crate::config::WebDavConfig;

const MKCOL_TIMEOUT: Duration = Duration::from_secs(10);
const PUT_TIMEOUT: Duration = Duration::from_secs(30);
const SHARE_TIMEOUT: Duration = Duration::from_secs(30);

/// OCS share type for public links.
const SHARE_TYPE_PUBLIC_LINK: &str = "3";

/// Nextcloud-compatible storage: files go over WebDAV, public links come from
/// the OCS share API.
pub struct WebDavUploader {
    client: Client,
    cfg: WebDavConfig,
}

impl WebDavUploader {
    pub fn new(cfg: WebDavConfig) -> anyhow::Result<Self> {
        let client = Client::builder().build().context("build webdav http client")?;
        Ok(Self { client, cfg })
    }

    fn base(&self) -> &str {
        self.cfg.base_url.trim_end_matches('/')
    }

    fn directory(&self) -> &str {
        self.cfg.directory.trim_matches('/')
    }

    fn dav_url(&self, path: &str) -> String {
        format!(
            "{}/remote.php/dav/files/{}/{}",
            self.base(),
            self.cfg.username,
            path
        )
    }

    /// Best effort; the directory usually exists already.
    async fn ensure_directory(&self) {
        let Ok(mkcol) = Method::from_bytes(b"MKCOL") else {
            return;
        };
        let res = self
            .client
            .request(mkcol, self.dav_url(self.directory()))
            .basic_auth(&self.cfg.username, Some(&self.cfg.password))
            .timeout(MKCOL_TIMEOUT)
            .send()
            .await;
        if let Err(e) = res {
            debug!(error = %e, "mkcol failed; continuing");
        }
    }

    async fn put(&self, path: &str, body: Bytes, content_type: &str) -> Result<(), UploadError> {
        let res = self
            .client
            .put(self.dav_url(path))
            .basic_auth(&self.cfg.username, Some(&self.cfg.password))
            .header(CONTENT_TYPE, content_type)
            .body(body)
            .timeout(PUT_TIMEOUT)
            .send()
            .await
            .map_err(|e| UploadError::Transfer(e.to_string()))?;
        if !res.status().is_success() {
            return Err(UploadError::Rejected(res.status().as_u16()));
        }
        Ok(())
    }

    async fn create_share(&self, path: &str) -> anyhow::Result<String> {
        let url = format!(
            "{}/ocs/v2.php/apps/files_sharing/api/v1/shares",
            self.base()
        );
        let share_path = format!("/{}", path);
        let res = self
            .client
            .post(url)
            .basic_auth(&self.cfg.username, Some(&self.cfg.password))
            .header("OCS-APIRequest", "true")
            .form(&[("path", share_path.as_str()), ("shareType", SHARE_TYPE_PUBLIC_LINK)])
            .timeout(SHARE_TIMEOUT)
            .send()
            .await
            .context("share request")?;
        let status = res.status();
        let body = res.text().await.context("read share response")?;
        anyhow::ensure!(status.is_success(), "share request returned {}", status);
        let link = extract_share_url(&body).context("no <url> in share response")?;
        Ok(format!("{}/download", link.trim_end_matches('/')))
    }
}

#[async_trait]
impl AvatarUploader for WebDavUploader {
    async fn upload(
        &self,
        body: Bytes,
        original_name: &str,
        content_type: &str,
    ) -> Result<AvatarLink, UploadError> {
        let name = avatar_object_name(original_name, content_type, OffsetDateTime::now_utc());
        let path = match self.directory() {
            "" => name,
            dir => format!("{}/{}", dir, name),
        };

        self.ensure_directory().await;
        self.put(&path, body, content_type).await?;
        debug!(path = %path, "avatar uploaded");

        match self.create_share(&path).await {
            Ok(url) => Ok(AvatarLink::Public(url)),
            Err(e) => {
                warn!(error = %e, path = %path, "public share failed; using direct url");
                Ok(AvatarLink::Direct(self.dav_url(&path)))
            }
        }
    }
}

/// Pulls the share link out of an OCS XML reply.
pub(crate) fn extract_share_url(xml: &str) -> Option<String> {
    lazy_static! {
        static ref URL_RE: Regex = Regex::new(r"<url>\s*([^<]+?)\s*</url>").unwrap();
    }
    URL_RE
        .captures(xml)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().replace("&amp;", "&"))
        .filter(|u| !u.is_empty())
}
