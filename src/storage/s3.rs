use std::{fmt::Display, future::Future, time::Duration};

use async_trait::async_trait;
use aws_config::{defaults, BehaviorVersion};
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    config::{timeout::TimeoutConfig, Builder as S3ConfigBuilder, Region},
    Client,
};
use aws_smithy_types::byte_stream::ByteStream;
use bytes::Bytes;
use time::OffsetDateTime;
use tracing::debug;

use super::{avatar_object_name, AvatarLink, AvatarUploader, UploadError};
use crate::config::S3Config;

const KEY_PREFIX: &str = "avatars";
const PUT_TIMEOUT: Duration = Duration::from_secs(30);

/// S3/MinIO avatar storage.
#[derive(Clone)]
pub struct S3Uploader {
    client: Client,
    bucket: String,
    endpoint: String,
    public_base_url: Option<String>,
}

impl S3Uploader {
    pub async fn new(cfg: &S3Config) -> anyhow::Result<Self> {
        let shared = defaults(BehaviorVersion::latest())
            .region(Region::new(cfg.region.clone()))
            .credentials_provider(Credentials::new(
                &cfg.access_key,
                &cfg.secret_key,
                None,
                None,
                "static",
            ))
            .endpoint_url(&cfg.endpoint)
            .load()
            .await;

        let conf = S3ConfigBuilder::from(&shared)
            .endpoint_url(&cfg.endpoint)
            .force_path_style(true)
            .timeout_config(
                TimeoutConfig::builder()
                    .operation_timeout(PUT_TIMEOUT)
                    .build(),
            )
            .build();

        Ok(Self {
            client: Client::from_conf(conf),
            bucket: cfg.bucket.clone(),
            endpoint: cfg.endpoint.clone(),
            public_base_url: cfg.public_base_url.clone(),
        })
    }
}

#[async_trait]
impl AvatarUploader for S3Uploader {
    async fn upload(
        &self,
        body: Bytes,
        original_name: &str,
        content_type: &str,
    ) -> Result<AvatarLink, UploadError> {
        let name = avatar_object_name(original_name, content_type, OffsetDateTime::now_utc());
        let key = format!("{}/{}", KEY_PREFIX, name);
        let put = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send();
        within(PUT_TIMEOUT, &key, put).await?;
        debug!(key = %key, "avatar uploaded");

        Ok(object_link(
            self.public_base_url.as_deref(),
            &self.endpoint,
            &self.bucket,
            &key,
        ))
    }
}

/// Runs a storage call with a hard deadline.
async fn within<T, E, F>(limit: Duration, key: &str, call: F) -> Result<T, UploadError>
where
    E: Display,
    F: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(Ok(v)) => Ok(v),
        Ok(Err(e)) => Err(UploadError::Transfer(format!("s3 put_object {}: {}", key, e))),
        Err(_) => Err(UploadError::Transfer(format!(
            "s3 put_object {}: timed out after {:?}",
            key, limit
        ))),
    }
}

fn object_link(public_base: Option<&str>, endpoint: &str, bucket: &str, key: &str) -> AvatarLink {
    match public_base {
        Some(base) => AvatarLink::Public(format!("{}/{}", base.trim_end_matches('/'), key)),
        None => AvatarLink::Direct(format!(
            "{}/{}/{}",
            endpoint.trim_end_matches('/'),
            bucket,
            key
        )),
    }
}
