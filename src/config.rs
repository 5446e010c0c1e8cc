use serde::Deserialize;

/// One year; longer token lifetimes are clamped.
pub const MAX_TTL_MINUTES: i64 = 365 * 24 * 60;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    /// Signing secret. `None` keeps the server up but every sign/verify fails.
    pub secret: Option<String>,
    /// When set, issued tokens carry an `exp` claim.
    pub ttl_minutes: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AvatarBackend {
    WebDav,
    S3,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebDavConfig {
    pub base_url: String,
    pub username: String,
    pub password: String,
    pub directory: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3Config {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
    pub public_base_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AvatarConfig {
    pub backend: AvatarBackend,
    pub webdav: Option<WebDavConfig>,
    pub s3: Option<S3Config>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub jwt: JwtConfig,
    pub avatar: AvatarConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let host = std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port = std::env::var("APP_PORT")
            .ok()
            .and_then(|v| v.parse::<u16>().ok())
            .unwrap_or(8080);

        let jwt = JwtConfig {
            secret: non_empty("JWT_SECRET"),
            ttl_minutes: std::env::var("JWT_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .filter(|m| *m > 0)
                .map(|m| m.min(MAX_TTL_MINUTES)),
        };

        let backend = match std::env::var("AVATAR_BACKEND")
            .unwrap_or_default()
            .to_lowercase()
            .as_str()
        {
            "s3" | "minio" => AvatarBackend::S3,
            _ => AvatarBackend::WebDav,
        };

        let webdav = match (
            non_empty("NEXTCLOUD_URL"),
            non_empty("NEXTCLOUD_USER"),
            non_empty("NEXTCLOUD_PASSWORD"),
        ) {
            (Some(base_url), Some(username), Some(password)) => Some(WebDavConfig {
                base_url,
                username,
                password,
                directory: non_empty("NEXTCLOUD_AVATAR_DIR").unwrap_or_else(|| "avatars".into()),
            }),
            _ => None,
        };

        let s3 = match (
            non_empty("S3_ENDPOINT"),
            non_empty("S3_BUCKET"),
            non_empty("S3_ACCESS_KEY"),
            non_empty("S3_SECRET_KEY"),
        ) {
            (Some(endpoint), Some(bucket), Some(access_key), Some(secret_key)) => Some(S3Config {
                endpoint,
                bucket,
                access_key,
                secret_key,
                region: non_empty("S3_REGION").unwrap_or_else(|| "us-east-1".into()),
                public_base_url: non_empty("S3_PUBLIC_BASE_URL"),
            }),
            _ => None,
        };

        Ok(Self {
            database_url,
            host,
            port,
            jwt,
            avatar: AvatarConfig { backend, webdav, s3 },
        })
    }
}

fn non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
