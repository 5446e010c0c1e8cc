use std::sync::Arc;

use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::auth::jwt::TokenCodec;
use crate::config::AppConfig;
use crate::storage::{build_uploader, AvatarUploader};
use crate::users::repo::{PgUserStore, UserStore};

#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn UserStore>,
    pub config: Arc<AppConfig>,
    pub tokens: TokenCodec,
    pub avatars: Arc<dyn AvatarUploader>,
}

impl AppState {
    /// Connects the pool and wires collaborators; the pool is returned for migrations.
    pub async fn init(config: AppConfig) -> anyhow::Result<(Self, PgPool)> {
        let config = Arc::new(config);

        let db = PgPoolOptions::new()
            .max_connections(10)
            .connect(&config.database_url)
            .await
            .context("connect to database")?;

        let tokens = TokenCodec::from_config(&config.jwt);
        if !tokens.is_configured() {
            tracing::warn!("JWT_SECRET is not set; login and authenticated routes will fail");
        }

        crate::auth::services::dummy_hash().await;

        let avatars = build_uploader(&config.avatar)
            .await
            .context("build avatar uploader")?;

        let state = Self::from_parts(Arc::new(PgUserStore::new(db.clone())), config, tokens, avatars);
        Ok((state, db))
    }

    pub fn from_parts(
        users: Arc<dyn UserStore>,
        config: Arc<AppConfig>,
        tokens: TokenCodec,
        avatars: Arc<dyn AvatarUploader>,
    ) -> Self {
        Self {
            users,
            config,
            tokens,
            avatars,
        }
    }
}
