use lazy_static::lazy_static;
use regex::Regex;
use time::OffsetDateTime;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use super::{
    dto::SignedUpUser,
    password::{hash_password_async, verify_password_async},
};
use crate::{
    error::AppError,
    state::AppState,
    users::{
        dto::ProfileView,
        repo::StoreError,
        repo_types::{NewUser, MAX_EMAIL_CHARS, MAX_USERNAME_CHARS},
    },
};

const INVALID_CREDENTIALS: &str = "invalid email or password";

lazy_static! {
    static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
}

// Compared against when the email is unknown so both failure paths cost one hash check.
static DUMMY_HASH: OnceCell<Option<String>> = OnceCell::const_new();

/// Hashes the dummy password on the blocking pool, once.
pub async fn dummy_hash() -> Option<&'static str> {
    DUMMY_HASH
        .get_or_init(|| async { hash_password_async("not-a-real-password").await.ok() })
        .await
        .as_deref()
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

fn is_blank(s: &str) -> bool {
    s.trim().is_empty()
}

pub async fn sign_up(
    st: &AppState,
    username: &str,
    email: &str,
    password: &str,
) -> Result<SignedUpUser, AppError> {
    if is_blank(username) || is_blank(email) || is_blank(password) {
        return Err(AppError::invalid_input(
            "username, email and password are required",
        ));
    }
    let (username, email) = (username.trim(), email.trim());

    if username.chars().count() > MAX_USERNAME_CHARS {
        return Err(AppError::invalid_input("username must be at most 50 characters"));
    }
    if email.chars().count() > MAX_EMAIL_CHARS {
        return Err(AppError::invalid_input("email must be at most 255 characters"));
    }

    if !is_valid_email(email) {
        warn!(email = %email, "invalid email");
        return Err(AppError::invalid_input("invalid email"));
    }

    if st
        .users
        .find_by_email_or_username(email, username)
        .await?
        .is_some()
    {
        warn!(email = %email, username = %username, "signup collision");
        return Err(AppError::conflict("username or email already exists"));
    }

    let hash = hash_password_async(password).await.map_err(AppError::internal)?;

    // The store repeats the uniqueness check atomically; a concurrent twin lands here.
    let user = st
        .users
        .create(NewUser {
            email,
            username,
            password_hash: &hash,
            created_at: OffsetDateTime::now_utc(),
        })
        .await
        .map_err(|e| match e {
            StoreError::Conflict => AppError::conflict("username or email already exists"),
            other => other.into(),
        })?;

    info!(email = %user.email, username = %user.username, "user registered");
    Ok(SignedUpUser {
        username: user.username,
        email: user.email,
    })
}

/// Unknown email and wrong password fail identically.
pub async fn login(
    st: &AppState,
    email: &str,
    password: &str,
) -> Result<(String, ProfileView), AppError> {
    if is_blank(email) || is_blank(password) {
        return Err(AppError::invalid_input("email and password are required"));
    }
    let email = email.trim();

    let Some(mut user) = st.users.find_by_email(email).await? else {
        if let Some(dummy) = dummy_hash().await {
            let _ = verify_password_async(password, dummy).await;
        }
        warn!(email = %email, "login failed");
        return Err(AppError::unauthenticated(INVALID_CREDENTIALS));
    };

    let ok = verify_password_async(password, &user.password_hash)
        .await
        .map_err(AppError::internal)?;
    if !ok {
        warn!(email = %email, "login failed");
        return Err(AppError::unauthenticated(INVALID_CREDENTIALS));
    }

    let token = st.tokens.issue(&user.email)?;

    let now = OffsetDateTime::now_utc();
    st.users.touch_last_login(&user.email, now).await?;
    user.last_login = Some(now);

    info!(email = %user.email, "user logged in");
    Ok((token, ProfileView::from(user)))
}

/// Profile of an already-resolved identity; also stamps `last_login`.
pub async fn verify_and_fetch(st: &AppState, email: &str) -> Result<ProfileView, AppError> {
    let mut user = st
        .users
        .find_by_email(email)
        .await?
        .ok_or_else(|| AppError::not_found("user not found"))?;

    let now = OffsetDateTime::now_utc();
    st.users.touch_last_login(&user.email, now).await?;
    user.last_login = Some(now);

    Ok(ProfileView::from(user))
}
