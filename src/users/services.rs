use time::{macros::format_description, Date, OffsetDateTime};
use tracing::{info, warn};

use super::{
    dto::{ProfileUpdate, ProfileView, UserSummary},
    repo_types::{ProfileChanges, MAX_COUNTRY_CHARS, MAX_USERNAME_CHARS},
};
use crate::{
    auth::password::{hash_password_async, verify_password_async},
    error::AppError,
    state::AppState,
};

pub const MAX_AVATAR_BYTES: usize = 5 * 1024 * 1024;
pub const MIN_PASSWORD_CHARS: usize = 6;

fn supplied(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn parse_birth_date(raw: &str) -> Result<Date, AppError> {
    Date::parse(raw, format_description!("[year]-[month]-[day]"))
        .map_err(|_| AppError::invalid_input("birth_date must be a date in YYYY-MM-DD format"))
}

pub async fn list_users(st: &AppState) -> Result<Vec<UserSummary>, AppError> {
    let users = st.users.list().await?;
    Ok(users.into_iter().map(UserSummary::from).collect())
}

/// Validates every supplied field, uploads the avatar if any, then writes all
/// changes at once. A failed upload persists nothing.
pub async fn update_profile(
    st: &AppState,
    email: &str,
    input: ProfileUpdate,
) -> Result<ProfileView, AppError> {
    let mut changes = ProfileChanges::default();

    if let Some(username) = supplied(input.username) {
        if username.chars().count() > MAX_USERNAME_CHARS {
            return Err(AppError::invalid_input("username must be at most 50 characters"));
        }
        if let Some(owner) = st.users.find_by_username(&username).await? {
            if owner.email != email {
                warn!(email = %email, username = %username, "username taken");
                return Err(AppError::conflict("username already taken"));
            }
        }
        changes.username = Some(username);
    }

    changes.bio = supplied(input.bio);

    if let Some(raw) = supplied(input.birth_date) {
        changes.birth_date = Some(parse_birth_date(&raw)?);
    }

    changes.country = supplied(input.country);
    if changes
        .country
        .as_ref()
        .is_some_and(|c| c.chars().count() > MAX_COUNTRY_CHARS)
    {
        return Err(AppError::invalid_input("country must be at most 100 characters"));
    }

    let avatar = input.avatar.filter(|a| !a.body.is_empty());
    if let Some(a) = &avatar {
        if !a.content_type.starts_with("image/") {
            return Err(AppError::invalid_input("avatar must be an image"));
        }
        if a.body.len() > MAX_AVATAR_BYTES {
            return Err(AppError::invalid_input("avatar must not exceed 5 MiB"));
        }
    }

    if changes.is_empty() && avatar.is_none() {
        return Err(AppError::invalid_input("no fields to update"));
    }

    if let Some(a) = avatar {
        let link = st
            .avatars
            .upload(a.body, &a.file_name, &a.content_type)
            .await?;
        if link.is_degraded() {
            warn!(email = %email, url = %link.url(), "avatar stored without public link");
        }
        changes.avatar_url = Some(link.url().to_string());
    }

    let user = st
        .users
        .update_profile(email, &changes, OffsetDateTime::now_utc())
        .await?
        .ok_or_else(|| AppError::not_found("user not found"))?;

    info!(email = %email, "profile updated");
    Ok(ProfileView::from(user))
}

pub async fn change_password(
    st: &AppState,
    email: &str,
    current: &str,
    new: &str,
) -> Result<(), AppError> {
    if current.trim().is_empty() || new.trim().is_empty() {
        return Err(AppError::invalid_input(
            "current_password and new_password are required",
        ));
    }
    if new.chars().count() < MIN_PASSWORD_CHARS {
        return Err(AppError::invalid_input(
            "new password must be at least 6 characters",
        ));
    }

    let user = st
        .users
        .find_by_email(email)
        .await?
        .ok_or_else(|| AppError::not_found("user not found"))?;

    let matches = verify_password_async(current, &user.password_hash)
        .await
        .map_err(AppError::internal)?;
    if !matches {
        warn!(email = %email, "change password: wrong current password");
        return Err(AppError::forbidden("current password is incorrect"));
    }

    let unchanged = verify_password_async(new, &user.password_hash)
        .await
        .map_err(AppError::internal)?;
    if unchanged {
        return Err(AppError::invalid_input(
            "new password must differ from the current one",
        ));
    }

    let hash = hash_password_async(new).await.map_err(AppError::internal)?;
    if !st
        .users
        .update_password(email, &hash, OffsetDateTime::now_utc())
        .await?
    {
        return Err(AppError::not_found("user not found"));
    }

    info!(email = %email, "password changed");
    Ok(())
}

/// Permanent; there is no soft delete.
pub async fn delete_account(st: &AppState, email: &str, password: &str) -> Result<(), AppError> {
    if password.trim().is_empty() {
        return Err(AppError::invalid_input("password is required"));
    }

    let user = st
        .users
        .find_by_email(email)
        .await?
        .ok_or_else(|| AppError::not_found("user not found"))?;

    let matches = verify_password_async(password, &user.password_hash)
        .await
        .map_err(AppError::internal)?;
    if !matches {
        warn!(email = %email, "delete account: wrong password");
        return Err(AppError::forbidden("password is incorrect"));
    }

    if !st.users.delete(email).await? {
        return Err(AppError::not_found("user not found"));
    }

    info!(email = %email, "account deleted");
    Ok(())
}
