use bytes::Bytes;
use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};

use super::repo_types::{User, UserRole, UserStatus};

time::serde::format_description!(birth_date_format, Date, "[year]-[month]-[day]");

/// Profile returned to its owner. Optional fields are omitted when unset and
/// the password hash never leaves the server.
#[derive(Debug, Clone, Serialize)]
pub struct ProfileView {
    pub email: String,
    pub username: String,
    pub role: UserRole,
    pub status: UserStatus,
    pub email_verified: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(
        with = "birth_date_format::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub birth_date: Option<Date>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_login: Option<OffsetDateTime>,
}

impl From<User> for ProfileView {
    fn from(u: User) -> Self {
        Self {
            email: u.email,
            username: u.username,
            role: u.role,
            status: u.status,
            email_verified: u.email_verified,
            created_at: u.created_at,
            updated_at: u.updated_at,
            avatar_url: u.avatar_url,
            bio: u.bio,
            birth_date: u.birth_date,
            country: u.country,
            last_login: u.last_login,
        }
    }
}

/// Entry of the user directory.
#[derive(Debug, Clone, Serialize)]
pub struct UserSummary {
    pub username: String,
    pub email: String,
    pub role: UserRole,
    pub status: UserStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

impl From<User> for UserSummary {
    fn from(u: User) -> Self {
        Self {
            username: u.username,
            email: u.email,
            role: u.role,
            status: u.status,
            created_at: u.created_at,
            avatar_url: u.avatar_url,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UpdateProfileResponse {
    pub message: &'static str,
    pub user: ProfileView,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    #[serde(default)]
    pub current_password: String,
    #[serde(default)]
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteAccountRequest {
    #[serde(default)]
    pub password: String,
}

/// Avatar file taken from the multipart body.
#[derive(Debug, Clone)]
pub struct AvatarUpload {
    pub file_name: String,
    pub content_type: String,
    pub body: Bytes,
}

/// Raw profile-update input; blank text fields count as not supplied.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub username: Option<String>,
    pub bio: Option<String>,
    pub birth_date: Option<String>,
    pub country: Option<String>,
    pub avatar: Option<AvatarUpload>,
}
