use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::{Date, OffsetDateTime};

// Column widths from the schema, in characters.
pub const MAX_EMAIL_CHARS: usize = 255;
pub const MAX_USERNAME_CHARS: usize = 50;
pub const MAX_COUNTRY_CHARS: usize = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    #[default]
    Usuario,
    Admin,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    #[default]
    Activo,
    Inactivo,
    Baneado,
}

/// User record in the database.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub email: String,         // primary key
    pub username: String,      // unique
    pub password_hash: String, // argon2 PHC string, never serialized
    pub role: UserRole,
    pub status: UserStatus,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
    pub birth_date: Option<Date>,
    pub country: Option<String>,
    pub email_verified: bool,
    pub last_login: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Columns supplied on sign-up; everything else takes its default.
#[derive(Debug, Clone)]
pub struct NewUser<'a> {
    pub email: &'a str,
    pub username: &'a str,
    pub password_hash: &'a str,
    pub created_at: OffsetDateTime,
}

/// Subset of profile columns to overwrite. `None` leaves a column untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileChanges {
    pub username: Option<String>,
    pub bio: Option<String>,
    pub birth_date: Option<Date>,
    pub country: Option<String>,
    pub avatar_url: Option<String>,
}

impl ProfileChanges {
    pub fn is_empty(&self) -> bool {
        self.username.is_none()
            && self.bio.is_none()
            && self.birth_date.is_none()
            && self.country.is_none()
            && self.avatar_url.is_none()
    }
}
