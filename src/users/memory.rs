use std::{collections::HashMap, sync::Mutex};

use async_trait::async_trait;
use time::OffsetDateTime;

use super::{
    repo::{StoreError, UserStore},
    repo_types::{
        NewUser, ProfileChanges, User, UserRole, UserStatus, MAX_COUNTRY_CHARS, MAX_EMAIL_CHARS,
        MAX_USERNAME_CHARS,
    },
};

fn too_long(value: Option<&str>, max: usize) -> bool {
    value.is_some_and(|v| v.chars().count() > max)
}

/// HashMap-backed store that enforces the same uniqueness rules and column
/// widths as the schema.
#[derive(Default)]
pub struct MemoryUserStore {
    rows: Mutex<HashMap<String, User>>,
}

impl MemoryUserStore {
    fn username_taken(rows: &HashMap<String, User>, username: &str, except: &str) -> bool {
        rows.values()
            .any(|u| u.username == username && u.email != except)
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self.rows.lock().unwrap().get(email).cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let rows = self.rows.lock().unwrap();
        Ok(rows.values().find(|u| u.username == username).cloned())
    }

    async fn find_by_email_or_username(
        &self,
        email: &str,
        username: &str,
    ) -> Result<Option<User>, StoreError> {
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .values()
            .find(|u| u.email == email || u.username == username)
            .cloned())
    }

    async fn create(&self, new_user: NewUser<'_>) -> Result<User, StoreError> {
        if too_long(Some(new_user.email), MAX_EMAIL_CHARS)
            || too_long(Some(new_user.username), MAX_USERNAME_CHARS)
        {
            return Err(StoreError::TooLong);
        }
        let mut rows = self.rows.lock().unwrap();
        if rows.contains_key(new_user.email)
            || Self::username_taken(&rows, new_user.username, new_user.email)
        {
            return Err(StoreError::Conflict);
        }
        let user = User {
            email: new_user.email.to_string(),
            username: new_user.username.to_string(),
            password_hash: new_user.password_hash.to_string(),
            role: UserRole::default(),
            status: UserStatus::default(),
            avatar_url: None,
            bio: None,
            birth_date: None,
            country: None,
            email_verified: false,
            last_login: None,
            created_at: new_user.created_at,
            updated_at: new_user.created_at,
        };
        rows.insert(user.email.clone(), user.clone());
        Ok(user)
    }

    async fn touch_last_login(&self, email: &str, at: OffsetDateTime) -> Result<bool, StoreError> {
        let mut rows = self.rows.lock().unwrap();
        Ok(rows
            .get_mut(email)
            .map(|u| u.last_login = Some(at))
            .is_some())
    }

    async fn update_profile(
        &self,
        email: &str,
        changes: &ProfileChanges,
        at: OffsetDateTime,
    ) -> Result<Option<User>, StoreError> {
        if too_long(changes.username.as_deref(), MAX_USERNAME_CHARS)
            || too_long(changes.country.as_deref(), MAX_COUNTRY_CHARS)
        {
            return Err(StoreError::TooLong);
        }
        let mut rows = self.rows.lock().unwrap();
        if let Some(username) = &changes.username {
            if Self::username_taken(&rows, username, email) {
                return Err(StoreError::Conflict);
            }
        }
        let Some(user) = rows.get_mut(email) else {
            return Ok(None);
        };
        if let Some(v) = &changes.username {
            user.username = v.clone();
        }
        if let Some(v) = &changes.bio {
            user.bio = Some(v.clone());
        }
        if let Some(v) = changes.birth_date {
            user.birth_date = Some(v);
        }
        if let Some(v) = &changes.country {
            user.country = Some(v.clone());
        }
        if let Some(v) = &changes.avatar_url {
            user.avatar_url = Some(v.clone());
        }
        user.updated_at = at;
        Ok(Some(user.clone()))
    }

    async fn update_password(
        &self,
        email: &str,
        password_hash: &str,
        at: OffsetDateTime,
    ) -> Result<bool, StoreError> {
        let mut rows = self.rows.lock().unwrap();
        Ok(rows
            .get_mut(email)
            .map(|u| {
                u.password_hash = password_hash.to_string();
                u.updated_at = at;
            })
            .is_some())
    }

    async fn delete(&self, email: &str) -> Result<bool, StoreError> {
        Ok(self.rows.lock().unwrap().remove(email).is_some())
    }

    async fn list(&self) -> Result<Vec<User>, StoreError> {
        let mut users: Vec<User> = self.rows.lock().unwrap().values().cloned().collect();
        users.sort_by_key(|u| u.created_at);
        Ok(users)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user<'a>(email: &'a str, username: &'a str) -> NewUser<'a> {
        NewUser {
            email,
            username,
            password_hash: "$argon2id$placeholder",
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[tokio::test]
    async fn rejects_values_wider_than_their_columns() {
        let store = MemoryUserStore::default();
        let long_name = "n".repeat(MAX_USERNAME_CHARS + 1);
        assert!(matches!(
            store.create(new_user("a@x.com", &long_name)).await,
            Err(StoreError::TooLong)
        ));

        store.create(new_user("a@x.com", "alice")).await.unwrap();
        let changes = ProfileChanges {
            country: Some("c".repeat(MAX_COUNTRY_CHARS + 1)),
            ..Default::default()
        };
        assert!(matches!(
            store
                .update_profile("a@x.com", &changes, OffsetDateTime::now_utc())
                .await,
            Err(StoreError::TooLong)
        ));
    }
}
