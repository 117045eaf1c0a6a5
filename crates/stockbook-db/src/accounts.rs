//! # Accounts
//!
//! User administration, login checks and self-service profile edits.
//!
//! ## Login Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  verify_credentials("Admin", "pw")                                      │
//! │       │                                                                 │
//! │       ├── fetch_by_username (COLLATE NOCASE)                           │
//! │       │        └── None ──────────────────────────► Ok(None)           │
//! │       │                                                                 │
//! │       └── argon2 verify(pw, stored PHC string)                         │
//! │                ├── mismatch ──────────────────────► Ok(None)           │
//! │                └── match ─────────────────────────► Ok(Some(user))     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::BTreeSet;

use serde::Deserialize;
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::audit;
use crate::error::DbResult;
use crate::password::{hash_password, verify_password};
use crate::repository::{new_id, user};
use stockbook_core::validation::{validate_password, validate_tag_prefix, validate_username};
use stockbook_core::{Actor, CoreError, LogAction, Permission, User, ValidationResult};

/// Input for [`Accounts::create_user`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub permissions: BTreeSet<Permission>,
    #[serde(default)]
    pub allowed_category_ids: BTreeSet<String>,
    #[serde(default)]
    pub allowed_tag_prefixes: BTreeSet<String>,
}

/// Input for [`Accounts::update_user`]. A `None` password keeps the current one.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserUpdate {
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub permissions: BTreeSet<Permission>,
    #[serde(default)]
    pub allowed_category_ids: BTreeSet<String>,
    #[serde(default)]
    pub allowed_tag_prefixes: BTreeSet<String>,
}

/// Input for [`Accounts::update_profile`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    pub current_password: String,
    #[serde(default)]
    pub new_username: Option<String>,
    #[serde(default)]
    pub new_password: Option<String>,
    #[serde(default)]
    pub profile_picture: Option<String>,
}

fn validate_prefixes(prefixes: &BTreeSet<String>) -> ValidationResult<BTreeSet<String>> {
    prefixes.iter().map(|p| validate_tag_prefix(p)).collect()
}

/// User account operations.
#[derive(Debug, Clone)]
pub struct Accounts {
    pool: SqlitePool,
}

impl Accounts {
    pub fn new(pool: SqlitePool) -> Self {
        Accounts { pool }
    }

    /// Creates an account with a hashed password.
    ///
    /// ## Errors
    /// * `Core(Validation)` - bad username, empty password or prefix
    /// * `UniqueViolation` - username taken (any case)
    /// * `ForeignKeyViolation` - unknown allowed category
    pub async fn create_user(&self, input: NewUser, actor: &Actor) -> DbResult<User> {
        let username = validate_username(&input.username)?;
        validate_password(&input.password)?;
        let allowed_tag_prefixes = validate_prefixes(&input.allowed_tag_prefixes)?;

        let created = User {
            id: new_id(),
            username,
            password_hash: hash_password(&input.password)?,
            permissions: input.permissions,
            allowed_category_ids: input.allowed_category_ids,
            allowed_tag_prefixes,
            profile_picture: None,
        };

        let mut tx = self.pool.begin().await?;
        user::upsert(&mut tx, &created).await?;
        audit::record(
            &mut tx,
            actor,
            LogAction::CreateUser,
            format!(
                "Created user '{}' with {} permission(s)",
                created.username,
                created.permissions.len()
            ),
        )
        .await?;
        tx.commit().await?;

        info!(user_id = %created.id, username = %created.username, "User created");
        Ok(created)
    }

    /// Replaces a user's name, permissions and access restrictions, and
    /// optionally the password.
    pub async fn update_user(&self, user_id: &str, update: UserUpdate, actor: &Actor) -> DbResult<User> {
        let username = validate_username(&update.username)?;
        let allowed_tag_prefixes = validate_prefixes(&update.allowed_tag_prefixes)?;
        let password_hash = match update.password.as_deref() {
            Some(password) => {
                validate_password(password)?;
                Some(hash_password(password)?)
            }
            None => None,
        };

        let mut tx = self.pool.begin().await?;
        let existing = user::fetch(&mut tx, user_id)
            .await?
            .ok_or_else(|| CoreError::UserNotFound(user_id.to_string()))?;

        let updated = User {
            username,
            password_hash: password_hash.unwrap_or_else(|| existing.password_hash.clone()),
            permissions: update.permissions,
            allowed_category_ids: update.allowed_category_ids,
            allowed_tag_prefixes,
            ..existing.clone()
        };
        user::upsert(&mut tx, &updated).await?;
        audit::record(
            &mut tx,
            actor,
            LogAction::UpdateUser,
            format!("Updated user '{}'", updated.username),
        )
        .await?;
        tx.commit().await?;

        info!(user_id = %updated.id, "User updated");
        Ok(updated)
    }

    /// Deletes an account. Nobody can delete their own account.
    pub async fn delete_user(&self, user_id: &str, actor: &Actor) -> DbResult<()> {
        if actor.user_id == user_id {
            warn!(user_id = %user_id, "Self-deletion rejected");
            return Err(CoreError::SelfDeletion.into());
        }

        let mut tx = self.pool.begin().await?;
        let existing = user::fetch(&mut tx, user_id)
            .await?
            .ok_or_else(|| CoreError::UserNotFound(user_id.to_string()))?;
        user::delete(&mut tx, user_id).await?;
        audit::record(
            &mut tx,
            actor,
            LogAction::DeleteUser,
            format!("Deleted user '{}'", existing.username),
        )
        .await?;
        tx.commit().await?;

        info!(user_id = %user_id, "User deleted");
        Ok(())
    }

    /// Checks a login attempt.
    ///
    /// ## Returns
    /// * `Ok(Some(user))` - username (any case) and password match
    /// * `Ok(None)` - unknown user or wrong password
    pub async fn verify_credentials(&self, username: &str, password: &str) -> DbResult<Option<User>> {
        let mut conn = self.pool.acquire().await?;
        let found = user::fetch_by_username(&mut conn, username.trim()).await?;

        Ok(found.filter(|u| verify_password(password, &u.password_hash)))
    }

    /// Lets a user change their own name, password or picture.
    ///
    /// The audit row is attributed to the user being edited.
    ///
    /// ## Errors
    /// * `Core(InvalidCredentials)` - `current_password` does not match
    /// * `Core(UserNotFound)` - unknown user
    pub async fn update_profile(&self, user_id: &str, update: ProfileUpdate) -> DbResult<User> {
        let username = update
            .new_username
            .as_deref()
            .map(validate_username)
            .transpose()?;
        let password_hash = match update.new_password.as_deref() {
            Some(password) => {
                validate_password(password)?;
                Some(hash_password(password)?)
            }
            None => None,
        };

        let mut tx = self.pool.begin().await?;
        let existing = user::fetch(&mut tx, user_id)
            .await?
            .ok_or_else(|| CoreError::UserNotFound(user_id.to_string()))?;

        if !verify_password(&update.current_password, &existing.password_hash) {
            warn!(user_id = %user_id, "Profile update with wrong password");
            return Err(CoreError::InvalidCredentials.into());
        }

        let mut changed = Vec::new();
        if username.as_ref().is_some_and(|u| *u != existing.username) {
            changed.push("username");
        }
        if password_hash.is_some() {
            changed.push("password");
        }
        if update.profile_picture.is_some() {
            changed.push("picture");
        }

        let updated = User {
            username: username.unwrap_or_else(|| existing.username.clone()),
            password_hash: password_hash.unwrap_or_else(|| existing.password_hash.clone()),
            profile_picture: update.profile_picture.or_else(|| existing.profile_picture.clone()),
            ..existing.clone()
        };
        user::upsert(&mut tx, &updated).await?;
        audit::record(
            &mut tx,
            &updated.actor(),
            LogAction::UpdateProfile,
            if changed.is_empty() {
                "Profile saved without changes".to_string()
            } else {
                format!("Changed {}", changed.join(", "))
            },
        )
        .await?;
        tx.commit().await?;

        info!(user_id = %updated.id, "Profile updated");
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::pool::{Database, DbConfig};

    fn admin() -> Actor {
        Actor::new("admin-id", "admin")
    }

    fn new_user(name: &str, password: &str) -> NewUser {
        NewUser {
            username: name.into(),
            password: password.into(),
            permissions: [Permission::CanPerformTransactions].into(),
            allowed_category_ids: BTreeSet::new(),
            allowed_tag_prefixes: [" A ".to_string()].into(),
        }
    }

    #[tokio::test]
    async fn test_create_and_login() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let created = db
            .accounts()
            .create_user(new_user("clerk", "pw1"), &admin())
            .await
            .unwrap();

        assert_ne!(created.password_hash, "pw1");
        assert!(created.allowed_tag_prefixes.contains("A"));

        let ok = db.accounts().verify_credentials("CLERK", "pw1").await.unwrap();
        assert_eq!(ok.map(|u| u.id), Some(created.id));
        assert!(db.accounts().verify_credentials("clerk", "nope").await.unwrap().is_none());
        assert!(db.accounts().verify_credentials("ghost", "pw1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_requires_password() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let err = db
            .accounts()
            .create_user(new_user("clerk", ""), &admin())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_update_without_password_keeps_it() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let u = db
            .accounts()
            .create_user(new_user("clerk", "pw1"), &admin())
            .await
            .unwrap();

        db.accounts()
            .update_user(
                &u.id,
                UserUpdate {
                    username: "clerk2".into(),
                    password: None,
                    permissions: [Permission::CanViewLogs].into(),
                    allowed_category_ids: BTreeSet::new(),
                    allowed_tag_prefixes: BTreeSet::new(),
                },
                &admin(),
            )
            .await
            .unwrap();

        let logged_in = db
            .accounts()
            .verify_credentials("clerk2", "pw1")
            .await
            .unwrap()
            .unwrap();
        assert!(logged_in.has_permission(Permission::CanViewLogs));
        assert!(!logged_in.is_restricted());
    }

    #[tokio::test]
    async fn test_self_deletion_rejected() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let u = db
            .accounts()
            .create_user(new_user("clerk", "pw1"), &admin())
            .await
            .unwrap();

        let err = db.accounts().delete_user(&u.id, &u.actor()).await.unwrap_err();
        assert!(matches!(err, crate::DbError::Core(CoreError::SelfDeletion)));

        db.accounts().delete_user(&u.id, &admin()).await.unwrap();
        assert!(db.users().get(&u.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_profile_requires_current_password() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let u = db
            .accounts()
            .create_user(new_user("clerk", "pw1"), &admin())
            .await
            .unwrap();

        let err = db
            .accounts()
            .update_profile(
                &u.id,
                ProfileUpdate {
                    current_password: "wrong".into(),
                    new_password: Some("pw2".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, crate::DbError::Core(CoreError::InvalidCredentials)));

        let updated = db
            .accounts()
            .update_profile(
                &u.id,
                ProfileUpdate {
                    current_password: "pw1".into(),
                    new_password: Some("pw2".into()),
                    profile_picture: Some("data:image/png;base64,AA==".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert!(updated.profile_picture.is_some());
        assert!(db.accounts().verify_credentials("clerk", "pw2").await.unwrap().is_some());

        let logs = db.logs().list(Some(1)).await.unwrap();
        assert_eq!(logs[0].action, LogAction::UpdateProfile);
        assert_eq!(logs[0].user_id, u.id);
    }
}
