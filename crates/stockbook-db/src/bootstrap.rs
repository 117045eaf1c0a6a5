//! # Admin Bootstrap
//!
//! Runs once per [`crate::Database::open`], after migrations.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  username exists (any case)? ── yes ──► keep it                        │
//! │       │ no                                                              │
//! │       ▼                                                                 │
//! │  a previous username exists? ── yes ──► rename it to `username`        │
//! │       │ no                                                              │
//! │       ▼                                                                 │
//! │  create it with the configured password                                │
//! │                                                                         │
//! │  then: grant every Permission it is missing                            │
//! │  never: touch an existing password                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::audit;
use crate::config::DefaultAdmin;
use crate::error::DbResult;
use crate::password::hash_password;
use crate::repository::{new_id, user};
use stockbook_core::validation::{validate_password, validate_username};
use stockbook_core::{Actor, LogAction, Permission, User};

/// What [`ensure_default_admin`] had to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapOutcome {
    /// The admin was already complete.
    Unchanged,
    /// The admin existed but was renamed or missing permissions.
    Repaired,
    /// No admin existed; one was created.
    Created,
}

/// Seeds or repairs the configured admin account. Idempotent.
///
/// ## Returns
/// The outcome and the admin as now stored.
pub async fn ensure_default_admin(
    pool: &SqlitePool,
    admin: &DefaultAdmin,
) -> DbResult<(BootstrapOutcome, User)> {
    let username = validate_username(&admin.username)?;
    let mut tx = pool.begin().await?;

    let mut found = user::fetch_by_username(&mut tx, &username).await?;
    let mut renamed_from = None;
    if found.is_none() {
        for previous in &admin.previous_usernames {
            if let Some(u) = user::fetch_by_username(&mut tx, previous).await? {
                renamed_from = Some(u.username.clone());
                found = Some(u);
                break;
            }
        }
    }

    let (outcome, stored) = match found {
        None => {
            validate_password(&admin.password)?;
            let created = User {
                id: new_id(),
                username,
                password_hash: hash_password(&admin.password)?,
                permissions: Permission::ALL.into_iter().collect(),
                allowed_category_ids: Default::default(),
                allowed_tag_prefixes: Default::default(),
                profile_picture: None,
            };
            user::upsert(&mut tx, &created).await?;
            audit::record(
                &mut tx,
                &Actor::system(),
                LogAction::CreateUser,
                format!("Created default admin '{}'", created.username),
            )
            .await?;
            (BootstrapOutcome::Created, created)
        }
        Some(existing) => {
            let missing = Permission::ALL
                .iter()
                .filter(|p| !existing.permissions.contains(*p))
                .count();

            if missing == 0 && renamed_from.is_none() {
                debug!(username = %existing.username, "Default admin already complete");
                (BootstrapOutcome::Unchanged, existing)
            } else {
                let repaired = User {
                    username: if renamed_from.is_some() {
                        username
                    } else {
                        existing.username.clone()
                    },
                    permissions: Permission::ALL.into_iter().collect(),
                    ..existing
                };
                user::upsert(&mut tx, &repaired).await?;

                let mut details = format!("Repaired default admin '{}'", repaired.username);
                if let Some(old) = &renamed_from {
                    details.push_str(&format!(", renamed from '{}'", old));
                }
                if missing > 0 {
                    details.push_str(&format!(", granted {} permission(s)", missing));
                }
                audit::record(&mut tx, &Actor::system(), LogAction::UpdateUser, details).await?;
                (BootstrapOutcome::Repaired, repaired)
            }
        }
    };

    tx.commit().await?;

    if outcome != BootstrapOutcome::Unchanged {
        info!(username = %stored.username, outcome = ?outcome, "Default admin bootstrapped");
    }
    Ok((outcome, stored))
}
