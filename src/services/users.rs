//! User administration and login.

use std::sync::Arc;

use chrono::Utc;

use super::{new_id, require, store_error, timestamp, AuditEvent, AuditLogService};
use crate::auth::{hash_password, verify_password, Actor};
use crate::errors::AppError;
use crate::models::{
    AuditAction, CreateUserRequest, LoginRequest, Role, Severity, UpdateUserRequest, User,
    UserProfile,
};
use crate::store::{RecordStore, StoreError};

pub const USERS_DOCUMENT: &str = "users.json";

const MIN_PASSWORD_LEN: usize = 8;
const BOOTSTRAP_ADMIN: &str = "admin";

pub struct UserService {
    store: Arc<dyn RecordStore<User>>,
    audit: Arc<AuditLogService>,
}

impl UserService {
    pub fn new(store: Arc<dyn RecordStore<User>>, audit: Arc<AuditLogService>) -> Self {
        Self { store, audit }
    }

    /// Resolve the acting user for a request.
    pub async fn resolve_actor(&self, user_id: &str) -> Result<Actor, AppError> {
        match self.store.get(user_id).await? {
            Some(user) if user.active => Ok(Actor::from(&user)),
            Some(_) => Err(AppError::Unauthorized(format!("User {} is inactive", user_id))),
            None => Err(AppError::Unauthorized(format!("Unknown user {}", user_id))),
        }
    }

    /// Every user profile. Only user managers see the roster.
    pub async fn list(&self, actor: &Actor) -> Result<Vec<UserProfile>, AppError> {
        ensure_manager(actor)?;
        let users = self.store.list().await?;
        Ok(users.iter().map(UserProfile::from).collect())
    }

    /// One profile. Users may always see their own.
    pub async fn get(&self, actor: &Actor, id: &str) -> Result<UserProfile, AppError> {
        if actor.id != id {
            ensure_manager(actor)?;
        }
        self.find(id).await
    }

    async fn find(&self, id: &str) -> Result<UserProfile, AppError> {
        self.store
            .get(id)
            .await?
            .map(|u| UserProfile::from(&u))
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", id)))
    }

    pub async fn create(
        &self,
        actor: &Actor,
        request: &CreateUserRequest,
    ) -> Result<UserProfile, AppError> {
        ensure_manager(actor)?;
        ensure_may_grant(actor, request.role)?;
        validate_username(&request.username)?;
        validate_password(&request.password)?;

        let existing = self.store.list().await?;
        if existing
            .iter()
            .any(|u| u.username.eq_ignore_ascii_case(&request.username))
        {
            return Err(AppError::Validation(format!(
                "Username {} is already taken",
                request.username
            )));
        }

        let user = User {
            id: new_id(),
            username: request.username.trim().to_string(),
            email: request.email.trim().to_string(),
            full_name: request.full_name.trim().to_string(),
            role: request.role,
            active: true,
            password_hash: hash_password(&request.password),
            created_at: timestamp(Utc::now()),
            last_login: None,
        };
        self.store.insert(&user).await?;

        let profile = UserProfile::from(&user);
        self.audit
            .log(
                actor,
                AuditEvent::new(
                    AuditAction::UserCreated,
                    format!("Created user {} ({})", user.username, user.role.as_str()),
                )
                .after(&profile),
            )
            .await;

        tracing::info!(user_id = %user.id, username = %user.username, "User created");
        Ok(profile)
    }

    pub async fn update(
        &self,
        actor: &Actor,
        id: &str,
        request: &UpdateUserRequest,
    ) -> Result<UserProfile, AppError> {
        ensure_manager(actor)?;
        if let Some(role) = request.role {
            ensure_may_grant(actor, role)?;
        }
        if let Some(password) = &request.password {
            validate_password(password)?;
        }
        if id == actor.id && request.active == Some(false) {
            return Err(AppError::Validation(
                "You cannot deactivate your own account".to_string(),
            ));
        }

        let before = self.find(id).await?;
        ensure_may_manage(actor, before.role)?;
        let password_hash = request.password.as_deref().map(hash_password);

        let updated = self
            .store
            .update(id, &|user: &mut User| {
                if let Some(email) = &request.email {
                    user.email = email.trim().to_string();
                }
                if let Some(full_name) = &request.full_name {
                    user.full_name = full_name.trim().to_string();
                }
                if let Some(role) = request.role {
                    user.role = role;
                }
                if let Some(active) = request.active {
                    user.active = active;
                }
                if let Some(hash) = &password_hash {
                    user.password_hash = hash.clone();
                }
                Ok(())
            })
            .await
            .map_err(|e| store_error("User", e))?;

        let profile = UserProfile::from(&updated);
        self.audit
            .log(
                actor,
                AuditEvent::new(
                    AuditAction::UserUpdated,
                    format!("Updated user {}", updated.username),
                )
                .before(&before)
                .after(&profile),
            )
            .await;

        Ok(profile)
    }

    pub async fn delete(&self, actor: &Actor, id: &str) -> Result<(), AppError> {
        ensure_manager(actor)?;
        if id == actor.id {
            return Err(AppError::Validation(
                "You cannot delete your own account".to_string(),
            ));
        }

        let before = self.find(id).await?;
        ensure_may_manage(actor, before.role)?;
        if !self.store.remove(id).await? {
            return Err(AppError::NotFound(format!("User {} not found", id)));
        }

        self.audit
            .log(
                actor,
                AuditEvent::new(
                    AuditAction::UserDeleted,
                    format!("Deleted user {}", before.username),
                )
                .before(&before)
                .severity(Severity::Warning),
            )
            .await;

        tracing::info!(user_id = %id, "User deleted");
        Ok(())
    }

    /// Log in by username or e-mail. Both outcomes are audited.
    pub async fn login(&self, request: &LoginRequest) -> Result<UserProfile, AppError> {
        let login = request.login.trim();
        let users = self.store.list().await?;
        let found = users.into_iter().find(|u| {
            u.username.eq_ignore_ascii_case(login)
                || (!u.email.is_empty() && u.email.eq_ignore_ascii_case(login))
        });

        let user = match found {
            Some(user) if user.active && verify_password(&request.password, &user.password_hash) => {
                user
            }
            other => {
                let actor = other.as_ref().map(Actor::from).unwrap_or_else(|| Actor {
                    id: "anonymous".to_string(),
                    username: login.to_string(),
                    role: Role::Viewer,
                });
                self.audit
                    .log(
                        &actor,
                        AuditEvent::new(
                            AuditAction::LoginFailed,
                            format!("Failed login for {}", login),
                        )
                        .severity(Severity::Warning),
                    )
                    .await;
                return Err(AppError::Unauthorized("Invalid credentials".to_string()));
            }
        };

        let now = timestamp(Utc::now());
        let updated = match self
            .store
            .update(&user.id, &|u: &mut User| {
                u.last_login = Some(now.clone());
                Ok(())
            })
            .await
        {
            Ok(updated) => updated,
            Err(e) => {
                tracing::warn!(user_id = %user.id, "Failed to stamp last login: {}", e);
                user
            }
        };

        let actor = Actor::from(&updated);
        self.audit
            .log(
                &actor,
                AuditEvent::new(AuditAction::Login, format!("{} logged in", updated.username)),
            )
            .await;

        Ok(UserProfile::from(&updated))
    }

    /// Create the `admin` super admin when no users exist. Returns whether it did.
    pub async fn ensure_bootstrap_admin(&self, password: &str) -> Result<bool, AppError> {
        validate_password(password)?;
        if !self.store.list().await?.is_empty() {
            return Ok(false);
        }

        let user = User {
            id: new_id(),
            username: BOOTSTRAP_ADMIN.to_string(),
            email: String::new(),
            full_name: "Administrator".to_string(),
            role: Role::SuperAdmin,
            active: true,
            password_hash: hash_password(password),
            created_at: timestamp(Utc::now()),
            last_login: None,
        };

        match self.store.insert(&user).await {
            Ok(()) => {}
            // Another instance bootstrapped first.
            Err(StoreError::Rejected(_)) | Err(StoreError::ConcurrencyConflict { .. }) => {
                return Ok(false)
            }
            Err(e) => return Err(e.into()),
        }

        self.audit
            .log(
                &Actor::system(),
                AuditEvent::new(AuditAction::UserCreated, "Created bootstrap admin")
                    .after(UserProfile::from(&user))
                    .severity(Severity::Warning),
            )
            .await;

        tracing::warn!("Created bootstrap admin user '{}'", BOOTSTRAP_ADMIN);
        Ok(true)
    }
}

fn ensure_manager(actor: &Actor) -> Result<(), AppError> {
    if actor.role.manages_users() {
        Ok(())
    } else {
        Err(AppError::AccessDenied(
            "User administration requires the admin role".to_string(),
        ))
    }
}

fn ensure_may_grant(actor: &Actor, role: Role) -> Result<(), AppError> {
    if role == Role::SuperAdmin && actor.role != Role::SuperAdmin {
        return Err(AppError::AccessDenied(
            "Only a super admin may grant the super admin role".to_string(),
        ));
    }
    Ok(())
}

/// Super admin accounts are changed by super admins only.
fn ensure_may_manage(actor: &Actor, target: Role) -> Result<(), AppError> {
    if target == Role::SuperAdmin && actor.role != Role::SuperAdmin {
        return Err(AppError::AccessDenied(
            "Only a super admin may change a super admin account".to_string(),
        ));
    }
    Ok(())
}

fn validate_username(username: &str) -> Result<(), AppError> {
    require("Username", username)?;
    if !username
        .trim()
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '.' | '_' | '-'))
    {
        return Err(AppError::Validation(
            "Username may contain letters, digits, '.', '_' and '-' only".to_string(),
        ));
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), AppError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}
