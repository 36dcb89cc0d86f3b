//! User service
//!
//! Implements business logic for accounts and authentication:
//! - User CRUD with field-keyed validation
//! - Blocking, unblocking and soft deletion with self/admin protection
//! - Roles and permission checks
//! - Admin login/logout backed by the `sessions` table
//! - Credential checks for the public API and Google account upserts

use crate::db::repositories::{RoleRepository, SessionRepository, UserRepository};
use crate::models::{
    ListParams, NewUser, PagedResult, Role, Session, User, UserFilter, UserInput, ROLE_PUBLIC,
};
use crate::services::password::{hash_password, random_password, verify_password, MIN_PASSWORD_LENGTH};
use crate::services::validation::{is_valid_email, FieldErrors};
use anyhow::Context;
use chrono::Duration;
use std::sync::Arc;
use uuid::Uuid;

/// Default admin session lifetime in minutes
const DEFAULT_SESSION_EXPIRATION_MINUTES: i64 = 60;

/// Error types for user service operations
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    /// Wrong credentials or disabled account
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    /// Invalid input, keyed by field
    #[error("Validation error: {0}")]
    ValidationError(FieldErrors),

    /// User not found
    #[error("User not found")]
    NotFound,

    /// The acting user may not perform the operation
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl From<FieldErrors> for UserServiceError {
    fn from(errors: FieldErrors) -> Self {
        UserServiceError::ValidationError(errors)
    }
}

/// Credentials submitted to a login form or endpoint
#[derive(Debug, Clone)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
}

/// User service for managing accounts, roles and sessions
pub struct UserService {
    user_repo: Arc<dyn UserRepository>,
    role_repo: Arc<dyn RoleRepository>,
    session_repo: Arc<dyn SessionRepository>,
    session_expiration_minutes: i64,
}

impl UserService {
    /// Create a new user service with the given repositories
    pub fn new(
        user_repo: Arc<dyn UserRepository>,
        role_repo: Arc<dyn RoleRepository>,
        session_repo: Arc<dyn SessionRepository>,
    ) -> Self {
        Self {
            user_repo,
            role_repo,
            session_repo,
            session_expiration_minutes: DEFAULT_SESSION_EXPIRATION_MINUTES,
        }
    }

    /// Use a custom admin session lifetime
    pub fn with_session_expiration(mut self, minutes: i64) -> Self {
        self.session_expiration_minutes = minutes;
        self
    }

    // ------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------

    pub async fn get_user(&self, id: i64) -> Result<Option<User>, UserServiceError> {
        Ok(self.user_repo.get_by_id(id).await?)
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, UserServiceError> {
        Ok(self.user_repo.get_by_email(email).await?)
    }

    pub async fn list_users(&self) -> Result<Vec<User>, UserServiceError> {
        Ok(self.user_repo.list().await?)
    }

    /// Admin user search, 25 per page
    pub async fn search_users(&self, filter: &UserFilter) -> Result<PagedResult<User>, UserServiceError> {
        let params = ListParams::admin(filter.page);
        let (users, total) = self.user_repo.search(filter, &params).await?;
        Ok(PagedResult::new(users, total, &params))
    }

    pub async fn list_roles(&self) -> Result<Vec<Role>, UserServiceError> {
        Ok(self.role_repo.list_roles().await?)
    }

    // ------------------------------------------------------------------
    // CRUD
    // ------------------------------------------------------------------

    /// Create a user from a raw form.
    ///
    /// # Errors
    ///
    /// - `ValidationError` with every failing field
    /// - `InternalError` for database errors
    pub async fn create_user(&self, input: &UserInput) -> Result<User, UserServiceError> {
        let mut errors = FieldErrors::new();

        let email = errors.require("email", input.email.as_deref());
        if let Some(email) = &email {
            self.check_email(&mut errors, email, None).await?;
        }
        let name = errors.require("name", input.name.as_deref());
        let last_name = errors.require("last_name", input.last_name.as_deref());

        let password = errors.require("password", input.password.as_deref());
        if let Some(password) = &password {
            check_password(&mut errors, password);
        }
        self.check_role(&mut errors, input.role_id).await?;

        errors.into_result()?;
        let (Some(email), Some(name), Some(last_name), Some(password)) =
            (email, name, last_name, password)
        else {
            return Err(FieldErrors::single("general", "Invalid user data").into());
        };

        let user = self
            .user_repo
            .create(&NewUser {
                email,
                name,
                last_name,
                password_hash: hash_password(&password)?,
                role_id: input.role_id,
                avatar: None,
                system_admin: false,
            })
            .await?;

        tracing::info!("Created user {} ({})", user.id, user.email);
        Ok(user)
    }

    /// Update a user, falling back to current values for missing fields.
    ///
    /// The password is re-hashed only when given; the email uniqueness check
    /// runs only when the email changes.
    pub async fn update_user(&self, id: i64, input: &UserInput) -> Result<User, UserServiceError> {
        let Some(mut user) = self.user_repo.get_by_id(id).await? else {
            return Err(FieldErrors::single("general", "User not found").into());
        };
        let mut errors = FieldErrors::new();

        let email = errors.require("email", input.email.as_deref().or(Some(&user.email)));
        if let Some(email) = &email {
            if !email.eq_ignore_ascii_case(&user.email) {
                self.check_email(&mut errors, email, Some(user.id)).await?;
            }
        }
        let name = errors.require("name", input.name.as_deref().or(Some(&user.name)));
        let last_name = errors.require(
            "last_name",
            input.last_name.as_deref().or(Some(&user.last_name)),
        );

        let password = input
            .password
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty());
        if let Some(password) = password {
            check_password(&mut errors, password);
        }

        let role_id = input.role_id.or(user.role_id);
        self.check_role(&mut errors, role_id).await?;

        errors.into_result()?;

        if let Some(email) = email {
            user.email = email;
        }
        if let Some(name) = name {
            user.name = name;
        }
        if let Some(last_name) = last_name {
            user.last_name = last_name;
        }
        if let Some(password) = password {
            user.password_hash = hash_password(password)?;
        }
        user.role_id = role_id;

        let updated = self.user_repo.update(&user).await?;
        tracing::info!("Updated user {}", updated.id);
        Ok(updated)
    }

    /// Self-service profile update from the public API
    pub async fn update_profile(
        &self,
        id: i64,
        name: Option<&str>,
        last_name: Option<&str>,
        avatar: Option<&str>,
    ) -> Result<User, UserServiceError> {
        let mut user = self
            .user_repo
            .get_by_id(id)
            .await?
            .ok_or(UserServiceError::NotFound)?;
        let mut errors = FieldErrors::new();

        if let Some(name) = name {
            if let Some(name) = errors.require("name", Some(name)) {
                errors.max_len("name", &name, 100);
                user.name = name;
            }
        }
        if let Some(last_name) = last_name {
            let last_name = last_name.trim().to_string();
            errors.max_len("last_name", &last_name, 100);
            user.last_name = last_name;
        }
        if let Some(avatar) = avatar {
            let avatar = avatar.trim();
            user.avatar = (!avatar.is_empty()).then(|| avatar.to_string());
        }
        errors.into_result()?;

        Ok(self.user_repo.update(&user).await?)
    }

    /// Soft delete a user.
    ///
    /// # Errors
    ///
    /// - `NotFound` when the user does not exist
    /// - `Forbidden` for admin-role users and for the acting user
    pub async fn delete_user(&self, id: i64, acting_user: &User) -> Result<(), UserServiceError> {
        let user = self
            .user_repo
            .get_by_id(id)
            .await?
            .ok_or(UserServiceError::NotFound)?;

        if user.is_admin_role() {
            tracing::warn!("Refused to delete admin user {}", id);
            return Err(UserServiceError::Forbidden(
                "Administrators cannot be deleted".to_string(),
            ));
        }
        if user.id == acting_user.id {
            return Err(UserServiceError::Forbidden(
                "You cannot delete yourself".to_string(),
            ));
        }

        self.user_repo.soft_delete(id).await?;
        self.session_repo.delete_by_user(id).await?;
        tracing::info!("User {} deleted by {}", id, acting_user.id);
        Ok(())
    }

    /// Disable a user and drop their sessions.
    ///
    /// Returns `None` when the user does not exist.
    pub async fn block_user(
        &self,
        id: i64,
        acting_user: &User,
    ) -> Result<Option<User>, UserServiceError> {
        let Some(user) = self.user_repo.get_by_id(id).await? else {
            return Ok(None);
        };

        if user.is_admin_role() {
            tracing::warn!("Refused to block admin user {}", id);
            return Err(UserServiceError::Forbidden(
                "Administrators cannot be blocked".to_string(),
            ));
        }
        if user.id == acting_user.id {
            return Err(UserServiceError::Forbidden(
                "You cannot block yourself".to_string(),
            ));
        }

        self.user_repo.set_enabled(id, false).await?;
        self.session_repo.delete_by_user(id).await?;
        tracing::info!("User {} blocked by {}", id, acting_user.id);
        Ok(self.user_repo.get_by_id(id).await?)
    }

    /// Re-enable a user; `None` when the user does not exist
    pub async fn unblock_user(&self, id: i64) -> Result<Option<User>, UserServiceError> {
        if self.user_repo.get_by_id(id).await?.is_none() {
            return Ok(None);
        }
        self.user_repo.set_enabled(id, true).await?;
        tracing::info!("User {} unblocked", id);
        Ok(self.user_repo.get_by_id(id).await?)
    }

    // ------------------------------------------------------------------
    // Roles and permissions
    // ------------------------------------------------------------------

    pub async fn assign_role(&self, user_id: i64, role_id: i64) -> Result<(), UserServiceError> {
        if self.role_repo.get_role(role_id).await?.is_none() {
            return Err(FieldErrors::single("role_id", "Role does not exist").into());
        }
        self.user_repo.set_role(user_id, Some(role_id)).await?;
        Ok(())
    }

    /// Drop a user back to the `public` role
    pub async fn unassign_role(&self, user_id: i64) -> Result<(), UserServiceError> {
        let public = self
            .role_repo
            .get_role_by_name(ROLE_PUBLIC)
            .await?
            .context("The public role is missing")?;
        self.user_repo.set_role(user_id, Some(public.id)).await?;
        Ok(())
    }

    /// Permission names granted by the user's role
    pub async fn permissions_of(&self, user: &User) -> Result<Vec<String>, UserServiceError> {
        if user.role_id.is_none() {
            return Ok(Vec::new());
        }
        Ok(self.role_repo.permissions_for_user(user.id).await?)
    }

    /// Whether the user's role grants `permission`
    pub async fn has_permission(&self, user: &User, permission: &str) -> Result<bool, UserServiceError> {
        let permissions = self.permissions_of(user).await?;
        Ok(permissions.iter().any(|p| p == permission))
    }

    // ------------------------------------------------------------------
    // Authentication
    // ------------------------------------------------------------------

    /// Check credentials; disabled users are rejected like wrong passwords.
    pub async fn authenticate(&self, input: &LoginInput) -> Result<User, UserServiceError> {
        let invalid = || UserServiceError::AuthenticationError("Invalid credentials".to_string());

        let user = self
            .user_repo
            .get_by_email(input.email.trim())
            .await?
            .ok_or_else(invalid)?;

        if !verify_password(&input.password, &user.password_hash)? {
            tracing::warn!("Failed login for {}", user.email);
            return Err(invalid());
        }
        if !user.enabled {
            tracing::warn!("Disabled user {} tried to log in", user.email);
            return Err(UserServiceError::AuthenticationError(
                "This account is disabled".to_string(),
            ));
        }
        Ok(user)
    }

    /// Admin login: check credentials and open a session
    pub async fn login(&self, input: &LoginInput) -> Result<(User, Session), UserServiceError> {
        let user = self.authenticate(input).await?;

        let session = Session::new(
            Uuid::new_v4().to_string(),
            user.id,
            Duration::minutes(self.session_expiration_minutes),
        );
        let session = self.session_repo.create(&session).await?;
        tracing::info!("User {} logged in", user.id);
        Ok((user, session))
    }

    pub async fn logout(&self, token: &str) -> Result<(), UserServiceError> {
        self.session_repo.delete(token).await?;
        Ok(())
    }

    /// User of a live session; expired sessions are removed on sight
    pub async fn validate_session(&self, token: &str) -> Result<Option<User>, UserServiceError> {
        let Some(session) = self.session_repo.get_by_id(token).await? else {
            return Ok(None);
        };
        if session.is_expired() {
            self.session_repo.delete(token).await?;
            return Ok(None);
        }

        let user = self.user_repo.get_by_id(session.user_id).await?;
        Ok(user.filter(|u| u.enabled))
    }

    /// Remove expired sessions, returning how many were dropped
    pub async fn purge_expired_sessions(&self) -> Result<i64, UserServiceError> {
        Ok(self.session_repo.delete_expired().await?)
    }

    /// Find or create the account of a Google identity.
    ///
    /// Existing users get the avatar only when they have none. New users get
    /// a random password and the `public` role.
    pub async fn upsert_user_from_google(
        &self,
        email: &str,
        name: &str,
        avatar: Option<&str>,
    ) -> Result<User, UserServiceError> {
        let email = email.trim().to_lowercase();
        if email.is_empty() {
            return Err(FieldErrors::single("email", "Google did not return an email").into());
        }

        if let Some(mut user) = self.user_repo.get_by_email(&email).await? {
            if user.avatar.is_none() && avatar.is_some() {
                user.avatar = avatar.map(str::to_string);
                user = self.user_repo.update(&user).await?;
            }
            return Ok(user);
        }

        let public = self
            .role_repo
            .get_role_by_name(ROLE_PUBLIC)
            .await?
            .context("The public role is missing")?;
        let name = match name.trim() {
            "" => email.split('@').next().unwrap_or_default().to_string(),
            n => n.to_string(),
        };

        let user = self
            .user_repo
            .create(&NewUser {
                email,
                name,
                last_name: String::new(),
                password_hash: hash_password(&random_password())?,
                role_id: Some(public.id),
                avatar: avatar.map(str::to_string),
                system_admin: false,
            })
            .await?;
        tracing::info!("Created user {} from Google sign-in", user.id);
        Ok(user)
    }

    // ------------------------------------------------------------------
    // Validation helpers
    // ------------------------------------------------------------------

    async fn check_email(
        &self,
        errors: &mut FieldErrors,
        email: &str,
        current_id: Option<i64>,
    ) -> Result<(), UserServiceError> {
        if !is_valid_email(email) {
            errors.add("email", "Invalid email address");
            return Ok(());
        }
        if let Some(existing) = self.user_repo.get_by_email(email).await? {
            if Some(existing.id) != current_id {
                errors.add("email", "Email is already in use");
            }
        }
        Ok(())
    }

    async fn check_role(
        &self,
        errors: &mut FieldErrors,
        role_id: Option<i64>,
    ) -> Result<(), UserServiceError> {
        match role_id {
            None => errors.add("role_id", "This field is required"),
            Some(id) => {
                if self.role_repo.get_role(id).await?.is_none() {
                    errors.add("role_id", "Role does not exist");
                }
            }
        }
        Ok(())
    }
}

fn check_password(errors: &mut FieldErrors, password: &str) {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        errors.add(
            "password",
            format!("Must be at least {} characters", MIN_PASSWORD_LENGTH),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SeedConfig;
    use crate::db::repositories::test_support::setup_pool;
    use crate::db::repositories::{SqlxRoleRepository, SqlxSessionRepository, SqlxUserRepository};
    use crate::db::seeds::run_seeds;
    use crate::models::{ROLE_ADMIN, ROLE_EDITOR};

    struct Fixture {
        service: UserService,
        roles: Arc<dyn RoleRepository>,
    }

    async fn fixture() -> Fixture {
        let pool = setup_pool().await;
        run_seeds(&pool, &SeedConfig::default()).await.unwrap();
        let roles = SqlxRoleRepository::boxed(pool.clone());
        let service = UserService::new(
            SqlxUserRepository::boxed(pool.clone()),
            roles.clone(),
            SqlxSessionRepository::boxed(pool),
        );
        Fixture { service, roles }
    }

    async fn role_id(f: &Fixture, name: &str) -> i64 {
        f.roles.get_role_by_name(name).await.unwrap().unwrap().id
    }

    fn input(email: &str, role_id: i64) -> UserInput {
        UserInput {
            email: Some(email.to_string()),
            name: Some(" Ana ".to_string()),
            last_name: Some("Pérez".to_string()),
            password: Some("secreto".to_string()),
            role_id: Some(role_id),
        }
    }

    #[tokio::test]
    async fn test_create_user_validates_every_field() {
        let f = fixture().await;
        let bad = UserInput {
            email: Some("not-an-email".into()),
            name: Some("  ".into()),
            last_name: None,
            password: Some("123".into()),
            role_id: Some(999),
        };

        match f.service.create_user(&bad).await {
            Err(UserServiceError::ValidationError(errors)) => {
                for field in ["email", "name", "last_name", "password", "role_id"] {
                    assert!(errors.has(field), "missing error for {}", field);
                }
            }
            other => panic!("expected validation error, got {:?}", other.map(|u| u.id)),
        }
    }

    #[tokio::test]
    async fn test_create_user_trims_and_rejects_duplicates() {
        let f = fixture().await;
        let editor = role_id(&f, ROLE_EDITOR).await;

        let user = f.service.create_user(&input("ana@example.com", editor)).await.unwrap();
        assert_eq!(user.name, "Ana");
        assert_eq!(user.role_name.as_deref(), Some(ROLE_EDITOR));
        assert!(user.password_hash.starts_with("$argon2id$"));

        let err = f.service.create_user(&input("ANA@example.com", editor)).await;
        assert!(matches!(err, Err(UserServiceError::ValidationError(e)) if e.has("email")));
    }

    #[tokio::test]
    async fn test_update_user_keeps_current_values() {
        let f = fixture().await;
        let editor = role_id(&f, ROLE_EDITOR).await;
        let user = f.service.create_user(&input("ana@example.com", editor)).await.unwrap();
        let old_hash = user.password_hash.clone();

        let updated = f
            .service
            .update_user(
                user.id,
                &UserInput {
                    last_name: Some("Gómez".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.email, "ana@example.com");
        assert_eq!(updated.last_name, "Gómez");
        assert_eq!(updated.password_hash, old_hash);

        let missing = f.service.update_user(9999, &UserInput::default()).await;
        assert!(matches!(missing, Err(UserServiceError::ValidationError(e)) if e.has("general")));
    }

    #[tokio::test]
    async fn test_block_and_delete_protections() {
        let f = fixture().await;
        let admin_role = role_id(&f, ROLE_ADMIN).await;
        let editor = role_id(&f, ROLE_EDITOR).await;
        let admin = f.service.create_user(&input("root@example.com", admin_role)).await.unwrap();
        let other_admin = f.service.create_user(&input("root2@example.com", admin_role)).await.unwrap();
        let target = f.service.create_user(&input("ed@example.com", editor)).await.unwrap();

        assert!(matches!(
            f.service.block_user(other_admin.id, &admin).await,
            Err(UserServiceError::Forbidden(_))
        ));
        assert!(matches!(
            f.service.delete_user(other_admin.id, &admin).await,
            Err(UserServiceError::Forbidden(_))
        ));
        assert!(f.service.block_user(9999, &admin).await.unwrap().is_none());

        let (_, session) = f
            .service
            .login(&LoginInput {
                email: "ed@example.com".into(),
                password: "secreto".into(),
            })
            .await
            .unwrap();
        let blocked = f.service.block_user(target.id, &admin).await.unwrap().unwrap();
        assert!(!blocked.enabled);
        assert!(f.service.validate_session(&session.id).await.unwrap().is_none());

        let login = f
            .service
            .login(&LoginInput {
                email: "ed@example.com".into(),
                password: "secreto".into(),
            })
            .await;
        assert!(matches!(login, Err(UserServiceError::AuthenticationError(_))));

        assert!(f.service.unblock_user(target.id).await.unwrap().unwrap().enabled);
        f.service.delete_user(target.id, &admin).await.unwrap();
        assert!(f.service.get_user(target.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cannot_delete_or_block_self() {
        let f = fixture().await;
        let editor = role_id(&f, ROLE_EDITOR).await;
        let me = f.service.create_user(&input("me@example.com", editor)).await.unwrap();

        assert!(matches!(
            f.service.delete_user(me.id, &me).await,
            Err(UserServiceError::Forbidden(_))
        ));
        assert!(matches!(
            f.service.block_user(me.id, &me).await,
            Err(UserServiceError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_login_and_session_roundtrip() {
        let f = fixture().await;
        let editor = role_id(&f, ROLE_EDITOR).await;
        let user = f.service.create_user(&input("ana@example.com", editor)).await.unwrap();

        let wrong = f
            .service
            .login(&LoginInput {
                email: "ana@example.com".into(),
                password: "wrong-password".into(),
            })
            .await;
        assert!(matches!(wrong, Err(UserServiceError::AuthenticationError(_))));

        let (logged, session) = f
            .service
            .login(&LoginInput {
                email: " ANA@example.com ".into(),
                password: "secreto".into(),
            })
            .await
            .unwrap();
        assert_eq!(logged.id, user.id);
        assert_eq!(
            f.service.validate_session(&session.id).await.unwrap().map(|u| u.id),
            Some(user.id)
        );

        f.service.logout(&session.id).await.unwrap();
        assert!(f.service.validate_session(&session.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_permissions_follow_role() {
        let f = fixture().await;
        let editor = role_id(&f, ROLE_EDITOR).await;
        let user = f.service.create_user(&input("ana@example.com", editor)).await.unwrap();

        assert!(f.service.has_permission(&user, "tags_management").await.unwrap());
        assert!(!f.service.has_permission(&user, "delete_site").await.unwrap());

        f.service.unassign_role(user.id).await.unwrap();
        let user = f.service.get_user(user.id).await.unwrap().unwrap();
        assert_eq!(user.role_name.as_deref(), Some(ROLE_PUBLIC));
        assert!(!f.service.has_permission(&user, "tags_management").await.unwrap());

        f.service.assign_role(user.id, editor).await.unwrap();
        assert!(f.service.assign_role(user.id, 9999).await.is_err());
    }

    #[tokio::test]
    async fn test_google_upsert() {
        let f = fixture().await;

        let created = f
            .service
            .upsert_user_from_google(" New.User@Gmail.com ", "New User", Some("https://img/a.png"))
            .await
            .unwrap();
        assert_eq!(created.email, "new.user@gmail.com");
        assert_eq!(created.last_name, "");
        assert_eq!(created.role_name.as_deref(), Some(ROLE_PUBLIC));

        let again = f
            .service
            .upsert_user_from_google("new.user@gmail.com", "Other", Some("https://img/b.png"))
            .await
            .unwrap();
        assert_eq!(again.id, created.id);
        assert_eq!(again.avatar.as_deref(), Some("https://img/a.png"));

        assert!(f.service.upsert_user_from_google("  ", "x", None).await.is_err());
    }

    #[tokio::test]
    async fn test_update_profile() {
        let f = fixture().await;
        let user = f
            .service
            .upsert_user_from_google("fan@gmail.com", "Fan", None)
            .await
            .unwrap();

        let updated = f
            .service
            .update_profile(user.id, Some("Fanático"), Some("Del Sitio"), Some("https://img/x.png"))
            .await
            .unwrap();
        assert_eq!(updated.full_name(), "Fanático Del Sitio");
        assert_eq!(updated.avatar.as_deref(), Some("https://img/x.png"));

        assert!(f.service.update_profile(user.id, Some(" "), None, None).await.is_err());
        assert!(matches!(
            f.service.update_profile(9999, None, None, None).await,
            Err(UserServiceError::NotFound)
        ));
    }
}
