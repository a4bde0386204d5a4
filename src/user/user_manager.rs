use super::{
    auth::AuthError, user_models::Actor, AuthToken, AuthTokenValue, UserAuthCredentials,
    UserRole, UserStore, UsernamePasswordCredentials,
};
use anyhow::{bail, Context, Result};
use lazy_static::lazy_static;
use regex::Regex;
use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};
use tracing::{debug, info};

lazy_static! {
    static ref USER_HANDLE_REGEX: Regex =
        Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.-]{1,31}$").expect("valid user handle regex");
}

pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

pub struct UserManager {
    user_store: Arc<dyn UserStore>,
    token_ttl: Duration,
}

impl UserManager {
    pub fn new(user_store: Arc<dyn UserStore>, token_ttl: Duration) -> Self {
        Self {
            user_store,
            token_ttl,
        }
    }

    pub fn add_user<T: AsRef<str>>(&self, user_handle: T, role: UserRole) -> Result<usize> {
        let user_handle = user_handle.as_ref();
        if !USER_HANDLE_REGEX.is_match(user_handle) {
            bail!(
                "Invalid user handle '{}': 2-32 letters, digits, '.', '_' or '-'",
                user_handle
            );
        }
        if self.user_store.get_user_id(user_handle)?.is_some() {
            bail!("User handle already exists.");
        }
        let user_id = self.user_store.create_user(user_handle, role)?;
        info!("Created user {} ({}) with role {}", user_handle, user_id, role);
        Ok(user_id)
    }

    /// Creates a user that can log in right away.
    pub fn add_user_with_password<T: AsRef<str>>(
        &self,
        user_handle: T,
        role: UserRole,
        password: &str,
    ) -> Result<usize> {
        let user_id = self.add_user(user_handle.as_ref(), role)?;
        self.create_password_credentials(user_handle.as_ref(), password)?;
        Ok(user_id)
    }

    pub fn get_user(&self, user_id: usize) -> Result<Option<Actor>> {
        self.user_store.get_user(user_id)
    }

    pub fn get_user_by_handle(&self, user_handle: &str) -> Result<Option<Actor>> {
        match self.user_store.get_user_id(user_handle)? {
            Some(user_id) => self.user_store.get_user(user_id),
            None => Ok(None),
        }
    }

    pub fn get_all_users(&self) -> Result<Vec<Actor>> {
        self.user_store.get_all_users()
    }

    pub fn set_user_role(&self, user_handle: &str, role: UserRole) -> Result<()> {
        let user_id = self
            .user_store
            .get_user_id(user_handle)?
            .with_context(|| format!("User {} not found", user_handle))?;
        self.user_store.set_user_role(user_id, role)
    }

    pub fn get_user_credentials(&self, user_handle: &str) -> Result<Option<UserAuthCredentials>> {
        self.user_store.get_user_auth_credentials(user_handle)
    }

    fn existing_credentials(&self, user_handle: &str) -> Result<UserAuthCredentials> {
        self.get_user_credentials(user_handle)?
            .with_context(|| format!("User {} not found", user_handle))
    }

    pub fn create_password_credentials(&self, user_handle: &str, password: &str) -> Result<()> {
        let mut credentials = self.existing_credentials(user_handle)?;
        if credentials.username_password.is_some() {
            bail!("User {} already has a password set", user_handle);
        }
        credentials.username_password = Some(UsernamePasswordCredentials::new(
            credentials.user_id,
            password,
        )?);
        self.user_store.update_user_auth_credentials(credentials)
    }

    pub fn update_password_credentials(&self, user_handle: &str, password: &str) -> Result<()> {
        let mut credentials = self.existing_credentials(user_handle)?;
        if credentials.username_password.is_none() {
            bail!("User {} has no password to update", user_handle);
        }
        credentials.username_password = Some(UsernamePasswordCredentials::new(
            credentials.user_id,
            password,
        )?);
        self.user_store.update_user_auth_credentials(credentials)
    }

    pub fn delete_password_credentials(&self, user_handle: &str) -> Result<()> {
        let mut credentials = self.existing_credentials(user_handle)?;
        credentials.username_password = None;
        self.user_store.update_user_auth_credentials(credentials)
    }

    /// Checks the password and issues a new session token. `Ok(None)` means
    /// the handle is unknown, has no password, or the password is wrong.
    pub fn login(&self, user_handle: &str, password: &str) -> Result<Option<AuthToken>> {
        let password_credentials = match self
            .get_user_credentials(user_handle)?
            .and_then(|c| c.username_password)
        {
            Some(x) => x,
            None => return Ok(None),
        };
        if !password_credentials.verify(password)? {
            return Ok(None);
        }
        self.generate_auth_token(password_credentials.user_id)
            .map(Some)
    }

    pub fn generate_auth_token(&self, user_id: usize) -> Result<AuthToken> {
        let token = AuthToken {
            user_id,
            value: AuthTokenValue::generate(),
            created: SystemTime::now(),
            last_used: None,
        };
        self.user_store.add_user_auth_token(token.clone())?;
        Ok(token)
    }

    pub fn delete_auth_token(&self, token: &AuthTokenValue) -> Result<Option<AuthToken>> {
        self.user_store.delete_user_auth_token(token)
    }

    pub fn get_user_tokens(&self, user_handle: &str) -> Result<Vec<AuthToken>> {
        self.user_store.get_all_user_auth_tokens(user_handle)
    }

    /// Resolves a session token to the actor behind it.
    pub fn verify_token(&self, value: &AuthTokenValue) -> Result<Actor, AuthError> {
        let token = self
            .user_store
            .get_user_auth_token(value)?
            .ok_or(AuthError::Unauthenticated)?;

        if token.is_expired(self.token_ttl, SystemTime::now()) {
            debug!("Auth token of user {} expired", token.user_id);
            if let Err(e) = self.user_store.delete_user_auth_token(value) {
                debug!("Failed to delete expired auth token: {}", e);
            }
            return Err(AuthError::Unauthenticated);
        }

        let actor = self
            .user_store
            .get_user(token.user_id)?
            .ok_or(AuthError::Unauthenticated)?;

        if let Err(e) = self
            .user_store
            .update_user_auth_token_last_used_timestamp(value)
        {
            debug!("Failed to update auth token last_used timestamp: {}", e);
        }
        Ok(actor)
    }
}
