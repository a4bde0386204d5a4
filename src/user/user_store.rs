use super::auth::{AuthToken, AuthTokenValue, UserAuthCredentials};
use super::user_models::Actor;
use super::UserRole;
use anyhow::Result;

pub trait UserAuthCredentialsStore: Send + Sync {
    /// Returns the credentials of the user with the given handle, if the user exists.
    fn get_user_auth_credentials(&self, user_handle: &str) -> Result<Option<UserAuthCredentials>>;

    /// Replaces the stored credentials. A `None` password removes password login.
    fn update_user_auth_credentials(&self, credentials: UserAuthCredentials) -> Result<()>;
}

pub trait UserAuthTokenStore: Send + Sync {
    fn get_user_auth_token(&self, token: &AuthTokenValue) -> Result<Option<AuthToken>>;

    /// Deletes the token and returns it, if it existed.
    fn delete_user_auth_token(&self, token: &AuthTokenValue) -> Result<Option<AuthToken>>;

    fn update_user_auth_token_last_used_timestamp(&self, token: &AuthTokenValue) -> Result<()>;

    fn add_user_auth_token(&self, token: AuthToken) -> Result<()>;

    fn get_all_user_auth_tokens(&self, user_handle: &str) -> Result<Vec<AuthToken>>;
}

pub trait UserStore: UserAuthTokenStore + UserAuthCredentialsStore + Send + Sync {
    /// Creates a user and returns its id.
    fn create_user(&self, user_handle: &str, role: UserRole) -> Result<usize>;

    fn get_user_id(&self, user_handle: &str) -> Result<Option<usize>>;

    fn get_user(&self, user_id: usize) -> Result<Option<Actor>>;

    fn set_user_role(&self, user_id: usize, role: UserRole) -> Result<()>;

    fn get_all_users(&self) -> Result<Vec<Actor>>;
}
