pub mod auth;
pub mod permissions;
mod sqlite_user_store;
mod user_manager;
pub mod user_models;
mod user_store;

pub use auth::{AuthError, AuthToken, AuthTokenValue, UserAuthCredentials, UsernamePasswordCredentials};
pub use permissions::{Permission, UserRole};
pub use sqlite_user_store::SqliteUserStore;
pub use user_manager::{UserManager, DEFAULT_TOKEN_TTL};
pub use user_models::Actor;
pub use user_store::{UserAuthCredentialsStore, UserAuthTokenStore, UserStore};
