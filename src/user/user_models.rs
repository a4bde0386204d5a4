use super::UserRole;
use serde::Serialize;

/// An authenticated caller, resolved from a session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Actor {
    pub user_id: usize,
    pub handle: String,
    pub role: UserRole,
}

impl Actor {
    pub fn new<S: Into<String>>(user_id: usize, handle: S, role: UserRole) -> Self {
        Actor {
            user_id,
            handle: handle.into(),
            role,
        }
    }
}
