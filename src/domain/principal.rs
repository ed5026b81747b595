//! The authenticated identity of a request (§3 "Principal").

/// An authenticated identity. Immutable once constructed; created by the
/// Authentication Resolver and dropped with its Request Context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: String,
    pub username: String,
    pub role: String,
}

impl Principal {
    pub fn new(user_id: impl Into<String>, username: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            username: username.into(),
            role: role.into(),
        }
    }
}
