//! Request-scoped caller identity.

/// Who is calling, derived from the bearer token of one request.
///
/// Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    /// The caller's platform user id (`user_id` claim).
    pub user_id: String,
    /// Whether the token carries the platform admin scope.
    pub is_admin: bool,
}

impl CallerIdentity {
    /// Creates an identity for a regular user.
    #[must_use]
    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            is_admin: false,
        }
    }

    /// Creates an identity for a platform administrator.
    #[must_use]
    pub fn admin(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            is_admin: true,
        }
    }
}
