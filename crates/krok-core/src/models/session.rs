use serde::Serialize;

use super::User;

/// Token written for every established session. There is no real token
/// issuance behind it.
pub const PLACEHOLDER_TOKEN: &str = "mock_jwt_token";

/// Snapshot of the current session.
///
/// `user` is an owned copy, not a live view of the stored collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub user: Option<User>,
    pub token: String,
}

impl Session {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn authenticated(user: User) -> Self {
        Self {
            user: Some(user),
            token: PLACEHOLDER_TOKEN.to_string(),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}
