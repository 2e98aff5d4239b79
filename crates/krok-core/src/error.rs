use thiserror::Error;

use crate::storage::StorageError;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("a user with email {email} already exists")]
    EmailTaken { email: String },

    #[error("invalid registration: {0}")]
    InvalidRegistration(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("failed to encode stored value: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("no free user id left")]
    IdsExhausted,

    #[error("use_auth must be used within an AuthProvider")]
    NoProvider,
}

impl AuthError {
    /// Whether this error should be shown to the person filling in a form,
    /// as opposed to being an infrastructure or programming failure.
    pub fn is_user_facing(&self) -> bool {
        matches!(self, AuthError::EmailTaken { .. } | AuthError::InvalidRegistration(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_taken_message() {
        let err = AuthError::EmailTaken {
            email: "admin@krokos.com".to_string(),
        };
        assert_eq!(err.to_string(), "a user with email admin@krokos.com already exists");
        assert!(err.is_user_facing());
    }

    #[test]
    fn test_no_provider_is_not_user_facing() {
        assert!(!AuthError::NoProvider.is_user_facing());
        assert_eq!(
            AuthError::NoProvider.to_string(),
            "use_auth must be used within an AuthProvider"
        );
    }
}
