use crate::error::AuthError;
use crate::models::User;

/// Where the front end should go after a successful registration.
pub const POST_REGISTRATION_ROUTE: &str = "/";

/// Registration form input.
#[derive(Debug, Clone)]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub password: String,
}

impl Registration {
    pub fn new(name: impl Into<String>, email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            password: password.into(),
        }
    }

    /// Check the fields a registration form requires.
    ///
    /// Values are taken as-is, no trimming or case folding, matching how
    /// credentials are later compared.
    pub fn validate(&self) -> Result<(), AuthError> {
        let invalid =
            |msg: &str| -> Result<(), AuthError> { Err(AuthError::InvalidRegistration(msg.to_string())) };

        if self.name.is_empty() {
            return invalid("name is required");
        }
        if self.email.is_empty() {
            return invalid("email is required");
        }
        if !is_plausible_email(&self.email) {
            return invalid("email address is not valid");
        }
        if self.password.is_empty() {
            return invalid("password is required");
        }
        Ok(())
    }
}

/// `local@domain` with both parts non-empty and no whitespace.
fn is_plausible_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && !domain.is_empty() && !domain.contains('@'),
        None => false,
    }
}

/// Result of a successful registration.
#[derive(Debug, Clone)]
pub struct RegistrationOutcome {
    pub user: User,
    pub redirect_to: &'static str,
}
