//! Authentication module for managing the current session.
//!
//! This module provides:
//! - `SessionManager`: login, logout, profile update and registration
//! - `Registration`: registration input and its validation
//! - `AuthProvider`/`use_auth`: thread-scoped access to the active manager
//!
//! Sessions never expire; they last until logout clears the stored keys.

pub mod provider;
pub mod registration;
pub mod session;

pub use provider::{try_use_auth, use_auth, AuthProvider, DynStore, ProviderGuard};
pub use registration::{Registration, RegistrationOutcome, POST_REGISTRATION_ROUTE};
pub use session::SessionManager;
