//! Core library for krok.
//!
//! A mock authentication provider over a string key-value store:
//!
//! - `storage`: the `KeyValueStore` capability plus in-memory and JSON-file backends
//! - `models`: `User`, `Role`, `UserPatch` and the `Session` snapshot
//! - `users`: the `UserStore` owning the `app-users` collection
//! - `auth`: the `SessionManager`, registration flow and `AuthProvider` scope
//! - `config`: on-disk configuration for the command-line front end
//!
//! Passwords are stored in plaintext and the session token is a constant
//! placeholder. This is a mock contract and carries no real security.

pub mod auth;
pub mod config;
pub mod error;
pub mod models;
pub mod storage;
pub mod users;

pub use auth::{
    try_use_auth, use_auth, AuthProvider, DynStore, ProviderGuard, Registration, RegistrationOutcome,
    SessionManager,
};
pub use config::Config;
pub use error::AuthError;
pub use models::{Role, Session, User, UserPatch};
pub use storage::{JsonFileStore, KeyValueStore, MemoryStore, StorageError};
pub use users::UserStore;
