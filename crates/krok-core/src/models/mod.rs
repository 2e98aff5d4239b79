//! Data models for the auth store.
//!
//! - `User`, `Role`, `UserPatch`: account records and partial updates
//! - `Session`: the current user copy plus its placeholder token

pub mod session;
pub mod user;

pub use session::{Session, PLACEHOLDER_TOKEN};
pub use user::{Role, User, UserPatch};
