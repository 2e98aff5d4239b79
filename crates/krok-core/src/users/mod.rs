//! Registered user collection.
//!
//! `UserStore` owns the `app-users` key: seeding the default accounts,
//! credential lookup, insertion with email uniqueness, and in-place patches.
//! Users are never deleted.

pub mod store;

pub use store::{default_users, UserStore};
