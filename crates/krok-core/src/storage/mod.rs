//! Key-value storage capability.
//!
//! Everything krok persists lives in a flat string-keyed store, the same
//! shape as a browser's local storage:
//!
//! - `app-users`: JSON array of user records
//! - `user_data`: JSON record of the signed-in user
//! - `auth_token`: plain session token
//!
//! The store is injected into `UserStore`/`SessionManager` rather than being
//! global. `MemoryStore` backs tests, `JsonFileStore` backs the CLI.

pub mod codec;
pub mod file;
pub mod memory;

use thiserror::Error;

pub use codec::{decode, Decoded};
pub use file::JsonFileStore;
pub use memory::MemoryStore;

/// Key holding the registered user collection.
pub const USERS_KEY: &str = "app-users";

/// Key holding the current session's user record.
pub const USER_DATA_KEY: &str = "user_data";

/// Key holding the current session token.
pub const AUTH_TOKEN_KEY: &str = "auth_token";

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize storage document: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Synchronous string key-value storage.
///
/// Reads take `&self`, mutations take `&mut self`; there is a single writer.
pub trait KeyValueStore {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn set_item(&mut self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove a key. Removing an absent key is not an error.
    fn remove_item(&mut self, key: &str) -> Result<(), StorageError>;
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for Box<S> {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).get_item(key)
    }

    fn set_item(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        (**self).set_item(key, value)
    }

    fn remove_item(&mut self, key: &str) -> Result<(), StorageError> {
        (**self).remove_item(key)
    }
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for &mut S {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).get_item(key)
    }

    fn set_item(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        (**self).set_item(key, value)
    }

    fn remove_item(&mut self, key: &str) -> Result<(), StorageError> {
        (**self).remove_item(key)
    }
}

/// Restore `key` to a previously captured raw value (or absence).
pub(crate) fn restore<S: KeyValueStore + ?Sized>(
    store: &mut S,
    key: &str,
    previous: Option<&str>,
) -> Result<(), StorageError> {
    match previous {
        Some(raw) => store.set_item(key, raw),
        None => store.remove_item(key),
    }
}

/// Raw values of a set of keys captured before a multi-key write, so the
/// write can be undone if a later step fails.
#[derive(Debug)]
pub(crate) struct Snapshot {
    entries: Vec<(&'static str, Option<String>)>,
}

impl Snapshot {
    pub(crate) fn capture<S: KeyValueStore + ?Sized>(
        store: &S,
        keys: &[&'static str],
    ) -> Result<Self, StorageError> {
        let entries = keys
            .iter()
            .map(|&key| store.get_item(key).map(|raw| (key, raw)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { entries })
    }

    /// Put every captured key back. All keys are attempted; the first
    /// failure is returned.
    pub(crate) fn restore<S: KeyValueStore + ?Sized>(&self, store: &mut S) -> Result<(), StorageError> {
        let mut first_err = None;
        for (key, previous) in self.entries.iter().rev() {
            if let Err(e) = restore(store, key, previous.as_deref()) {
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
