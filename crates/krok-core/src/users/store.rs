use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::AuthError;
use crate::models::{Role, User, UserPatch};
use crate::storage::{decode, Decoded, KeyValueStore, USERS_KEY};

/// The three accounts written when the collection is absent or empty.
pub fn default_users() -> Vec<User> {
    vec![
        User::new("1", "Администратор", "admin@krokos.com", "admin123", Role::Admin),
        User::new("2", "Редактор", "editor@krokos.com", "editor123", Role::Editor),
        User::new("3", "Наблюдатель", "viewer@krokos.com", "viewer123", Role::Viewer),
    ]
}

/// Owner of the `app-users` collection.
///
/// Every operation is a full read-modify-write of the stored JSON array.
pub struct UserStore<S> {
    storage: S,
}

impl<S: KeyValueStore> UserStore<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    pub fn into_storage(self) -> S {
        self.storage
    }

    /// Seed the default accounts unless a non-empty array is already stored.
    ///
    /// Unparsable or non-array contents are overwritten.
    pub fn ensure_default_users(&mut self) -> Result<(), AuthError> {
        let raw = self.storage.get_item(USERS_KEY)?;
        match decode::<Vec<Value>>(raw.as_deref()) {
            Decoded::Valid(users) if !users.is_empty() => {
                debug!(count = users.len(), "User collection present, skipping seed");
                return Ok(());
            }
            Decoded::Malformed(e) => {
                warn!(key = USERS_KEY, error = %e, "User collection is malformed, reseeding");
            }
            _ => {}
        }
        self.save(&default_users())?;
        info!("Seeded default users");
        Ok(())
    }

    /// All decodable user records, in stored order.
    ///
    /// Records that fail to decode are skipped here (and logged) but are
    /// left in storage untouched; a malformed collection reads as empty.
    pub fn list(&self) -> Result<Vec<User>, AuthError> {
        let users = self
            .load_raw()?
            .into_iter()
            .enumerate()
            .filter_map(|(index, record)| match serde_json::from_value::<User>(record) {
                Ok(user) => Some(user),
                Err(e) => {
                    warn!(index, error = %e, "Skipping malformed user record");
                    None
                }
            })
            .collect();
        Ok(users)
    }

    /// Exact, case-sensitive match on both email and password.
    pub fn find_by_credentials(&self, email: &str, password: &str) -> Result<Option<User>, AuthError> {
        Ok(self
            .list()?
            .into_iter()
            .find(|u| u.matches_credentials(email, password)))
    }

    pub fn find_by_email(&self, email: &str) -> Result<Option<User>, AuthError> {
        Ok(self.list()?.into_iter().find(|u| u.email == email))
    }

    pub fn find_by_id(&self, id: &str) -> Result<Option<User>, AuthError> {
        Ok(self.list()?.into_iter().find(|u| u.id == id))
    }

    /// Append a user. Fails without touching storage if the email is taken
    /// by any stored record, decodable or not.
    pub fn insert(&mut self, user: User) -> Result<(), AuthError> {
        let mut records = self.load_raw()?;
        if records.iter().any(|r| field_str(r, "email") == Some(user.email.as_str())) {
            debug!(email = %user.email, "Rejecting insert with duplicate email");
            return Err(AuthError::EmailTaken { email: user.email });
        }
        debug!(id = %user.id, "Inserting user");
        records.push(serde_json::to_value(&user)?);
        self.save_raw(&records)
    }

    /// Shallow-merge `patch` into the record with the given id.
    ///
    /// Only the patched fields of the stored object are rewritten; every
    /// other record is saved back exactly as it was read. Returns the
    /// updated record, or `None` (with storage untouched) when no record has
    /// that id. Email uniqueness is not re-checked here.
    pub fn update(&mut self, id: &str, patch: &UserPatch) -> Result<Option<User>, AuthError> {
        let mut records = self.load_raw()?;
        let Some(Value::Object(fields)) = records.iter_mut().find(|r| field_str(r, "id") == Some(id)) else {
            debug!(id, "Update for unknown user id ignored");
            return Ok(None);
        };
        if let Value::Object(changes) = serde_json::to_value(patch)? {
            fields.extend(changes);
        }
        let updated = serde_json::from_value::<User>(Value::Object(fields.clone()));
        self.save_raw(&records)?;

        match updated {
            Ok(user) => Ok(Some(user)),
            Err(e) => {
                warn!(id, error = %e, "Updated user record does not decode");
                Ok(None)
            }
        }
    }

    /// Overwrite the record whose id matches `user.id` with `user`.
    ///
    /// Returns `false` (with storage untouched) when no record has that id.
    pub fn replace(&mut self, user: &User) -> Result<bool, AuthError> {
        let mut records = self.load_raw()?;
        let Some(record) = records
            .iter_mut()
            .find(|r| field_str(r, "id") == Some(user.id.as_str()))
        else {
            debug!(id = %user.id, "Replace for unknown user id ignored");
            return Ok(false);
        };
        *record = serde_json::to_value(user)?;
        self.save_raw(&records)?;
        Ok(true)
    }

    /// Fresh id derived from the current time.
    pub fn next_id(&self) -> Result<String, AuthError> {
        self.next_id_at(Utc::now())
    }

    /// Millisecond timestamp id, bumped past every numeric id already
    /// stored so ids stay strictly increasing even within one millisecond.
    ///
    /// If the highest stored id cannot be bumped, the first free id at or
    /// after the timestamp is used instead.
    pub fn next_id_at(&self, now: DateTime<Utc>) -> Result<String, AuthError> {
        let candidate = now.timestamp_millis();
        let taken: HashSet<i64> = self
            .load_raw()?
            .iter()
            .filter_map(|r| field_str(r, "id").and_then(|id| id.parse::<i64>().ok()))
            .collect();

        let id = match taken.iter().max() {
            Some(&max) if max >= candidate => match max.checked_add(1) {
                Some(next) => next,
                None => {
                    warn!(max, "Highest stored id is at the limit, searching for a free id");
                    (candidate..=i64::MAX)
                        .find(|id| !taken.contains(id))
                        .ok_or(AuthError::IdsExhausted)?
                }
            },
            _ => candidate,
        };
        Ok(id.to_string())
    }

    /// The stored array as raw JSON records. Malformed or non-array
    /// contents read as empty.
    fn load_raw(&self) -> Result<Vec<Value>, AuthError> {
        let raw = self.storage.get_item(USERS_KEY)?;
        Ok(decode::<Vec<Value>>(raw.as_deref())
            .into_option(USERS_KEY)
            .unwrap_or_default())
    }

    fn save_raw(&mut self, records: &[Value]) -> Result<(), AuthError> {
        let encoded = serde_json::to_string(records)?;
        self.storage.set_item(USERS_KEY, &encoded)?;
        Ok(())
    }

    fn save(&mut self, users: &[User]) -> Result<(), AuthError> {
        let encoded = serde_json::to_string(users)?;
        self.storage.set_item(USERS_KEY, &encoded)?;
        Ok(())
    }
}

fn field_str<'a>(record: &'a Value, field: &str) -> Option<&'a str> {
    record.get(field).and_then(Value::as_str)
}
