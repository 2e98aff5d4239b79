use chrono::{SubsecRound, Utc};
use tracing::{debug, info, warn};

use super::registration::{Registration, RegistrationOutcome, POST_REGISTRATION_ROUTE};
use crate::error::AuthError;
use crate::models::{Role, Session, User, UserPatch};
use crate::storage::{decode, KeyValueStore, Snapshot, AUTH_TOKEN_KEY, USERS_KEY, USER_DATA_KEY};
use crate::users::UserStore;

/// Owner of the current session.
///
/// Two states: anonymous (no user, empty token) and authenticated (user
/// copy plus the stored token, the placeholder after a login). The session
/// keys are persisted next to the user collection in the same store.
pub struct SessionManager<S> {
    users: UserStore<S>,
    session: Session,
}

impl<S: KeyValueStore> SessionManager<S> {
    /// Seed default users, then rehydrate the session from storage.
    ///
    /// A missing or malformed stored user yields an anonymous session.
    pub fn new(storage: S) -> Result<Self, AuthError> {
        let mut users = UserStore::new(storage);
        users.ensure_default_users()?;

        let session = Self::rehydrate(users.storage())?;
        debug!(authenticated = session.is_authenticated(), "Session rehydrated");

        Ok(Self { users, session })
    }

    fn rehydrate(storage: &S) -> Result<Session, AuthError> {
        let raw_user = storage.get_item(USER_DATA_KEY)?;
        let user = decode::<User>(raw_user.as_deref()).into_option(USER_DATA_KEY);
        let token = storage.get_item(AUTH_TOKEN_KEY)?.unwrap_or_default();
        Ok(Session { user, token })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn user(&self) -> Option<&User> {
        self.session.user()
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_authenticated()
    }

    pub fn token(&self) -> &str {
        self.session.token()
    }

    pub fn users(&self) -> &UserStore<S> {
        &self.users
    }

    pub fn into_storage(self) -> S {
        self.users.into_storage()
    }

    /// Returns `false` on a credential mismatch, without saying which
    /// field was wrong. The session is left as it was.
    pub fn login(&mut self, email: &str, password: &str) -> Result<bool, AuthError> {
        match self.users.find_by_credentials(email, password)? {
            Some(user) => {
                let session = Session::authenticated(user);
                self.persist(&session)?;
                info!(email, "Login successful");
                self.session = session;
                Ok(true)
            }
            None => {
                debug!(email, "Login rejected");
                Ok(false)
            }
        }
    }

    /// Drop back to anonymous and remove both session keys.
    ///
    /// The in-memory transition always happens and both removals are always
    /// attempted; a backend failure is reported afterwards.
    pub fn logout(&mut self) -> Result<(), AuthError> {
        self.session = Session::anonymous();
        let storage = self.users.storage_mut();
        let token_result = storage.remove_item(AUTH_TOKEN_KEY);
        let user_result = storage.remove_item(USER_DATA_KEY);
        info!("Logged out");
        token_result?;
        user_result?;
        Ok(())
    }

    /// Merge `patch` into the signed-in user and the matching stored record.
    ///
    /// No-op returning `None` while anonymous. The session copy and the
    /// collection are written together: if either write fails both keys
    /// are restored and the in-memory session is unchanged.
    pub fn update_user(&mut self, patch: &UserPatch) -> Result<Option<User>, AuthError> {
        let Some(current) = self.session.user() else {
            debug!("Profile update ignored, no active session");
            return Ok(None);
        };
        let updated = current.merged(patch);

        let snapshot = Snapshot::capture(self.users.storage(), &[USER_DATA_KEY, USERS_KEY])?;
        if let Err(e) = self.write_profile(&updated) {
            if let Err(restore_err) = snapshot.restore(self.users.storage_mut()) {
                warn!(error = %restore_err, "Failed to roll back profile update");
            }
            return Err(e);
        }

        debug!(id = %updated.id, "Profile updated");
        self.session.user = Some(updated.clone());
        Ok(Some(updated))
    }

    /// The merged session copy is the source of truth for both keys.
    fn write_profile(&mut self, updated: &User) -> Result<(), AuthError> {
        let encoded = serde_json::to_string(updated)?;
        self.users.storage_mut().set_item(USER_DATA_KEY, &encoded)?;
        if !self.users.replace(updated)? {
            debug!(id = %updated.id, "Signed-in user has no stored record");
        }
        Ok(())
    }

    /// Create a `viewer` account and sign it in.
    ///
    /// Invalid input or a taken email is rejected before anything is written.
    /// Only `user_data` is written for the new session; the token is whatever
    /// `auth_token` already holds, empty if nothing.
    pub fn register(&mut self, registration: Registration) -> Result<RegistrationOutcome, AuthError> {
        registration.validate()?;

        let id = self.users.next_id()?;
        let user = User::new(
            id,
            registration.name,
            registration.email,
            registration.password,
            Role::Viewer,
        )
        // Stored as epoch milliseconds
        .with_created_at(Utc::now().trunc_subsecs(3));

        self.users.insert(user.clone())?;
        info!(id = %user.id, email = %user.email, "User registered");

        let encoded = serde_json::to_string(&user)?;
        let storage = self.users.storage_mut();
        storage.set_item(USER_DATA_KEY, &encoded)?;
        let token = storage.get_item(AUTH_TOKEN_KEY)?.unwrap_or_default();
        self.session = Session {
            user: Some(user.clone()),
            token,
        };

        Ok(RegistrationOutcome {
            user,
            redirect_to: POST_REGISTRATION_ROUTE,
        })
    }

    fn persist(&mut self, session: &Session) -> Result<(), AuthError> {
        let Some(ref user) = session.user else {
            return Ok(());
        };
        let encoded = serde_json::to_string(user)?;

        let storage = self.users.storage_mut();
        let snapshot = Snapshot::capture(&*storage, &[AUTH_TOKEN_KEY, USER_DATA_KEY])?;
        let result = storage
            .set_item(AUTH_TOKEN_KEY, &session.token)
            .and_then(|()| storage.set_item(USER_DATA_KEY, &encoded));
        if let Err(e) = result {
            if let Err(restore_err) = snapshot.restore(storage) {
                warn!(error = %restore_err, "Failed to roll back session write");
            }
            return Err(e.into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PLACEHOLDER_TOKEN;
    use crate::storage::{MemoryStore, StorageError};
    use std::io;

    /// Memory store that rejects writes to one key once armed.
    #[derive(Default)]
    struct FailingStore {
        inner: MemoryStore,
        fail_key: Option<&'static str>,
    }

    impl KeyValueStore for FailingStore {
        fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
            self.inner.get_item(key)
        }

        fn set_item(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
            if self.fail_key == Some(key) {
                return Err(StorageError::Io {
                    path: key.to_string(),
                    source: io::Error::other("quota exceeded"),
                });
            }
            self.inner.set_item(key, value)
        }

        fn remove_item(&mut self, key: &str) -> Result<(), StorageError> {
            self.inner.remove_item(key)
        }
    }

    fn manager() -> SessionManager<MemoryStore> {
        SessionManager::new(MemoryStore::new()).unwrap()
    }

    #[test]
    fn test_new_seeds_and_starts_anonymous() {
        let manager = manager();
        assert!(!manager.is_authenticated());
        assert_eq!(manager.token(), "");
        assert_eq!(manager.users().list().unwrap().len(), 3);
    }

    #[test]
    fn test_login_admin() {
        let mut manager = manager();
        assert!(manager.login("admin@krokos.com", "admin123").unwrap());
        assert!(manager.is_authenticated());
        assert_eq!(manager.token(), PLACEHOLDER_TOKEN);
        assert_eq!(manager.user().unwrap().role, Role::Admin);

        let storage = manager.users().storage();
        assert_eq!(
            storage.get_item(AUTH_TOKEN_KEY).unwrap().as_deref(),
            Some(PLACEHOLDER_TOKEN)
        );
        let stored: User =
            serde_json::from_str(&storage.get_item(USER_DATA_KEY).unwrap().unwrap()).unwrap();
        assert_eq!(stored.email, "admin@krokos.com");
    }

    #[test]
    fn test_login_wrong_password() {
        let mut manager = manager();
        assert!(!manager.login("admin@krokos.com", "wrong").unwrap());
        assert!(!manager.is_authenticated());
        assert_eq!(manager.token(), "");
        assert!(!manager.users().storage().contains_key(AUTH_TOKEN_KEY));
        assert!(!manager.users().storage().contains_key(USER_DATA_KEY));
    }

    #[test]
    fn test_logout_clears_keys() {
        let mut manager = manager();
        manager.login("viewer@krokos.com", "viewer123").unwrap();
        manager.logout().unwrap();

        assert!(!manager.is_authenticated());
        assert_eq!(manager.session(), &Session::anonymous());
        assert!(!manager.users().storage().contains_key(AUTH_TOKEN_KEY));
        assert!(!manager.users().storage().contains_key(USER_DATA_KEY));
    }

    #[test]
    fn test_logout_when_anonymous() {
        let mut manager = manager();
        assert!(manager.logout().is_ok());
        assert!(!manager.is_authenticated());
    }

    #[test]
    fn test_update_user_authenticated() {
        let mut manager = manager();
        manager.login("editor@krokos.com", "editor123").unwrap();

        let updated = manager.update_user(&UserPatch::name("X")).unwrap().unwrap();
        assert_eq!(updated.name, "X");
        assert_eq!(manager.user().unwrap().name, "X");

        let stored = manager.users().find_by_id("2").unwrap().unwrap();
        assert_eq!(stored.name, "X");
        let session_copy: User = serde_json::from_str(
            &manager.users().storage().get_item(USER_DATA_KEY).unwrap().unwrap(),
        )
        .unwrap();
        assert_eq!(session_copy, updated);
    }

    #[test]
    fn test_update_user_anonymous_is_noop() {
        let mut manager = manager();
        let before = manager.users().storage().clone();

        assert_eq!(manager.update_user(&UserPatch::name("X")).unwrap(), None);
        assert_eq!(
            manager.users().storage().get_item(USERS_KEY).unwrap(),
            before.get_item(USERS_KEY).unwrap()
        );
        assert!(!manager.users().storage().contains_key(USER_DATA_KEY));
    }

    #[test]
    fn test_update_user_rolls_back_on_failure() {
        let mut manager = SessionManager::new(FailingStore::default()).unwrap();
        manager.login("admin@krokos.com", "admin123").unwrap();
        let session_before = manager.users().storage().get_item(USER_DATA_KEY).unwrap();

        manager.users.storage_mut().fail_key = Some(USERS_KEY);
        let err = manager.update_user(&UserPatch::name("X")).unwrap_err();
        assert!(matches!(err, AuthError::Storage(StorageError::Io { .. })));

        // Session copy restored and in-memory state untouched
        assert_eq!(
            manager.users().storage().get_item(USER_DATA_KEY).unwrap(),
            session_before
        );
        assert_eq!(manager.user().unwrap().name, "Администратор");
        assert_eq!(
            manager.users().find_by_id("1").unwrap().unwrap().name,
            "Администратор"
        );
    }

    #[test]
    fn test_login_failed_write_leaves_anonymous() {
        let mut manager = SessionManager::new(FailingStore::default()).unwrap();
        manager.users.storage_mut().fail_key = Some(USER_DATA_KEY);

        assert!(manager.login("admin@krokos.com", "admin123").is_err());
        assert!(!manager.is_authenticated());
        assert_eq!(manager.users().storage().get_item(AUTH_TOKEN_KEY).unwrap(), None);
    }

    #[test]
    fn test_rehydrate_from_storage() {
        let mut manager = manager();
        manager.login("editor@krokos.com", "editor123").unwrap();
        let storage = manager.into_storage();

        let manager = SessionManager::new(storage).unwrap();
        assert!(manager.is_authenticated());
        assert_eq!(manager.user().unwrap().email, "editor@krokos.com");
        assert_eq!(manager.token(), PLACEHOLDER_TOKEN);
    }

    #[test]
    fn test_rehydrate_malformed_user_is_anonymous() {
        let mut storage = MemoryStore::new();
        storage.set_item(USER_DATA_KEY, "{broken").unwrap();
        storage.set_item(AUTH_TOKEN_KEY, PLACEHOLDER_TOKEN).unwrap();

        let manager = SessionManager::new(storage).unwrap();
        assert!(!manager.is_authenticated());
        assert!(manager.user().is_none());
    }

    #[test]
    fn test_register_signs_in_viewer() {
        let mut manager = manager();
        let outcome = manager
            .register(Registration::new("Ivan", "ivan@example.com", "secret"))
            .unwrap();

        assert_eq!(outcome.redirect_to, "/");
        assert_eq!(outcome.user.role, Role::Viewer);
        assert!(outcome.user.created_at.is_some());
        assert!(manager.is_authenticated());
        assert_eq!(manager.user(), Some(&outcome.user));
        assert_eq!(manager.users().list().unwrap().len(), 4);

        let storage = manager.users().storage();
        let stored: User = serde_json::from_str(&storage.get_item(USER_DATA_KEY).unwrap().unwrap()).unwrap();
        assert_eq!(stored, outcome.user);
        assert_eq!(storage.get_item(AUTH_TOKEN_KEY).unwrap(), None);
        assert_eq!(manager.token(), "");

        manager.logout().unwrap();
        assert!(manager.login("ivan@example.com", "secret").unwrap());
    }

    #[test]
    fn test_register_duplicate_email() {
        let mut manager = manager();
        let err = manager
            .register(Registration::new("Dup", "viewer@krokos.com", "pw"))
            .unwrap_err();
        assert!(err.is_user_facing());
        assert!(matches!(err, AuthError::EmailTaken { .. }));
        assert!(!manager.is_authenticated());
        assert_eq!(manager.users().list().unwrap().len(), 3);
        assert!(!manager.users().storage().contains_key(USER_DATA_KEY));
    }

    #[test]
    fn test_register_invalid_input_writes_nothing() {
        let mut manager = manager();
        let err = manager
            .register(Registration::new("", "x@y.z", "pw"))
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidRegistration(_)));
        assert_eq!(manager.users().list().unwrap().len(), 3);
    }

    #[test]
    fn test_register_keeps_existing_token() {
        let mut manager = manager();
        manager.login("admin@krokos.com", "admin123").unwrap();
        manager
            .register(Registration::new("Ivan", "ivan@example.com", "secret"))
            .unwrap();

        assert_eq!(manager.user().unwrap().email, "ivan@example.com");
        assert_eq!(manager.token(), PLACEHOLDER_TOKEN);
    }

    #[test]
    fn test_update_user_writes_session_copy_to_collection() {
        let mut manager = manager();
        manager.login("editor@krokos.com", "editor123").unwrap();

        // Stored record drifts away from the signed-in copy
        let drift = UserPatch {
            email: Some("new@x.io".to_string()),
            ..UserPatch::default()
        };
        manager.users.update("2", &drift).unwrap();

        let updated = manager.update_user(&UserPatch::name("X")).unwrap().unwrap();
        assert_eq!(updated.email, "editor@krokos.com");

        let stored = manager.users().find_by_id("2").unwrap().unwrap();
        assert_eq!(stored, updated);
        assert_eq!(manager.user(), Some(&stored));
    }

    #[test]
    fn test_rehydrate_user_without_token() {
        let mut storage = MemoryStore::new();
        let user = User::new("3", "Наблюдатель", "viewer@krokos.com", "viewer123", Role::Viewer);
        storage
            .set_item(USER_DATA_KEY, &serde_json::to_string(&user).unwrap())
            .unwrap();

        let manager = SessionManager::new(storage).unwrap();
        assert!(manager.is_authenticated());
        assert_eq!(manager.user(), Some(&user));
        assert_eq!(manager.token(), "");
    }
}
