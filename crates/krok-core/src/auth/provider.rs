//! Thread-scoped access to the active `SessionManager`.
//!
//! Code that needs the session calls `use_auth` instead of threading the
//! manager through every layer. Using it without an installed provider is
//! a programming error and panics.

use std::cell::{Cell, RefCell};
use std::marker::PhantomData;

use tracing::debug;

use super::session::SessionManager;
use crate::error::AuthError;
use crate::storage::KeyValueStore;

/// Storage type held by an installed provider.
pub type DynStore = Box<dyn KeyValueStore>;

thread_local! {
    static CURRENT: RefCell<Option<SessionManager<DynStore>>> = const { RefCell::new(None) };
    static DEPTH: Cell<usize> = const { Cell::new(0) };
}

pub struct AuthProvider;

impl AuthProvider {
    /// Build a manager over `storage` (seeding and rehydrating) and install it.
    pub fn new<S: KeyValueStore + 'static>(storage: S) -> Result<ProviderGuard, AuthError> {
        let manager = SessionManager::new(Box::new(storage) as DynStore)?;
        Ok(Self::install(manager))
    }

    /// Install `manager` for the current thread until the guard is dropped.
    ///
    /// Installing while another provider is active shadows it; the outer one
    /// comes back when the inner guard goes away.
    pub fn install(manager: SessionManager<DynStore>) -> ProviderGuard {
        let previous = CURRENT.with(|current| current.borrow_mut().replace(manager));
        let depth = DEPTH.with(|d| {
            d.set(d.get() + 1);
            d.get()
        });
        debug!(depth, "Auth provider installed");
        ProviderGuard {
            previous,
            depth,
            active: true,
            _not_send: PhantomData,
        }
    }
}

/// Keeps a provider installed. Must be dropped on the thread that created it.
///
/// Nested guards must end in reverse order of installation; ending an outer
/// guard while an inner one is alive panics.
#[must_use = "the provider is uninstalled as soon as the guard is dropped"]
pub struct ProviderGuard {
    previous: Option<SessionManager<DynStore>>,
    depth: usize,
    active: bool,
    _not_send: PhantomData<*const ()>,
}

impl ProviderGuard {
    /// End the scope and hand back the manager it held.
    ///
    /// # Panics
    ///
    /// Panics if a provider installed after this one is still active.
    pub fn into_inner(mut self) -> SessionManager<DynStore> {
        self.check_order();
        match self.uninstall() {
            Some(manager) => manager,
            None => panic!("auth provider slot empty while its guard was alive"),
        }
    }

    fn check_order(&self) {
        let current = DEPTH.with(Cell::get);
        if current != self.depth && !std::thread::panicking() {
            panic!(
                "auth provider guards ended out of order (guard depth {}, active depth {})",
                self.depth, current
            );
        }
    }

    /// Put the shadowed manager back and return the one this guard installed.
    fn uninstall(&mut self) -> Option<SessionManager<DynStore>> {
        self.active = false;
        let previous = self.previous.take();
        DEPTH.with(|d| d.set(self.depth - 1));
        let manager = CURRENT.with(|current| std::mem::replace(&mut *current.borrow_mut(), previous));
        debug!(depth = self.depth, "Auth provider uninstalled");
        manager
    }
}

impl Drop for ProviderGuard {
    fn drop(&mut self) {
        if self.active {
            self.check_order();
            self.uninstall();
        }
    }
}

/// Run `f` against the active session manager.
///
/// # Panics
///
/// Panics when no `AuthProvider` is installed on this thread, or when called
/// re-entrantly from inside another `use_auth` closure.
pub fn use_auth<R>(f: impl FnOnce(&mut SessionManager<DynStore>) -> R) -> R {
    match try_use_auth(f) {
        Ok(value) => value,
        Err(e) => panic!("{}", e),
    }
}

/// Like `use_auth` but reports a missing provider as `AuthError::NoProvider`.
pub fn try_use_auth<R>(f: impl FnOnce(&mut SessionManager<DynStore>) -> R) -> Result<R, AuthError> {
    CURRENT.with(|current| {
        let mut slot = current.borrow_mut();
        match slot.as_mut() {
            Some(manager) => Ok(f(manager)),
            None => Err(AuthError::NoProvider),
        }
    })
}
