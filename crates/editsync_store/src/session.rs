//! User session signals.
//!
//! The database connection lives exactly as long as a user is logged in.
//! Components that care about login/logout register a [`SessionListener`]
//! with the shared [`Session`].

use crate::error::StoreResult;
use parking_lot::RwLock;
use std::sync::{Arc, Weak};

/// The identity of a logged-in user.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserIdentity {
    username: String,
}

impl UserIdentity {
    /// Creates an identity.
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
        }
    }

    /// Returns the user name.
    pub fn username(&self) -> &str {
        &self.username
    }
}

/// Receives session login/logout signals.
pub trait SessionListener: Send + Sync {
    /// Called after a user has logged in.
    fn on_login(&self, user: &UserIdentity) -> StoreResult<()>;

    /// Called after the user has logged out.
    fn on_logout(&self);
}

/// The current user session.
///
/// Listeners are held weakly; dropping a listener unsubscribes it.
#[derive(Default)]
pub struct Session {
    user: RwLock<Option<UserIdentity>>,
    listeners: RwLock<Vec<Weak<dyn SessionListener>>>,
}

impl Session {
    /// Creates a logged-out session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener.
    ///
    /// If a user is already logged in, the listener receives `on_login`
    /// immediately.
    pub fn subscribe<L>(&self, listener: &Arc<L>) -> StoreResult<()>
    where
        L: SessionListener + 'static,
    {
        let weak: Weak<dyn SessionListener> = Arc::downgrade(listener) as Weak<dyn SessionListener>;
        self.listeners.write().push(weak);

        let current = self.user.read().clone();
        if let Some(user) = current {
            listener.on_login(&user)?;
        }
        Ok(())
    }

    /// Logs `user` in and notifies every listener.
    ///
    /// Returns the first listener error. A failing listener does not prevent
    /// the remaining listeners from being notified.
    pub fn login(&self, user: UserIdentity) -> StoreResult<()> {
        tracing::info!(user = user.username(), "session login");
        *self.user.write() = Some(user.clone());

        let mut first_error = None;
        for listener in self.live_listeners() {
            if let Err(e) = listener.on_login(&user) {
                tracing::error!(error = %e, "session listener failed on login");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Logs the current user out and notifies every listener.
    ///
    /// Logging out while logged out is a no-op.
    pub fn logout(&self) {
        let previous = self.user.write().take();
        if previous.is_none() {
            return;
        }
        tracing::info!("session logout");

        for listener in self.live_listeners() {
            listener.on_logout();
        }
    }

    /// Returns true while a user is logged in.
    pub fn is_logged_in(&self) -> bool {
        self.user.read().is_some()
    }

    /// Returns the logged-in user.
    pub fn current_user(&self) -> Option<UserIdentity> {
        self.user.read().clone()
    }

    fn live_listeners(&self) -> Vec<Arc<dyn SessionListener>> {
        let mut listeners = self.listeners.write();
        listeners.retain(|l| l.strong_count() > 0);
        listeners.iter().filter_map(Weak::upgrade).collect()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("user", &*self.user.read())
            .field("listeners", &self.listeners.read().len())
            .finish()
    }
}
