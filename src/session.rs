//! Authentication context supplied by the host application.

use std::sync::{Arc, RwLock};

use crate::error::{Result, SyncError};

/// Shared handle to the signed-in owner. Cloning shares the same state, so the
/// host can sign in or out while the engine holds a copy.
#[derive(Debug, Clone, Default)]
pub struct Session {
    owner_id: Arc<RwLock<Option<String>>>,
}

impl Session {
    /// A session with nobody signed in.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signed_in(owner_id: impl Into<String>) -> Self {
        let session = Self::new();
        session.sign_in(owner_id);
        session
    }

    pub fn sign_in(&self, owner_id: impl Into<String>) {
        if let Ok(mut guard) = self.owner_id.write() {
            *guard = Some(owner_id.into());
        }
    }

    pub fn sign_out(&self) {
        if let Ok(mut guard) = self.owner_id.write() {
            *guard = None;
        }
    }

    pub fn owner_id(&self) -> Option<String> {
        self.owner_id.read().ok().and_then(|guard| guard.clone())
    }

    /// The owner id, or `NotAuthenticated`.
    pub fn require_owner(&self) -> Result<String> {
        self.owner_id().ok_or(SyncError::NotAuthenticated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymous_session_is_rejected() {
        let session = Session::new();
        assert_eq!(session.require_owner(), Err(SyncError::NotAuthenticated));
    }

    #[test]
    fn clones_observe_sign_in_and_out() {
        let session = Session::new();
        let held = session.clone();
        session.sign_in("user-42");
        assert_eq!(held.require_owner().unwrap(), "user-42");
        session.sign_out();
        assert!(held.owner_id().is_none());
    }
}
