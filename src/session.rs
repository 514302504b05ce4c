use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::RwLock;
use tracing::{error, info, warn};

use crate::auth::{AuthorizationRequest, Flow as AuthFlow, TokenGrant};
use crate::reddit::{OAuthToken, TokenProvider};
use crate::storage::{SecretStore, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("not signed in")]
    SignedOut,
    #[error("sign-in is not configured (missing reddit.client_id)")]
    NotConfigured,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Restoring,
    SignedOut,
    SignedIn,
}

/// Owns the bearer token and its persistence. The token is read back from
/// the secret store on startup and removed on sign-out; the refresh token is
/// stored but never used.
pub struct Manager {
    store: Arc<dyn SecretStore>,
    flow: Option<Arc<AuthFlow>>,
    state: RwLock<AuthState>,
    access_token: RwLock<Option<String>>,
}

impl Manager {
    pub fn new(store: Arc<dyn SecretStore>, flow: Option<Arc<AuthFlow>>) -> Self {
        Self {
            store,
            flow,
            state: RwLock::new(AuthState::Restoring),
            access_token: RwLock::new(None),
        }
    }

    pub fn state(&self) -> AuthState {
        *self.state.read()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state() == AuthState::SignedIn
    }

    pub fn is_loading(&self) -> bool {
        self.state() == AuthState::Restoring
    }

    pub fn access_token(&self) -> Option<String> {
        self.access_token.read().clone()
    }

    pub fn can_sign_in(&self) -> bool {
        self.flow.is_some()
    }

    /// Leaves `Restoring`. A store failure is logged and treated as signed out.
    pub fn restore(&self) -> AuthState {
        let token = match self.store.get(ACCESS_TOKEN_KEY) {
            Ok(token) => token.filter(|value| !value.trim().is_empty()),
            Err(err) => {
                error!(error = %format!("{err:#}"), "session: failed to load token");
                None
            }
        };
        let next = if token.is_some() {
            AuthState::SignedIn
        } else {
            AuthState::SignedOut
        };
        *self.access_token.write() = token;
        *self.state.write() = next;
        info!(state = ?next, "session: restored");
        next
    }

    pub fn begin_login(&self) -> Result<AuthorizationRequest> {
        let flow = self.flow.as_ref().ok_or(SessionError::NotConfigured)?;
        flow.begin()
    }

    /// Waits for the redirect and exchanges the code. On failure the state is untouched.
    pub fn complete_login(&self, authz: &AuthorizationRequest) -> Result<()> {
        let flow = self.flow.as_ref().ok_or(SessionError::NotConfigured)?;
        match flow.complete(authz) {
            Ok(grant) => self.accept_grant(grant),
            Err(err) => {
                error!(error = %format!("{err:#}"), "session: token exchange failed");
                Err(err)
            }
        }
    }

    /// Persists a fresh grant and moves to `SignedIn`.
    pub fn accept_grant(&self, grant: TokenGrant) -> Result<()> {
        self.store
            .set(ACCESS_TOKEN_KEY, &grant.access_token)
            .context("session: persist access token")?;
        if let Some(refresh) = grant.refresh_token.as_deref() {
            self.store
                .set(REFRESH_TOKEN_KEY, refresh)
                .context("session: persist refresh token")?;
        }
        *self.access_token.write() = Some(grant.access_token);
        *self.state.write() = AuthState::SignedIn;
        info!("session: signed in");
        Ok(())
    }

    pub fn sign_out(&self) -> Result<()> {
        let access = self.store.delete(ACCESS_TOKEN_KEY);
        let refresh = self.store.delete(REFRESH_TOKEN_KEY);
        if let Err(err) = access.and(refresh) {
            warn!(error = %format!("{err:#}"), "session: sign out failed");
            return Err(err);
        }
        *self.access_token.write() = None;
        *self.state.write() = AuthState::SignedOut;
        info!("session: signed out");
        Ok(())
    }
}

impl TokenProvider for Manager {
    fn token(&self) -> Result<OAuthToken> {
        let access_token = self.access_token().ok_or(SessionError::SignedOut)?;
        Ok(OAuthToken { access_token })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn manager(store: Arc<MemoryStore>) -> Manager {
        Manager::new(store, None)
    }

    #[test]
    fn starts_restoring_then_signed_out_without_token() {
        let session = manager(Arc::new(MemoryStore::new()));
        assert!(session.is_loading());
        assert_eq!(session.restore(), AuthState::SignedOut);
        assert!(!session.is_authenticated());
        assert!(session.token().is_err());
    }

    #[test]
    fn restores_stored_token() {
        let store = Arc::new(MemoryStore::new());
        store.set(ACCESS_TOKEN_KEY, "stored").unwrap();
        let session = manager(store);
        assert_eq!(session.restore(), AuthState::SignedIn);
        assert_eq!(session.token().unwrap().access_token, "stored");
    }

    #[test]
    fn grant_persists_both_tokens() {
        let store = Arc::new(MemoryStore::new());
        let session = manager(store.clone());
        session.restore();
        session
            .accept_grant(TokenGrant {
                access_token: "access".into(),
                refresh_token: Some("refresh".into()),
            })
            .unwrap();
        assert!(session.is_authenticated());
        assert_eq!(store.get(ACCESS_TOKEN_KEY).unwrap().as_deref(), Some("access"));
        assert_eq!(store.get(REFRESH_TOKEN_KEY).unwrap().as_deref(), Some("refresh"));
    }

    #[test]
    fn sign_out_deletes_tokens() {
        let store = Arc::new(MemoryStore::new());
        store.set(ACCESS_TOKEN_KEY, "a").unwrap();
        store.set(REFRESH_TOKEN_KEY, "r").unwrap();
        let session = manager(store.clone());
        session.restore();
        session.sign_out().unwrap();
        assert_eq!(session.state(), AuthState::SignedOut);
        assert!(store.get(ACCESS_TOKEN_KEY).unwrap().is_none());
        assert!(store.get(REFRESH_TOKEN_KEY).unwrap().is_none());
    }

    #[test]
    fn login_without_flow_is_not_configured() {
        let session = manager(Arc::new(MemoryStore::new()));
        session.restore();
        let Err(err) = session.begin_login() else {
            panic!("begin_login should fail without a client id");
        };
        assert!(err.downcast_ref::<SessionError>().is_some());
        assert_eq!(session.state(), AuthState::SignedOut);
    }
}
