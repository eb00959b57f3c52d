use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::api::AuthApi;
use crate::models::Id;
use crate::store::SessionStore;

/// Where the authentication prompt stands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AuthState {
    Authenticated { user_id: Id },
    /// No stored user id: the blocking prompt is shown.
    Prompt,
    /// The user dismissed the prompt and continues without an identity.
    Anonymous,
    /// Validation was rejected or could not be performed; retry is manual.
    Failed { message: String },
}

/// Gate in front of the workspace: validates a token once and remembers
/// only the resolved user id.
pub struct AuthGate {
    auth: Arc<dyn AuthApi>,
    session: SessionStore,
    state: AuthState,
    last_token: Option<String>,
}

impl AuthGate {
    pub fn new(auth: Arc<dyn AuthApi>, session: SessionStore) -> Self {
        let state = match session.user_id() {
            Some(user_id) => AuthState::Authenticated { user_id },
            None => AuthState::Prompt,
        };
        Self { auth, session, state, last_token: None }
    }

    pub fn state(&self) -> &AuthState {
        &self.state
    }

    pub fn user_id(&self) -> Option<&str> {
        match &self.state {
            AuthState::Authenticated { user_id } => Some(user_id),
            _ => None,
        }
    }

    pub fn is_blocking(&self) -> bool {
        matches!(self.state, AuthState::Prompt | AuthState::Failed { .. })
    }

    pub async fn validate(&mut self, token: &str) -> &AuthState {
        // held in memory only, for a manual retry
        self.last_token = Some(token.to_string());
        self.state = match self.auth.validate_token(token).await {
            Ok(v) if v.success => match v.user_id {
                Some(user_id) => match self.session.set_user_id(&user_id) {
                    Ok(()) => {
                        info!(user = %user_id, "token validated");
                        AuthState::Authenticated { user_id }
                    }
                    Err(e) => {
                        // still usable for this session
                        warn!("could not persist user id: {e}");
                        AuthState::Authenticated { user_id }
                    }
                },
                None => AuthState::Failed { message: "validation returned no user".into() },
            },
            Ok(v) => AuthState::Failed { message: v.message.unwrap_or_else(|| "invalid token".into()) },
            Err(e) => {
                warn!("token validation failed: {e}");
                AuthState::Failed { message: e.to_string() }
            }
        };
        &self.state
    }

    /// Re-run validation with the last token.
    pub async fn retry(&mut self) -> &AuthState {
        match self.last_token.clone() {
            Some(token) => self.validate(&token).await,
            None => {
                self.state = AuthState::Prompt;
                &self.state
            }
        }
    }

    /// Continue without validating.
    pub fn dismiss(&mut self) {
        if self.is_blocking() {
            self.state = AuthState::Anonymous;
        }
    }

    pub fn logout(&mut self) {
        if let Err(e) = self.session.clear() {
            warn!("could not clear session: {e}");
        }
        self.last_token = None;
        self.state = AuthState::Prompt;
    }
}

#[cfg(all(test, feature = "inmem-backend"))]
mod tests {
    use super::*;
    use crate::api::inmem::InMemBackend;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn only_user_id_is_persisted() {
        let backend = InMemBackend::new();
        backend.register_token("tok-1", "u1");
        let store = Arc::new(MemoryStore::new());
        let mut gate = AuthGate::new(Arc::new(backend), SessionStore::new(store.clone()));
        assert_eq!(gate.state(), &AuthState::Prompt);

        gate.validate("tok-1").await;
        assert_eq!(gate.user_id(), Some("u1"));

        use crate::store::LocalStore;
        assert_eq!(store.get("user_id").unwrap().as_deref(), Some("u1"));
        assert!(store.get("token").unwrap().is_none());
    }

    #[tokio::test]
    async fn rejected_token_can_be_dismissed() {
        let backend = InMemBackend::new();
        let mut gate = AuthGate::new(Arc::new(backend.clone()), SessionStore::new(Arc::new(MemoryStore::new())));
        assert!(matches!(gate.validate("bad").await, AuthState::Failed { .. }));

        backend.register_token("bad", "u9");
        assert_eq!(gate.retry().await, &AuthState::Authenticated { user_id: "u9".into() });

        gate.logout();
        gate.dismiss();
        assert_eq!(gate.state(), &AuthState::Anonymous);
        assert!(!gate.is_blocking());
    }
}
