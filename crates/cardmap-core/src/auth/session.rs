use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::api::ApiClient;
use crate::models::UserProfile;

use super::login::{Credentials, LoginError};
use super::store::TokenLifetime;
use super::TokenStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum AuthStatus {
    #[default]
    Unknown,
    Authenticated,
    Unauthenticated,
}

/// Cached interpretation of the stored credentials.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct SessionState {
    pub status: AuthStatus,
    /// A probe or an explicit set has happened at least once
    pub checked: bool,
    pub user: Option<UserProfile>,
}

impl SessionState {
    fn authenticated(user: Option<UserProfile>) -> Self {
        Self {
            status: AuthStatus::Authenticated,
            checked: true,
            user,
        }
    }

    fn unauthenticated() -> Self {
        Self {
            status: AuthStatus::Unauthenticated,
            checked: true,
            user: None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.status == AuthStatus::Authenticated
    }
}

/// Process-wide authentication status.
///
/// Clone is cheap; every clone observes and updates the same state.
#[derive(Clone)]
pub struct AuthSession {
    api: ApiClient,
    state: Arc<watch::Sender<SessionState>>,
}

impl AuthSession {
    pub fn new(api: ApiClient) -> Self {
        let (state, _) = watch::channel(SessionState::default());
        Self {
            api,
            state: Arc::new(state),
        }
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn tokens(&self) -> &dyn TokenStore {
        self.api.tokens()
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn user_id(&self) -> Option<String> {
        self.state.borrow().user.as_ref().map(|u| u.user_id.clone())
    }

    /// Whether this session is authenticated, probing the backend unless a
    /// previous check already said yes.
    pub async fn check_auth(&self) -> bool {
        {
            let state = self.state.borrow();
            if state.checked && state.is_authenticated() {
                return true;
            }
        }
        self.probe().await
    }

    /// Ask the backend who we are, ignoring any cached answer
    pub async fn probe(&self) -> bool {
        match self.api.me().await {
            Ok(user) => {
                debug!(user_id = %user.user_id, "Session probe succeeded");
                self.state.send_replace(SessionState::authenticated(Some(user)));
                true
            }
            Err(e) => {
                debug!(error = %e, "Session probe failed, clearing tokens");
                self.tokens().clear_all();
                self.state.send_replace(SessionState::unauthenticated());
                false
            }
        }
    }

    /// Overwrite the cached status without a network round-trip
    pub fn set_auth(&self, authenticated: bool) {
        let next = if authenticated {
            let user = self.state.borrow().user.clone();
            SessionState::authenticated(user)
        } else {
            SessionState::unauthenticated()
        };
        self.state.send_replace(next);
    }

    /// Validate, sign in, persist the tokens, and mark the session authenticated.
    pub async fn login(&self, credentials: &Credentials, remember_me: bool) -> Result<(), LoginError> {
        credentials.validate()?;

        let pair = self
            .api
            .login(&credentials.email, &credentials.password)
            .await?;
        TokenLifetime::for_remember_me(remember_me).persist(
            self.tokens(),
            &pair.access_token,
            &pair.refresh_token,
        );

        info!(remember_me, "Signed in");
        // New credentials; whoever was cached before is not this user
        self.state.send_replace(SessionState::authenticated(None));
        Ok(())
    }

    /// End the session locally, telling the backend when it can be reached
    pub async fn logout(&self) {
        if let Err(e) = self.api.logout().await {
            warn!(error = %e, "Logout request failed, clearing local session anyway");
        }
        self.tokens().clear_all();
        self.set_auth(false);
        info!("Signed out");
    }
}
