use std::sync::Arc;

use tokio::sync::watch;

use super::slot::CredentialSlot;
use super::traits::{IdentityProvider, LoginOptions, TokenOptions};
use crate::error::Error;
use crate::types::UserProfile;

/// Snapshot of the authentication state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub is_loading: bool,
    pub is_authenticated: bool,
    pub user: Option<UserProfile>,
}

impl Session {
    /// Provider still rehydrating; nothing is known yet.
    #[must_use]
    pub fn loading() -> Self {
        Self {
            is_loading: true,
            is_authenticated: false,
            user: None,
        }
    }

    #[must_use]
    pub fn authenticated(user: UserProfile) -> Self {
        Self {
            is_loading: false,
            is_authenticated: true,
            user: Some(user),
        }
    }

    #[must_use]
    pub fn anonymous() -> Self {
        Self {
            is_loading: false,
            is_authenticated: false,
            user: None,
        }
    }
}

/// Holds the session and fronts the identity provider.
///
/// The only writer of [`Session`]. Everything else reads snapshots or
/// subscribes to changes.
pub struct SessionStore<P> {
    provider: Arc<P>,
    state: Arc<watch::Sender<Session>>,
}

// Manual Clone: avoid derive adding a `P: Clone` bound.
impl<P> Clone for SessionStore<P> {
    fn clone(&self) -> Self {
        Self {
            provider: self.provider.clone(),
            state: self.state.clone(),
        }
    }
}

impl<P: IdentityProvider> SessionStore<P> {
    /// Start in the loading state.
    #[must_use]
    pub fn new(provider: P) -> Self {
        Self::from_arc(Arc::new(provider))
    }

    #[must_use]
    pub fn from_arc(provider: Arc<P>) -> Self {
        let (tx, _rx) = watch::channel(Session::loading());
        Self {
            provider,
            state: Arc::new(tx),
        }
    }

    #[must_use]
    pub fn provider(&self) -> &Arc<P> {
        &self.provider
    }

    /// Current snapshot.
    #[must_use]
    pub fn session(&self) -> Session {
        self.state.borrow().clone()
    }

    /// Receiver that sees every subsequent change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.state.subscribe()
    }

    /// Finish loading with the rehydrated user, if any.
    pub fn resolve(&self, user: Option<UserProfile>) {
        let next = match user {
            Some(user) => Session::authenticated(user),
            None => Session::anonymous(),
        };
        tracing::debug!(authenticated = next.is_authenticated, "session resolved");
        self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
    }

    /// Start the interactive login flow. Failures are logged, not returned.
    pub async fn login(&self, options: LoginOptions) {
        if let Err(e) = self.provider.login(options).await {
            tracing::error!(error = %e, "login redirect failed");
        }
    }

    /// End the session: mark it signed out, clear the credential slot,
    /// then hand over to the provider's logout.
    pub async fn logout(&self, slot: &CredentialSlot) {
        self.resolve(None);
        slot.clear();
        if let Err(e) = self.provider.logout().await {
            tracing::warn!(error = %e, "provider logout failed");
        }
    }

    /// # Errors
    ///
    /// Returns [`Error::Auth`] when silent renewal is impossible.
    pub async fn get_token_silently(&self, options: TokenOptions) -> Result<String, Error> {
        self.provider.get_token_silently(options).await
    }
}
