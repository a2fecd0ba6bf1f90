//! Wires configuration, session, data access and search together.

use std::sync::Arc;

use crate::api::ApiClient;
use crate::config::{AuthFlow, ClientConfig};
use crate::error::Error;
use crate::search::SuggestionSearch;
use crate::session::{
    CredentialSlot, IdentityProvider, LoginOptions, MirrorHandle, Navigator, RouteGuard,
    SessionStore, TokenMirror, TokenOptions,
};
use crate::tasks::TaskService;

/// Stand-in provider when no identity settings are configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProvider;

impl IdentityProvider for NoProvider {
    async fn login(&self, _options: LoginOptions) -> Result<(), Error> {
        tracing::debug!("login requested without an identity provider");
        Ok(())
    }

    async fn logout(&self) -> Result<(), Error> {
        Ok(())
    }

    async fn get_token_silently(&self, _options: TokenOptions) -> Result<String, Error> {
        Err(Error::Auth("no identity provider configured".into()))
    }
}

/// Everything a page needs: session, credential slot, tasks and search.
pub struct TodoClient<P> {
    config: ClientConfig,
    anonymous: bool,
    store: SessionStore<P>,
    slot: CredentialSlot,
    tasks: TaskService,
    search: SuggestionSearch,
    mirror: Option<MirrorHandle>,
}

impl<P: IdentityProvider> TodoClient<P> {
    /// Assemble a client for `config`.
    ///
    /// Returns `None` when identity settings are missing and the fallback is
    /// strict: the authenticated flow is disabled and nothing should render.
    /// With the anonymous fallback the session resolves signed-out and
    /// protected views are not gated.
    #[must_use]
    pub fn bootstrap(
        config: ClientConfig,
        provider: P,
        navigator: Arc<dyn Navigator>,
        slot: CredentialSlot,
    ) -> Option<Self> {
        let anonymous = match config.auth_flow() {
            AuthFlow::Enabled(_) => false,
            AuthFlow::Anonymous => true,
            AuthFlow::Disabled => {
                tracing::warn!("identity settings missing, authenticated flow disabled");
                return None;
            }
        };

        let store = SessionStore::new(provider);
        if anonymous {
            tracing::info!("identity settings missing, running anonymously");
            store.resolve(None);
        }

        let api = ApiClient::new(config.api_base_url.clone(), slot.clone()).with_expiry_recovery(
            &store,
            navigator.clone(),
            config.expiry_policy,
        );
        let search = SuggestionSearch::new(api.clone(), navigator)
            .with_debounce(config.search_debounce);

        Some(Self {
            anonymous,
            store,
            slot,
            tasks: TaskService::new(api),
            search,
            mirror: None,
            config,
        })
    }

    /// Start mirroring tokens into the credential slot. Must run inside a
    /// Tokio runtime. A second call replaces the running mirror.
    pub fn start(&mut self) {
        if self.anonymous {
            return;
        }
        let mirror = TokenMirror::new(self.store.clone(), self.slot.clone())
            .with_interval(self.config.refresh_interval)
            .spawn();
        self.mirror = Some(mirror);
    }

    /// Stop mirroring; pending refreshes are cancelled.
    pub fn stop(&mut self) {
        self.mirror.take();
    }

    /// Guard for a protected path, or `None` when running anonymously.
    #[must_use]
    pub fn guard(&self, path: &str) -> Option<RouteGuard> {
        (!self.anonymous).then(|| RouteGuard::new(path, self.config.credential_trust))
    }

    /// Clear the credential slot and sign out through the provider.
    pub async fn logout(&self) {
        self.store.logout(&self.slot).await;
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    #[must_use]
    pub fn session(&self) -> &SessionStore<P> {
        &self.store
    }

    #[must_use]
    pub fn slot(&self) -> &CredentialSlot {
        &self.slot
    }

    #[must_use]
    pub fn tasks(&self) -> &TaskService {
        &self.tasks
    }

    #[must_use]
    pub fn search(&self) -> &SuggestionSearch {
        &self.search
    }

    #[must_use]
    pub fn mirror(&self) -> Option<&MirrorHandle> {
        self.mirror.as_ref()
    }
}
