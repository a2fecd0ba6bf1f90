//! Hosted identity provider: authorization code + PKCE login, silent renewal
//! through the refresh-token grant.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Deserialize;
use tokio::time::Instant;
use url::Url;

use crate::config::IdentityConfig;
use crate::error::Error;
use crate::pkce::{self, Pkce};
use crate::session::{IdentityProvider, LoginOptions, Navigator, TokenOptions, post_login_target};
use crate::types::UserProfile;

/// Renew this long before the provider-reported expiry.
const EXPIRY_SKEW: Duration = Duration::from_secs(60);

/// Authorization URL plus what the callback needs to finish the flow.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct AuthorizationRequest {
    pub url: Url,
    pub state: String,
    pub code_verifier: String,
    pub return_to: Option<String>,
}

/// Token response from the provider's token endpoint.
#[derive(Debug, Clone, Deserialize)]
#[non_exhaustive]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Clone)]
struct TokenSet {
    access_token: String,
    refresh_token: Option<String>,
    expires_at: Option<Instant>,
}

impl TokenSet {
    fn is_fresh(&self, now: Instant) -> bool {
        self.expires_at
            .is_none_or(|at| now + EXPIRY_SKEW < at)
    }
}

/// Identity provider backed by a hosted OAuth2 tenant.
pub struct HostedProvider {
    config: IdentityConfig,
    issuer: Url,
    http: reqwest::Client,
    navigator: Arc<dyn Navigator>,
    tokens: Mutex<Option<TokenSet>>,
    pending: Mutex<Option<AuthorizationRequest>>,
}

impl HostedProvider {
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configured domain is not a valid host.
    pub fn new(config: IdentityConfig, navigator: Arc<dyn Navigator>) -> Result<Self, Error> {
        let issuer = config.issuer()?;
        Ok(Self {
            config,
            issuer,
            http: reqwest::Client::new(),
            navigator,
            tokens: Mutex::new(None),
            pending: Mutex::new(None),
        })
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    /// Build an authorization URL with fresh PKCE parameters.
    #[must_use]
    pub fn authorization_url(&self, return_to: Option<String>) -> AuthorizationRequest {
        let state = pkce::generate_state();
        let pkce = Pkce::generate();
        let scope = self.config.scopes.join(" ");

        let mut url = self.endpoint("authorize");
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", self.config.redirect_uri.as_str())
            .append_pair("audience", &self.config.audience)
            .append_pair("scope", &scope)
            .append_pair("state", &state)
            .append_pair("code_challenge", &pkce.challenge)
            .append_pair("code_challenge_method", "S256");

        AuthorizationRequest {
            url,
            state,
            code_verifier: pkce.verifier,
            return_to,
        }
    }

    /// Finish the login round-trip started by [`IdentityProvider::login`].
    ///
    /// Returns the path to navigate to next.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Auth`] if no login is pending or `state` does not
    /// match, [`Error::Http`] on network failure, or [`Error::Transport`] if
    /// the token endpoint rejects the code.
    pub async fn complete_login(&self, code: &str, state: &str) -> Result<String, Error> {
        let pending = self
            .pending
            .lock()
            .take()
            .ok_or_else(|| Error::Auth("no login in progress".into()))?;

        if pending.state != state {
            tracing::warn!("OAuth state mismatch");
            return Err(Error::Auth("state_mismatch".into()));
        }

        let tokens = self.exchange_code(code, &pending.code_verifier).await?;
        self.store_tokens(tokens, None);
        tracing::info!("login completed");

        Ok(post_login_target(pending.return_to.as_deref()).to_string())
    }

    /// Fetch the signed-in user's profile.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] on network failure, or [`Error::Transport`] if
    /// the userinfo endpoint returns an error.
    pub async fn user_info(&self, access_token: &str) -> Result<UserProfile, Error> {
        let response = self
            .http
            .get(self.endpoint("userinfo"))
            .bearer_auth(access_token)
            .send()
            .await?;

        let response = Self::ensure_success(response, "userinfo request").await?;
        response.json::<UserProfile>().await.map_err(Into::into)
    }

    /// Whether a grant exists that silent renewal could use.
    #[must_use]
    pub fn has_session(&self) -> bool {
        self.tokens.lock().is_some()
    }

    async fn exchange_code(&self, code: &str, code_verifier: &str) -> Result<TokenResponse, Error> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("client_id", self.config.client_id.as_str()),
            ("code_verifier", code_verifier),
        ];
        self.token_request(&params, "token exchange").await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, Error> {
        let params = [
            ("grant_type", "refresh_token"),
            ("client_id", self.config.client_id.as_str()),
            ("refresh_token", refresh_token),
        ];
        self.token_request(&params, "token refresh").await
    }

    async fn token_request(
        &self,
        params: &[(&str, &str)],
        operation: &'static str,
    ) -> Result<TokenResponse, Error> {
        let response = self
            .http
            .post(self.endpoint("oauth/token"))
            .form(params)
            .send()
            .await?;

        let response = Self::ensure_success(response, operation).await?;
        response.json::<TokenResponse>().await.map_err(Into::into)
    }

    fn store_tokens(&self, response: TokenResponse, previous_refresh: Option<String>) -> String {
        let access_token = response.access_token.clone();
        *self.tokens.lock() = Some(TokenSet {
            access_token: response.access_token,
            refresh_token: response.refresh_token.or(previous_refresh),
            expires_at: response
                .expires_in
                .map(|secs| Instant::now() + Duration::from_secs(secs)),
        });
        access_token
    }

    fn endpoint(&self, path: &str) -> Url {
        let mut url = self.issuer.clone();
        url.set_path(path);
        url
    }

    /// Checks HTTP response status; returns the response on success or an error with details.
    async fn ensure_success(
        response: reqwest::Response,
        operation: &'static str,
    ) -> Result<reqwest::Response, Error> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let detail = response.text().await.unwrap_or_default();
        Err(Error::Transport {
            operation,
            status,
            detail,
        })
    }
}

impl IdentityProvider for HostedProvider {
    async fn login(&self, options: LoginOptions) -> Result<(), Error> {
        let request = self.authorization_url(options.return_to);
        let url = request.url.clone();
        *self.pending.lock() = Some(request);
        self.navigator.redirect(&url);
        Ok(())
    }

    async fn logout(&self) -> Result<(), Error> {
        self.tokens.lock().take();
        let mut url = self.endpoint("v2/logout");
        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("returnTo", self.config.redirect_uri.as_str());
        self.navigator.redirect(&url);
        Ok(())
    }

    async fn get_token_silently(&self, options: TokenOptions) -> Result<String, Error> {
        let cached = self.tokens.lock().clone();
        let Some(cached) = cached else {
            return Err(Error::Auth("login_required".into()));
        };

        if !options.force_refresh && cached.is_fresh(Instant::now()) {
            return Ok(cached.access_token);
        }

        let Some(refresh_token) = cached.refresh_token else {
            return Err(Error::Auth("missing_refresh_token".into()));
        };

        let response = self.refresh(&refresh_token).await.map_err(|e| {
            tracing::warn!(error = %e, "silent renewal failed");
            Error::Auth(format!("silent renewal failed: {e}"))
        })?;
        tracing::debug!("access token renewed");
        Ok(self.store_tokens(response, Some(refresh_token)))
    }
}
