use std::time::Duration;

use url::Url;

use crate::api::{ExpiryPolicy, with_trailing_slash};
use crate::error::Error;
use crate::logging::LogLevel;
use crate::search::DEFAULT_DEBOUNCE;
use crate::session::{CredentialTrust, DEFAULT_REFRESH_INTERVAL};

const DEFAULT_API_BASE_URL: &str = "http://localhost:8000/api/";
const DEFAULT_REDIRECT_URI: &str = "http://localhost:5173/";

/// Identity provider settings. Only present when domain, client ID and
/// audience are all configured.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct IdentityConfig {
    pub(crate) domain: String,
    pub(crate) client_id: String,
    pub(crate) audience: String,
    pub(crate) redirect_uri: Url,
    pub(crate) scopes: Vec<String>,
}

impl IdentityConfig {
    #[must_use]
    pub fn new(
        domain: impl Into<String>,
        client_id: impl Into<String>,
        audience: impl Into<String>,
        redirect_uri: Url,
    ) -> Self {
        Self {
            domain: domain.into(),
            client_id: client_id.into(),
            audience: audience.into(),
            redirect_uri,
            scopes: vec!["openid".into(), "profile".into(), "offline_access".into()],
        }
    }

    /// Override the requested scopes (default: `openid profile offline_access`).
    #[must_use]
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    #[must_use]
    pub fn domain(&self) -> &str {
        &self.domain
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    #[must_use]
    pub fn audience(&self) -> &str {
        &self.audience
    }

    /// Where the identity provider sends the browser after login and logout.
    #[must_use]
    pub fn redirect_uri(&self) -> &Url {
        &self.redirect_uri
    }

    #[must_use]
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    /// Base URL of the identity provider tenant.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the domain does not form a valid URL.
    pub fn issuer(&self) -> Result<Url, Error> {
        let raw = if self.domain.starts_with("http://") || self.domain.starts_with("https://") {
            format!("{}/", self.domain.trim_end_matches('/'))
        } else {
            format!("https://{}/", self.domain.trim_end_matches('/'))
        };
        raw.parse()
            .map_err(|e| Error::Config(format!("AUTH_DOMAIN: {e}")))
    }
}

/// What to do when identity settings are missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthFallback {
    /// Render nothing.
    #[default]
    Strict,
    /// Run without a signed-in user.
    Anonymous,
}

/// Outcome of [`ClientConfig::auth_flow`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFlow<'a> {
    Enabled(&'a IdentityConfig),
    Disabled,
    Anonymous,
}

/// Client configuration.
///
/// Use [`from_env()`](ClientConfig::from_env) for convention-based setup,
/// or [`new()`](ClientConfig::new) with `with_*` methods for full control.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub(crate) api_base_url: Url,
    pub(crate) identity: Option<IdentityConfig>,
    pub(crate) fallback: AuthFallback,
    pub(crate) log_level: LogLevel,
    pub(crate) credential_trust: CredentialTrust,
    pub(crate) expiry_policy: ExpiryPolicy,
    pub(crate) refresh_interval: Duration,
    pub(crate) search_debounce: Duration,
}

impl ClientConfig {
    #[must_use]
    pub fn new(api_base_url: Url) -> Self {
        Self {
            api_base_url: with_trailing_slash(api_base_url),
            identity: None,
            fallback: AuthFallback::default(),
            log_level: LogLevel::default(),
            credential_trust: CredentialTrust::default(),
            expiry_policy: ExpiryPolicy::default(),
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            search_debounce: DEFAULT_DEBOUNCE,
        }
    }

    /// Create config from environment variables.
    ///
    /// # Identity env vars (all three required to enable login)
    /// - `AUTH_DOMAIN`
    /// - `AUTH_CLIENT_ID`
    /// - `AUTH_AUDIENCE`
    ///
    /// # Optional env vars
    /// - `API_BASE_URL`: REST base (default `http://localhost:8000/api/`)
    /// - `AUTH_REDIRECT_URI`: application origin (default `http://localhost:5173/`)
    /// - `AUTH_FALLBACK`: `strict` or `anonymous`
    /// - `GUARD_TRUST`: `provisional` or `strict`
    /// - `EXPIRY_POLICY`: `reload` (default) or `refresh`
    /// - `LOG_LEVEL`: `debug`, `info`, `warn`, `error`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a URL is invalid or an enum value is unknown.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a URL is invalid or an enum value is unknown.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let base: Url = var("API_BASE_URL")
            .as_deref()
            .unwrap_or(DEFAULT_API_BASE_URL)
            .parse()
            .map_err(|e| Error::Config(format!("API_BASE_URL: {e}")))?;

        let mut config = Self::new(base);

        if let (Some(domain), Some(client_id), Some(audience)) = (
            var("AUTH_DOMAIN"),
            var("AUTH_CLIENT_ID"),
            var("AUTH_AUDIENCE"),
        ) {
            let redirect_uri: Url = var("AUTH_REDIRECT_URI")
                .as_deref()
                .unwrap_or(DEFAULT_REDIRECT_URI)
                .parse()
                .map_err(|e| Error::Config(format!("AUTH_REDIRECT_URI: {e}")))?;
            config = config.with_identity(IdentityConfig::new(
                domain,
                client_id,
                audience,
                redirect_uri,
            ));
        }

        if let Some(fallback) = var("AUTH_FALLBACK") {
            let fallback = match fallback.to_ascii_lowercase().as_str() {
                "strict" => AuthFallback::Strict,
                "anonymous" => AuthFallback::Anonymous,
                other => return Err(Error::Config(format!("AUTH_FALLBACK: unknown '{other}'"))),
            };
            config = config.with_fallback(fallback);
        }

        if let Some(trust) = var("GUARD_TRUST") {
            let trust = match trust.to_ascii_lowercase().as_str() {
                "provisional" => CredentialTrust::Provisional,
                "strict" => CredentialTrust::Strict,
                other => return Err(Error::Config(format!("GUARD_TRUST: unknown '{other}'"))),
            };
            config = config.with_credential_trust(trust);
        }

        if let Some(policy) = var("EXPIRY_POLICY") {
            let policy = match policy.to_ascii_lowercase().as_str() {
                "reload" => ExpiryPolicy::Reload,
                "refresh" => ExpiryPolicy::RefreshAndRetry,
                other => return Err(Error::Config(format!("EXPIRY_POLICY: unknown '{other}'"))),
            };
            config = config.with_expiry_policy(policy);
        }

        if let Some(level) = var("LOG_LEVEL") {
            config = config.with_log_level(LogLevel::parse_lenient(&level));
        }

        Ok(config)
    }

    #[must_use]
    pub fn with_identity(mut self, identity: IdentityConfig) -> Self {
        self.identity = Some(identity);
        self
    }

    #[must_use]
    pub fn with_fallback(mut self, fallback: AuthFallback) -> Self {
        self.fallback = fallback;
        self
    }

    #[must_use]
    pub fn with_log_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }

    #[must_use]
    pub fn with_credential_trust(mut self, trust: CredentialTrust) -> Self {
        self.credential_trust = trust;
        self
    }

    #[must_use]
    pub fn with_expiry_policy(mut self, policy: ExpiryPolicy) -> Self {
        self.expiry_policy = policy;
        self
    }

    #[must_use]
    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    #[must_use]
    pub fn with_search_debounce(mut self, delay: Duration) -> Self {
        self.search_debounce = delay;
        self
    }

    #[must_use]
    pub fn api_base_url(&self) -> &Url {
        &self.api_base_url
    }

    #[must_use]
    pub fn identity(&self) -> Option<&IdentityConfig> {
        self.identity.as_ref()
    }

    #[must_use]
    pub fn log_level(&self) -> LogLevel {
        self.log_level
    }

    #[must_use]
    pub fn credential_trust(&self) -> CredentialTrust {
        self.credential_trust
    }

    #[must_use]
    pub fn expiry_policy(&self) -> ExpiryPolicy {
        self.expiry_policy
    }

    #[must_use]
    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    #[must_use]
    pub fn search_debounce(&self) -> Duration {
        self.search_debounce
    }

    /// Whether the login integration is active, and if not, how to degrade.
    #[must_use]
    pub fn auth_flow(&self) -> AuthFlow<'_> {
        match (&self.identity, self.fallback) {
            (Some(identity), _) => AuthFlow::Enabled(identity),
            (None, AuthFallback::Strict) => AuthFlow::Disabled,
            (None, AuthFallback::Anonymous) => AuthFlow::Anonymous,
        }
    }
}
