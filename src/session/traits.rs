use std::future::Future;
use std::pin::Pin;

use url::Url;

use crate::error::Error;

/// Options for [`IdentityProvider::get_token_silently`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TokenOptions {
    /// Skip any cached token and renew against the provider.
    pub force_refresh: bool,
}

impl TokenOptions {
    #[must_use]
    pub fn force_refresh() -> Self {
        Self {
            force_refresh: true,
        }
    }
}

/// Options for [`IdentityProvider::login`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LoginOptions {
    /// Path to land on after the login round-trip. Defaults to the task list.
    pub return_to: Option<String>,
}

impl LoginOptions {
    #[must_use]
    pub fn returning_to(path: impl Into<String>) -> Self {
        Self {
            return_to: Some(path.into()),
        }
    }
}

/// Consumer-provided identity provider.
///
/// The provider owns the interactive login flow and the long-lived grant;
/// this crate only asks it for access tokens.
///
/// # Example
///
/// ```rust,ignore
/// impl IdentityProvider for MyProvider {
///     async fn login(&self, options: LoginOptions) -> Result<(), Error> {
///         self.navigator.redirect(&self.authorize_url(options.return_to)?);
///         Ok(())
///     }
///
///     async fn logout(&self) -> Result<(), Error> {
///         self.tokens.clear();
///         Ok(())
///     }
///
///     async fn get_token_silently(&self, options: TokenOptions) -> Result<String, Error> {
///         self.refresh_if_needed(options.force_refresh).await
///     }
/// }
/// ```
pub trait IdentityProvider: Send + Sync + 'static {
    /// Send the browsing context to the external login flow.
    fn login(&self, options: LoginOptions) -> impl Future<Output = Result<(), Error>> + Send;

    /// Drop the local session and send the browsing context to the provider's logout.
    fn logout(&self) -> impl Future<Output = Result<(), Error>> + Send;

    /// Return a valid access token, renewing it without user interaction if needed.
    ///
    /// Fails with [`Error::Auth`] when only an interactive login can help.
    fn get_token_silently(
        &self,
        options: TokenOptions,
    ) -> impl Future<Output = Result<String, Error>> + Send;
}

/// The browsing context: whatever can be sent somewhere else.
pub trait Navigator: Send + Sync + 'static {
    /// Replace the current location.
    fn redirect(&self, url: &Url);

    /// Reload the current location, discarding in-memory state.
    fn reload(&self);

    /// Open a location in a new context, leaving the current one in place.
    fn open(&self, url: &Url);

    /// Path of the current location, captured as the post-login return path.
    fn location(&self) -> Option<String> {
        None
    }
}

pub(crate) type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Object-safe wrapper for `IdentityProvider` (needed for `Arc<dyn>`).
pub(crate) trait IdentityProviderDyn: Send + Sync {
    fn login_dyn(&self, options: LoginOptions) -> BoxFuture<'_, Result<(), Error>>;

    fn get_token_silently_dyn(&self, options: TokenOptions) -> BoxFuture<'_, Result<String, Error>>;
}

impl<T: IdentityProvider> IdentityProviderDyn for T {
    fn login_dyn(&self, options: LoginOptions) -> BoxFuture<'_, Result<(), Error>> {
        Box::pin(self.login(options))
    }

    fn get_token_silently_dyn(&self, options: TokenOptions) -> BoxFuture<'_, Result<String, Error>> {
        Box::pin(self.get_token_silently(options))
    }
}
