use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum_extra::extract::cookie::{Cookie, SameSite};
use parking_lot::RwLock;
use time::Duration;

/// Cookie name the access token is mirrored under.
pub const ACCESS_TOKEN_COOKIE: &str = "access_token";

/// Cookie-backed slot holding the current bearer token.
///
/// Behaves like a browser cookie store scoped to one origin: writes follow
/// `Set-Cookie` semantics (a zero max-age deletes), reads go through the
/// aggregate `name=value; ...` string. Presence of a token says nothing about
/// its validity.
#[derive(Clone, Default)]
pub struct CredentialSlot {
    jar: Arc<RwLock<BTreeMap<String, Cookie<'static>>>>,
    revision: Arc<AtomicU64>,
}

impl std::fmt::Debug for CredentialSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialSlot")
            .field("cookies", &self.jar.read().keys().collect::<Vec<_>>())
            .field("revision", &self.revision())
            .finish()
    }
}

impl CredentialSlot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rehydrate from an aggregate cookie string (`a=1; b=2`).
    /// Malformed pairs are skipped.
    #[must_use]
    pub fn from_cookie_string(cookies: &str) -> Self {
        let slot = Self::new();
        {
            let mut jar = slot.jar.write();
            for cookie in Cookie::split_parse(cookies.to_owned()).filter_map(Result::ok) {
                let cookie = cookie.into_owned();
                jar.insert(cookie.name().to_owned(), cookie);
            }
        }
        slot
    }

    /// Apply a `Set-Cookie`-style write.
    pub fn set(&self, cookie: Cookie<'static>) {
        let mut jar = self.jar.write();
        if cookie.max_age() == Some(Duration::ZERO) {
            jar.remove(cookie.name());
        } else {
            jar.insert(cookie.name().to_owned(), cookie);
        }
        self.revision.fetch_add(1, Ordering::SeqCst);
    }

    /// Mirror `token` with `path=/; samesite=strict; secure`.
    pub fn store(&self, token: &str) {
        self.set(access_token_cookie(token));
        tracing::debug!("access token mirrored");
    }

    /// Empty the slot (empty value, `max-age=0`).
    pub fn clear(&self) {
        self.set(clear_access_token_cookie());
        tracing::debug!("access token cleared");
    }

    /// The aggregate string a page script would see.
    #[must_use]
    pub fn document_cookie(&self) -> String {
        self.jar
            .read()
            .values()
            .map(|c| format!("{}={}", c.name(), c.value()))
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Current access token, parsed out of [`document_cookie`](Self::document_cookie).
    #[must_use]
    pub fn access_token(&self) -> Option<String> {
        Cookie::split_parse(self.document_cookie())
            .filter_map(Result::ok)
            .find(|c| c.name() == ACCESS_TOKEN_COOKIE)
            .map(|c| c.value().to_owned())
            .filter(|v| !v.is_empty())
    }

    #[must_use]
    pub fn has_access_token(&self) -> bool {
        self.access_token().is_some()
    }

    /// The stored access-token cookie with its attributes.
    #[must_use]
    pub fn access_token_cookie(&self) -> Option<Cookie<'static>> {
        self.jar.read().get(ACCESS_TOKEN_COOKIE).cloned()
    }

    /// Incremented on every write, including clears.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::SeqCst)
    }
}

fn access_token_cookie(token: &str) -> Cookie<'static> {
    Cookie::build((ACCESS_TOKEN_COOKIE, token.to_string()))
        .path("/")
        .same_site(SameSite::Strict)
        .secure(true)
        .build()
}

fn clear_access_token_cookie() -> Cookie<'static> {
    Cookie::build((ACCESS_TOKEN_COOKIE, ""))
        .path("/")
        .max_age(Duration::ZERO)
        .build()
}
