//! Client-side session lifecycle.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use todo_session::session::{CredentialSlot, RouteGuard, SessionStore, TokenMirror, TASKS_PATH};
//!
//! // 1. Implement IdentityProvider for your login integration
//! let store = SessionStore::new(provider);
//! let slot = CredentialSlot::new();
//!
//! // 2. Keep the credential slot fed while the session is authenticated
//! let mirror = TokenMirror::new(store.clone(), slot.clone()).spawn();
//!
//! // 3. Gate protected views
//! let mut guard = RouteGuard::new(TASKS_PATH, config.credential_trust());
//! let view = guard.check(&store, &slot).await;
//! ```

mod guard;
mod mirror;
mod slot;
mod state;
mod traits;

pub use guard::{
    CredentialTrust, GuardDecision, GuardInput, GuardOutcome, GuardView, RouteGuard, TASKS_PATH,
    decide, landing_redirect, post_login_target,
};
pub use mirror::{
    DEFAULT_REFRESH_INTERVAL, MirrorAction, MirrorEvent, MirrorHandle, MirrorState, TokenMirror,
};
pub use slot::{ACCESS_TOKEN_COOKIE, CredentialSlot};
pub use state::{Session, SessionStore};
pub use traits::{IdentityProvider, LoginOptions, Navigator, TokenOptions};

pub(crate) use traits::IdentityProviderDyn;
