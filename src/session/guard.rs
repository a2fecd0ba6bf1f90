//! Route Guard: decides what a protected view renders for a given session
//! and credential state, and when to start the login flow.

use super::slot::CredentialSlot;
use super::state::{Session, SessionStore};
use super::traits::{IdentityProvider, LoginOptions};

/// Protected task list path; also the default post-login target.
pub const TASKS_PATH: &str = "/todos";

/// How far a mirrored credential is trusted before the session store confirms it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CredentialTrust {
    /// A present credential grants access while the store is loading or
    /// unauthenticated. A stale one is caught later by a 403.
    #[default]
    Provisional,
    /// Only a confirmed authenticated session grants access.
    Strict,
}

/// Inputs the decision depends on; also the change-detection key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GuardInput {
    pub is_loading: bool,
    pub is_authenticated: bool,
    pub has_credential: bool,
}

impl GuardInput {
    #[must_use]
    pub fn new(session: &Session, slot: &CredentialSlot) -> Self {
        Self {
            is_loading: session.is_loading,
            is_authenticated: session.is_authenticated,
            has_credential: slot.has_access_token(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardView {
    Children,
    Loading,
    Nothing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    Render(GuardView),
    /// Render nothing and send the visitor to login.
    RequireLogin,
}

impl GuardDecision {
    #[must_use]
    pub fn view(self) -> GuardView {
        match self {
            Self::Render(view) => view,
            Self::RequireLogin => GuardView::Nothing,
        }
    }
}

/// Pure decision table.
#[must_use]
pub fn decide(input: GuardInput, trust: CredentialTrust) -> GuardDecision {
    let GuardInput {
        is_loading,
        is_authenticated,
        has_credential,
    } = input;

    match trust {
        CredentialTrust::Provisional => match (is_loading, is_authenticated, has_credential) {
            (true, _, true) => GuardDecision::Render(GuardView::Children),
            (true, _, false) => GuardDecision::Render(GuardView::Loading),
            (false, true, _) | (false, false, true) => GuardDecision::Render(GuardView::Children),
            (false, false, false) => GuardDecision::RequireLogin,
        },
        CredentialTrust::Strict => match (is_loading, is_authenticated) {
            (true, _) => GuardDecision::Render(GuardView::Loading),
            (false, true) => GuardDecision::Render(GuardView::Children),
            (false, false) => GuardDecision::RequireLogin,
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardOutcome {
    pub view: GuardView,
    /// Start the login flow now. True at most once per entry into
    /// [`GuardDecision::RequireLogin`].
    pub fire_login: bool,
}

/// Guard for one protected path, evaluated on every render.
#[derive(Debug, Clone)]
pub struct RouteGuard {
    path: String,
    trust: CredentialTrust,
    last: Option<(GuardInput, bool)>,
}

impl RouteGuard {
    #[must_use]
    pub fn new(path: impl Into<String>, trust: CredentialTrust) -> Self {
        Self {
            path: path.into(),
            trust,
            last: None,
        }
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Decide for `input`; the login side effect fires only when the key
    /// changed and the previous evaluation did not already require login.
    pub fn evaluate(&mut self, input: GuardInput) -> GuardOutcome {
        let decision = decide(input, self.trust);
        let requires_login = decision == GuardDecision::RequireLogin;

        let fire_login = requires_login
            && match self.last {
                Some((key, was_required)) => key != input && !was_required,
                None => true,
            };

        self.last = Some((input, requires_login));
        GuardOutcome {
            view: decision.view(),
            fire_login,
        }
    }

    /// Evaluate against live state and run the login side effect if due.
    pub async fn check<P: IdentityProvider>(
        &mut self,
        store: &SessionStore<P>,
        slot: &CredentialSlot,
    ) -> GuardView {
        let outcome = self.evaluate(GuardInput::new(&store.session(), slot));
        if outcome.fire_login {
            tracing::info!(path = %self.path, "unauthenticated visit, redirecting to login");
            store.login(LoginOptions::returning_to(self.path.clone())).await;
        }
        outcome.view
    }
}

/// Where the public landing page should forward to, if anywhere.
#[must_use]
pub fn landing_redirect(session: &Session, slot: &CredentialSlot) -> Option<&'static str> {
    let signed_in = !session.is_loading && session.is_authenticated;
    (signed_in || slot.has_access_token()).then_some(TASKS_PATH)
}

/// Post-login destination: the captured return path, else the task list.
#[must_use]
pub fn post_login_target(return_to: Option<&str>) -> &str {
    return_to.filter(|p| !p.is_empty()).unwrap_or(TASKS_PATH)
}
