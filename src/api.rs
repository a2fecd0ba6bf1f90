//! Data Access Layer: REST calls for task resources with the mirrored
//! credential attached, and recovery from credential expiry.

use std::sync::Arc;

use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use url::Url;

use crate::error::Error;
use crate::session::{
    CredentialSlot, IdentityProvider, IdentityProviderDyn, LoginOptions, Navigator, SessionStore,
    TokenOptions,
};
use crate::types::{NewTask, Task, TaskId, TaskPatch, TaskType};

/// What to do when the server rejects the attached credential with 403.
///
/// Either way the credential slot is cleared exactly once per originating
/// request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExpiryPolicy {
    /// Reload the page context so the mirror starts over, and fail the call.
    #[default]
    Reload,
    /// Force a silent refresh and reissue the request once with the new
    /// token. The slot is rewritten only if the server accepts it; a failed
    /// refresh or a second rejection escalates to interactive login.
    RefreshAndRetry,
}

#[derive(Clone)]
struct Recovery {
    provider: Arc<dyn IdentityProviderDyn>,
    navigator: Arc<dyn Navigator>,
}

impl Recovery {
    /// Interactive login, returning to wherever the rejected call came from.
    async fn escalate(&self) {
        let options = LoginOptions {
            return_to: self.navigator.location(),
        };
        tracing::warn!(return_to = ?options.return_to, "credential could not be renewed, redirecting to login");
        if let Err(e) = self.provider.login_dyn(options).await {
            tracing::error!(error = %e, "login redirect failed");
        }
    }
}

/// A request that can be sent again verbatim.
#[derive(Debug, Clone)]
struct ApiRequest {
    method: Method,
    path: String,
    query: Vec<(&'static str, String)>,
    body: Option<serde_json::Value>,
}

impl ApiRequest {
    fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    fn query(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.query.push((key, value.into()));
        self
    }

    fn json<T: serde::Serialize>(mut self, body: &T) -> Result<Self, Error> {
        let value = serde_json::to_value(body)
            .map_err(|e| Error::Validation(format!("unserializable payload: {e}")))?;
        self.body = Some(value);
        Ok(self)
    }
}

#[derive(Deserialize)]
struct SuggestionsResponse {
    #[serde(default)]
    suggestions: Vec<String>,
}

/// REST client bound to a fixed base address and a credential slot.
#[derive(Clone)]
pub struct ApiClient {
    base: Url,
    http: reqwest::Client,
    slot: CredentialSlot,
    policy: ExpiryPolicy,
    recovery: Option<Recovery>,
}

impl ApiClient {
    #[must_use]
    pub fn new(base: Url, slot: CredentialSlot) -> Self {
        Self {
            base: with_trailing_slash(base),
            http: reqwest::Client::new(),
            slot,
            policy: ExpiryPolicy::default(),
            recovery: None,
        }
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    /// Enable 403 recovery through the session's provider and the browsing context.
    ///
    /// Without this, a 403 only clears the slot and fails the call.
    #[must_use]
    pub fn with_expiry_recovery<P: IdentityProvider>(
        mut self,
        store: &SessionStore<P>,
        navigator: Arc<dyn Navigator>,
        policy: ExpiryPolicy,
    ) -> Self {
        let provider: Arc<dyn IdentityProviderDyn> = store.provider().clone();
        self.recovery = Some(Recovery {
            provider,
            navigator,
        });
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    #[must_use]
    pub fn slot(&self) -> &CredentialSlot {
        &self.slot
    }

    /// `GET /todos/`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] on network failure, or [`Error::Transport`] on
    /// a non-success status.
    pub async fn list_tasks(&self) -> Result<Vec<Task>, Error> {
        self.fetch_json("list tasks", ApiRequest::new(Method::GET, "todos/"))
            .await
    }

    /// `GET /todo-types/`
    ///
    /// # Errors
    ///
    /// See [`list_tasks`](Self::list_tasks).
    pub async fn list_task_types(&self) -> Result<Vec<TaskType>, Error> {
        self.fetch_json("list task types", ApiRequest::new(Method::GET, "todo-types/"))
            .await
    }

    /// `POST /todos/`
    ///
    /// # Errors
    ///
    /// See [`list_tasks`](Self::list_tasks).
    pub async fn create_task(&self, task: &NewTask) -> Result<Task, Error> {
        let request = ApiRequest::new(Method::POST, "todos/").json(task)?;
        self.fetch_json("create task", request).await
    }

    /// `PATCH /todos/{id}/` with the new completion flag.
    ///
    /// # Errors
    ///
    /// See [`list_tasks`](Self::list_tasks).
    pub async fn set_completed(&self, id: TaskId, completed: bool) -> Result<Task, Error> {
        let request =
            ApiRequest::new(Method::PATCH, format!("todos/{id}/")).json(&TaskPatch { completed })?;
        self.fetch_json("update task", request).await
    }

    /// `DELETE /todos/{id}/`
    ///
    /// # Errors
    ///
    /// See [`list_tasks`](Self::list_tasks).
    pub async fn delete_task(&self, id: TaskId) -> Result<(), Error> {
        self.execute("delete task", ApiRequest::new(Method::DELETE, format!("todos/{id}/")))
            .await
            .map(drop)
    }

    /// `GET /youtube/search/?q=<query>`
    ///
    /// # Errors
    ///
    /// Any failure is reported as [`Error::Search`].
    pub async fn search_suggestions(&self, query: &str) -> Result<Vec<String>, Error> {
        let request = ApiRequest::new(Method::GET, "youtube/search/").query("q", query);
        self.fetch_json::<SuggestionsResponse>("search suggestions", request)
            .await
            .map(|r| r.suggestions)
            .map_err(|e| {
                tracing::error!(error = %e, "suggestion search failed");
                Error::Search(e.to_string())
            })
    }

    async fn fetch_json<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        request: ApiRequest,
    ) -> Result<T, Error> {
        let response = self.execute(operation, request).await?;
        response.json::<T>().await.map_err(Into::into)
    }

    async fn execute(
        &self,
        operation: &'static str,
        request: ApiRequest,
    ) -> Result<reqwest::Response, Error> {
        let response = self.send(&request).await?;
        if response.status() == StatusCode::FORBIDDEN {
            let rejection = Self::rejection(response, operation).await;
            return self.recover(operation, &request, rejection).await;
        }
        Self::ensure_success(response, operation).await
    }

    /// Handles the first 403 of an originating request: one clear, then one
    /// recovery action. The reissued request bypasses `execute`, so it can
    /// never recover again.
    async fn recover(
        &self,
        operation: &'static str,
        request: &ApiRequest,
        rejection: Error,
    ) -> Result<reqwest::Response, Error> {
        self.slot.clear();

        let Some(recovery) = &self.recovery else {
            tracing::warn!(operation, "credential rejected");
            return Err(rejection);
        };

        match self.policy {
            ExpiryPolicy::Reload => {
                tracing::warn!(operation, "credential expired, reloading to obtain a new one");
                recovery.navigator.reload();
                Err(rejection)
            }
            ExpiryPolicy::RefreshAndRetry => {
                let token = match recovery
                    .provider
                    .get_token_silently_dyn(TokenOptions::force_refresh())
                    .await
                {
                    Ok(token) => token,
                    Err(e) => {
                        tracing::warn!(operation, error = %e, "forced refresh failed");
                        recovery.escalate().await;
                        return Err(rejection);
                    }
                };

                tracing::info!(operation, "credential refreshed, reissuing request");
                let response = self.send_with(request, Some(&token)).await?;
                if response.status() == StatusCode::FORBIDDEN {
                    recovery.escalate().await;
                    return Err(Self::rejection(response, operation).await);
                }
                self.slot.store(&token);
                Self::ensure_success(response, operation).await
            }
        }
    }

    async fn send(&self, request: &ApiRequest) -> Result<reqwest::Response, Error> {
        let token = self.slot.access_token();
        self.send_with(request, token.as_deref()).await
    }

    async fn send_with(
        &self,
        request: &ApiRequest,
        token: Option<&str>,
    ) -> Result<reqwest::Response, Error> {
        let url = self
            .base
            .join(&request.path)
            .map_err(|e| Error::Config(format!("invalid path '{}': {e}", request.path)))?;

        let mut builder = self.http.request(request.method.clone(), url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }

        builder.send().await.map_err(Into::into)
    }

    /// Checks HTTP response status; returns the response on success or an error with details.
    async fn ensure_success(
        response: reqwest::Response,
        operation: &'static str,
    ) -> Result<reqwest::Response, Error> {
        if response.status().is_success() {
            return Ok(response);
        }
        Err(Self::rejection(response, operation).await)
    }

    async fn rejection(response: reqwest::Response, operation: &'static str) -> Error {
        let status = response.status();
        let detail = response.text().await.unwrap_or_default();
        Error::Transport {
            operation,
            status,
            detail,
        }
    }
}

// `Url::join` drops the last path segment unless the base ends in '/'.
pub(crate) fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}
