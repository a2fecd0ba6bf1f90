#![doc = include_str!("../README.md")]

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod logging;
#[cfg(feature = "oauth")]
pub mod oauth;
#[cfg(feature = "oauth")]
pub mod pkce;
pub mod search;
pub mod session;
pub mod tasks;
pub mod types;

// Re-exports for convenient access
pub use api::{ApiClient, ExpiryPolicy};
pub use client::{NoProvider, TodoClient};
pub use config::{AuthFallback, AuthFlow, ClientConfig, IdentityConfig};
pub use error::Error;
pub use logging::LogLevel;
#[cfg(feature = "oauth")]
pub use oauth::{AuthorizationRequest, HostedProvider, TokenResponse};
pub use search::{SearchView, SuggestionSearch, results_url};
pub use session::{
    CredentialSlot, CredentialTrust, IdentityProvider, LoginOptions, Navigator, RouteGuard,
    Session, SessionStore, TokenMirror, TokenOptions,
};
pub use tasks::{CacheKey, TaskDraft, TaskService};
pub use types::{NewTask, Task, TaskId, TaskType, TaskTypeId, UserProfile};
