//! Search suggestions: debounced queries and result links.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use url::Url;

use crate::api::ApiClient;
use crate::error::Error;
use crate::session::Navigator;

const RESULTS_URL: &str = "https://www.youtube.com/results";

/// Quiet period before a suggestion query is sent.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// Results page for a suggestion, query percent-encoded.
#[must_use]
pub fn results_url(value: &str) -> Url {
    let encoded = urlencoding::encode(value);
    format!("{RESULTS_URL}?search_query={encoded}")
        .parse()
        .expect("percent-encoded query keeps the URL valid")
}

/// What the suggestion list shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchView {
    /// Nothing typed.
    Idle,
    Suggestions(Vec<String>),
    NoResults,
    Failed(String),
}

impl SearchView {
    #[must_use]
    pub fn from_result(query: &str, result: Result<Vec<String>, Error>) -> Self {
        match result {
            _ if query.trim().is_empty() => Self::Idle,
            Ok(items) if items.is_empty() => Self::NoResults,
            Ok(items) => Self::Suggestions(items),
            Err(_) => Self::Failed("Failed to fetch suggestions".into()),
        }
    }
}

/// Debounced suggestion lookups. Only the latest query within the debounce
/// window reaches the server, and answers to superseded queries are dropped.
#[derive(Clone)]
pub struct SuggestionSearch {
    api: ApiClient,
    navigator: Arc<dyn Navigator>,
    debounce: Duration,
    latest: Arc<AtomicU64>,
}

impl SuggestionSearch {
    #[must_use]
    pub fn new(api: ApiClient, navigator: Arc<dyn Navigator>) -> Self {
        Self {
            api,
            navigator,
            debounce: DEFAULT_DEBOUNCE,
            latest: Arc::new(AtomicU64::new(0)),
        }
    }

    #[must_use]
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Wait out the debounce window, then fetch.
    ///
    /// `Ok(None)` means a newer query arrived and this one was dropped.
    /// Blank queries settle to an empty list without a request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Search`] if the lookup fails.
    pub async fn suggest(&self, query: &str) -> Result<Option<Vec<String>>, Error> {
        let ticket = self.latest.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(self.debounce).await;
        if !self.is_latest(ticket) {
            return Ok(None);
        }

        if query.trim().is_empty() {
            return Ok(Some(Vec::new()));
        }

        let suggestions = self.api.search_suggestions(query).await?;
        if !self.is_latest(ticket) {
            tracing::debug!(query, "discarding superseded suggestions");
            return Ok(None);
        }
        Ok(Some(suggestions))
    }

    /// Open the results page for `value` in a new context.
    pub fn open_result(&self, value: &str) {
        self.navigator.open(&results_url(value));
    }

    fn is_latest(&self, ticket: u64) -> bool {
        self.latest.load(Ordering::SeqCst) == ticket
    }
}
