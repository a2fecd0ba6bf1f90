//! Task Mutation Layer.
//!
//! Reads go through a small read-through cache keyed like the original
//! query keys. Every successful mutation invalidates [`CacheKey::Tasks`] so
//! the next read refetches; the cache is never patched in place.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use moka::future::Cache;

use crate::api::ApiClient;
use crate::error::Error;
use crate::types::{NewTask, Task, TaskId, TaskType, TaskTypeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Tasks,
    TaskTypes,
}

impl CacheKey {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tasks => "todos",
            Self::TaskTypes => "todoTypes",
        }
    }
}

#[derive(Debug, Clone)]
enum Cached {
    Tasks(Arc<Vec<Task>>),
    TaskTypes(Arc<Vec<TaskType>>),
}

/// Invalidation count per key. A read only fills the cache if no
/// invalidation happened while it was in flight.
#[derive(Debug, Default)]
struct Generations {
    tasks: AtomicU64,
    task_types: AtomicU64,
}

impl Generations {
    fn of(&self, key: CacheKey) -> &AtomicU64 {
        match key {
            CacheKey::Tasks => &self.tasks,
            CacheKey::TaskTypes => &self.task_types,
        }
    }
}

/// Task queries and mutations over an [`ApiClient`].
#[derive(Clone)]
pub struct TaskService {
    api: ApiClient,
    cache: Cache<CacheKey, Cached>,
    generations: Arc<Generations>,
}

impl TaskService {
    #[must_use]
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            cache: Cache::new(8),
            generations: Arc::default(),
        }
    }

    #[must_use]
    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    /// Task list, from cache when fresh.
    ///
    /// # Errors
    ///
    /// Propagates the [`ApiClient`] error; nothing is cached on failure.
    pub async fn tasks(&self) -> Result<Arc<Vec<Task>>, Error> {
        if let Some(Cached::Tasks(tasks)) = self.cache.get(&CacheKey::Tasks).await {
            return Ok(tasks);
        }
        let seen = self.generation(CacheKey::Tasks);
        let tasks = Arc::new(self.api.list_tasks().await?);
        self.fill(CacheKey::Tasks, seen, Cached::Tasks(tasks.clone()))
            .await;
        Ok(tasks)
    }

    /// Task types, from cache when fresh.
    ///
    /// # Errors
    ///
    /// Propagates the [`ApiClient`] error; nothing is cached on failure.
    pub async fn task_types(&self) -> Result<Arc<Vec<TaskType>>, Error> {
        if let Some(Cached::TaskTypes(types)) = self.cache.get(&CacheKey::TaskTypes).await {
            return Ok(types);
        }
        let seen = self.generation(CacheKey::TaskTypes);
        let types = Arc::new(self.api.list_task_types().await?);
        self.fill(CacheKey::TaskTypes, seen, Cached::TaskTypes(types.clone()))
            .await;
        Ok(types)
    }

    /// Drop a cache entry so the next read refetches.
    ///
    /// Reads already in flight still return their result to their caller
    /// but never fill the cache.
    pub async fn invalidate(&self, key: CacheKey) {
        self.generations.of(key).fetch_add(1, Ordering::SeqCst);
        self.cache.invalidate(&key).await;
        tracing::debug!(key = key.as_str(), "cache invalidated");
    }

    #[must_use]
    pub fn is_cached(&self, key: CacheKey) -> bool {
        self.cache.contains_key(&key)
    }

    fn generation(&self, key: CacheKey) -> u64 {
        self.generations.of(key).load(Ordering::SeqCst)
    }

    /// Cache `value` fetched at generation `seen`, unless an invalidation
    /// has happened since.
    async fn fill(&self, key: CacheKey, seen: u64, value: Cached) {
        if self.generation(key) != seen {
            tracing::debug!(key = key.as_str(), "discarding read that raced an invalidation");
            return;
        }
        self.cache.insert(key, value).await;
        // An invalidation may have landed between the check and the insert.
        if self.generation(key) != seen {
            self.cache.invalidate(&key).await;
        }
    }

    /// Create a task. The type reference is sent only when selected.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for a blank title without touching the
    /// network, otherwise propagates the [`ApiClient`] error.
    pub async fn add(
        &self,
        title: impl Into<String>,
        task_type: Option<TaskTypeId>,
    ) -> Result<Task, Error> {
        let payload = NewTask::new(title)?.with_task_type(task_type);
        let created = self.api.create_task(&payload).await?;
        tracing::info!(task_id = %created.id, "task created");
        self.invalidate(CacheKey::Tasks).await;
        Ok(created)
    }

    /// Flip `completed` relative to the copy the caller holds.
    ///
    /// The server value is not re-read, so two toggles of the same stale
    /// copy both send the same value.
    ///
    /// # Errors
    ///
    /// Propagates the [`ApiClient`] error.
    pub async fn toggle(&self, task: &Task) -> Result<Task, Error> {
        let updated = self.api.set_completed(task.id, !task.completed).await?;
        tracing::info!(task_id = %task.id, completed = updated.completed, "task toggled");
        self.invalidate(CacheKey::Tasks).await;
        Ok(updated)
    }

    /// # Errors
    ///
    /// Propagates the [`ApiClient`] error.
    pub async fn delete(&self, id: TaskId) -> Result<(), Error> {
        self.api.delete_task(id).await?;
        tracing::info!(task_id = %id, "task deleted");
        self.invalidate(CacheKey::Tasks).await;
        Ok(())
    }
}

/// The add-task form: a title and an optional type, reset after a
/// successful submit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskDraft {
    pub title: String,
    pub task_type: Option<TaskTypeId>,
}

impl TaskDraft {
    /// Whether submitting would reach the network.
    #[must_use]
    pub fn is_submittable(&self) -> bool {
        !self.title.trim().is_empty()
    }

    /// Submit through `service`; clears the draft only on success.
    ///
    /// # Errors
    ///
    /// See [`TaskService::add`]. The draft is left untouched on error.
    pub async fn submit(&mut self, service: &TaskService) -> Result<Task, Error> {
        let created = service.add(self.title.clone(), self.task_type).await?;
        *self = Self::default();
        Ok(created)
    }
}
