use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;

use lms_core::gating::{self, ContentGate};
use lms_core::model::{ContentId, ContentProgress, ModuleId, ModuleProgress, OverallProgress};
use storage::{ProgressCache, QueryKey, StorageError};

use crate::Clock;
use crate::api::ProgressApi;
use crate::config::ApiConfig;
use crate::error::{ApiError, ProgressError};
use crate::notify::Notifier;

use super::reconcile::{keep_completion, keep_completions};

//
// ─── SERVICE ───────────────────────────────────────────────────────────────────
//

/// Client-side progress synchronization over an injected cache.
///
/// Reads answer from the cache without touching the network. Fetches and the
/// update mutation go through the `ProgressApi` and keep the cache in step.
/// Cloning is cheap; clones share the cache and the in-flight set.
#[derive(Clone)]
pub struct ProgressService {
    pub(super) api: Arc<dyn ProgressApi>,
    pub(super) cache: Arc<ProgressCache>,
    pub(super) notifier: Arc<dyn Notifier>,
    pub(super) config: Arc<ApiConfig>,
    pub(super) clock: Clock,
    pub(super) in_flight: Arc<Mutex<HashSet<ContentId>>>,
}

impl ProgressService {
    #[must_use]
    pub fn new(
        api: Arc<dyn ProgressApi>,
        cache: Arc<ProgressCache>,
        notifier: Arc<dyn Notifier>,
        config: ApiConfig,
        clock: Clock,
    ) -> Self {
        Self {
            api,
            cache,
            notifier,
            config: Arc::new(config),
            clock,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    #[must_use]
    pub fn cache(&self) -> Arc<ProgressCache> {
        Arc::clone(&self.cache)
    }

    #[must_use]
    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    /// Drop all cached progress (sign-out).
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Storage` if the cache lock is poisoned.
    pub fn sign_out(&self) -> Result<(), ProgressError> {
        self.cache.clear()?;
        tracing::info!("progress cache torn down");
        Ok(())
    }

    // ─── Read accessors ────────────────────────────────────────────────────────

    #[must_use]
    pub fn overall(&self) -> Option<OverallProgress> {
        self.cache.overall()
    }

    #[must_use]
    pub fn module_contents(&self, module_id: ModuleId) -> Option<Vec<ContentProgress>> {
        self.cache.module_contents(module_id)
    }

    #[must_use]
    pub fn content(&self, content_id: ContentId) -> Option<ContentProgress> {
        self.cache.content(content_id)
    }

    /// A module's aggregate, read out of the cached overall record.
    #[must_use]
    pub fn module_progress(&self, module_id: ModuleId) -> Option<ModuleProgress> {
        self.cache.overall()?.module(module_id).cloned()
    }

    /// Best known record for `content_id`: the module list first, then the
    /// single-content entry.
    #[must_use]
    pub fn record(&self, module_id: Option<ModuleId>, content_id: ContentId) -> Option<ContentProgress> {
        module_id
            .and_then(|module_id| self.cache.content_in_module(module_id, content_id))
            .or_else(|| self.cache.content(content_id))
    }

    /// Whether `content_id` is known to be completed.
    ///
    /// The loaded module's list takes priority over a single-content entry,
    /// and anything not resident reads as not completed.
    #[must_use]
    pub fn is_completed(&self, module_id: Option<ModuleId>, content_id: ContentId) -> bool {
        self.record(module_id, content_id)
            .is_some_and(|record| record.is_completed)
    }

    /// Saved resume offset for video and pdf content.
    #[must_use]
    pub fn resume_position(&self, module_id: Option<ModuleId>, content_id: ContentId) -> Option<f64> {
        self.record(module_id, content_id)
            .filter(|record| record.content_type.is_resumable())
            .and_then(|record| record.last_position)
    }

    #[must_use]
    pub fn is_accessible(
        &self,
        module_id: Option<ModuleId>,
        content_id: ContentId,
        ordered: &[ContentId],
    ) -> bool {
        gating::is_accessible(content_id, ordered, |id| self.is_completed(module_id, id))
    }

    #[must_use]
    pub fn gate(
        &self,
        module_id: Option<ModuleId>,
        content_id: ContentId,
        ordered: &[ContentId],
    ) -> Option<ContentGate> {
        gating::gate_of(content_id, ordered, |id| self.is_completed(module_id, id))
    }

    #[must_use]
    pub fn gates(&self, module_id: Option<ModuleId>, ordered: &[ContentId]) -> Vec<ContentGate> {
        gating::gates(ordered, |id| self.is_completed(module_id, id))
    }

    /// Check that navigating to `content_id` is allowed.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Gate` when the item is locked or not in `ordered`.
    pub fn ensure_navigable(
        &self,
        module_id: Option<ModuleId>,
        content_id: ContentId,
        ordered: &[ContentId],
    ) -> Result<ContentGate, ProgressError> {
        Ok(gating::ensure_navigable(content_id, ordered, |id| {
            self.is_completed(module_id, id)
        })?)
    }

    /// Module-level gate from the cached overall record; unknown modules are locked.
    #[must_use]
    pub fn is_module_accessible(&self, module_id: ModuleId) -> bool {
        self.module_progress(module_id)
            .is_some_and(|module| module.is_accessible)
    }

    // ─── Fetchers ──────────────────────────────────────────────────────────────

    pub(super) async fn bounded<T, F>(&self, limit: Duration, request: F) -> Result<T, ApiError>
    where
        F: Future<Output = Result<T, ApiError>>,
    {
        tokio::time::timeout(limit, request)
            .await
            .map_err(|_| ApiError::Timeout(limit))?
    }

    /// Fetch the overall record and cache it unless a write superseded the fetch.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Api` when the request fails.
    pub async fn fetch_overall(&self) -> Result<OverallProgress, ProgressError> {
        let generation = self.cache.generation();
        let overall = self
            .bounded(self.config.request_timeout, self.api.overall())
            .await?;
        if self.cache.put_overall_if_current(generation, overall.clone())? {
            return Ok(overall);
        }
        tracing::debug!(key = %QueryKey::Overall, "dropped superseded fetch");
        Ok(self.cache.overall().unwrap_or(overall))
    }

    /// Fetch a module's content list.
    ///
    /// Items this session already holds as completed stay completed even if
    /// the response lags behind.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Api` when the request fails.
    pub async fn fetch_module(
        &self,
        module_id: ModuleId,
    ) -> Result<Vec<ContentProgress>, ProgressError> {
        let generation = self.cache.generation();
        let fetched = self
            .bounded(self.config.request_timeout, self.api.module_contents(module_id))
            .await?;
        let contents = keep_completions(self.cache.module_contents(module_id), fetched);
        if self
            .cache
            .put_module_if_current(generation, module_id, contents.clone())?
        {
            return Ok(contents);
        }
        tracing::debug!(key = %QueryKey::Module(module_id), "dropped superseded fetch");
        Ok(self.cache.module_contents(module_id).unwrap_or(contents))
    }

    /// Fetch a single content record, keeping a resident completion.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Api` when the request fails.
    pub async fn fetch_content(
        &self,
        content_id: ContentId,
    ) -> Result<ContentProgress, ProgressError> {
        let generation = self.cache.generation();
        let fetched = self
            .bounded(self.config.request_timeout, self.api.content(content_id))
            .await?;
        let record = match self.cache.content(content_id) {
            Some(resident) => keep_completion(&resident, fetched),
            None => fetched,
        };
        if self
            .cache
            .put_content_if_current(generation, record.clone())?
        {
            return Ok(record);
        }
        tracing::debug!(key = %QueryKey::Content(content_id), "dropped superseded fetch");
        Ok(self.cache.content(content_id).unwrap_or(record))
    }

    async fn load<T, C, F>(&self, key: QueryKey, cached: C, fetch: F) -> Result<T, ProgressError>
    where
        C: Fn() -> Option<T>,
        F: Future<Output = Result<T, ProgressError>>,
    {
        if self.cache.is_fresh(key, self.config.stale_time) {
            if let Some(value) = cached() {
                return Ok(value);
            }
        }
        match fetch.await {
            Ok(value) => Ok(value),
            Err(err) => match cached() {
                Some(stale) => {
                    tracing::warn!(%key, error = %err, "fetch failed, serving cached progress");
                    Ok(stale)
                }
                None => Err(err),
            },
        }
    }

    /// Cached overall record when fresh, otherwise a fetch.
    ///
    /// A failed fetch falls back to whatever is cached.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Api` when the fetch fails and nothing is cached.
    pub async fn load_overall(&self) -> Result<OverallProgress, ProgressError> {
        self.load(QueryKey::Overall, || self.cache.overall(), self.fetch_overall())
            .await
    }

    /// Cached module list when fresh, otherwise a fetch.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Api` when the fetch fails and nothing is cached.
    pub async fn load_module(
        &self,
        module_id: ModuleId,
    ) -> Result<Vec<ContentProgress>, ProgressError> {
        self.load(
            QueryKey::Module(module_id),
            || self.cache.module_contents(module_id),
            self.fetch_module(module_id),
        )
        .await
    }

    /// Cached content record when fresh, otherwise a fetch.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Api` when the fetch fails and nothing is cached.
    pub async fn load_content(
        &self,
        content_id: ContentId,
    ) -> Result<ContentProgress, ProgressError> {
        self.load(
            QueryKey::Content(content_id),
            || self.cache.content(content_id),
            self.fetch_content(content_id),
        )
        .await
    }

    /// Refetch the overall record in the background.
    pub fn revalidate_overall(&self) -> JoinHandle<()> {
        let service = self.clone();
        tokio::spawn(async move {
            if let Err(err) = service.fetch_overall().await {
                tracing::warn!(error = %err, "background progress revalidation failed");
            }
        })
    }

    // ─── Access tracking ───────────────────────────────────────────────────────

    /// Record that the user opened `module_id`. Failures are logged and dropped.
    pub async fn track_module_access(&self, module_id: ModuleId) {
        match self
            .bounded(self.config.request_timeout, self.api.track_access(module_id))
            .await
        {
            Ok(()) => tracing::debug!(%module_id, "module access tracked"),
            Err(err) => {
                tracing::warn!(%module_id, code = err.kind().code(), error = %err, "module access tracking failed");
            }
        }
    }

    pub(super) fn lock_in_flight(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashSet<ContentId>>, StorageError> {
        self.in_flight
            .lock()
            .map_err(|e| StorageError::Poisoned(e.to_string()))
    }
}
