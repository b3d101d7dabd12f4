use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use lms_core::model::{ContentId, ContentProgress, ModuleId, ProgressUpdate};
use storage::ProgressSnapshot;

use super::reconcile::{
    counts_as_new_completion, project_record, reconcile_overall, settle_record, upsert_record,
};
use super::service::ProgressService;
use crate::error::{ApiError, ProgressError};
use crate::notify::{Notification, RetryAction};

/// Marks a content id as having a write in flight until dropped.
struct InFlightGuard {
    in_flight: Arc<Mutex<HashSet<ContentId>>>,
    content_id: ContentId,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if let Ok(mut in_flight) = self.in_flight.lock() {
            in_flight.remove(&self.content_id);
        }
    }
}

impl ProgressService {
    fn begin_write(&self, content_id: ContentId) -> Result<InFlightGuard, ProgressError> {
        if !self.lock_in_flight()?.insert(content_id) {
            return Err(ProgressError::InFlight(content_id));
        }
        Ok(InFlightGuard {
            in_flight: Arc::clone(&self.in_flight),
            content_id,
        })
    }

    /// Write progress for `content_id` with an optimistic cache update.
    ///
    /// The cache shows the projected result immediately. On success it is
    /// replaced with the server's record and the module and overall aggregates
    /// are recomputed. On failure this write's own changes are undone,
    /// leaving concurrent writes to other items in place, and a failure
    /// notification with a retry action is emitted.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::InFlight` if a write for the same item is still
    /// running, `ProgressError::Api` once the request has failed for good, or
    /// `ProgressError::Storage` if the cache lock is poisoned.
    pub async fn update_progress(
        &self,
        module_id: ModuleId,
        content_id: ContentId,
        update: ProgressUpdate,
    ) -> Result<ContentProgress, ProgressError> {
        let _guard = self.begin_write(content_id)?;
        let snapshot = self.apply_optimistic(module_id, content_id, &update)?;

        match self.send_update(content_id, &update).await {
            Ok(server) => self.commit(module_id, content_id, &update, &snapshot, server),
            Err(err) => Err(self.roll_back(module_id, content_id, update, snapshot, err)),
        }
    }

    /// Replay a failed write with its original arguments.
    ///
    /// # Errors
    ///
    /// Same as [`ProgressService::update_progress`].
    pub async fn retry(&self, action: RetryAction) -> Result<ContentProgress, ProgressError> {
        tracing::info!(content_id = %action.content_id, "retrying progress update");
        self.update_progress(action.module_id, action.content_id, action.update)
            .await
    }

    fn apply_optimistic(
        &self,
        module_id: ModuleId,
        content_id: ContentId,
        update: &ProgressUpdate,
    ) -> Result<ProgressSnapshot, ProgressError> {
        // a refetch landing after this point would overwrite the projection
        self.cache.cancel_queries()?;
        let snapshot = self.cache.snapshot(content_id, module_id);

        if let Some(projected) = project_record(&snapshot, update, self.clock.now()) {
            self.cache.put_content(projected.clone())?;
            self.cache
                .update_module(module_id, |list| upsert_record(list, projected))?;
        }
        if counts_as_new_completion(&snapshot, update) {
            self.cache
                .update_overall(|overall| overall.project_completion(module_id))?;
        }
        Ok(snapshot)
    }

    async fn send_update(
        &self,
        content_id: ContentId,
        update: &ProgressUpdate,
    ) -> Result<ContentProgress, ApiError> {
        let limit = self.config.mutation_timeout;
        self.config
            .retry
            .run(move |attempt| {
                tracing::debug!(%content_id, attempt, "sending progress update");
                self.bounded(limit, self.api.update(content_id, update))
            })
            .await
    }

    fn commit(
        &self,
        module_id: ModuleId,
        content_id: ContentId,
        update: &ProgressUpdate,
        snapshot: &ProgressSnapshot,
        server: ContentProgress,
    ) -> Result<ContentProgress, ProgressError> {
        if snapshot.was_completed() && !server.is_completed {
            tracing::warn!(%content_id, "server reported a completed item as incomplete");
        }
        let record = settle_record(snapshot, server);
        self.cache.put_content(record.clone())?;

        let mut module_list = None;
        self.cache.update_module(module_id, |list| {
            upsert_record(list, record.clone());
            module_list = Some(list.clone());
        })?;

        let now = self.clock.now();
        self.cache.update_overall(|overall| {
            reconcile_overall(overall, module_id, module_list.as_deref(), content_id, now);
        })?;

        // consistency backstop, runs detached
        drop(self.revalidate_overall());

        let newly_completed = counts_as_new_completion(snapshot, update) && record.is_completed;
        tracing::info!(
            %content_id,
            %module_id,
            is_completed = record.is_completed,
            time_spent = record.time_spent,
            "progress update committed"
        );
        if newly_completed {
            self.notifier.notify(Notification::completed());
        }
        Ok(record)
    }

    fn roll_back(
        &self,
        module_id: ModuleId,
        content_id: ContentId,
        update: ProgressUpdate,
        snapshot: ProgressSnapshot,
        err: ApiError,
    ) -> ProgressError {
        let kind = err.kind();
        tracing::warn!(%content_id, code = kind.code(), error = %err, "progress update rolled back");

        let counted = counts_as_new_completion(&snapshot, &update);
        if let Err(storage) = self.cache.revert(snapshot, counted) {
            tracing::error!(%content_id, error = %storage, "failed to revert optimistic progress");
        }
        self.notifier.notify(Notification::failed(
            kind,
            RetryAction {
                module_id,
                content_id,
                update,
            },
        ));
        ProgressError::Api(err)
    }
}
