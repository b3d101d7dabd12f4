//! Cache projections applied around a progress write.

use chrono::{DateTime, Utc};

use lms_core::model::{ContentId, ContentProgress, ModuleId, OverallProgress, ProgressUpdate};
use storage::ProgressSnapshot;

/// Replace the record for the same content id, or append it.
pub(super) fn upsert_record(list: &mut Vec<ContentProgress>, record: ContentProgress) {
    match list.iter_mut().find(|c| c.content_id == record.content_id) {
        Some(slot) => *slot = record,
        None => list.push(record),
    }
}

/// Optimistic record for the write, built on the best record known before it.
///
/// `None` when neither the module list nor the content entry knows the item;
/// no record is fabricated in that case.
pub(super) fn project_record(
    snapshot: &ProgressSnapshot,
    update: &ProgressUpdate,
    now: DateTime<Utc>,
) -> Option<ContentProgress> {
    snapshot
        .prior_record()
        .map(|prior| prior.apply_update(update, now))
}

/// Whether the write should count one more completed item.
pub(super) fn counts_as_new_completion(snapshot: &ProgressSnapshot, update: &ProgressUpdate) -> bool {
    update.is_completed && !snapshot.was_completed()
}

/// Server record merged over what was known before the write.
pub(super) fn settle_record(
    snapshot: &ProgressSnapshot,
    server: ContentProgress,
) -> ContentProgress {
    match snapshot.prior_record() {
        Some(prior) => prior.reconcile(server),
        None => server,
    }
}

/// `fetched` merged over `resident` without losing an observed completion.
pub(super) fn keep_completion(resident: &ContentProgress, fetched: ContentProgress) -> ContentProgress {
    if resident.is_completed && !fetched.is_completed {
        tracing::warn!(content_id = %fetched.content_id, "fetched record lags a completion, keeping it");
    }
    resident.reconcile(fetched)
}

/// Fetched module list merged record by record over the resident one.
pub(super) fn keep_completions(
    resident: Option<Vec<ContentProgress>>,
    fetched: Vec<ContentProgress>,
) -> Vec<ContentProgress> {
    let Some(resident) = resident else {
        return fetched;
    };
    fetched
        .into_iter()
        .map(|record| {
            match resident.iter().find(|c| c.content_id == record.content_id) {
                Some(prior) => keep_completion(prior, record),
                None => record,
            }
        })
        .collect()
}

/// Re-derive the overall record after a confirmed write.
///
/// The owning module is recounted from its (already reconciled) content
/// list when that list is known, and every total is re-summed from the
/// modules. Without module entries the projected totals are left alone.
pub(super) fn reconcile_overall(
    overall: &mut OverallProgress,
    module_id: ModuleId,
    module_list: Option<&[ContentProgress]>,
    content_id: ContentId,
    now: DateTime<Utc>,
) {
    if let (Some(list), Some(module)) = (module_list, overall.module_mut(module_id)) {
        module.recount_from(list);
    }
    if !overall.modules.is_empty() {
        overall.recompute_totals();
    }
    overall.stamp_last_accessed(content_id, module_id, now);
}
