use chrono::{DateTime, Utc};
use lms_core::Clock;
use lms_core::model::{ContentId, ContentProgress, ModuleId, OverallProgress};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the progress cache.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("cache lock poisoned: {0}")]
    Poisoned(String),
}

/// Identity of a cached progress query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKey {
    Overall,
    Module(ModuleId),
    Content(ContentId),
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryKey::Overall => write!(f, "progress"),
            QueryKey::Module(id) => write!(f, "progress/module/{id}"),
            QueryKey::Content(id) => write!(f, "progress/content/{id}"),
        }
    }
}

/// A cached value with the time it was written.
#[derive(Debug, Clone, PartialEq)]
pub struct Cached<T> {
    pub value: T,
    pub fetched_at: DateTime<Utc>,
    pub stale: bool,
}

impl<T> Cached<T> {
    fn new(value: T, fetched_at: DateTime<Utc>) -> Self {
        Self {
            value,
            fetched_at,
            stale: false,
        }
    }
}

/// Exact copy of the three entries a progress write touches.
///
/// Absent entries are recorded as `None` so restoring removes them again.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    content_id: ContentId,
    module_id: ModuleId,
    content: Option<Cached<ContentProgress>>,
    module: Option<Cached<Vec<ContentProgress>>>,
    overall: Option<Cached<OverallProgress>>,
}

impl ProgressSnapshot {
    #[must_use]
    pub fn content_id(&self) -> ContentId {
        self.content_id
    }

    #[must_use]
    pub fn module_id(&self) -> ModuleId {
        self.module_id
    }

    #[must_use]
    pub fn content(&self) -> Option<&Cached<ContentProgress>> {
        self.content.as_ref()
    }

    #[must_use]
    pub fn module(&self) -> Option<&Cached<Vec<ContentProgress>>> {
        self.module.as_ref()
    }

    #[must_use]
    pub fn overall(&self) -> Option<&Cached<OverallProgress>> {
        self.overall.as_ref()
    }

    /// The record known before the write, module list first.
    #[must_use]
    pub fn prior_record(&self) -> Option<&ContentProgress> {
        self.module
            .as_ref()
            .and_then(|m| m.value.iter().find(|c| c.content_id == self.content_id))
            .or_else(|| self.content.as_ref().map(|c| &c.value))
    }

    /// Whether the item was already completed before the write.
    #[must_use]
    pub fn was_completed(&self) -> bool {
        self.prior_record().is_some_and(|c| c.is_completed)
    }
}

#[derive(Default)]
struct CacheState {
    overall: Option<Cached<OverallProgress>>,
    modules: HashMap<ModuleId, Cached<Vec<ContentProgress>>>,
    contents: HashMap<ContentId, Cached<ContentProgress>>,
    generation: u64,
}

/// In-memory query cache for progress records.
///
/// One instance is created per signed-in session and shared behind an `Arc`;
/// `clear` drops everything on sign-out. Reads never block on I/O and never
/// fail: a poisoned lock reads as an empty cache.
pub struct ProgressCache {
    clock: Clock,
    state: Mutex<CacheState>,
}

impl ProgressCache {
    #[must_use]
    pub fn new(clock: Clock) -> Self {
        Self {
            clock,
            state: Mutex::new(CacheState::default()),
        }
    }

    fn read(&self) -> Option<MutexGuard<'_, CacheState>> {
        self.state.lock().ok()
    }

    fn write(&self) -> Result<MutexGuard<'_, CacheState>, StorageError> {
        self.state
            .lock()
            .map_err(|e| StorageError::Poisoned(e.to_string()))
    }

    // ─── Reads ─────────────────────────────────────────────────────────────────

    #[must_use]
    pub fn overall(&self) -> Option<OverallProgress> {
        self.read()?.overall.as_ref().map(|c| c.value.clone())
    }

    #[must_use]
    pub fn module_contents(&self, module_id: ModuleId) -> Option<Vec<ContentProgress>> {
        self.read()?.modules.get(&module_id).map(|c| c.value.clone())
    }

    #[must_use]
    pub fn content(&self, content_id: ContentId) -> Option<ContentProgress> {
        self.read()?.contents.get(&content_id).map(|c| c.value.clone())
    }

    /// One record out of a cached module list, without cloning the list.
    #[must_use]
    pub fn content_in_module(
        &self,
        module_id: ModuleId,
        content_id: ContentId,
    ) -> Option<ContentProgress> {
        self.read()?
            .modules
            .get(&module_id)?
            .value
            .iter()
            .find(|c| c.content_id == content_id)
            .cloned()
    }

    #[must_use]
    pub fn contains(&self, key: QueryKey) -> bool {
        self.read().is_some_and(|state| match key {
            QueryKey::Overall => state.overall.is_some(),
            QueryKey::Module(id) => state.modules.contains_key(&id),
            QueryKey::Content(id) => state.contents.contains_key(&id),
        })
    }

    /// Whether `key` is resident, not invalidated and younger than `stale_time`.
    #[must_use]
    pub fn is_fresh(&self, key: QueryKey, stale_time: Duration) -> bool {
        let Some(state) = self.read() else {
            return false;
        };
        let stamp = match key {
            QueryKey::Overall => state.overall.as_ref().map(|c| (c.fetched_at, c.stale)),
            QueryKey::Module(id) => state.modules.get(&id).map(|c| (c.fetched_at, c.stale)),
            QueryKey::Content(id) => state.contents.get(&id).map(|c| (c.fetched_at, c.stale)),
        };
        stamp.is_some_and(|(at, stale)| !stale && self.clock.elapsed_since(at) < stale_time)
    }

    // ─── Writes ────────────────────────────────────────────────────────────────

    /// Replace the overall record.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Poisoned` if the cache lock is poisoned.
    pub fn put_overall(&self, value: OverallProgress) -> Result<(), StorageError> {
        let now = self.clock.now();
        self.write()?.overall = Some(Cached::new(value, now));
        Ok(())
    }

    /// Replace a module's content list.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Poisoned` if the cache lock is poisoned.
    pub fn put_module(
        &self,
        module_id: ModuleId,
        contents: Vec<ContentProgress>,
    ) -> Result<(), StorageError> {
        let now = self.clock.now();
        self.write()?
            .modules
            .insert(module_id, Cached::new(contents, now));
        Ok(())
    }

    /// Replace a single content record.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Poisoned` if the cache lock is poisoned.
    pub fn put_content(&self, value: ContentProgress) -> Result<(), StorageError> {
        let now = self.clock.now();
        self.write()?
            .contents
            .insert(value.content_id, Cached::new(value, now));
        Ok(())
    }

    /// Mutate the overall record in place. Returns `false` when absent.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Poisoned` if the cache lock is poisoned.
    pub fn update_overall<F>(&self, f: F) -> Result<bool, StorageError>
    where
        F: FnOnce(&mut OverallProgress),
    {
        let now = self.clock.now();
        let mut state = self.write()?;
        let Some(entry) = state.overall.as_mut() else {
            return Ok(false);
        };
        f(&mut entry.value);
        entry.fetched_at = now;
        Ok(true)
    }

    /// Mutate a module's content list in place. Returns `false` when absent.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Poisoned` if the cache lock is poisoned.
    pub fn update_module<F>(&self, module_id: ModuleId, f: F) -> Result<bool, StorageError>
    where
        F: FnOnce(&mut Vec<ContentProgress>),
    {
        let now = self.clock.now();
        let mut state = self.write()?;
        let Some(entry) = state.modules.get_mut(&module_id) else {
            return Ok(false);
        };
        f(&mut entry.value);
        entry.fetched_at = now;
        Ok(true)
    }

    // ─── Query generations ─────────────────────────────────────────────────────

    /// Current generation of the progress namespace.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.read().map_or(0, |state| state.generation)
    }

    /// Cancel every in-flight progress fetch.
    ///
    /// Fetches started before this call carry an older generation and their
    /// results are dropped by the `*_if_current` writers.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Poisoned` if the cache lock is poisoned.
    pub fn cancel_queries(&self) -> Result<u64, StorageError> {
        let mut state = self.write()?;
        state.generation = state.generation.wrapping_add(1);
        tracing::debug!(generation = state.generation, "cancelled in-flight progress queries");
        Ok(state.generation)
    }

    /// Store a fetched overall record unless its fetch was cancelled.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Poisoned` if the cache lock is poisoned.
    pub fn put_overall_if_current(
        &self,
        generation: u64,
        value: OverallProgress,
    ) -> Result<bool, StorageError> {
        let now = self.clock.now();
        let mut state = self.write()?;
        if state.generation != generation {
            return Ok(false);
        }
        state.overall = Some(Cached::new(value, now));
        Ok(true)
    }

    /// Store a fetched module list unless its fetch was cancelled.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Poisoned` if the cache lock is poisoned.
    pub fn put_module_if_current(
        &self,
        generation: u64,
        module_id: ModuleId,
        contents: Vec<ContentProgress>,
    ) -> Result<bool, StorageError> {
        let now = self.clock.now();
        let mut state = self.write()?;
        if state.generation != generation {
            return Ok(false);
        }
        state.modules.insert(module_id, Cached::new(contents, now));
        Ok(true)
    }

    /// Store a fetched content record unless its fetch was cancelled.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Poisoned` if the cache lock is poisoned.
    pub fn put_content_if_current(
        &self,
        generation: u64,
        value: ContentProgress,
    ) -> Result<bool, StorageError> {
        let now = self.clock.now();
        let mut state = self.write()?;
        if state.generation != generation {
            return Ok(false);
        }
        state
            .contents
            .insert(value.content_id, Cached::new(value, now));
        Ok(true)
    }

    // ─── Invalidation & lifecycle ──────────────────────────────────────────────

    /// Mark an entry stale so the next load refetches it. Data stays readable.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Poisoned` if the cache lock is poisoned.
    pub fn invalidate(&self, key: QueryKey) -> Result<(), StorageError> {
        let mut state = self.write()?;
        match key {
            QueryKey::Overall => {
                if let Some(entry) = state.overall.as_mut() {
                    entry.stale = true;
                }
            }
            QueryKey::Module(id) => {
                if let Some(entry) = state.modules.get_mut(&id) {
                    entry.stale = true;
                }
            }
            QueryKey::Content(id) => {
                if let Some(entry) = state.contents.get_mut(&id) {
                    entry.stale = true;
                }
            }
        }
        Ok(())
    }

    /// Drop every entry and cancel in-flight fetches (sign-out).
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Poisoned` if the cache lock is poisoned.
    pub fn clear(&self) -> Result<(), StorageError> {
        let mut state = self.write()?;
        let generation = state.generation.wrapping_add(1);
        *state = CacheState {
            generation,
            ..CacheState::default()
        };
        tracing::debug!("progress cache cleared");
        Ok(())
    }

    // ─── Snapshots ─────────────────────────────────────────────────────────────

    /// Copy the content, module-list and overall entries touched by a write.
    #[must_use]
    pub fn snapshot(&self, content_id: ContentId, module_id: ModuleId) -> ProgressSnapshot {
        let (content, module, overall) = match self.read() {
            Some(state) => (
                state.contents.get(&content_id).cloned(),
                state.modules.get(&module_id).cloned(),
                state.overall.clone(),
            ),
            None => (None, None, None),
        };
        ProgressSnapshot {
            content_id,
            module_id,
            content,
            module,
            overall,
        }
    }

    /// Undo one write's optimistic changes without disturbing other items.
    ///
    /// The content entry goes back exactly as captured. Inside the module
    /// list only this item's record is put back, or dropped when the list did
    /// not hold it, and the module and overall figures are re-derived from the
    /// list as it stands now so concurrent writes to sibling items survive.
    /// Without a module list the single completion this write projected is
    /// withdrawn when `counted_completion` is set. Entries that did not exist
    /// when the snapshot was taken are not created.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Poisoned` if the cache lock is poisoned.
    pub fn revert(
        &self,
        snapshot: ProgressSnapshot,
        counted_completion: bool,
    ) -> Result<(), StorageError> {
        let ProgressSnapshot {
            content_id,
            module_id,
            content,
            module,
            overall,
        } = snapshot;
        let mut state = self.write()?;

        match content {
            Some(entry) => {
                state.contents.insert(content_id, entry);
            }
            None => {
                state.contents.remove(&content_id);
            }
        }

        let mut current_list = None;
        if let (Some(captured), Some(entry)) = (module, state.modules.get_mut(&module_id)) {
            let prior = captured
                .value
                .into_iter()
                .find(|c| c.content_id == content_id);
            match (prior, entry.value.iter().position(|c| c.content_id == content_id)) {
                (Some(prior), Some(index)) => entry.value[index] = prior,
                (Some(prior), None) => entry.value.push(prior),
                (None, Some(index)) => {
                    entry.value.remove(index);
                }
                (None, None) => {}
            }
            current_list = Some(entry.value.clone());
        }

        if overall.is_some() {
            if let Some(entry) = state.overall.as_mut() {
                let recounted = match (current_list.as_deref(), entry.value.module_mut(module_id)) {
                    (Some(list), Some(module)) => {
                        module.recount_from(list);
                        true
                    }
                    _ => false,
                };
                if recounted {
                    entry.value.recompute_totals();
                } else if counted_completion {
                    entry.value.withdraw_completion(module_id);
                }
            }
        }
        Ok(())
    }
}
