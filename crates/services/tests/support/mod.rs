#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use lms_core::model::{
    ContentId, ContentProgress, ContentType, ModuleId, ModuleProgress, OverallProgress,
    ProgressUpdate,
};
use lms_core::time::{fixed_clock, fixed_now};
use services::{
    ApiConfig, ApiError, Notification, Notifier, ProgressApi, ProgressService,
};
use storage::ProgressCache;

// ─── Course fixture ────────────────────────────────────────────────────────────

pub struct ModuleFixture {
    pub id: ModuleId,
    pub contents: Vec<ContentId>,
    pub completed: usize,
}

pub struct Course {
    pub modules: Vec<ModuleFixture>,
}

impl Course {
    /// One module per `(total, completed)` pair; the first `completed` items are done.
    pub fn new(shape: &[(usize, usize)]) -> Self {
        let modules = shape
            .iter()
            .enumerate()
            .map(|(m, &(total, completed))| ModuleFixture {
                id: ModuleId::new(Uuid::from_u128(1_000 + m as u128)),
                contents: (0..total)
                    .map(|c| ContentId::new(Uuid::from_u128((m as u128 + 1) * 100 + c as u128)))
                    .collect(),
                completed,
            })
            .collect();
        Self { modules }
    }

    pub fn module(&self, index: usize) -> &ModuleFixture {
        &self.modules[index]
    }
}

pub fn server_time() -> DateTime<Utc> {
    fixed_now() + chrono::Duration::seconds(1)
}

// ─── Fake backend ──────────────────────────────────────────────────────────────

pub enum Scripted {
    Fail(ApiError),
    Hang,
    /// Answer normally after a pause.
    Delay(Duration),
}

struct ServerState {
    overall: OverallProgress,
    modules: HashMap<ModuleId, Vec<ContentProgress>>,
    owner: HashMap<ContentId, ModuleId>,
}

/// In-memory progress backend with scriptable failures.
pub struct FakeProgressApi {
    state: Mutex<ServerState>,
    update_script: Mutex<VecDeque<Scripted>>,
    update_calls: Mutex<Vec<(ContentId, ProgressUpdate)>>,
    overall_calls: AtomicUsize,
    overall_failure: Mutex<Option<ApiError>>,
    overall_delay: Mutex<Option<Duration>>,
    access_calls: AtomicUsize,
    access_failure: Mutex<Option<ApiError>>,
}

impl FakeProgressApi {
    pub fn new(course: &Course) -> Self {
        let mut modules = HashMap::new();
        let mut owner = HashMap::new();
        let mut aggregates = Vec::new();

        for module in &course.modules {
            let records = module
                .contents
                .iter()
                .enumerate()
                .map(|(index, id)| {
                    owner.insert(*id, module.id);
                    let record = ContentProgress::not_started(*id, ContentType::Video, fixed_now());
                    if index < module.completed {
                        record.apply_update(&ProgressUpdate::completed(60), fixed_now())
                    } else {
                        record
                    }
                })
                .collect();
            modules.insert(module.id, records);
            aggregates.push(
                ModuleProgress::new(
                    module.id,
                    module.contents.len() as u32,
                    module.completed as u32,
                )
                .unwrap(),
            );
        }

        Self {
            state: Mutex::new(ServerState {
                overall: OverallProgress::from_modules(aggregates),
                modules,
                owner,
            }),
            update_script: Mutex::new(VecDeque::new()),
            update_calls: Mutex::new(Vec::new()),
            overall_calls: AtomicUsize::new(0),
            overall_failure: Mutex::new(None),
            overall_delay: Mutex::new(None),
            access_calls: AtomicUsize::new(0),
            access_failure: Mutex::new(None),
        }
    }

    pub fn script_update(&self, step: Scripted) {
        self.update_script.lock().unwrap().push_back(step);
    }

    pub fn fail_overall(&self, err: Option<ApiError>) {
        *self.overall_failure.lock().unwrap() = err;
    }

    pub fn delay_overall(&self, delay: Duration) {
        *self.overall_delay.lock().unwrap() = Some(delay);
    }

    pub fn fail_access(&self, err: ApiError) {
        *self.access_failure.lock().unwrap() = Some(err);
    }

    pub fn update_calls(&self) -> Vec<(ContentId, ProgressUpdate)> {
        self.update_calls.lock().unwrap().clone()
    }

    pub fn overall_calls(&self) -> usize {
        self.overall_calls.load(Ordering::SeqCst)
    }

    pub fn access_calls(&self) -> usize {
        self.access_calls.load(Ordering::SeqCst)
    }

    pub fn server_overall(&self) -> OverallProgress {
        self.state.lock().unwrap().overall.clone()
    }
}

#[async_trait]
impl ProgressApi for FakeProgressApi {
    async fn overall(&self) -> Result<OverallProgress, ApiError> {
        self.overall_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.overall_failure.lock().unwrap().clone() {
            return Err(err);
        }
        let overall = self.server_overall();
        let delay = *self.overall_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(overall)
    }

    async fn module_contents(
        &self,
        module_id: ModuleId,
    ) -> Result<Vec<ContentProgress>, ApiError> {
        self.state
            .lock()
            .unwrap()
            .modules
            .get(&module_id)
            .cloned()
            .ok_or_else(|| ApiError::from_status(404, "module not found".into(), None))
    }

    async fn content(&self, content_id: ContentId) -> Result<ContentProgress, ApiError> {
        let state = self.state.lock().unwrap();
        state
            .owner
            .get(&content_id)
            .and_then(|module_id| state.modules.get(module_id))
            .and_then(|list| list.iter().find(|c| c.content_id == content_id))
            .cloned()
            .ok_or_else(|| ApiError::from_status(404, "content not found".into(), None))
    }

    async fn update(
        &self,
        content_id: ContentId,
        update: &ProgressUpdate,
    ) -> Result<ContentProgress, ApiError> {
        self.update_calls
            .lock()
            .unwrap()
            .push((content_id, update.clone()));

        let step = self.update_script.lock().unwrap().pop_front();
        match step {
            Some(Scripted::Fail(err)) => return Err(err),
            Some(Scripted::Hang) => {
                return std::future::pending().await;
            }
            Some(Scripted::Delay(delay)) => tokio::time::sleep(delay).await,
            None => {}
        }

        let mut state = self.state.lock().unwrap();
        let module_id = *state
            .owner
            .get(&content_id)
            .ok_or_else(|| ApiError::from_status(404, "content not found".into(), None))?;
        let list = state.modules.get_mut(&module_id).expect("owner points at module");
        let slot = list
            .iter_mut()
            .find(|c| c.content_id == content_id)
            .expect("owner points at content");
        *slot = slot.apply_update(update, server_time());
        let record = slot.clone();

        let list = list.clone();
        if let Some(module) = state.overall.module_mut(module_id) {
            module.recount_from(&list);
        }
        state.overall.recompute_totals();
        state
            .overall
            .stamp_last_accessed(content_id, module_id, server_time());
        Ok(record)
    }

    async fn track_access(&self, _module_id: ModuleId) -> Result<(), ApiError> {
        self.access_calls.fetch_add(1, Ordering::SeqCst);
        match self.access_failure.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

// ─── Notifications ─────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingNotifier {
    seen: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn all(&self) -> Vec<Notification> {
        self.seen.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<Notification> {
        self.seen.lock().unwrap().last().cloned()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        self.seen.lock().unwrap().push(notification);
    }
}

// ─── Wiring ────────────────────────────────────────────────────────────────────

pub struct Harness {
    pub course: Course,
    pub api: Arc<FakeProgressApi>,
    pub notifier: Arc<RecordingNotifier>,
    pub service: ProgressService,
}

impl Harness {
    pub fn new(shape: &[(usize, usize)]) -> Self {
        Self::with_config(shape, ApiConfig::default())
    }

    pub fn with_config(shape: &[(usize, usize)], config: ApiConfig) -> Self {
        let course = Course::new(shape);
        let api = Arc::new(FakeProgressApi::new(&course));
        let notifier = Arc::new(RecordingNotifier::default());
        let service = ProgressService::new(
            Arc::clone(&api) as Arc<dyn ProgressApi>,
            Arc::new(ProgressCache::new(fixed_clock())),
            Arc::clone(&notifier) as Arc<dyn Notifier>,
            config,
            fixed_clock(),
        );
        Self {
            course,
            api,
            notifier,
            service,
        }
    }

    /// Load overall progress and every module list into the cache.
    pub async fn warm(&self) {
        self.service.fetch_overall().await.unwrap();
        for module in &self.course.modules {
            self.service.fetch_module(module.id).await.unwrap();
        }
    }
}
