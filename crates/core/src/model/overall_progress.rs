use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::gating::module_accessibility;
use crate::model::ids::{ContentId, ModuleId};
use crate::model::module_progress::{ModuleProgress, percentage};

/// Pointer to the content item the user touched last.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastAccessedContent {
    pub content_id: ContentId,
    pub module_id: ModuleId,
    pub accessed_at: DateTime<Utc>,
}

/// Course-wide aggregate across all modules, in course order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverallProgress {
    pub total_modules: u32,
    pub completed_modules: u32,
    pub total_content: u32,
    pub completed_content: u32,
    pub progress_percentage: f64,
    #[serde(default)]
    pub last_accessed_content: Option<LastAccessedContent>,
    #[serde(default)]
    pub modules: Vec<ModuleProgress>,
}

impl OverallProgress {
    /// Build an aggregate whose totals are derived from `modules`.
    #[must_use]
    pub fn from_modules(modules: Vec<ModuleProgress>) -> Self {
        let mut overall = Self {
            total_modules: 0,
            completed_modules: 0,
            total_content: 0,
            completed_content: 0,
            progress_percentage: 0.0,
            last_accessed_content: None,
            modules,
        };
        overall.recompute_totals();
        overall
    }

    #[must_use]
    pub fn module(&self, module_id: ModuleId) -> Option<&ModuleProgress> {
        self.modules.iter().find(|m| m.module_id == module_id)
    }

    pub fn module_mut(&mut self, module_id: ModuleId) -> Option<&mut ModuleProgress> {
        self.modules.iter_mut().find(|m| m.module_id == module_id)
    }

    /// Re-derive every total from the per-module figures.
    ///
    /// After this call `total_content` and `completed_content` equal the sums
    /// over `modules`, and each module's `is_accessible` follows its predecessor.
    pub fn recompute_totals(&mut self) {
        let accessible = module_accessibility(&self.modules);
        for (module, is_accessible) in self.modules.iter_mut().zip(accessible) {
            module.is_accessible = is_accessible;
        }

        self.total_modules = u32::try_from(self.modules.len()).unwrap_or(u32::MAX);
        self.completed_modules = u32::try_from(
            self.modules
                .iter()
                .filter(|m| m.is_fully_complete())
                .count(),
        )
        .unwrap_or(u32::MAX);
        self.total_content = self
            .modules
            .iter()
            .fold(0u32, |acc, m| acc.saturating_add(m.total_content));
        self.completed_content = self
            .modules
            .iter()
            .fold(0u32, |acc, m| acc.saturating_add(m.completed_content));
        self.progress_percentage = percentage(self.completed_content, self.total_content);
    }

    /// Optimistically count one more completed item in `module_id`.
    ///
    /// Adds at most one to `completed_content` and never exceeds the totals.
    /// The owning module entry, when present, is bumped the same way.
    pub fn project_completion(&mut self, module_id: ModuleId) {
        self.completed_content = self
            .completed_content
            .saturating_add(1)
            .min(self.total_content);
        self.progress_percentage = percentage(self.completed_content, self.total_content);

        if let Some(module) = self.module_mut(module_id) {
            let next = module.completed_content.saturating_add(1);
            module.set_completed(next);
        }
    }

    /// Take back one projected completion in `module_id`.
    pub fn withdraw_completion(&mut self, module_id: ModuleId) {
        self.completed_content = self.completed_content.saturating_sub(1);
        self.progress_percentage = percentage(self.completed_content, self.total_content);

        if let Some(module) = self.module_mut(module_id) {
            let previous = module.completed_content.saturating_sub(1);
            module.set_completed(previous);
        }
    }

    pub fn stamp_last_accessed(
        &mut self,
        content_id: ContentId,
        module_id: ModuleId,
        at: DateTime<Utc>,
    ) {
        self.last_accessed_content = Some(LastAccessedContent {
            content_id,
            module_id,
            accessed_at: at,
        });
    }
}
