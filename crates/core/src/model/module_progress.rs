use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::model::content_progress::ContentProgress;
use crate::model::ids::ModuleId;

/// Percentage of `completed` over `total`, 0 when there is nothing to complete.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn percentage(completed: u32, total: u32) -> f64 {
    if total == 0 {
        return 0.0;
    }
    f64::from(completed) / f64::from(total) * 100.0
}

/// Per-module aggregate of content completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleProgress {
    pub module_id: ModuleId,
    pub total_content: u32,
    pub completed_content: u32,
    pub progress_percentage: f64,
    pub is_accessible: bool,
    pub is_completed: bool,
}

impl ModuleProgress {
    /// Build a module aggregate with derived fields filled in.
    ///
    /// `is_accessible` starts out `false`; it depends on the preceding module
    /// and is filled in by `OverallProgress::recompute_totals`.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::CompletedExceedsTotal` if `completed_content > total_content`.
    pub fn new(
        module_id: ModuleId,
        total_content: u32,
        completed_content: u32,
    ) -> Result<Self, ModelError> {
        if completed_content > total_content {
            return Err(ModelError::CompletedExceedsTotal {
                completed: completed_content,
                total: total_content,
            });
        }
        let mut module = Self {
            module_id,
            total_content,
            completed_content,
            progress_percentage: 0.0,
            is_accessible: false,
            is_completed: false,
        };
        module.refresh_derived();
        Ok(module)
    }

    /// Set the completed count (clamped to the total) and re-derive.
    pub fn set_completed(&mut self, completed: u32) {
        self.completed_content = completed.min(self.total_content);
        self.refresh_derived();
    }

    /// Recount completion from the module's content list.
    ///
    /// The list may hold fewer records than `total_content` when some items
    /// were never started; it never raises the total.
    pub fn recount_from(&mut self, contents: &[ContentProgress]) {
        let completed = contents.iter().filter(|c| c.is_completed).count();
        self.set_completed(u32::try_from(completed).unwrap_or(u32::MAX));
    }

    fn refresh_derived(&mut self) {
        self.progress_percentage = percentage(self.completed_content, self.total_content);
        self.is_completed = self.total_content > 0 && self.completed_content == self.total_content;
    }

    /// Whether the module is at 100 %, which unlocks the next one.
    #[must_use]
    pub fn is_fully_complete(&self) -> bool {
        self.is_completed
    }
}
