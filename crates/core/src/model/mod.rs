mod content_progress;
mod ids;
mod module_progress;
mod overall_progress;

pub use content_progress::{ContentProgress, ContentType, ProgressUpdate};
pub use ids::{ContentId, ModuleId, ParseIdError};
pub use module_progress::{ModuleProgress, percentage};
pub use overall_progress::{LastAccessedContent, OverallProgress};
