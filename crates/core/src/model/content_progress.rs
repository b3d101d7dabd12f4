use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ids::ContentId;

//
// ─── CONTENT TYPE ──────────────────────────────────────────────────────────────
//

/// Kind of content item a progress record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Video,
    Pdf,
    RichText,
    Exercise,
}

impl ContentType {
    /// Whether `last_position` carries a resume offset for this kind of content.
    #[must_use]
    pub fn is_resumable(self) -> bool {
        matches!(self, ContentType::Video | ContentType::Pdf)
    }
}

//
// ─── UPDATE PAYLOAD ────────────────────────────────────────────────────────────
//

/// Body of the single progress write operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub is_completed: bool,
    pub time_spent: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_position: Option<f64>,
}

impl ProgressUpdate {
    /// Marks the item completed after `time_spent` seconds.
    #[must_use]
    pub fn completed(time_spent: u64) -> Self {
        Self {
            is_completed: true,
            time_spent,
            last_position: None,
        }
    }

    /// A partial time-tracking update that leaves completion untouched.
    #[must_use]
    pub fn time_tracking(time_spent: u64, last_position: Option<f64>) -> Self {
        Self {
            is_completed: false,
            time_spent,
            last_position,
        }
    }
}

//
// ─── CONTENT PROGRESS ──────────────────────────────────────────────────────────
//

/// Per-user progress on one content item, as returned by the progress API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentProgress {
    pub content_id: ContentId,
    pub content_type: ContentType,
    pub is_completed: bool,
    pub time_spent: u64,
    #[serde(default)]
    pub last_position: Option<f64>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl ContentProgress {
    /// A fresh, untouched record.
    #[must_use]
    pub fn not_started(
        content_id: ContentId,
        content_type: ContentType,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            content_id,
            content_type,
            is_completed: false,
            time_spent: 0,
            last_position: None,
            completed_at: None,
            updated_at: now,
        }
    }

    /// Local projection of `update` onto this record.
    ///
    /// Completion never reverts, `time_spent` never decreases and
    /// `completed_at` is stamped only on the first transition.
    #[must_use]
    pub fn apply_update(&self, update: &ProgressUpdate, now: DateTime<Utc>) -> Self {
        let is_completed = self.is_completed || update.is_completed;
        let completed_at = match self.completed_at {
            Some(at) => Some(at),
            None if is_completed => Some(now),
            None => None,
        };

        Self {
            content_id: self.content_id,
            content_type: self.content_type,
            is_completed,
            time_spent: self.time_spent.max(update.time_spent),
            last_position: update.last_position.or(self.last_position),
            completed_at,
            updated_at: now,
        }
    }

    /// Merges a server record over this one without losing completion.
    ///
    /// The server copy wins on every field except that a record already
    /// observed as completed stays completed for this session.
    #[must_use]
    pub fn reconcile(&self, server: ContentProgress) -> Self {
        if self.is_completed && !server.is_completed {
            return Self {
                is_completed: true,
                completed_at: server.completed_at.or(self.completed_at),
                ..server
            };
        }
        server
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
