//! Sequential gating of content items and modules.
//!
//! Item N of an ordered list is reachable only once item N-1 is completed;
//! item 0 always is. Gates are derived on every read from the ordered list
//! and a completion predicate, nothing here is stored.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{ContentId, ModuleProgress};

/// Derived navigation state of a content item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentGate {
    /// The predecessor is not completed yet.
    Locked,
    /// Reachable, not completed.
    Unlockable,
    Completed,
}

impl ContentGate {
    #[must_use]
    pub fn is_accessible(self) -> bool {
        !matches!(self, ContentGate::Locked)
    }
}

/// Rejection returned when navigating to a locked item.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum GateError {
    #[error("Complete the previous item to unlock this content.")]
    Locked { content_id: ContentId },

    #[error("content {content_id} is not part of this module")]
    NotInModule { content_id: ContentId },
}

/// Gate of the item at `index` in `ordered`.
///
/// Reachability comes first: an item whose predecessor is not completed is
/// `Locked` even if it is itself completed, so the gate always agrees with
/// [`is_accessible`]. An index outside the list is reported as locked.
pub fn gate_at<F>(ordered: &[ContentId], index: usize, is_completed: F) -> ContentGate
where
    F: Fn(ContentId) -> bool,
{
    let Some(&content_id) = ordered.get(index) else {
        return ContentGate::Locked;
    };
    if !reachable_at(ordered, index, &is_completed) {
        ContentGate::Locked
    } else if is_completed(content_id) {
        ContentGate::Completed
    } else {
        ContentGate::Unlockable
    }
}

fn reachable_at<F>(ordered: &[ContentId], index: usize, is_completed: F) -> bool
where
    F: Fn(ContentId) -> bool,
{
    index == 0 || ordered.get(index - 1).is_some_and(|prev| is_completed(*prev))
}

/// Gate of `content_id`, or `None` when it is not in `ordered`.
pub fn gate_of<F>(content_id: ContentId, ordered: &[ContentId], is_completed: F) -> Option<ContentGate>
where
    F: Fn(ContentId) -> bool,
{
    let index = ordered.iter().position(|id| *id == content_id)?;
    Some(gate_at(ordered, index, is_completed))
}

/// Accessibility by position: index 0, or a completed predecessor.
pub fn is_accessible<F>(content_id: ContentId, ordered: &[ContentId], is_completed: F) -> bool
where
    F: Fn(ContentId) -> bool,
{
    ordered
        .iter()
        .position(|id| *id == content_id)
        .is_some_and(|index| reachable_at(ordered, index, is_completed))
}

/// Gates for a whole ordered list.
pub fn gates<F>(ordered: &[ContentId], is_completed: F) -> Vec<ContentGate>
where
    F: Fn(ContentId) -> bool,
{
    (0..ordered.len())
        .map(|index| gate_at(ordered, index, &is_completed))
        .collect()
}

/// Reject navigation to a locked item.
///
/// # Errors
///
/// Returns `GateError::Locked` when the predecessor is not completed, or
/// `GateError::NotInModule` when the item is not in `ordered`.
pub fn ensure_navigable<F>(
    content_id: ContentId,
    ordered: &[ContentId],
    is_completed: F,
) -> Result<ContentGate, GateError>
where
    F: Fn(ContentId) -> bool,
{
    match gate_of(content_id, ordered, is_completed) {
        None => Err(GateError::NotInModule { content_id }),
        Some(ContentGate::Locked) => Err(GateError::Locked { content_id }),
        Some(gate) => Ok(gate),
    }
}

/// Module-level gating: the first module, or one whose predecessor is at 100 %.
#[must_use]
pub fn module_accessibility(modules: &[ModuleProgress]) -> Vec<bool> {
    modules
        .iter()
        .enumerate()
        .map(|(index, _)| index == 0 || modules[index - 1].is_fully_complete())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;
    use uuid::Uuid;

    fn ids(n: usize) -> Vec<ContentId> {
        (0..n)
            .map(|i| ContentId::new(Uuid::from_u128(i as u128 + 1)))
            .collect()
    }

    #[test]
    fn nothing_completed_only_first_is_open() {
        let ordered = ids(3);
        let none = |_: ContentId| false;

        assert!(is_accessible(ordered[0], &ordered, none));
        assert!(!is_accessible(ordered[1], &ordered, none));
        assert!(!is_accessible(ordered[2], &ordered, none));
        assert_eq!(
            gates(&ordered, none),
            vec![
                ContentGate::Unlockable,
                ContentGate::Locked,
                ContentGate::Locked
            ]
        );
    }

    #[test]
    fn completing_first_unlocks_second_only() {
        let ordered = ids(3);
        let done: HashSet<_> = [ordered[0]].into_iter().collect();
        let completed = |id: ContentId| done.contains(&id);

        assert_eq!(
            gates(&ordered, completed),
            vec![
                ContentGate::Completed,
                ContentGate::Unlockable,
                ContentGate::Locked
            ]
        );
    }

    #[test]
    fn unknown_item_is_not_accessible() {
        let ordered = ids(2);
        let stranger = ContentId::new(Uuid::from_u128(99));
        assert!(!is_accessible(stranger, &ordered, |_| true));
        assert_eq!(
            ensure_navigable(stranger, &ordered, |_| true),
            Err(GateError::NotInModule {
                content_id: stranger
            })
        );
    }

    #[test]
    fn locked_navigation_carries_user_message() {
        let ordered = ids(2);
        let err = ensure_navigable(ordered[1], &ordered, |_| false).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Complete the previous item to unlock this content."
        );
    }

    #[test]
    fn modules_gate_on_full_completion() {
        let m = |n: u128, total, done| {
            ModuleProgress::new(crate::model::ModuleId::new(Uuid::from_u128(n)), total, done)
                .unwrap()
        };
        let modules = vec![m(1, 2, 2), m(2, 2, 1), m(3, 0, 0)];
        assert_eq!(module_accessibility(&modules), vec![true, true, false]);
    }

    #[test]
    fn completed_item_behind_an_open_one_stays_locked() {
        let ordered = ids(3);
        let done: HashSet<_> = [ordered[2]].into_iter().collect();
        let completed = |id: ContentId| done.contains(&id);

        assert!(!is_accessible(ordered[2], &ordered, completed));
        assert_eq!(gate_of(ordered[2], &ordered, completed), Some(ContentGate::Locked));
        assert_eq!(
            ensure_navigable(ordered[2], &ordered, completed),
            Err(GateError::Locked {
                content_id: ordered[2]
            })
        );
    }

    proptest! {
        #[test]
        fn completed_item_opens_exactly_the_next(n in 2usize..12, k_seed in 0usize..64) {
            let ordered = ids(n);
            let k = k_seed % (n - 1);
            let done = ordered[k];
            let completed = |id: ContentId| id == done;

            prop_assert!(is_accessible(ordered[k + 1], &ordered, completed));
            for later in &ordered[k + 2..] {
                prop_assert!(!is_accessible(*later, &ordered, completed));
            }
        }

        #[test]
        fn prefix_completion_opens_prefix_plus_one(n in 1usize..12, done_seed in 0usize..64) {
            let ordered = ids(n);
            let done = done_seed % (n + 1);
            let set: HashSet<_> = ordered[..done].iter().copied().collect();
            let gates = gates(&ordered, |id| set.contains(&id));

            for (index, gate) in gates.iter().enumerate() {
                prop_assert_eq!(gate.is_accessible(), index <= done);
            }
        }

        #[test]
        fn gate_and_accessibility_agree(n in 1usize..10, mask in 0u32..1024) {
            let ordered = ids(n);
            let completed = |id: ContentId| {
                ordered
                    .iter()
                    .position(|c| *c == id)
                    .is_some_and(|i| mask & (1 << i) != 0)
            };
            for (index, id) in ordered.iter().enumerate() {
                prop_assert_eq!(
                    gate_at(&ordered, index, completed).is_accessible(),
                    is_accessible(*id, &ordered, completed)
                );
            }
        }
    }
}
