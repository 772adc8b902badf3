//! Membership diff engine.
//!
//! Computes the remote mutations needed to move a resource's membership set
//! (share assets, share recipients, recipient IP lists) from its observed
//! state to the desired state. Two input modes are supported: a declarative
//! full-membership list, or incremental add/remove lists.
//!
//! Contradictory membership lists (the same value requested as both present
//! and removed) are rejected by [`crate::config::PackValidator`] before a run
//! touches the platform; the diff itself is pure set arithmetic.

use std::collections::BTreeSet;
use tracing::debug;

/// Engine for computing membership diffs.
#[derive(Debug, Default)]
pub struct DiffEngine;

/// The mutations needed to converge one membership set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MembershipDiff {
    /// Elements to add remotely.
    pub add: BTreeSet<String>,
    /// Elements to remove remotely.
    pub remove: BTreeSet<String>,
}

impl DiffEngine {
    /// Creates a new diff engine.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes the membership diff for one field of one resource.
    ///
    /// Modes:
    /// - `desired_full` non-empty: declarative replace.
    ///   `add = desired_full - current`, `remove = current - desired_full`.
    /// - otherwise, either incremental list non-empty:
    ///   `add = to_add - current`, `remove = to_remove ∩ current`. Removal
    ///   only ever touches explicitly requested elements, never implied ones.
    /// - all empty: no-op. Absent membership means "leave untouched", not
    ///   "empty membership".
    #[must_use]
    pub fn diff(
        &self,
        owner: &str,
        field: &str,
        desired_full: &BTreeSet<String>,
        to_add: &BTreeSet<String>,
        to_remove: &BTreeSet<String>,
        current: &BTreeSet<String>,
    ) -> MembershipDiff {
        let diff = if desired_full.is_empty() {
            if to_add.is_empty() && to_remove.is_empty() {
                MembershipDiff::default()
            } else {
                MembershipDiff {
                    add: to_add.difference(current).cloned().collect(),
                    remove: to_remove.intersection(current).cloned().collect(),
                }
            }
        } else {
            MembershipDiff {
                add: desired_full.difference(current).cloned().collect(),
                remove: current.difference(desired_full).cloned().collect(),
            }
        };

        if !diff.is_empty() {
            debug!(
                "{owner}.{field}: {} to add, {} to remove",
                diff.add.len(),
                diff.remove.len()
            );
        }

        diff
    }

    /// Computes the diff that drives `current` to exactly `target`.
    ///
    /// Unlike [`Self::diff`], an empty target means genuinely empty, not
    /// "leave untouched". Used to restore a captured prior membership, which
    /// is an observed set rather than a document field.
    #[must_use]
    pub fn toward(
        &self,
        owner: &str,
        field: &str,
        target: &BTreeSet<String>,
        current: &BTreeSet<String>,
    ) -> MembershipDiff {
        let diff = MembershipDiff {
            add: target.difference(current).cloned().collect(),
            remove: current.difference(target).cloned().collect(),
        };
        if !diff.is_empty() {
            debug!(
                "{owner}.{field}: restoring, {} to add, {} to remove",
                diff.add.len(),
                diff.remove.len()
            );
        }
        diff
    }
}

impl MembershipDiff {
    /// Returns true if no mutation is needed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }

    /// Returns the total number of mutations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.add.len() + self.remove.len()
    }

    /// Applies the diff to a membership set, returning the converged set.
    #[must_use]
    pub fn apply_to(&self, current: &BTreeSet<String>) -> BTreeSet<String> {
        let mut result: BTreeSet<String> = current.union(&self.add).cloned().collect();
        for removed in &self.remove {
            result.remove(removed);
        }
        result
    }
}

impl std::fmt::Display for MembershipDiff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "+{} -{}", self.add.len(), self.remove.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_incremental_diff() {
        let engine = DiffEngine::new();
        let diff = engine.diff(
            "sales",
            "assets",
            &set(&[]),
            &set(&["a", "b"]),
            &set(&["b", "c"]),
            &set(&["b", "x"]),
        );
        // "b" is already current so it is not re-added; "c" is not currently
        // present so it is not removed; "x" was never requested for removal.
        assert_eq!(diff.add, set(&["a"]));
        assert_eq!(diff.remove, set(&["b"]));
    }

    #[test]
    fn test_declarative_replace() {
        let engine = DiffEngine::new();
        let diff = engine.diff(
            "sales",
            "assets",
            &set(&["a", "b"]),
            &set(&[]),
            &set(&[]),
            &set(&["b", "x"]),
        );
        assert_eq!(diff.add, set(&["a"]));
        assert_eq!(diff.remove, set(&["x"]));
    }

    #[test]
    fn test_absent_membership_is_noop() {
        let engine = DiffEngine::new();
        let diff = engine.diff(
            "sales",
            "assets",
            &set(&[]),
            &set(&[]),
            &set(&[]),
            &set(&["b", "x"]),
        );
        assert!(diff.is_empty());
    }

    #[test]
    fn test_declarative_matching_is_noop() {
        let engine = DiffEngine::new();
        let diff = engine.diff(
            "sales",
            "assets",
            &set(&["a", "b"]),
            &set(&[]),
            &set(&[]),
            &set(&["a", "b"]),
        );
        assert!(diff.is_empty());
        assert_eq!(diff.len(), 0);
    }

    #[test]
    fn test_toward_empty_target_drains() {
        let engine = DiffEngine::new();
        let diff = engine.toward("sales", "assets", &set(&[]), &set(&["a", "b"]));
        assert!(diff.add.is_empty());
        assert_eq!(diff.remove, set(&["a", "b"]));
    }

    #[test]
    fn test_apply_to() {
        let diff = MembershipDiff {
            add: set(&["a"]),
            remove: set(&["x"]),
        };
        assert_eq!(diff.apply_to(&set(&["b", "x"])), set(&["a", "b"]));
    }
}
