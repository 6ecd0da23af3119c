// src/build/progress.rs

use std::collections::BTreeMap;

use crate::types::BuildTarget;

/// Folds per-target completion counts into one forward-only value.
///
/// The aggregate is the *minimum* count across active targets, so the
/// reported value tracks the slowest target. Candidates below the last
/// reported value are dropped, which keeps the output non-decreasing even
/// when reports from concurrent targets arrive out of order.
#[derive(Debug, Clone, Default)]
pub struct ProgressAggregator {
    completed_by_target: BTreeMap<BuildTarget, u64>,
    total: u64,
    last_reported: u64,
}

impl ProgressAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a new build with `targets`, each processing `total`
    /// files.
    pub fn reset(&mut self, targets: &[BuildTarget], total: u64) {
        self.completed_by_target = targets.iter().map(|t| (*t, 0)).collect();
        self.total = total;
        self.last_reported = 0;
    }

    /// Record that `target` has finished `completed` files.
    ///
    /// Returns the aggregate to display, or `None` if the update would move
    /// the value backwards. Reports for targets outside the current build
    /// are ignored.
    pub fn report(&mut self, target: BuildTarget, completed: u64) -> Option<u64> {
        let slot = self.completed_by_target.get_mut(&target)?;
        *slot = completed;

        let candidate = self
            .completed_by_target
            .values()
            .copied()
            .min()
            .unwrap_or(0);
        if candidate < self.last_reported {
            return None;
        }
        self.last_reported = candidate;
        Some(candidate)
    }

    /// Force the final value to the total file count.
    pub fn complete(&mut self) -> u64 {
        for count in self.completed_by_target.values_mut() {
            *count = self.total;
        }
        self.last_reported = self.total;
        self.total
    }

    /// Target holding the aggregate back; the first one on ties.
    pub fn slowest(&self) -> Option<BuildTarget> {
        self.completed_by_target
            .iter()
            .min_by_key(|(_, count)| **count)
            .map(|(target, _)| *target)
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn last_reported(&self) -> u64 {
        self.last_reported
    }

    pub fn targets(&self) -> impl Iterator<Item = BuildTarget> + '_ {
        self.completed_by_target.keys().copied()
    }
}
