//! Plan - Ordered Effects derived from a RouteDiff
//!
//! Puts come first, then deletes. The plan is split into batches that respect
//! the store's batch-size ceiling.

use crate::differ::RouteDiff;
use crate::effect::Effect;

#[derive(Debug, Clone, Default)]
pub struct Plan {
    effects: Vec<Effect>,
}

impl Plan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_diff(diff: &RouteDiff) -> Self {
        let mut plan = Self::new();
        for route in &diff.added {
            plan.add(Effect::Put(route.to_persisted()));
        }
        for record in &diff.removed {
            plan.add(Effect::Delete(record.key.clone()));
        }
        plan
    }

    pub fn add(&mut self, effect: Effect) {
        self.effects.push(effect);
    }

    pub fn effects(&self) -> &[Effect] {
        &self.effects
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    /// Split into batches of at most `max_batch_size` effects (minimum 1)
    pub fn batches(&self, max_batch_size: usize) -> std::slice::Chunks<'_, Effect> {
        self.effects.chunks(max_batch_size.max(1))
    }

    pub fn summary(&self) -> PlanSummary {
        let mut summary = PlanSummary::default();
        for effect in &self.effects {
            match effect {
                Effect::Put(_) => summary.put += 1,
                Effect::Delete(_) => summary.delete += 1,
            }
        }
        summary
    }
}

#[derive(Debug, Default)]
pub struct PlanSummary {
    pub put: usize,
    pub delete: usize,
}

impl std::fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Plan: {} to put, {} to delete", self.put, self.delete)
    }
}
