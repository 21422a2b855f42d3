use std::sync::{Arc, PoisonError, RwLock};

use crate::types::Step;

/// Append-only step history shared between the loop and its observers.
#[derive(Debug, Clone, Default)]
pub struct Trajectory {
    steps: Arc<RwLock<Vec<Step>>>,
}

impl Trajectory {
    pub fn push(&self, step: Step) {
        tracing::trace!(action = ?step.action, result = %step.result, "step");
        self.steps
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(step);
    }

    pub fn len(&self) -> usize {
        self.steps.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<Step> {
        self.steps.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// The last `n` steps, oldest first.
    pub fn recent(&self, n: usize) -> Vec<Step> {
        let steps = self.steps.read().unwrap_or_else(PoisonError::into_inner);
        let start = steps.len().saturating_sub(n);
        steps[start..].to_vec()
    }
}
