//! Per-phase lifecycle tracking.
//!
//! Transitions are monotonic: NotStarted → Running → Completed | TimedOut.
//! A phase that has finished never re-enters Running.

use std::collections::BTreeMap;

use log::warn;
use serde::Serialize;

use crate::core::Phase;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PhaseState {
    NotStarted,
    Running,
    Completed,
    TimedOut,
}

impl PhaseState {
    pub fn can_advance_to(self, next: PhaseState) -> bool {
        matches!(
            (self, next),
            (PhaseState::NotStarted, PhaseState::Running)
                | (PhaseState::Running, PhaseState::Completed)
                | (PhaseState::Running, PhaseState::TimedOut)
        )
    }

    pub fn is_finished(self) -> bool {
        matches!(self, PhaseState::Completed | PhaseState::TimedOut)
    }
}

impl std::fmt::Display for PhaseState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PhaseState::NotStarted => write!(f, "skipped"),
            PhaseState::Running => write!(f, "running"),
            PhaseState::Completed => write!(f, "completed"),
            PhaseState::TimedOut => write!(f, "timed out"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PhaseTracker {
    states: BTreeMap<Phase, PhaseState>,
}

impl PhaseTracker {
    pub fn new() -> Self {
        Self {
            states: Phase::ORDER.iter().map(|p| (*p, PhaseState::NotStarted)).collect(),
        }
    }

    pub fn state(&self, phase: Phase) -> PhaseState {
        self.states.get(&phase).copied().unwrap_or(PhaseState::NotStarted)
    }

    /// Moves `phase` to `next`. Illegal transitions are refused and logged.
    pub fn advance(&mut self, phase: Phase, next: PhaseState) -> bool {
        let current = self.state(phase);
        if !current.can_advance_to(next) {
            warn!("Refusing phase transition {} : {:?} -> {:?}", phase, current, next);
            return false;
        }
        self.states.insert(phase, next);
        true
    }

    /// Final states in execution order.
    pub fn snapshot(&self) -> Vec<(Phase, PhaseState)> {
        Phase::ORDER.iter().map(|p| (*p, self.state(*p))).collect()
    }
}

impl Default for PhaseTracker {
    fn default() -> Self {
        Self::new()
    }
}
