//! Trigger debounce: a breach must hold continuously before it fires.
//!
//! Callers feed metric observations with explicit timestamps, so the
//! monitor never reads a clock and tests are deterministic. Each
//! (decision, trigger kind) pair is tracked independently.

use std::collections::HashMap;

use tracing::debug;

use tmc_types::{RollbackTrigger, RollbackTriggerKind};

#[derive(Debug, Clone, Copy, PartialEq)]
enum TriggerState {
    /// Threshold currently satisfied.
    Clear,
    /// Breach observed, waiting out the debounce window.
    Breaching { since_ms: u64 },
    /// Fired; stays latched until the breach clears.
    Fired,
}

/// Tracks breach durations and decides when a trigger fires.
#[derive(Debug, Default)]
pub struct TriggerMonitor {
    states: HashMap<(String, RollbackTriggerKind), TriggerState>,
}

impl TriggerMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one observation. Returns true exactly once per breach
    /// episode, after the breach has held for the trigger's duration.
    pub fn observe(
        &mut self,
        decision_id: &str,
        trigger: &RollbackTrigger,
        breached: bool,
        now_ms: u64,
    ) -> bool {
        let key = (decision_id.to_string(), trigger.kind);
        let state = self.states.entry(key).or_insert(TriggerState::Clear);

        if !breached {
            *state = TriggerState::Clear;
            return false;
        }

        match *state {
            TriggerState::Clear => {
                *state = TriggerState::Breaching { since_ms: now_ms };
                // A zero-duration trigger fires on the first breach.
                if trigger.duration_ms == 0 {
                    *state = TriggerState::Fired;
                    return true;
                }
                false
            }
            TriggerState::Breaching { since_ms } => {
                if now_ms.saturating_sub(since_ms) >= trigger.duration_ms {
                    debug!(
                        decision = %decision_id,
                        kind = ?trigger.kind,
                        held_ms = now_ms.saturating_sub(since_ms),
                        "trigger fired"
                    );
                    *state = TriggerState::Fired;
                    true
                } else {
                    false
                }
            }
            TriggerState::Fired => false,
        }
    }

    /// Drop all state for a decision, e.g. once it reaches a terminal
    /// phase.
    pub fn forget(&mut self, decision_id: &str) {
        self.states.retain(|(id, _), _| id != decision_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_trigger(duration_ms: u64) -> RollbackTrigger {
        RollbackTrigger {
            kind: RollbackTriggerKind::HealthCheck,
            threshold: 0.5,
            duration_ms,
        }
    }

    #[test]
    fn breach_shorter_than_the_window_never_fires() {
        let mut monitor = TriggerMonitor::new();
        let trigger = make_trigger(1000);

        assert!(!monitor.observe("d-1", &trigger, true, 0));
        assert!(!monitor.observe("d-1", &trigger, true, 999));
        // Clears just before the window elapses.
        assert!(!monitor.observe("d-1", &trigger, false, 1000));
        assert!(!monitor.observe("d-1", &trigger, true, 1500));
        assert!(!monitor.observe("d-1", &trigger, true, 2499));
    }

    #[test]
    fn sustained_breach_fires_exactly_once() {
        let mut monitor = TriggerMonitor::new();
        let trigger = make_trigger(1000);

        assert!(!monitor.observe("d-1", &trigger, true, 0));
        assert!(!monitor.observe("d-1", &trigger, true, 500));
        assert!(monitor.observe("d-1", &trigger, true, 1001));
        // Latched: continued breach does not re-fire.
        assert!(!monitor.observe("d-1", &trigger, true, 2000));
        assert!(!monitor.observe("d-1", &trigger, true, 10_000));
    }

    #[test]
    fn fires_at_exactly_the_window_boundary() {
        let mut monitor = TriggerMonitor::new();
        let trigger = make_trigger(1000);

        assert!(!monitor.observe("d-1", &trigger, true, 100));
        assert!(monitor.observe("d-1", &trigger, true, 1100));
    }

    #[test]
    fn clearing_resets_and_allows_a_second_episode() {
        let mut monitor = TriggerMonitor::new();
        let trigger = make_trigger(1000);

        assert!(!monitor.observe("d-1", &trigger, true, 0));
        assert!(monitor.observe("d-1", &trigger, true, 1000));
        assert!(!monitor.observe("d-1", &trigger, false, 2000));
        // New episode: the window starts over.
        assert!(!monitor.observe("d-1", &trigger, true, 3000));
        assert!(!monitor.observe("d-1", &trigger, true, 3999));
        assert!(monitor.observe("d-1", &trigger, true, 4000));
    }

    #[test]
    fn zero_duration_fires_immediately() {
        let mut monitor = TriggerMonitor::new();
        let trigger = make_trigger(0);
        assert!(monitor.observe("d-1", &trigger, true, 42));
        assert!(!monitor.observe("d-1", &trigger, true, 43));
    }

    #[test]
    fn decisions_and_kinds_are_tracked_independently() {
        let mut monitor = TriggerMonitor::new();
        let health = make_trigger(1000);
        let perf = RollbackTrigger {
            kind: RollbackTriggerKind::PerformanceDegradation,
            threshold: 0.9,
            duration_ms: 1000,
        };

        assert!(!monitor.observe("d-1", &health, true, 0));
        assert!(!monitor.observe("d-2", &health, true, 500));
        assert!(!monitor.observe("d-1", &perf, true, 800));

        assert!(monitor.observe("d-1", &health, true, 1000));
        assert!(!monitor.observe("d-2", &health, true, 1000));
        assert!(monitor.observe("d-2", &health, true, 1500));
        assert!(monitor.observe("d-1", &perf, true, 1800));
    }

    #[test]
    fn forget_drops_the_episode() {
        let mut monitor = TriggerMonitor::new();
        let trigger = make_trigger(1000);

        assert!(!monitor.observe("d-1", &trigger, true, 0));
        monitor.forget("d-1");
        // The window restarts from the next observation.
        assert!(!monitor.observe("d-1", &trigger, true, 900));
        assert!(!monitor.observe("d-1", &trigger, true, 1000));
        assert!(monitor.observe("d-1", &trigger, true, 1900));
    }
}
