//! Reconciliation of snapshots and patches
//!
//! Rules:
//! - a full snapshot replaces the held state;
//! - a patch only overwrites the fields it carries;
//! - the first terminal phase sticks, whatever arrives afterwards.

use runwatch_common::{Phase, SessionSnapshot, StatusPatch};

/// What a single merge did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub changed: bool,
    /// Set on the merge that first reached a terminal phase
    pub entered_terminal: Option<Phase>,
}

#[derive(Debug, Clone, Default)]
pub struct MergeState {
    snapshot: SessionSnapshot,
    terminal: Option<Phase>,
}

impl MergeState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> &SessionSnapshot {
        &self.snapshot
    }

    pub fn terminal(&self) -> Option<Phase> {
        self.terminal
    }

    /// Apply a full snapshot from the poller
    pub fn apply_snapshot(&mut self, mut incoming: SessionSnapshot) -> MergeOutcome {
        if let Some(terminal) = self.terminal {
            incoming.phase = terminal;
        }
        self.commit(incoming)
    }

    /// Apply a partial patch from the push channel
    pub fn apply_patch(&mut self, patch: &StatusPatch) -> MergeOutcome {
        let mut next = self.snapshot.clone();

        if let Some(phase) = patch.phase {
            if self.terminal.is_none() {
                next.phase = phase;
            }
        }
        if let Some(progress) = patch.progress_percent {
            next.progress_percent = progress.min(100);
        }
        if let Some(n) = patch.discovered_count {
            next.discovered_count = n;
        }
        if let Some(n) = patch.passed_count {
            next.passed_count = n;
        }
        if let Some(n) = patch.failed_count {
            next.failed_count = n;
        }
        if let Some(n) = patch.skipped_count {
            next.skipped_count = n;
        }
        if let Some(name) = &patch.current_test_name {
            next.current_test_name = Some(name.clone());
        }

        self.commit(next)
    }

    fn commit(&mut self, next: SessionSnapshot) -> MergeOutcome {
        let changed = next != self.snapshot;
        self.snapshot = next;

        let mut entered_terminal = None;
        if self.terminal.is_none() && self.snapshot.phase.is_terminal() {
            self.terminal = Some(self.snapshot.phase);
            entered_terminal = self.terminal;
        }

        MergeOutcome {
            changed,
            entered_terminal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runwatch_common::{TestOutcome, TestResult};

    fn phase_patch(phase: Phase) -> StatusPatch {
        StatusPatch {
            phase: Some(phase),
            ..Default::default()
        }
    }

    #[test]
    fn test_snapshot_replaces_everything() {
        let mut state = MergeState::new();
        state.apply_patch(&StatusPatch {
            phase: Some(Phase::Discovering),
            progress_percent: Some(10),
            current_test_name: Some("login".to_string()),
            ..Default::default()
        });

        let incoming = SessionSnapshot {
            phase: Phase::Executing,
            progress_percent: 40,
            passed_count: 2,
            ..Default::default()
        };
        let outcome = state.apply_snapshot(incoming.clone());

        assert!(outcome.changed);
        assert_eq!(outcome.entered_terminal, None);
        assert_eq!(state.snapshot(), &incoming);
    }

    #[test]
    fn test_patch_keeps_known_fields() {
        let mut state = MergeState::new();
        state.apply_patch(&StatusPatch {
            passed_count: Some(3),
            current_test_name: Some("checkout".to_string()),
            ..Default::default()
        });
        state.apply_patch(&StatusPatch {
            progress_percent: Some(55),
            ..Default::default()
        });

        let snapshot = state.snapshot();
        assert_eq!(snapshot.passed_count, 3);
        assert_eq!(snapshot.progress_percent, 55);
        assert_eq!(snapshot.current_test_name.as_deref(), Some("checkout"));
    }

    #[test]
    fn test_patch_keeps_results_from_snapshot() {
        let mut state = MergeState::new();
        state.apply_snapshot(SessionSnapshot {
            phase: Phase::Executing,
            results: vec![TestResult {
                test_name: "login".to_string(),
                status: TestOutcome::Passed,
                duration_ms: 900,
                error_message: None,
            }],
            ..Default::default()
        });
        state.apply_patch(&phase_patch(Phase::Analyzing));

        assert_eq!(state.snapshot().phase, Phase::Analyzing);
        assert_eq!(state.snapshot().results.len(), 1);
    }

    #[test]
    fn test_terminal_phase_is_sticky() {
        let mut state = MergeState::new();
        let outcome = state.apply_patch(&phase_patch(Phase::Completed));
        assert_eq!(outcome.entered_terminal, Some(Phase::Completed));

        let outcome = state.apply_patch(&phase_patch(Phase::Executing));
        assert!(!outcome.changed);
        assert_eq!(outcome.entered_terminal, None);

        let outcome = state.apply_snapshot(SessionSnapshot {
            phase: Phase::Failed,
            progress_percent: 100,
            passed_count: 10,
            ..Default::default()
        });
        assert!(outcome.changed);
        assert_eq!(outcome.entered_terminal, None);
        assert_eq!(state.snapshot().phase, Phase::Completed);
        assert_eq!(state.snapshot().passed_count, 10);
        assert_eq!(state.terminal(), Some(Phase::Completed));
    }

    #[test]
    fn test_phase_sequences_never_leave_terminal() {
        let phases = [
            Phase::Initializing,
            Phase::Discovering,
            Phase::Planning,
            Phase::Executing,
            Phase::Analyzing,
            Phase::Completed,
            Phase::Failed,
            Phase::Stopped,
        ];

        // Every (first terminal, later phase) pair, through both merge paths.
        for &terminal in phases.iter().filter(|p| p.is_terminal()) {
            for &later in &phases {
                let mut state = MergeState::new();
                state.apply_patch(&phase_patch(Phase::Executing));
                state.apply_snapshot(SessionSnapshot {
                    phase: terminal,
                    ..Default::default()
                });
                state.apply_patch(&phase_patch(later));
                state.apply_snapshot(SessionSnapshot {
                    phase: later,
                    ..Default::default()
                });
                assert_eq!(state.snapshot().phase, terminal);
            }
        }
    }

    #[test]
    fn test_pre_terminal_phases_may_be_revisited() {
        let mut state = MergeState::new();
        state.apply_patch(&phase_patch(Phase::Executing));
        state.apply_patch(&phase_patch(Phase::Discovering));
        assert_eq!(state.snapshot().phase, Phase::Discovering);
    }

    #[test]
    fn test_identical_patch_reports_no_change() {
        let mut state = MergeState::new();
        let patch = StatusPatch {
            progress_percent: Some(20),
            ..Default::default()
        };
        assert!(state.apply_patch(&patch).changed);
        assert!(!state.apply_patch(&patch).changed);
    }
}
