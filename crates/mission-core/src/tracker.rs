use serde::Serialize;
use tracing::{debug, info};

use crate::event::TerminalEvent;
use crate::mission::{Mission, MissionSet};

/// Progress through the mission list. `current_index == total` means every
/// mission is complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MissionState {
    pub current_index: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Active(usize),
    Complete,
}

impl MissionState {
    pub fn phase(&self) -> Phase {
        if self.current_index < self.total {
            Phase::Active(self.current_index)
        } else {
            Phase::Complete
        }
    }

    pub fn is_complete(&self) -> bool {
        self.phase() == Phase::Complete
    }

    pub fn completed(&self) -> usize {
        self.current_index
    }
}

/// Emitted when the active mission's listener matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Advance {
    /// Index of the mission that was just completed.
    pub mission: usize,
    pub state: MissionState,
}

/// Owns the mission list and the single live cursor into it.
///
/// Only the mission at the cursor is ever evaluated, and the cursor only moves
/// forward, so missions complete strictly in order.
#[derive(Debug)]
pub struct MissionTracker {
    missions: MissionSet,
    current: usize,
}

impl MissionTracker {
    pub fn new(missions: MissionSet) -> Self {
        Self {
            missions,
            current: 0,
        }
    }

    pub fn missions(&self) -> &MissionSet {
        &self.missions
    }

    pub fn state(&self) -> MissionState {
        MissionState {
            current_index: self.current,
            total: self.missions.len(),
        }
    }

    pub fn active(&self) -> Option<&Mission> {
        self.missions.get(self.current)
    }

    pub fn observe(&mut self, event: &TerminalEvent) -> Option<Advance> {
        let mission = self.active()?;
        if mission.target() != event.kind {
            return None;
        }
        if !mission.matcher().is_match(&event.content) {
            debug!(
                mission = self.current,
                kind = %event.kind,
                "event did not satisfy active mission"
            );
            return None;
        }

        info!(
            mission = self.current,
            title = mission.title(),
            kind = %event.kind,
            "mission completed"
        );
        let completed = self.current;
        self.current += 1;
        Some(Advance {
            mission: completed,
            state: self.state(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;
    use crate::matcher::{Listener, ListenerKind};
    use crate::mission::MissionDefinition;

    fn mission(target: EventKind, kind: ListenerKind, pattern: &str) -> MissionDefinition {
        MissionDefinition {
            title: pattern.into(),
            prompt: String::new(),
            description: String::new(),
            listener: Listener {
                kind,
                target,
                pattern: pattern.into(),
            },
        }
    }

    fn tracker(definitions: Vec<MissionDefinition>) -> MissionTracker {
        MissionTracker::new(MissionSet::compile(definitions).unwrap())
    }

    #[test]
    fn empty_mission_list_starts_complete() {
        let tracker = tracker(Vec::new());
        assert_eq!(tracker.state().phase(), Phase::Complete);
        assert!(tracker.active().is_none());
    }

    #[test]
    fn events_of_the_wrong_kind_are_ignored() {
        let mut tracker = tracker(vec![mission(
            EventKind::Command,
            ListenerKind::Exact,
            "ls",
        )]);
        assert_eq!(tracker.observe(&TerminalEvent::output("ls")), None);
        assert_eq!(tracker.state().phase(), Phase::Active(0));
        assert!(tracker.observe(&TerminalEvent::command("ls")).is_some());
    }

    #[test]
    fn non_matching_event_leaves_state_untouched() {
        let mut tracker = tracker(vec![mission(
            EventKind::Command,
            ListenerKind::Regex,
            "^go$",
        )]);
        let before = tracker.state();
        assert_eq!(tracker.observe(&TerminalEvent::command("go away")), None);
        assert_eq!(tracker.state(), before);
    }

    #[test]
    fn missions_complete_strictly_in_order() {
        let mut tracker = tracker(vec![
            mission(EventKind::Command, ListenerKind::Exact, "first"),
            mission(EventKind::Command, ListenerKind::Exact, "second"),
        ]);

        // Satisfying the later mission first does nothing.
        assert_eq!(tracker.observe(&TerminalEvent::command("second")), None);
        assert_eq!(tracker.state().completed(), 0);

        let advance = tracker.observe(&TerminalEvent::command("first")).unwrap();
        assert_eq!(advance.mission, 0);
        assert_eq!(advance.state.phase(), Phase::Active(1));

        // Repeating the completed mission's input does not advance again.
        assert_eq!(tracker.observe(&TerminalEvent::command("first")), None);

        let advance = tracker.observe(&TerminalEvent::command("second")).unwrap();
        assert_eq!(advance.mission, 1);
        assert!(advance.state.is_complete());
        assert_eq!(tracker.observe(&TerminalEvent::command("second")), None);
    }

    #[test]
    fn output_listener_matches_multiline_output() {
        let mut tracker = tracker(vec![mission(
            EventKind::Output,
            ListenerKind::Regex,
            "total \\d+.*README",
        )]);
        let advance = tracker
            .observe(&TerminalEvent::output("total 8\ndrwxr-x .\n-rw-r-- README.md\n"))
            .unwrap();
        assert_eq!(
            advance.state,
            MissionState {
                current_index: 1,
                total: 1
            }
        );
    }

    #[test]
    fn state_serializes_with_client_field_names() {
        let state = MissionState {
            current_index: 1,
            total: 3,
        };
        let json = serde_json::to_value(state).unwrap();
        assert_eq!(json["currentIndex"], 1);
        assert_eq!(json["total"], 3);
    }
}
