use crate::{DrawError, Result};
use fastbreak_core::teams::{is_known_team, NBA_TEAMS, TEAM_COUNT};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Split on newlines or commas, trim, and drop empty entries.
pub fn parse_usernames(raw: &str) -> Vec<String> {
    raw.split(|c| c == '\n' || c == ',')
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    First,
    Second,
}

/// A two-team slot built by the operator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComboSlot {
    pub id: usize,
    pub first: Option<String>,
    pub second: Option<String>,
}

impl ComboSlot {
    fn new(id: usize) -> Self {
        Self {
            id,
            first: None,
            second: None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.first.is_some() && self.second.is_some()
    }

    pub fn contains(&self, team: &str) -> bool {
        self.first.as_deref() == Some(team) || self.second.as_deref() == Some(team)
    }

    pub fn pair(&self) -> Option<(String, String)> {
        Some((self.first.clone()?, self.second.clone()?))
    }

    fn slot_mut(&mut self, slot: Slot) -> &mut Option<String> {
        match slot {
            Slot::First => &mut self.first,
            Slot::Second => &mut self.second,
        }
    }
}

/// Partition of the canonical teams into combos and singles for one round.
///
/// A team can sit in at most one combo slot; `place` refuses anything else,
/// so overlap is impossible rather than validated after the fact.
#[derive(Debug, Clone)]
pub struct TeamLayout {
    participants: usize,
    combos: Vec<ComboSlot>,
}

impl TeamLayout {
    pub fn new(participants: usize) -> Result<Self> {
        if participants == 0 || participants > TEAM_COUNT {
            return Err(DrawError::layout(format!(
                "participant count must be between 1 and {}, got {}",
                TEAM_COUNT, participants
            )));
        }

        let combos = (0..TEAM_COUNT - participants).map(ComboSlot::new).collect();

        Ok(Self {
            participants,
            combos,
        })
    }

    pub fn participants(&self) -> usize {
        self.participants
    }

    pub fn combos(&self) -> &[ComboSlot] {
        &self.combos
    }

    pub fn combo_count(&self) -> usize {
        self.combos.len()
    }

    pub fn is_team_used(&self, team: &str) -> bool {
        self.combos.iter().any(|c| c.contains(team))
    }

    /// Put `team` into a combo slot. Returns false, leaving the layout
    /// untouched, for unknown teams, unknown combos, or teams already placed.
    pub fn place(&mut self, combo: usize, slot: Slot, team: &str) -> bool {
        if !is_known_team(team) || self.is_team_used(team) {
            return false;
        }

        match self.combos.get_mut(combo) {
            Some(c) => {
                *c.slot_mut(slot) = Some(team.to_string());
                true
            }
            None => false,
        }
    }

    /// Fill both slots of a combo, or neither.
    pub fn pair(&mut self, combo: usize, first: &str, second: &str) -> bool {
        if first == second || !self.place(combo, Slot::First, first) {
            return false;
        }
        if !self.place(combo, Slot::Second, second) {
            self.remove(combo, Slot::First);
            return false;
        }
        true
    }

    pub fn remove(&mut self, combo: usize, slot: Slot) -> Option<String> {
        self.combos.get_mut(combo)?.slot_mut(slot).take()
    }

    pub fn clear(&mut self) {
        for combo in &mut self.combos {
            combo.first = None;
            combo.second = None;
        }
    }

    /// Canonical teams not used by any combo; these become the singles.
    pub fn available_teams(&self) -> Vec<String> {
        NBA_TEAMS
            .iter()
            .filter(|team| !self.is_team_used(team))
            .map(|team| team.to_string())
            .collect()
    }

    pub fn incomplete_count(&self) -> usize {
        self.combos.iter().filter(|c| !c.is_complete()).count()
    }

    pub fn is_complete(&self) -> bool {
        self.incomplete_count() == 0
    }
}

/// One round's input, as submitted with the commit transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentRequest {
    pub usernames: Vec<String>,
    pub single_teams: Vec<String>,
    pub combo_pairs: Vec<(String, String)>,
}

impl AssignmentRequest {
    pub fn participant_count(&self) -> usize {
        self.usernames.len()
    }

    pub fn slot_count(&self) -> usize {
        self.single_teams.len() + self.combo_pairs.len()
    }

    /// Combos as the contract expects them: "<team1>, <team2>".
    pub fn combo_strings(&self) -> Vec<String> {
        self.combo_pairs
            .iter()
            .map(|(a, b)| format!("{}, {}", a, b))
            .collect()
    }

    pub fn validate(&self) -> Result<()> {
        if self.usernames.is_empty() {
            return Err(DrawError::EmptyUsernames);
        }

        if self.slot_count() != self.participant_count() {
            return Err(DrawError::SlotMismatch {
                singles: self.single_teams.len(),
                combos: self.combo_pairs.len(),
                participants: self.participant_count(),
            });
        }

        let mut seen = HashSet::new();
        let teams = self
            .single_teams
            .iter()
            .chain(self.combo_pairs.iter().flat_map(|(a, b)| [a, b]));
        for team in teams {
            if !seen.insert(team.as_str()) {
                return Err(DrawError::layout(format!("team used twice: {}", team)));
            }
        }

        Ok(())
    }
}

/// Normalize raw input against a layout into a submittable request.
pub fn build_request(raw_usernames: &str, layout: &TeamLayout) -> Result<AssignmentRequest> {
    let usernames = parse_usernames(raw_usernames);

    if usernames.is_empty() {
        return Err(DrawError::EmptyUsernames);
    }

    if usernames.len() != layout.participants() {
        return Err(DrawError::ParticipantCount {
            expected: layout.participants(),
            actual: usernames.len(),
        });
    }

    if !layout.is_complete() {
        return Err(DrawError::IncompleteCombos {
            incomplete: layout.incomplete_count(),
        });
    }

    let request = AssignmentRequest {
        usernames,
        single_teams: layout.available_teams(),
        combo_pairs: layout.combos().iter().filter_map(ComboSlot::pair).collect(),
    };
    request.validate()?;

    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(n: usize) -> String {
        (1..=n)
            .map(|i| format!("user{}", i))
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn test_parse_usernames() {
        assert!(parse_usernames("").is_empty());
        assert!(parse_usernames("   ").is_empty());
        assert_eq!(parse_usernames("a,,b"), vec!["a", "b"]);
        assert_eq!(
            parse_usernames(" alice \n bob, carol\n\n"),
            vec!["alice", "bob", "carol"]
        );
    }

    #[test]
    fn test_layout_combo_count() {
        assert_eq!(TeamLayout::new(30).unwrap().combo_count(), 0);
        assert_eq!(TeamLayout::new(28).unwrap().combo_count(), 2);
        assert!(TeamLayout::new(0).is_err());
        assert!(TeamLayout::new(31).is_err());
    }

    #[test]
    fn test_place_refuses_reuse() {
        let mut layout = TeamLayout::new(28).unwrap();

        assert!(layout.place(0, Slot::First, "Boston Celtics"));
        assert!(!layout.place(0, Slot::Second, "Boston Celtics"));
        assert!(!layout.place(1, Slot::First, "Boston Celtics"));
        assert!(!layout.place(1, Slot::First, "Seattle SuperSonics"));
        assert!(!layout.place(5, Slot::First, "Utah Jazz"));

        assert_eq!(layout.remove(0, Slot::First).as_deref(), Some("Boston Celtics"));
        assert!(layout.place(1, Slot::First, "Boston Celtics"));
    }

    #[test]
    fn test_pair_is_all_or_nothing() {
        let mut layout = TeamLayout::new(29).unwrap();
        assert!(!layout.pair(0, "Miami Heat", "Miami Heat"));
        assert!(!layout.pair(0, "Miami Heat", "Nope"));
        assert!(!layout.is_team_used("Miami Heat"));
        assert!(layout.pair(0, "Miami Heat", "Utah Jazz"));
        assert!(layout.is_complete());
    }

    #[test]
    fn test_build_request_full_slate() {
        let layout = TeamLayout::new(30).unwrap();
        let request = build_request(&names(30), &layout).unwrap();

        assert_eq!(request.single_teams.len(), 30);
        assert!(request.combo_pairs.is_empty());
        assert_eq!(request.slot_count(), request.participant_count());
    }

    #[test]
    fn test_build_request_with_combos() {
        let mut layout = TeamLayout::new(28).unwrap();
        assert!(layout.pair(0, "Miami Heat", "Utah Jazz"));
        assert!(layout.pair(1, "Orlando Magic", "Brooklyn Nets"));

        let request = build_request(&names(28), &layout).unwrap();
        assert_eq!(request.single_teams.len(), 26);
        assert_eq!(
            request.combo_strings(),
            vec!["Miami Heat, Utah Jazz", "Orlando Magic, Brooklyn Nets"]
        );
        assert!(!request.single_teams.contains(&"Utah Jazz".to_string()));
    }

    #[test]
    fn test_build_request_reports_input_errors() {
        let mut layout = TeamLayout::new(28).unwrap();

        assert!(matches!(
            build_request("  ", &layout),
            Err(DrawError::EmptyUsernames)
        ));
        assert!(matches!(
            build_request(&names(27), &layout),
            Err(DrawError::ParticipantCount {
                expected: 28,
                actual: 27
            })
        ));

        layout.place(0, Slot::First, "Miami Heat");
        let err = build_request(&names(28), &layout).unwrap_err();
        assert!(matches!(err, DrawError::IncompleteCombos { incomplete: 2 }));
        assert!(err.is_input());
    }

    #[test]
    fn test_small_rounds_cannot_fill_slots() {
        // 10 participants need 20 combos, more teams than exist
        let layout = TeamLayout::new(10).unwrap();
        assert_eq!(layout.combo_count(), 20);
        assert!(matches!(
            build_request(&names(10), &layout),
            Err(DrawError::IncompleteCombos { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_duplicate_team() {
        let request = AssignmentRequest {
            usernames: vec!["a".into(), "b".into()],
            single_teams: vec!["Utah Jazz".into()],
            combo_pairs: vec![("Utah Jazz".into(), "Miami Heat".into())],
        };
        assert!(matches!(request.validate(), Err(DrawError::InvalidLayout(_))));
    }
}
