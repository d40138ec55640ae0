//! Merges live and sealed event observations into one record per assignment.
//!
//! The access node delivers events at least once across the live/final
//! boundary: an event seen while the reveal is executing shows up again in
//! the sealed result. The reconciler keys events by `(type, index)` and hands
//! each record out exactly once.

use fastbreak_core::cadence::as_u64;
use fastbreak_core::{Assignment, LedgerEvent};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};

const USERNAME_FIELDS: &[&str] = &["username", "participant"];
const TEAM_FIELDS: &[&str] = &["team", "assignedTo"];
const INDEX_FIELDS: &[&str] = &["assignmentIndex", "assignmentNumber"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventSource {
    Live,
    Final,
}

/// Client-side view of one participant's assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentRecord {
    pub username: String,
    pub team: String,
    pub teams: Vec<String>,
    pub index: u64,
    pub is_combo: bool,
    pub revealed: bool,
}

impl AssignmentRecord {
    pub fn new(username: impl Into<String>, team: impl Into<String>, index: u64) -> Self {
        let team = team.into();
        let teams: Vec<String> = if team.contains(',') {
            team.split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect()
        } else {
            vec![team.trim().to_string()]
        };

        Self {
            username: username.into(),
            is_combo: teams.len() > 1,
            team,
            teams,
            index,
            revealed: false,
        }
    }

    pub fn from_assignment(assignment: &Assignment) -> Self {
        Self::new(
            assignment.username.clone(),
            assignment.team.clone(),
            assignment.assignment_index,
        )
    }

    pub fn display_teams(&self) -> String {
        self.teams.join(" + ")
    }
}

#[derive(Debug)]
pub struct Reconciler {
    expected: usize,
    event_name: String,
    emitted: HashSet<(String, u64)>,
    records: BTreeMap<u64, AssignmentRecord>,
}

impl Reconciler {
    pub fn new(expected: usize, event_name: impl Into<String>) -> Self {
        Self {
            expected,
            event_name: event_name.into(),
            emitted: HashSet::new(),
            records: BTreeMap::new(),
        }
    }

    /// Absorb a batch of events; returns only records not emitted before.
    pub fn absorb(&mut self, events: &[LedgerEvent], source: EventSource) -> Vec<AssignmentRecord> {
        let mut fresh = Vec::new();

        for event in events {
            if !event.event_type.contains(&self.event_name) {
                continue;
            }

            let Some((username, team, index)) = decode(event) else {
                tracing::warn!(
                    "Dropping malformed {} event ({:?}): {:?}",
                    event.event_type,
                    source,
                    event.data
                );
                continue;
            };

            let key = (event.event_type.clone(), index);
            if self.emitted.contains(&key) {
                tracing::debug!("Already emitted assignment {} ({:?})", index, source);
                continue;
            }

            if index >= self.expected as u64 {
                tracing::warn!(
                    "Dropping assignment {} outside 0..{} ({:?})",
                    index,
                    self.expected,
                    source
                );
                continue;
            }

            if self.records.contains_key(&index) {
                tracing::warn!(
                    "Dropping second record for assignment {} from {}",
                    index,
                    event.event_type
                );
                continue;
            }

            let record = AssignmentRecord::new(username, team, index);
            self.emitted.insert(key);
            self.records.insert(index, record.clone());
            fresh.push(record);
        }

        fresh
    }

    pub fn expected(&self) -> usize {
        self.expected
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        self.records.len() == self.expected
    }

    pub fn missing(&self) -> Vec<u64> {
        (0..self.expected as u64)
            .filter(|i| !self.records.contains_key(i))
            .collect()
    }

    /// Records in index order.
    pub fn records(&self) -> Vec<AssignmentRecord> {
        self.records.values().cloned().collect()
    }
}

fn decode(event: &LedgerEvent) -> Option<(String, String, u64)> {
    let username = event.field(USERNAME_FIELDS).and_then(Value::as_str)?;
    let team = event.field(TEAM_FIELDS).and_then(Value::as_str)?;
    let index = event.field(INDEX_FIELDS).and_then(as_u64)?;

    if username.trim().is_empty() || team.trim().is_empty() {
        return None;
    }

    Some((username.to_string(), team.to_string(), index))
}
