//! Presentation pacing.
//!
//! Records reach the display on a fixed cadence in ascending index order,
//! whatever order the ledger produced them in. Every pending reveal belongs
//! to a round; cancelling the round cancels all of them at once.

use crate::reconciler::AssignmentRecord;
use fastbreak_core::{Assignment, PacingConfig};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

pub type RoundId = Uuid;

#[derive(Debug, Clone, PartialEq)]
pub enum DisplayEvent {
    RoundStarted { round: RoundId },
    Reconciled { round: RoundId, record: AssignmentRecord },
    HeaderRevealed { round: RoundId },
    Revealed { round: RoundId, index: u64 },
    RoundAborted { round: RoundId },
    Cleared,
}

/// Emission point shared by the scheduler and its tasks.
///
/// Checking the active round and sending happen under one lock, so once
/// `cancel` has cleared the active round no event of that round gets out.
#[derive(Clone)]
struct Gate {
    active: Arc<Mutex<Option<RoundId>>>,
    display: mpsc::UnboundedSender<DisplayEvent>,
}

impl Gate {
    fn emit(&self, round: RoundId, event: DisplayEvent) -> bool {
        let active = self.active.lock();
        if *active != Some(round) {
            return false;
        }
        self.display.send(event).is_ok()
    }
}

struct RoundTask {
    feed: Option<mpsc::UnboundedSender<u64>>,
    handle: JoinHandle<()>,
}

pub struct RevealScheduler {
    config: PacingConfig,
    gate: Gate,
    tasks: HashMap<RoundId, RoundTask>,
}

impl RevealScheduler {
    pub fn new(config: PacingConfig, display: mpsc::UnboundedSender<DisplayEvent>) -> Self {
        Self {
            config,
            gate: Gate {
                active: Arc::new(Mutex::new(None)),
                display,
            },
            tasks: HashMap::new(),
        }
    }

    /// Cancel everything pending and start pacing a new round.
    pub fn begin_round(&mut self, round: RoundId) {
        self.cancel_all();

        *self.gate.active.lock() = Some(round);
        self.gate.emit(round, DisplayEvent::RoundStarted { round });

        let (feed, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run_round(
            round,
            self.config.clone(),
            rx,
            self.gate.clone(),
        ));

        self.tasks.insert(
            round,
            RoundTask {
                feed: Some(feed),
                handle,
            },
        );
    }

    /// Queue a reconciled record for reveal.
    pub fn enqueue(&self, round: RoundId, index: u64) {
        match self.tasks.get(&round).and_then(|t| t.feed.as_ref()) {
            Some(feed) => {
                let _ = feed.send(index);
            }
            None => tracing::debug!("Ignoring record {} for inactive round {}", index, round),
        }
    }

    /// No more records will arrive; release what is left, skipping gaps.
    pub fn close_feed(&mut self, round: RoundId) {
        if let Some(task) = self.tasks.get_mut(&round) {
            task.feed = None;
        }
    }

    pub fn cancel(&mut self, round: RoundId) {
        {
            let mut active = self.gate.active.lock();
            if *active == Some(round) {
                *active = None;
            }
        }

        if let Some(task) = self.tasks.remove(&round) {
            task.handle.abort();
            tracing::debug!("Cancelled pacing for round {}", round);
        }
    }

    pub fn cancel_all(&mut self) {
        *self.gate.active.lock() = None;

        for (round, task) in self.tasks.drain() {
            task.handle.abort();
            tracing::debug!("Cancelled pacing for round {}", round);
        }
    }

    pub fn active_round(&self) -> Option<RoundId> {
        *self.gate.active.lock()
    }

    /// Rounds whose pacing task is still running.
    pub fn pending_rounds(&self) -> usize {
        self.tasks
            .values()
            .filter(|task| !task.handle.is_finished())
            .count()
    }
}

impl Drop for RevealScheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

async fn run_round(
    round: RoundId,
    config: PacingConfig,
    mut feed: mpsc::UnboundedReceiver<u64>,
    gate: Gate,
) {
    let mut pending = BTreeSet::new();
    let mut feed_open = true;
    let mut next_expected = 0u64;

    // header waits for the first record
    match feed.recv().await {
        Some(index) => {
            pending.insert(index);
        }
        None => return,
    }

    tokio::time::sleep(config.header_delay).await;
    if !gate.emit(round, DisplayEvent::HeaderRevealed { round }) {
        return;
    }

    loop {
        tokio::time::sleep(config.reveal_interval).await;

        let next = loop {
            while feed_open {
                match feed.try_recv() {
                    Ok(index) => {
                        pending.insert(index);
                    }
                    Err(mpsc::error::TryRecvError::Empty) => break,
                    Err(mpsc::error::TryRecvError::Disconnected) => feed_open = false,
                }
            }

            match pending.first().copied() {
                Some(first) if first <= next_expected || !feed_open => break Some(first),
                None if !feed_open => break None,
                _ => match feed.recv().await {
                    Some(index) => {
                        pending.insert(index);
                    }
                    None => feed_open = false,
                },
            }
        };

        let Some(index) = next else {
            tracing::debug!("Round {} fully revealed", round);
            return;
        };

        pending.remove(&index);
        next_expected = index + 1;

        if !gate.emit(round, DisplayEvent::Revealed { round, index }) {
            return;
        }
    }
}

/// What the operator sees: the current round's records and which are revealed.
#[derive(Debug, Default)]
pub struct Board {
    round: Option<RoundId>,
    records: BTreeMap<u64, AssignmentRecord>,
    header_revealed: bool,
}

impl Board {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a display event; returns the record it revealed, if any.
    pub fn apply(&mut self, event: &DisplayEvent) -> Option<AssignmentRecord> {
        match event {
            DisplayEvent::RoundStarted { round } => {
                self.clear();
                self.round = Some(*round);
                None
            }
            DisplayEvent::Reconciled { round, record } if self.is_current(round) => {
                self.records.entry(record.index).or_insert_with(|| record.clone());
                None
            }
            DisplayEvent::HeaderRevealed { round } if self.is_current(round) => {
                self.header_revealed = true;
                None
            }
            DisplayEvent::Revealed { round, index } if self.is_current(round) => {
                let record = self.records.get_mut(index)?;
                if record.revealed {
                    return None;
                }
                record.revealed = true;
                Some(record.clone())
            }
            DisplayEvent::RoundAborted { round } if self.is_current(round) => {
                self.clear();
                None
            }
            DisplayEvent::Cleared => {
                self.clear();
                None
            }
            _ => None,
        }
    }

    /// Show assignments already settled on chain, all revealed.
    pub fn load_settled(&mut self, assignments: &BTreeMap<u64, Assignment>) {
        self.clear();
        for assignment in assignments.values() {
            let mut record = AssignmentRecord::from_assignment(assignment);
            record.revealed = true;
            self.records.insert(record.index, record);
        }
        self.header_revealed = !self.records.is_empty();
    }

    pub fn clear(&mut self) {
        self.round = None;
        self.records.clear();
        self.header_revealed = false;
    }

    pub fn round(&self) -> Option<RoundId> {
        self.round
    }

    pub fn records(&self) -> impl Iterator<Item = &AssignmentRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn header_revealed(&self) -> bool {
        self.header_revealed
    }

    pub fn revealed_count(&self) -> usize {
        self.records.values().filter(|r| r.revealed).count()
    }

    pub fn is_fully_revealed(&self) -> bool {
        !self.records.is_empty() && self.revealed_count() == self.records.len()
    }

    fn is_current(&self, round: &RoundId) -> bool {
        self.round == Some(*round)
    }
}
