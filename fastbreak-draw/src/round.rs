//! One draw, end to end: commit, wait for randomness, reveal, reconcile.

use crate::input::AssignmentRequest;
use crate::pacing::{DisplayEvent, RevealScheduler, RoundId};
use crate::reconciler::{AssignmentRecord, EventSource, Reconciler};
use crate::settlement::{CancelSignal, SettlementWaiter};
use crate::submitter::TransactionSubmitter;
use crate::Result;
use chrono::{DateTime, Utc};
use fastbreak_core::contract::fetch_assignments;
use fastbreak_core::{
    AccessNode, Assignment, ClientConfig, FastbreakError, Identity, LedgerEvent, TransactionId,
    Wallet,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoundPhase {
    Idle,
    Committing,
    Waiting,
    Revealing,
    Complete,
}

impl RoundPhase {
    pub fn status_message(&self) -> Option<&'static str> {
        match self {
            RoundPhase::Idle => None,
            RoundPhase::Committing => Some("Locking in participants and teams..."),
            RoundPhase::Waiting => Some("Waiting for randomness..."),
            RoundPhase::Revealing => Some("Revealing team assignments..."),
            RoundPhase::Complete => Some("Team assignments complete"),
        }
    }

    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            RoundPhase::Committing | RoundPhase::Waiting | RoundPhase::Revealing
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundResult {
    pub round_id: RoundId,
    pub commit_transaction: TransactionId,
    pub reveal_transaction: TransactionId,
    pub lock_block: u64,
    pub reveal_block: Option<u64>,
    pub completed_at: DateTime<Utc>,
    /// In index order.
    pub records: Vec<AssignmentRecord>,
    /// Indices the sealed reveal never produced.
    pub missing: Vec<u64>,
}

impl RoundResult {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// State of the round in flight.
#[derive(Debug)]
pub struct RoundContext {
    pub round_id: RoundId,
    pub started_at: DateTime<Utc>,
    pub commit_transaction: Option<TransactionId>,
    pub lock_block: Option<u64>,
    pub reveal_transaction: Option<TransactionId>,
    reconciler: Reconciler,
}

impl RoundContext {
    fn new(request: &AssignmentRequest, event_name: &str) -> Self {
        Self {
            round_id: Uuid::new_v4(),
            started_at: Utc::now(),
            commit_transaction: None,
            lock_block: None,
            reveal_transaction: None,
            reconciler: Reconciler::new(request.participant_count(), event_name),
        }
    }
}

/// Drives rounds and owns everything a round leaves behind.
///
/// `run_round` takes `&mut self`, so at most one round is in flight.
pub struct Coordinator {
    config: ClientConfig,
    wallet: Arc<dyn Wallet>,
    node: Arc<dyn AccessNode>,
    submitter: TransactionSubmitter,
    waiter: SettlementWaiter,
    scheduler: RevealScheduler,
    display: mpsc::UnboundedSender<DisplayEvent>,
    phase: watch::Sender<RoundPhase>,
    context: Option<RoundContext>,
    last_result: Option<RoundResult>,
}

impl Coordinator {
    pub fn new(
        config: ClientConfig,
        wallet: Arc<dyn Wallet>,
        node: Arc<dyn AccessNode>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<DisplayEvent>)> {
        config.validate()?;

        let (display, events) = mpsc::unbounded_channel();
        let (phase, _) = watch::channel(RoundPhase::Idle);

        let coordinator = Self {
            submitter: TransactionSubmitter::new(wallet.clone(), &config),
            waiter: SettlementWaiter::new(node.clone(), config.poll_interval),
            scheduler: RevealScheduler::new(config.pacing.clone(), display.clone()),
            config,
            wallet,
            node,
            display,
            phase,
            context: None,
            last_result: None,
        };

        Ok((coordinator, events))
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn phase(&self) -> RoundPhase {
        *self.phase.borrow()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<RoundPhase> {
        self.phase.subscribe()
    }

    pub fn context(&self) -> Option<&RoundContext> {
        self.context.as_ref()
    }

    pub fn last_result(&self) -> Option<&RoundResult> {
        self.last_result.as_ref()
    }

    pub fn identity(&self) -> Identity {
        self.wallet.current_identity().borrow().clone()
    }

    pub async fn connect(&self) -> Result<Identity> {
        let identity = self.wallet.authenticate().await?;
        tracing::info!(
            "Wallet connected: {}",
            identity.short_address().unwrap_or_default()
        );
        Ok(identity)
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.wallet.unauthenticate().await?;
        tracing::info!("Wallet disconnected");
        Ok(())
    }

    /// Assignments the contract already holds from earlier rounds.
    pub async fn fetch_settled(&self) -> Result<BTreeMap<u64, Assignment>> {
        Ok(fetch_assignments(self.node.as_ref(), &self.config).await?)
    }

    /// Run one round. Rejected input or a disconnected wallet leaves the
    /// previous round untouched; any later failure leaves the coordinator
    /// `Idle` with the round's pending reveals cancelled.
    pub async fn run_round(
        &mut self,
        request: AssignmentRequest,
        mut cancel: CancelSignal,
    ) -> Result<RoundResult> {
        request.validate()?;
        if !self.wallet.current_identity().borrow().logged_in {
            return Err(FastbreakError::NotAuthenticated.into());
        }

        self.scheduler.cancel_all();
        self.context = None;
        self.set_phase(RoundPhase::Idle);

        let mut context = RoundContext::new(&request, &self.config.assignment_event);
        let round = context.round_id;
        tracing::info!(
            "Starting round {} with {} participants",
            round,
            request.participant_count()
        );

        let outcome = self.drive(&request, &mut context, &mut cancel).await;
        self.context = Some(context);

        match outcome {
            Ok(result) => {
                self.set_phase(RoundPhase::Complete);
                self.last_result = Some(result.clone());
                Ok(result)
            }
            Err(e) => {
                tracing::warn!("Round {} aborted: {}", round, e);
                self.scheduler.cancel(round);
                let _ = self.display.send(DisplayEvent::RoundAborted { round });
                self.context = None;
                self.set_phase(RoundPhase::Idle);
                Err(e)
            }
        }
    }

    /// Reset results and the display.
    pub fn clear(&mut self) {
        self.scheduler.cancel_all();
        self.context = None;
        self.last_result = None;
        let _ = self.display.send(DisplayEvent::Cleared);
        self.set_phase(RoundPhase::Idle);
    }

    pub fn shutdown(mut self) {
        self.scheduler.cancel_all();
        tracing::debug!("Coordinator shut down");
    }

    async fn drive(
        &mut self,
        request: &AssignmentRequest,
        context: &mut RoundContext,
        cancel: &mut CancelSignal,
    ) -> Result<RoundResult> {
        let round = context.round_id;

        self.set_phase(RoundPhase::Committing);
        self.scheduler.begin_round(round);

        let commit_id = self.submitter.submit_commit(request).await?;
        context.commit_transaction = Some(commit_id.clone());

        let commit = self.waiter.await_sealed(&commit_id, cancel).await?;
        let lock_block = match commit.block_height {
            Some(height) => height,
            None => self.waiter.await_block_height(0, cancel).await?,
        };
        context.lock_block = Some(lock_block);
        tracing::info!("Commit {} sealed at block {}", commit_id.short(), lock_block);

        if self.config.min_block_gap > 0 {
            self.set_phase(RoundPhase::Waiting);
            self.waiter
                .await_block_height(lock_block + self.config.min_block_gap, cancel)
                .await?;
        }

        self.set_phase(RoundPhase::Revealing);
        let reveal_id = self.submitter.submit_reveal().await?;
        context.reveal_transaction = Some(reveal_id.clone());

        let mut live = self.waiter.subscribe(&reveal_id);
        let waiter = self.waiter.clone();
        let sealed = {
            let seal = waiter.await_sealed(&reveal_id, cancel);
            tokio::pin!(seal);
            let mut live_open = true;

            loop {
                tokio::select! {
                    biased;
                    update = live.recv(), if live_open => match update {
                        Some(update) => self.absorb(
                            round,
                            &mut context.reconciler,
                            &update.events,
                            EventSource::Live,
                        ),
                        None => live_open = false,
                    },
                    sealed = &mut seal => break sealed?,
                }
            }
        };

        while let Ok(update) = live.try_recv() {
            self.absorb(round, &mut context.reconciler, &update.events, EventSource::Live);
        }
        self.absorb(round, &mut context.reconciler, &sealed.events, EventSource::Final);
        self.scheduler.close_feed(round);

        let missing = context.reconciler.missing();
        if !missing.is_empty() {
            tracing::warn!(
                "Reveal {} sealed without assignments {:?}",
                reveal_id.short(),
                missing
            );
        }

        tracing::info!(
            "Round {} revealed {} of {} assignments",
            round,
            context.reconciler.len(),
            context.reconciler.expected()
        );

        Ok(RoundResult {
            round_id: round,
            commit_transaction: commit_id,
            reveal_transaction: reveal_id,
            lock_block,
            reveal_block: sealed.block_height,
            completed_at: Utc::now(),
            records: context.reconciler.records(),
            missing,
        })
    }

    fn absorb(
        &self,
        round: RoundId,
        reconciler: &mut Reconciler,
        events: &[LedgerEvent],
        source: EventSource,
    ) {
        for record in reconciler.absorb(events, source) {
            let index = record.index;
            if self
                .display
                .send(DisplayEvent::Reconciled { round, record })
                .is_err()
            {
                tracing::debug!("Display closed; record {} not shown", index);
            }
            self.scheduler.enqueue(round, index);
        }
    }

    fn set_phase(&self, phase: RoundPhase) {
        let previous = self.phase.send_replace(phase);
        if previous != phase {
            tracing::info!("Round phase {:?} -> {:?}", previous, phase);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DrawError;
    use crate::input::{build_request, TeamLayout};
    use crate::pacing::Board;
    use crate::sim::SimulatedLedger;
    use fastbreak_core::{PacingConfig, NBA_TEAMS};
    use std::collections::HashSet;
    use std::time::Duration;

    fn config() -> ClientConfig {
        ClientConfig {
            poll_interval: Duration::from_millis(100),
            pacing: PacingConfig {
                header_delay: Duration::from_millis(500),
                reveal_interval: Duration::from_secs(3),
            },
            ..ClientConfig::default()
        }
    }

    async fn coordinator(
        seed: u64,
    ) -> (
        Coordinator,
        mpsc::UnboundedReceiver<DisplayEvent>,
        Arc<SimulatedLedger>,
    ) {
        let ledger = Arc::new(SimulatedLedger::new(seed));
        let (coordinator, events) =
            Coordinator::new(config(), ledger.clone(), ledger.clone()).unwrap();
        coordinator.connect().await.unwrap();
        (coordinator, events, ledger)
    }

    fn usernames(n: usize) -> String {
        (0..n).map(|i| format!("user{}", i)).collect::<Vec<_>>().join("\n")
    }

    async fn reveal_all(events: &mut mpsc::UnboundedReceiver<DisplayEvent>, board: &mut Board) {
        while !board.is_fully_revealed() {
            let event = events.recv().await.unwrap();
            board.apply(&event);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_league_without_combos() {
        let (mut coordinator, mut events, _ledger) = coordinator(1).await;
        let layout = TeamLayout::new(30).unwrap();
        let request = build_request(&usernames(30), &layout).unwrap();

        let result = coordinator
            .run_round(request, CancelSignal::never())
            .await
            .unwrap();

        assert!(result.is_complete());
        assert_eq!(result.records.len(), 30);
        assert!(result.records.iter().all(|r| !r.is_combo));

        let indices: Vec<u64> = result.records.iter().map(|r| r.index).collect();
        assert_eq!(indices, (0..30).collect::<Vec<_>>());

        let teams: HashSet<&str> = result.records.iter().map(|r| r.team.as_str()).collect();
        let league: HashSet<&str> = NBA_TEAMS.iter().copied().collect();
        assert_eq!(teams, league);
        assert_eq!(coordinator.phase(), RoundPhase::Complete);

        let mut board = Board::new();
        reveal_all(&mut events, &mut board).await;
        assert_eq!(board.len(), 30);
        assert!(board.header_revealed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_combos_partition_the_league() {
        let (mut coordinator, _events, _ledger) = coordinator(2).await;
        let mut layout = TeamLayout::new(28).unwrap();
        assert!(layout.pair(0, "Boston Celtics", "Utah Jazz"));
        assert!(layout.pair(1, "Miami Heat", "Orlando Magic"));
        let request = build_request(&usernames(28), &layout).unwrap();

        let result = coordinator
            .run_round(request, CancelSignal::never())
            .await
            .unwrap();

        assert_eq!(result.records.len(), 28);
        let combos: Vec<_> = result.records.iter().filter(|r| r.is_combo).collect();
        assert_eq!(combos.len(), 2);
        assert!(combos.iter().all(|r| r.teams.len() == 2 && r.teams[0] != r.teams[1]));

        let mut seen = HashSet::new();
        for team in result.records.iter().flat_map(|r| r.teams.iter()) {
            assert!(seen.insert(team.as_str()), "{} assigned twice", team);
        }
        assert_eq!(seen.len(), 30);

        let users: HashSet<&str> = result.records.iter().map(|r| r.username.as_str()).collect();
        assert_eq!(users.len(), 28);
    }

    #[tokio::test(start_paused = true)]
    async fn test_commit_failure_returns_to_idle() {
        let (mut coordinator, mut events, ledger) = coordinator(3).await;
        ledger.reject_next_submission("User rejected signature");
        let request = build_request(&usernames(30), &TeamLayout::new(30).unwrap()).unwrap();

        let err = coordinator
            .run_round(request, CancelSignal::never())
            .await
            .unwrap_err();

        assert!(matches!(err, DrawError::Core(FastbreakError::Authorization(_))));
        assert_eq!(coordinator.phase(), RoundPhase::Idle);
        assert!(coordinator.last_result().is_none());
        assert!(coordinator.context().is_none());

        let mut board = Board::new();
        while let Ok(event) = events.try_recv() {
            board.apply(&event);
        }
        assert!(board.is_empty());
        assert_eq!(board.round(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_input_errors_submit_nothing() {
        let (mut coordinator, _events, ledger) = coordinator(4).await;
        let request = AssignmentRequest {
            usernames: vec!["alice".into(), "bob".into()],
            single_teams: vec!["Utah Jazz".into()],
            combo_pairs: Vec::new(),
        };

        let err = coordinator
            .run_round(request, CancelSignal::never())
            .await
            .unwrap_err();

        assert!(err.is_input());
        assert!(ledger.submissions().is_empty());
        assert_eq!(coordinator.phase(), RoundPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_requires_connected_wallet() {
        let (mut coordinator, _events, ledger) = coordinator(5).await;
        coordinator.disconnect().await.unwrap();
        let request = build_request(&usernames(30), &TeamLayout::new(30).unwrap()).unwrap();

        let err = coordinator
            .run_round(request, CancelSignal::never())
            .await
            .unwrap_err();

        assert!(matches!(err, DrawError::Core(FastbreakError::NotAuthenticated)));
        assert!(ledger.submissions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_commit_is_cancelled() {
        let (mut coordinator, _events, ledger) = coordinator(6).await;
        ledger.stall_sealing(true);
        let request = build_request(&usernames(30), &TeamLayout::new(30).unwrap()).unwrap();

        let (handle, signal) = CancelSignal::pair();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(10)).await;
            handle.cancel();
        });

        let err = coordinator.run_round(request, signal).await.unwrap_err();
        assert!(matches!(err, DrawError::Core(FastbreakError::Stalled(_))));
        assert_eq!(coordinator.phase(), RoundPhase::Idle);
        assert!(ledger.has_receipt());
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_round_replaces_previous_display() {
        let (mut coordinator, mut events, _ledger) = coordinator(7).await;
        let request = build_request(&usernames(30), &TeamLayout::new(30).unwrap()).unwrap();

        let first = coordinator
            .run_round(request.clone(), CancelSignal::never())
            .await
            .unwrap();
        let second = coordinator
            .run_round(request, CancelSignal::never())
            .await
            .unwrap();
        assert_ne!(first.round_id, second.round_id);
        assert_eq!(coordinator.last_result().unwrap().round_id, second.round_id);

        let mut board = Board::new();
        reveal_all(&mut events, &mut board).await;
        assert_eq!(board.round(), Some(second.round_id));
        assert_eq!(board.len(), 30);

        // nothing from the first round trails in
        tokio::time::sleep(Duration::from_secs(120)).await;
        while let Ok(event) = events.try_recv() {
            match event {
                DisplayEvent::Revealed { round, .. } | DisplayEvent::HeaderRevealed { round } => {
                    assert_eq!(round, second.round_id)
                }
                _ => {}
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_resets_results() {
        let (mut coordinator, mut events, _ledger) = coordinator(8).await;
        let request = build_request(&usernames(30), &TeamLayout::new(30).unwrap()).unwrap();
        coordinator
            .run_round(request, CancelSignal::never())
            .await
            .unwrap();

        coordinator.clear();
        assert!(coordinator.last_result().is_none());
        assert_eq!(coordinator.phase(), RoundPhase::Idle);

        let mut board = Board::new();
        while let Ok(event) = events.try_recv() {
            board.apply(&event);
        }
        assert!(board.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_settled_after_round() {
        let (mut coordinator, _events, _ledger) = coordinator(9).await;
        let request = build_request(&usernames(30), &TeamLayout::new(30).unwrap()).unwrap();
        let result = coordinator
            .run_round(request, CancelSignal::never())
            .await
            .unwrap();

        let settled = coordinator.fetch_settled().await.unwrap();
        assert_eq!(settled.len(), 30);

        let mut board = Board::new();
        board.load_settled(&settled);
        assert!(board.is_fully_revealed());
        let teams: Vec<&str> = board.records().map(|r| r.team.as_str()).collect();
        let expected: Vec<&str> = result.records.iter().map(|r| r.team.as_str()).collect();
        assert_eq!(teams, expected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_request_leaves_previous_round_revealing() {
        let (mut coordinator, mut events, ledger) = coordinator(10).await;
        let request = build_request(&usernames(30), &TeamLayout::new(30).unwrap()).unwrap();
        coordinator
            .run_round(request.clone(), CancelSignal::never())
            .await
            .unwrap();

        // mid-pacing
        tokio::time::sleep(Duration::from_secs(10)).await;

        let bad = AssignmentRequest {
            usernames: vec!["alice".into(), "bob".into()],
            single_teams: vec!["Utah Jazz".into()],
            combo_pairs: Vec::new(),
        };
        let err = coordinator
            .run_round(bad, CancelSignal::never())
            .await
            .unwrap_err();
        assert!(err.is_input());

        coordinator.disconnect().await.unwrap();
        let err = coordinator
            .run_round(request, CancelSignal::never())
            .await
            .unwrap_err();
        assert!(matches!(err, DrawError::Core(FastbreakError::NotAuthenticated)));

        assert_eq!(coordinator.phase(), RoundPhase::Complete);
        assert_eq!(ledger.submissions().len(), 2);

        let mut board = Board::new();
        tokio::time::timeout(
            Duration::from_secs(300),
            reveal_all(&mut events, &mut board),
        )
        .await
        .unwrap();
        assert_eq!(board.len(), 30);
        assert_eq!(board.revealed_count(), 30);
    }

    #[tokio::test(start_paused = true)]
    async fn test_block_gap_waits_before_reveal() {
        let ledger = Arc::new(SimulatedLedger::new(11));
        let config = ClientConfig {
            min_block_gap: 10,
            ..config()
        };
        let (mut coordinator, _events) =
            Coordinator::new(config, ledger.clone(), ledger.clone()).unwrap();
        coordinator.connect().await.unwrap();

        let mut phases = coordinator.subscribe_phase();
        let watcher = tokio::spawn(async move {
            let mut seen = Vec::new();
            while phases.changed().await.is_ok() {
                let phase = *phases.borrow_and_update();
                if phase != RoundPhase::Idle && seen.last() != Some(&phase) {
                    seen.push(phase);
                }
                if phase == RoundPhase::Complete {
                    break;
                }
            }
            seen
        });

        let request = build_request(&usernames(30), &TeamLayout::new(30).unwrap()).unwrap();
        let result = coordinator
            .run_round(request, CancelSignal::never())
            .await
            .unwrap();

        assert_eq!(
            watcher.await.unwrap(),
            vec![
                RoundPhase::Committing,
                RoundPhase::Waiting,
                RoundPhase::Revealing,
                RoundPhase::Complete,
            ]
        );
        assert!(result.reveal_block.unwrap() >= result.lock_block + 10);
        assert_eq!(result.records.len(), 30);
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_participant_count_partitions_the_league() {
        for n in 15..=30usize {
            let (mut coordinator, _events, _ledger) = coordinator(n as u64).await;
            let mut layout = TeamLayout::new(n).unwrap();
            for combo in 0..layout.combo_count() {
                assert!(layout.pair(combo, NBA_TEAMS[2 * combo], NBA_TEAMS[2 * combo + 1]));
            }
            let request = build_request(&usernames(n), &layout).unwrap();

            let result = coordinator
                .run_round(request, CancelSignal::never())
                .await
                .unwrap();

            let indices: Vec<u64> = result.records.iter().map(|r| r.index).collect();
            assert_eq!(indices, (0..n as u64).collect::<Vec<_>>(), "n = {}", n);
            assert_eq!(result.records.iter().filter(|r| r.is_combo).count(), 30 - n);

            let mut seen = HashSet::new();
            for team in result.records.iter().flat_map(|r| r.teams.iter()) {
                assert!(seen.insert(team.as_str()), "{} assigned twice (n = {})", team, n);
            }
            assert_eq!(seen.len(), 30);

            coordinator.shutdown();
        }
    }

    #[test]
    fn test_status_messages() {
        assert_eq!(RoundPhase::Idle.status_message(), None);
        assert_eq!(
            RoundPhase::Committing.status_message(),
            Some("Locking in participants and teams...")
        );
        assert!(RoundPhase::Waiting.is_busy());
        assert!(!RoundPhase::Complete.is_busy());
    }
}
