//! In-process stand-in for the wallet and the access node.
//!
//! Runs the randomizeBreakv2 contract rules locally so a draw can be
//! rehearsed without a network: one receipt per account, reveal only after
//! the commit block, one `ParticipantAssigned` event per participant. Each
//! status query advances a transaction one step
//! (Pending, Finalized, Executed, Sealed) and produces a new block. While
//! executing, only part of the events are visible, so the live and sealed
//! views overlap the way they do on the real network.

use chrono::Utc;
use fastbreak_core::{
    AccessNode, Argument, Assignment, FastbreakError, Identity, LedgerEvent, TransactionId,
    TransactionRequest, TransactionResult, TransactionStatus, Wallet,
};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{RngCore, SeedableRng};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::watch;

use async_trait::async_trait;

const STEPS: [TransactionStatus; 4] = [
    TransactionStatus::Pending,
    TransactionStatus::Finalized,
    TransactionStatus::Executed,
    TransactionStatus::Sealed,
];

const SIGNER_ADDRESS: &str = "0x01cf0e2f2f715450";

struct Receipt {
    usernames: Vec<String>,
    slots: Vec<String>,
    lock_height: u64,
}

struct SimTransaction {
    step: usize,
    block_height: u64,
    events: Vec<LedgerEvent>,
    error: Option<String>,
}

struct SimState {
    height: u64,
    rng: StdRng,
    transactions: HashMap<TransactionId, SimTransaction>,
    receipt: Option<Receipt>,
    assignments: BTreeMap<u64, Assignment>,
    submissions: Vec<TransactionRequest>,
    reject_next: Option<String>,
    stall: bool,
}

pub struct SimulatedLedger {
    state: Mutex<SimState>,
    identity: watch::Sender<Identity>,
    contract: String,
}

impl SimulatedLedger {
    pub fn new(seed: u64) -> Self {
        let (identity, _) = watch::channel(Identity::default());

        Self {
            state: Mutex::new(SimState {
                height: 1,
                rng: StdRng::seed_from_u64(seed),
                transactions: HashMap::new(),
                receipt: None,
                assignments: BTreeMap::new(),
                submissions: Vec::new(),
                reject_next: None,
                stall: false,
            }),
            identity,
            contract: "randomizeBreakv2".to_string(),
        }
    }

    /// The next submission fails as if the operator declined to sign.
    pub fn reject_next_submission(&self, message: impl Into<String>) {
        self.state.lock().reject_next = Some(message.into());
    }

    /// Hold transactions short of sealing.
    pub fn stall_sealing(&self, stall: bool) {
        self.state.lock().stall = stall;
    }

    pub fn height(&self) -> u64 {
        self.state.lock().height
    }

    pub fn has_receipt(&self) -> bool {
        self.state.lock().receipt.is_some()
    }

    /// Every request handed to `submit_transaction`, accepted or not.
    pub fn submissions(&self) -> Vec<TransactionRequest> {
        self.state.lock().submissions.clone()
    }

    fn event_type(&self, contract: &str, name: &str) -> String {
        format!(
            "A.{}.{}.{}",
            SIGNER_ADDRESS.trim_start_matches("0x"),
            contract,
            name
        )
    }

    fn execute_commit(
        &self,
        state: &mut SimState,
        request: &TransactionRequest,
        block: u64,
    ) -> Outcome {
        let (usernames, teams, combos) = match request.arguments.as_slice() {
            [Argument::StringArray(u), Argument::StringArray(t), Argument::StringArray(c)] => {
                (u, t, c)
            }
            _ => return Outcome::failed("invalid arguments for commitAssignment"),
        };

        if state.receipt.is_some() {
            return Outcome::failed(
                "Cannot save resource: storage path /storage/TeamAssignmentReceipt is already occupied",
            );
        }

        if usernames.len() != teams.len() + combos.len() {
            return Outcome::failed(format!(
                "panic: Number of usernames ({}) must match teams plus combos ({})",
                usernames.len(),
                teams.len() + combos.len()
            ));
        }

        state.receipt = Some(Receipt {
            usernames: usernames.clone(),
            slots: teams.iter().chain(combos.iter()).cloned().collect(),
            lock_height: block,
        });

        let mut data = Map::new();
        data.insert("blockHeight".into(), json!(block.to_string()));
        Outcome::succeeded(vec![LedgerEvent::new(
            self.event_type("RandomConsumer", "RandomnessSourced"),
            0,
            data,
        )])
    }

    fn execute_reveal(&self, state: &mut SimState, block: u64) -> Outcome {
        let Some(receipt) = state.receipt.take() else {
            return Outcome::failed("panic: No receipt found in account storage");
        };

        if block <= receipt.lock_height {
            let lock_height = receipt.lock_height;
            state.receipt = Some(receipt);
            return Outcome::failed(format!(
                "panic: Randomness for block {} is not yet available",
                lock_height
            ));
        }

        let mut slots = receipt.slots;
        slots.shuffle(&mut state.rng);

        let timestamp = Utc::now().timestamp() as f64;
        let event_type = self.event_type(&self.contract, "ParticipantAssigned");

        state.assignments.clear();
        let mut events = vec![LedgerEvent::new(
            self.event_type("RandomConsumer", "RandomnessFulfilled"),
            0,
            Map::new(),
        )];

        for (i, (username, team)) in receipt.usernames.into_iter().zip(slots).enumerate() {
            let index = i as u64;
            let mut data = Map::new();
            data.insert("username".into(), json!(username));
            data.insert("team".into(), json!(team));
            data.insert("assignmentIndex".into(), json!(index.to_string()));
            events.push(LedgerEvent::new(event_type.clone(), i as u32 + 1, data));

            state.assignments.insert(
                index,
                Assignment {
                    username,
                    team,
                    assignment_index: index,
                    timestamp,
                },
            );
        }

        Outcome::succeeded(events)
    }
}

struct Outcome {
    events: Vec<LedgerEvent>,
    error: Option<String>,
}

impl Outcome {
    fn succeeded(events: Vec<LedgerEvent>) -> Self {
        Self {
            events,
            error: None,
        }
    }

    fn failed(message: impl Into<String>) -> Self {
        Self {
            events: Vec::new(),
            error: Some(message.into()),
        }
    }
}

#[async_trait]
impl Wallet for SimulatedLedger {
    async fn authenticate(&self) -> fastbreak_core::Result<Identity> {
        let identity = Identity::connected(SIGNER_ADDRESS);
        self.identity.send_replace(identity.clone());
        tracing::info!("Simulated wallet connected as {}", SIGNER_ADDRESS);
        Ok(identity)
    }

    async fn unauthenticate(&self) -> fastbreak_core::Result<()> {
        self.identity.send_replace(Identity::default());
        Ok(())
    }

    fn current_identity(&self) -> watch::Receiver<Identity> {
        self.identity.subscribe()
    }

    async fn submit_transaction(
        &self,
        request: TransactionRequest,
    ) -> fastbreak_core::Result<TransactionId> {
        if !self.identity.borrow().logged_in {
            return Err(FastbreakError::NotAuthenticated);
        }

        let mut state = self.state.lock();
        state.submissions.push(request.clone());

        if let Some(message) = state.reject_next.take() {
            return Err(FastbreakError::authorization(message));
        }

        state.height += 1;
        let block = state.height;

        let outcome = if request.code.contains("commitAssignment") {
            self.execute_commit(&mut state, &request, block)
        } else if request.code.contains("revealAndAssign") {
            self.execute_reveal(&mut state, block)
        } else {
            return Err(FastbreakError::submission(
                "simulated ledger only runs commit and reveal transactions",
            ));
        };

        let mut id = [0u8; 32];
        state.rng.fill_bytes(&mut id);
        let id = TransactionId::from_bytes(&id);

        state.transactions.insert(
            id.clone(),
            SimTransaction {
                step: 0,
                block_height: block,
                events: outcome.events,
                error: outcome.error,
            },
        );

        Ok(id)
    }
}

#[async_trait]
impl AccessNode for SimulatedLedger {
    async fn run_query(
        &self,
        code: &str,
        _arguments: &[Argument],
    ) -> fastbreak_core::Result<Value> {
        if !code.contains("getAllAssignments") {
            return Err(FastbreakError::decode(
                "simulated ledger only answers getAllAssignments",
            ));
        }

        let state = self.state.lock();
        let mut result = Map::new();
        for (index, assignment) in &state.assignments {
            result.insert(
                index.to_string(),
                json!({
                    "username": assignment.username,
                    "team": assignment.team,
                    "assignmentIndex": assignment.assignment_index.to_string(),
                    "timestamp": format!("{:.8}", assignment.timestamp),
                }),
            );
        }

        Ok(Value::Object(result))
    }

    async fn transaction_result(
        &self,
        id: &TransactionId,
    ) -> fastbreak_core::Result<TransactionResult> {
        let mut state = self.state.lock();
        state.height += 1;
        let stall = state.stall;

        let Some(tx) = state.transactions.get_mut(id) else {
            return Ok(TransactionResult {
                status: TransactionStatus::Unknown,
                ..TransactionResult::pending()
            });
        };

        let last = if stall { STEPS.len() - 2 } else { STEPS.len() - 1 };
        if tx.step < last {
            tx.step += 1;
        }

        let status = STEPS[tx.step];
        let events = match status {
            TransactionStatus::Executed => tx.events[..tx.events.len() / 2].to_vec(),
            TransactionStatus::Sealed => tx.events.clone(),
            _ => Vec::new(),
        };

        Ok(TransactionResult {
            status,
            error_message: if status == TransactionStatus::Sealed {
                tx.error.clone()
            } else {
                None
            },
            events,
            block_height: (status == TransactionStatus::Sealed).then_some(tx.block_height),
        })
    }

    async fn latest_sealed_block_height(&self) -> fastbreak_core::Result<u64> {
        let mut state = self.state.lock();
        state.height += 1;
        Ok(state.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fastbreak_core::contract::{with_address, COMMIT_TRANSACTION, REVEAL_TRANSACTION};
    use fastbreak_core::SignerRoles;

    fn commit() -> TransactionRequest {
        TransactionRequest {
            code: with_address(COMMIT_TRANSACTION, "0xf8d6e0586b0a20c7"),
            arguments: vec![
                Argument::StringArray(vec!["alice".into(), "bob".into()]),
                Argument::StringArray(vec!["Utah Jazz".into()]),
                Argument::StringArray(vec!["Miami Heat, Orlando Magic".into()]),
            ],
            roles: SignerRoles::current_user(),
            compute_limit: 9999,
        }
    }

    fn reveal() -> TransactionRequest {
        TransactionRequest {
            code: with_address(REVEAL_TRANSACTION, "0xf8d6e0586b0a20c7"),
            arguments: Vec::new(),
            roles: SignerRoles::current_user(),
            compute_limit: 9999,
        }
    }

    async fn seal(ledger: &SimulatedLedger, id: &TransactionId) -> TransactionResult {
        loop {
            let result = ledger.transaction_result(id).await.unwrap();
            if result.status.is_terminal() {
                return result;
            }
        }
    }

    #[tokio::test]
    async fn test_commit_then_reveal() {
        let ledger = SimulatedLedger::new(3);
        ledger.authenticate().await.unwrap();

        let commit_id = ledger.submit_transaction(commit()).await.unwrap();
        let sealed = seal(&ledger, &commit_id).await;
        assert!(!sealed.execution_failed());
        assert!(ledger.has_receipt());

        let reveal_id = ledger.submit_transaction(reveal()).await.unwrap();
        let first = ledger.transaction_result(&reveal_id).await.unwrap();
        assert_eq!(first.status, TransactionStatus::Finalized);
        assert!(first.events.is_empty());

        let executed = ledger.transaction_result(&reveal_id).await.unwrap();
        assert_eq!(executed.status, TransactionStatus::Executed);

        let sealed = seal(&ledger, &reveal_id).await;
        assert_eq!(sealed.events.len(), 3);
        assert!(executed.events.len() < sealed.events.len());
        assert!(sealed.block_height.is_some());
        assert!(!ledger.has_receipt());

        let all = ledger.run_query("getAllAssignments", &[]).await.unwrap();
        assert_eq!(all.as_object().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_second_commit_is_rejected_by_contract() {
        let ledger = SimulatedLedger::new(3);
        ledger.authenticate().await.unwrap();

        let first = ledger.submit_transaction(commit()).await.unwrap();
        seal(&ledger, &first).await;

        let second = ledger.submit_transaction(commit()).await.unwrap();
        let result = seal(&ledger, &second).await;
        assert!(result.execution_failed());
    }

    #[tokio::test]
    async fn test_reveal_without_receipt_fails() {
        let ledger = SimulatedLedger::new(3);
        ledger.authenticate().await.unwrap();

        let id = ledger.submit_transaction(reveal()).await.unwrap();
        let result = seal(&ledger, &id).await;
        assert!(result
            .error_message
            .unwrap()
            .contains("No receipt found"));
    }

    #[tokio::test]
    async fn test_identity_is_observable() {
        let ledger = SimulatedLedger::new(3);
        let identity = ledger.current_identity();
        assert!(!identity.borrow().logged_in);

        ledger.authenticate().await.unwrap();
        assert!(identity.borrow().logged_in);

        ledger.unauthenticate().await.unwrap();
        assert!(!identity.borrow().logged_in);
        assert!(matches!(
            ledger.submit_transaction(commit()).await,
            Err(FastbreakError::NotAuthenticated)
        ));
    }

    #[tokio::test]
    async fn test_same_seed_same_draw() {
        async fn draw(seed: u64) -> Vec<String> {
            let ledger = SimulatedLedger::new(seed);
            ledger.authenticate().await.unwrap();
            let id = ledger.submit_transaction(commit()).await.unwrap();
            seal(&ledger, &id).await;
            let id = ledger.submit_transaction(reveal()).await.unwrap();
            seal(&ledger, &id)
                .await
                .events
                .iter()
                .filter_map(|e| e.data.get("team").and_then(Value::as_str).map(str::to_string))
                .collect()
        }

        assert_eq!(draw(11).await, draw(11).await);
    }
}
