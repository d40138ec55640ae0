use crate::input::AssignmentRequest;
use crate::Result;
use fastbreak_core::contract::{with_address, COMMIT_TRANSACTION, REVEAL_TRANSACTION};
use fastbreak_core::{
    Argument, ClientConfig, SignerRoles, TransactionId, TransactionRequest, Wallet,
};
use std::sync::Arc;

/// Signs and sends the commit and reveal transactions through the wallet.
///
/// Never retries: a second commit would create a competing receipt.
#[derive(Clone)]
pub struct TransactionSubmitter {
    wallet: Arc<dyn Wallet>,
    contract_address: String,
    compute_limit: u64,
}

impl TransactionSubmitter {
    pub fn new(wallet: Arc<dyn Wallet>, config: &ClientConfig) -> Self {
        Self {
            wallet,
            contract_address: config.contract_address.clone(),
            compute_limit: config.compute_limit,
        }
    }

    pub fn commit_transaction(&self, request: &AssignmentRequest) -> TransactionRequest {
        TransactionRequest {
            code: with_address(COMMIT_TRANSACTION, &self.contract_address),
            arguments: vec![
                Argument::StringArray(request.usernames.clone()),
                Argument::StringArray(request.single_teams.clone()),
                Argument::StringArray(request.combo_strings()),
            ],
            roles: SignerRoles::current_user(),
            compute_limit: self.compute_limit,
        }
    }

    pub fn reveal_transaction(&self) -> TransactionRequest {
        TransactionRequest {
            code: with_address(REVEAL_TRANSACTION, &self.contract_address),
            arguments: Vec::new(),
            roles: SignerRoles::current_user(),
            compute_limit: self.compute_limit,
        }
    }

    pub async fn submit_commit(&self, request: &AssignmentRequest) -> Result<TransactionId> {
        let id = self
            .wallet
            .submit_transaction(self.commit_transaction(request))
            .await?;

        tracing::info!(
            "Commit submitted for {} participants ({} singles, {} combos): {}",
            request.participant_count(),
            request.single_teams.len(),
            request.combo_pairs.len(),
            id
        );
        Ok(id)
    }

    pub async fn submit_reveal(&self) -> Result<TransactionId> {
        let id = self
            .wallet
            .submit_transaction(self.reveal_transaction())
            .await?;

        tracing::info!("Reveal submitted: {}", id);
        Ok(id)
    }
}
