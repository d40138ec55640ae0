pub mod rest;

pub use rest::RestAccessNode;

use crate::error::Result;
use crate::types::{Argument, Identity, TransactionId, TransactionRequest, TransactionResult};
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::watch;

/// Session and signing capability of the connected wallet.
#[async_trait]
pub trait Wallet: Send + Sync {
    async fn authenticate(&self) -> Result<Identity>;

    async fn unauthenticate(&self) -> Result<()>;

    /// Observable identity; changes on connect and disconnect.
    fn current_identity(&self) -> watch::Receiver<Identity>;

    /// Sign and send. Returns once the network has accepted the transaction,
    /// not once it is sealed.
    async fn submit_transaction(&self, request: TransactionRequest) -> Result<TransactionId>;
}

/// Read-only access to the ledger.
#[async_trait]
pub trait AccessNode: Send + Sync {
    /// Run a script against the latest sealed state; the result is flattened JSON.
    async fn run_query(&self, code: &str, arguments: &[Argument]) -> Result<Value>;

    async fn transaction_result(&self, id: &TransactionId) -> Result<TransactionResult>;

    async fn latest_sealed_block_height(&self) -> Result<u64>;
}
