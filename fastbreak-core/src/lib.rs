//! Fast-BREAK core - ledger plumbing for the team draw client
//!
//! This library provides the wallet and access-node capabilities the draw
//! runs against, the JSON-Cadence codec, the contract's Cadence sources,
//! and client configuration.

pub mod cadence;
pub mod config;
pub mod contract;
pub mod error;
pub mod ledger;
pub mod teams;
pub mod types;

pub use config::{ClientConfig, Network, PacingConfig};
pub use error::{FastbreakError, Result};
pub use ledger::{AccessNode, RestAccessNode, Wallet};
pub use teams::{NBA_TEAMS, TEAM_COUNT};
pub use types::{
    Argument, Assignment, Identity, LedgerEvent, SignerRoles, TransactionId, TransactionRequest,
    TransactionResult, TransactionStatus,
};
