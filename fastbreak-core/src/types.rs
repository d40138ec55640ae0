use crate::error::{FastbreakError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Flow transaction ids are 32 bytes, hex encoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TransactionId(String);

impl TransactionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self(hex::encode(bytes))
    }

    /// Shortened form for status lines
    pub fn short(&self) -> String {
        format!("{}...{}", &self.0[..8], &self.0[self.0.len() - 8..])
    }
}

impl FromStr for TransactionId {
    type Err = FastbreakError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim().trim_start_matches("0x").to_ascii_lowercase();
        let bytes = hex::decode(&trimmed)
            .map_err(|e| FastbreakError::InvalidTransactionId(format!("{}: {}", s, e)))?;
        if bytes.len() != 32 {
            return Err(FastbreakError::InvalidTransactionId(format!(
                "{}: expected 32 bytes, got {}",
                s,
                bytes.len()
            )));
        }
        Ok(Self(trimmed))
    }
}

impl TryFrom<String> for TransactionId {
    type Error = FastbreakError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<TransactionId> for String {
    fn from(id: TransactionId) -> Self {
        id.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle of a submitted transaction as reported by the access node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TransactionStatus {
    Unknown,
    Pending,
    Finalized,
    Executed,
    Sealed,
    Expired,
}

impl TransactionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Sealed | Self::Expired)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// An event emitted by a contract, with its payload flattened to plain JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEvent {
    pub event_type: String,
    pub event_index: u32,
    pub data: Map<String, Value>,
}

impl LedgerEvent {
    pub fn new(event_type: impl Into<String>, event_index: u32, data: Map<String, Value>) -> Self {
        Self {
            event_type: event_type.into(),
            event_index,
            data,
        }
    }

    /// First present field among `names`, for payloads that renamed fields across revisions.
    pub fn field(&self, names: &[&str]) -> Option<&Value> {
        names.iter().find_map(|name| self.data.get(*name))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionResult {
    pub status: TransactionStatus,
    pub error_message: Option<String>,
    pub events: Vec<LedgerEvent>,
    pub block_height: Option<u64>,
}

impl TransactionResult {
    pub fn pending() -> Self {
        Self {
            status: TransactionStatus::Pending,
            error_message: None,
            events: Vec::new(),
            block_height: None,
        }
    }

    pub fn execution_failed(&self) -> bool {
        self.error_message
            .as_deref()
            .map_or(false, |msg| !msg.is_empty())
    }
}

/// Connected wallet identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub logged_in: bool,
    pub address: Option<String>,
}

impl Identity {
    pub fn connected(address: impl Into<String>) -> Self {
        Self {
            logged_in: true,
            address: Some(address.into()),
        }
    }

    pub fn short_address(&self) -> Option<String> {
        let addr = self.address.as_deref()?;
        if addr.len() <= 10 {
            return Some(addr.to_string());
        }
        Some(format!("{}...{}", &addr[..6], &addr[addr.len() - 4..]))
    }
}

/// Typed transaction/script argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Argument {
    String(String),
    StringArray(Vec<String>),
    UInt64(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Signer {
    CurrentUser,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerRoles {
    pub proposer: Signer,
    pub payer: Signer,
    pub authorizations: Vec<Signer>,
}

impl SignerRoles {
    /// The connected account proposes, pays for, and authorizes the transaction.
    pub fn current_user() -> Self {
        Self {
            proposer: Signer::CurrentUser,
            payer: Signer::CurrentUser,
            authorizations: vec![Signer::CurrentUser],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRequest {
    pub code: String,
    pub arguments: Vec<Argument>,
    pub roles: SignerRoles,
    pub compute_limit: u64,
}

/// An assignment as stored by the contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub username: String,
    pub team: String,
    pub assignment_index: u64,
    pub timestamp: f64,
}
