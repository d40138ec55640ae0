use crate::cadence;
use crate::error::{FastbreakError, Result};
use crate::ledger::AccessNode;
use crate::types::{Argument, LedgerEvent, TransactionId, TransactionResult, TransactionStatus};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Access node client for the Flow REST API.
pub struct RestAccessNode {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct RawBlock {
    header: RawBlockHeader,
}

#[derive(Debug, Deserialize)]
struct RawBlockHeader {
    id: String,
    height: String,
}

#[derive(Debug, Deserialize)]
struct RawTransactionResult {
    #[serde(default)]
    block_id: String,
    status: TransactionStatus,
    #[serde(default)]
    error_message: String,
    #[serde(default)]
    events: Vec<RawEvent>,
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    event_index: String,
    payload: String,
}

#[derive(Debug, Serialize)]
struct ScriptBody {
    script: String,
    arguments: Vec<String>,
}

impl RestAccessNode {
    pub fn new(base_url: &str) -> Result<Self> {
        if base_url.is_empty() {
            return Err(FastbreakError::config("Access node URL cannot be empty"));
        }

        let client = Client::builder().build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!("GET {}", url);

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FastbreakError::Http {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json::<T>().await?)
    }

    async fn block_height(&self, block_id: &str) -> Result<u64> {
        let blocks: Vec<RawBlock> = self.get_json(&format!("/v1/blocks/{}", block_id)).await?;
        let block = blocks
            .first()
            .ok_or_else(|| FastbreakError::decode(format!("Block {} not found", block_id)))?;
        parse_height(&block.header.height)
    }
}

#[async_trait]
impl AccessNode for RestAccessNode {
    async fn run_query(&self, code: &str, arguments: &[Argument]) -> Result<Value> {
        let body = ScriptBody {
            script: STANDARD.encode(code),
            arguments: arguments
                .iter()
                .map(|arg| -> Result<String> {
                    let json = serde_json::to_vec(&cadence::encode_argument(arg))?;
                    Ok(STANDARD.encode(json))
                })
                .collect::<Result<Vec<_>>>()?,
        };

        let url = format!("{}/v1/scripts?block_height=sealed", self.base_url);
        tracing::debug!("POST {}", url);

        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FastbreakError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let encoded: String = response.json().await?;
        decode_script_result(&encoded)
    }

    async fn transaction_result(&self, id: &TransactionId) -> Result<TransactionResult> {
        let raw: RawTransactionResult = match self
            .get_json(&format!("/v1/transaction_results/{}", id))
            .await
        {
            Ok(raw) => raw,
            // Not yet indexed by this node
            Err(FastbreakError::Http { status, .. })
                if status == StatusCode::NOT_FOUND.as_u16() =>
            {
                return Ok(TransactionResult {
                    status: TransactionStatus::Unknown,
                    ..TransactionResult::pending()
                });
            }
            Err(e) => return Err(e),
        };

        let block_id = raw.block_id.clone();
        let mut result = convert_transaction_result(raw)?;

        if result.status == TransactionStatus::Sealed && !block_id.is_empty() {
            result.block_height = Some(self.block_height(&block_id).await?);
        }

        Ok(result)
    }

    async fn latest_sealed_block_height(&self) -> Result<u64> {
        let blocks: Vec<RawBlock> = self.get_json("/v1/blocks?height=sealed").await?;
        let block = blocks
            .first()
            .ok_or_else(|| FastbreakError::decode("Access node returned no sealed block"))?;
        tracing::debug!("Latest sealed block {} at {}", block.header.id, block.header.height);
        parse_height(&block.header.height)
    }
}

fn parse_height(raw: &str) -> Result<u64> {
    raw.parse()
        .map_err(|_| FastbreakError::decode(format!("Invalid block height: {}", raw)))
}

fn decode_script_result(encoded: &str) -> Result<Value> {
    let bytes = STANDARD.decode(encoded.trim())?;
    let document: Value = serde_json::from_slice(&bytes)?;
    cadence::decode_value(&document)
}

fn convert_transaction_result(raw: RawTransactionResult) -> Result<TransactionResult> {
    let mut events = Vec::with_capacity(raw.events.len());
    for event in raw.events {
        let bytes = STANDARD.decode(event.payload.trim())?;
        let payload: Value = serde_json::from_slice(&bytes)?;
        let (_, data) = cadence::decode_event(&payload)?;
        events.push(LedgerEvent::new(
            event.event_type,
            event.event_index.parse().unwrap_or(0),
            data,
        ));
    }

    Ok(TransactionResult {
        status: raw.status,
        error_message: if raw.error_message.is_empty() {
            None
        } else {
            Some(raw.error_message)
        },
        events,
        block_height: None,
    })
}
