//! Cadence sources for the randomizeBreakv2 contract and the settled-assignment query.

use crate::cadence::as_u64;
use crate::config::ClientConfig;
use crate::error::{FastbreakError, Result};
use crate::ledger::AccessNode;
use crate::types::Assignment;
use serde_json::Value;
use std::collections::BTreeMap;

pub const ADDRESS_PLACEHOLDER: &str = "0xrandomizeBreakv2";

pub const COMMIT_TRANSACTION: &str = r#"
import randomizeBreakv2 from 0xrandomizeBreakv2

transaction(usernames: [String], teams: [String], combos: [String]) {

    prepare(signer: auth(Storage) &Account) {
        let receipt <- randomizeBreakv2.commitAssignment(
            usernames: usernames,
            teams: teams,
            combos: combos
        )

        let receiptUUID = receipt.uuid
        signer.storage.save(<-receipt, to: /storage/TeamAssignmentReceipt)

        log("Receipt created and stored. UUID: ".concat(receiptUUID.toString()))
    }
}
"#;

pub const REVEAL_TRANSACTION: &str = r#"
import randomizeBreakv2 from 0xrandomizeBreakv2

transaction() {

    prepare(signer: auth(Storage) &Account) {
        let receipt <- signer.storage.load<@randomizeBreakv2.Receipt>(
            from: /storage/TeamAssignmentReceipt
        ) ?? panic("No receipt found in account storage")

        let assignments = randomizeBreakv2.revealAndAssign(receipt: <-receipt)

        log("Assignments completed: ".concat(assignments.length.toString()))
    }
}
"#;

pub const ALL_ASSIGNMENTS_SCRIPT: &str = r#"
import randomizeBreakv2 from 0xrandomizeBreakv2

access(all) fun main(): {UInt64: randomizeBreakv2.Assignment} {
    return randomizeBreakv2.getAllAssignments()
}
"#;

/// Substitute the deployed contract address into a template.
pub fn with_address(template: &str, contract_address: &str) -> String {
    template.replace(ADDRESS_PLACEHOLDER, contract_address)
}

/// Every assignment the contract has recorded, keyed by index.
pub async fn fetch_assignments(
    node: &dyn AccessNode,
    config: &ClientConfig,
) -> Result<BTreeMap<u64, Assignment>> {
    let script = with_address(ALL_ASSIGNMENTS_SCRIPT, &config.contract_address);
    let result = node.run_query(&script, &[]).await?;
    parse_assignments(&result)
}

pub fn parse_assignments(result: &Value) -> Result<BTreeMap<u64, Assignment>> {
    let entries = result
        .as_object()
        .ok_or_else(|| FastbreakError::decode("Assignments result must be a dictionary"))?;

    let mut assignments = BTreeMap::new();
    for (key, entry) in entries {
        let index: u64 = key
            .parse()
            .map_err(|_| FastbreakError::decode(format!("Invalid assignment key: {}", key)))?;

        let text = |name: &str| -> Result<String> {
            entry
                .get(name)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| {
                    FastbreakError::decode(format!("Assignment {} missing {}", key, name))
                })
        };

        let assignment_index = entry
            .get("assignmentIndex")
            .and_then(as_u64)
            .unwrap_or(index);
        let timestamp = entry
            .get("timestamp")
            .and_then(|v| match v {
                Value::String(s) => s.parse::<f64>().ok(),
                other => other.as_f64(),
            })
            .unwrap_or_default();

        assignments.insert(
            index,
            Assignment {
                username: text("username")?,
                team: text("team")?,
                assignment_index,
                timestamp,
            },
        );
    }

    Ok(assignments)
}
