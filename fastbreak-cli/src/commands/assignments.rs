use anyhow::Result;
use clap::Args;
use comfy_table::{presets::UTF8_FULL, Table};
use fastbreak_core::contract::fetch_assignments;
use fastbreak_core::{ClientConfig, RestAccessNode};
use fastbreak_draw::{AssignmentRecord, Board};

#[derive(Args)]
pub struct AssignmentsArgs {
    /// Print raw JSON instead of a table
    #[arg(long)]
    json: bool,
}

pub async fn handle_assignments_command(
    args: AssignmentsArgs,
    config: &ClientConfig,
) -> Result<()> {
    config.validate()?;
    let node = RestAccessNode::new(&config.access_node_url)?;
    let assignments = fetch_assignments(&node, config).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&assignments)?);
        return Ok(());
    }

    if assignments.is_empty() {
        println!("No assignments recorded on {}", config.contract_address);
        return Ok(());
    }

    let mut board = Board::new();
    board.load_settled(&assignments);
    println!("{}", assignment_table(board.records()));
    Ok(())
}

pub fn assignment_table<'a>(records: impl Iterator<Item = &'a AssignmentRecord>) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["#", "Participant", "Team"]);

    for record in records {
        let team = if record.is_combo {
            format!("{} (combo)", record.display_teams())
        } else {
            record.team.clone()
        };
        table.add_row(vec![(record.index + 1).to_string(), record.username.clone(), team]);
    }

    table
}
