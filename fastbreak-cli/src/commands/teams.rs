use anyhow::Result;
use comfy_table::{presets::UTF8_FULL, Table};
use fastbreak_core::teams::short_name;
use fastbreak_core::NBA_TEAMS;

pub fn handle_teams_command() -> Result<()> {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["#", "Team", "Short"]);

    for (i, team) in NBA_TEAMS.iter().enumerate() {
        table.add_row(vec![
            (i + 1).to_string(),
            team.to_string(),
            short_name(team).to_string(),
        ]);
    }

    println!("{}", table);
    println!(
        "Fewer than {} participants leaves room for combos: each extra team pairs with another.",
        NBA_TEAMS.len()
    );
    Ok(())
}
