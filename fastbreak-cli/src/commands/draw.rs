use super::assignments::assignment_table;
use anyhow::{Context, Result};
use clap::Args;
use dialoguer::Confirm;
use fastbreak_core::{ClientConfig, PacingConfig};
use fastbreak_draw::{
    build_request, parse_usernames, AssignmentRequest, Board, CancelSignal, Coordinator,
    DisplayEvent, SimulatedLedger, TeamLayout,
};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Args)]
pub struct DrawArgs {
    /// Usernames, one per line or comma separated ("-" reads stdin)
    #[arg(short, long)]
    users: PathBuf,

    /// Participants in the draw (defaults to the number of usernames)
    #[arg(short = 'p', long)]
    participants: Option<usize>,

    /// Combo of two teams, "Team A,Team B" (repeat for each combo)
    #[arg(long = "combo")]
    combos: Vec<String>,

    /// Seed for the simulated ledger's randomness
    #[arg(long)]
    seed: Option<u64>,

    /// Show results without the reveal pacing
    #[arg(long)]
    fast: bool,

    /// Skip confirmation prompt
    #[arg(short, long)]
    yes: bool,
}

pub async fn handle_draw_command(args: DrawArgs, mut config: ClientConfig) -> Result<()> {
    let raw = read_usernames(&args.users)?;
    let participants = args
        .participants
        .unwrap_or_else(|| parse_usernames(&raw).len());

    let layout = combo_layout(participants, &args.combos)?;
    let request = build_request(&raw, &layout)?;
    print_request(&request);

    if !args.yes {
        let confirmed = Confirm::new()
            .with_prompt("Submit the commit transaction?")
            .default(true)
            .interact()?;
        if !confirmed {
            println!("Draw cancelled");
            return Ok(());
        }
    }

    if args.fast {
        config.pacing = PacingConfig {
            header_delay: Duration::ZERO,
            reveal_interval: Duration::ZERO,
        };
    }

    let seed = args.seed.unwrap_or_else(rand::random);
    tracing::debug!("Simulated ledger seed {}", seed);
    let ledger = Arc::new(SimulatedLedger::new(seed));

    let (mut coordinator, mut events) =
        Coordinator::new(config.clone(), ledger.clone(), ledger)?;
    let identity = coordinator.connect().await?;
    println!(
        "Connected as {} (simulated)",
        identity.address.as_deref().unwrap_or("unknown")
    );

    let (cancel, signal) = CancelSignal::pair();
    let mut phases = coordinator.subscribe_phase();
    let mut board = Board::new();

    let result = {
        let round = coordinator.run_round(request, signal);
        tokio::pin!(round);

        loop {
            tokio::select! {
                result = &mut round => break result?,
                Some(event) = events.recv() => show(&mut board, &event),
                Ok(()) = phases.changed() => {
                    if let Some(message) = phases.borrow_and_update().status_message() {
                        println!("{}", message);
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    println!("Cancelling...");
                    cancel.cancel();
                }
            }
        }
    };

    reveal_remaining(&mut board, &mut events, result.records.len()).await;

    println!();
    println!("{}", assignment_table(result.records.iter()));
    println!("Commit: {}", result.commit_transaction);
    println!("Reveal: {}", result.reveal_transaction);
    if let Some(url) = config.explorer_url(result.reveal_transaction.as_str()) {
        println!("Explorer: {}", url);
    }
    if !result.is_complete() {
        println!("Missing assignments: {:?}", result.missing);
    }

    coordinator.shutdown();
    Ok(())
}

/// Keep showing paced reveals until `expected` records are revealed.
async fn reveal_remaining(
    board: &mut Board,
    events: &mut mpsc::UnboundedReceiver<DisplayEvent>,
    expected: usize,
) {
    while board.revealed_count() < expected {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => show(board, &event),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }
}

fn read_usernames(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut raw = String::new();
        std::io::stdin()
            .read_to_string(&mut raw)
            .context("Failed to read usernames from stdin")?;
        return Ok(raw);
    }

    std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read usernames from {}", path.display()))
}

fn combo_layout(participants: usize, combos: &[String]) -> Result<TeamLayout> {
    let mut layout = TeamLayout::new(participants)?;

    if combos.len() > layout.combo_count() {
        anyhow::bail!(
            "{} participants leave room for {} combos, got {}",
            participants,
            layout.combo_count(),
            combos.len()
        );
    }

    for (i, combo) in combos.iter().enumerate() {
        let (first, second) = combo
            .split_once(',')
            .with_context(|| format!("Combo must be \"Team A,Team B\": {}", combo))?;

        if !layout.pair(i, first.trim(), second.trim()) {
            anyhow::bail!(
                "Cannot pair {} with {}: unknown team or already used",
                first.trim(),
                second.trim()
            );
        }
    }

    Ok(layout)
}

fn print_request(request: &AssignmentRequest) {
    println!("Participants: {}", request.participant_count());
    println!("Single teams: {}", request.single_teams.len());
    for combo in request.combo_strings() {
        println!("Combo: {}", combo);
    }
}

fn show(board: &mut Board, event: &DisplayEvent) {
    if matches!(event, DisplayEvent::HeaderRevealed { .. }) {
        println!();
        println!("Team assignments");
    }

    if let Some(record) = board.apply(event) {
        println!(
            "  {:>2}. {:<20} {}",
            record.index + 1,
            record.username,
            record.display_teams()
        );
    }
}
