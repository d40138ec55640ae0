//! Fast-BREAK team draw.
//!
//! Participants are matched to NBA teams by a commit/reveal pair of
//! transactions against the randomizeBreakv2 contract. The commit locks the
//! participants and teams and requests randomness tied to a future block; the
//! reveal consumes that request and emits one `ParticipantAssigned` event per
//! participant. This crate drives both transactions, merges the live and
//! sealed views of the reveal's events, and paces the results for display.

pub mod error;
pub mod input;
pub mod pacing;
pub mod reconciler;
pub mod round;
pub mod settlement;
pub mod sim;
pub mod submitter;

pub use error::{DrawError, Result};
pub use input::{build_request, parse_usernames, AssignmentRequest, ComboSlot, Slot, TeamLayout};
pub use pacing::{Board, DisplayEvent, RevealScheduler, RoundId};
pub use reconciler::{AssignmentRecord, EventSource, Reconciler};
pub use round::{Coordinator, RoundContext, RoundPhase, RoundResult};
pub use settlement::{CancelHandle, CancelSignal, SealResult, SettlementWaiter, StatusUpdate};
pub use sim::SimulatedLedger;
pub use submitter::TransactionSubmitter;
