use thiserror::Error;

pub type Result<T> = std::result::Result<T, DrawError>;

#[derive(Error, Debug)]
pub enum DrawError {
    #[error("Fastbreak core error: {0}")]
    Core(#[from] fastbreak_core::FastbreakError),

    #[error("Please enter at least one username")]
    EmptyUsernames,

    #[error("Please enter exactly {expected} usernames. You entered {actual}.")]
    ParticipantCount { expected: usize, actual: usize },

    #[error("Please complete all multi-team combos before starting the assignment ({incomplete} incomplete)")]
    IncompleteCombos { incomplete: usize },

    #[error("Total assignments ({singles} single + {combos} combos) must equal {participants} users")]
    SlotMismatch {
        singles: usize,
        combos: usize,
        participants: usize,
    },

    #[error("Invalid team layout: {0}")]
    InvalidLayout(String),
}

impl DrawError {
    pub fn layout(msg: impl Into<String>) -> Self {
        Self::InvalidLayout(msg.into())
    }

    /// Problems with the operator's input; nothing was submitted.
    pub fn is_input(&self) -> bool {
        matches!(
            self,
            Self::EmptyUsernames
                | Self::ParticipantCount { .. }
                | Self::IncompleteCombos { .. }
                | Self::SlotMismatch { .. }
                | Self::InvalidLayout(_)
        )
    }
}
