//! Status taxonomy for command events.
//!
//! Backend commands report progress as `<phase>:<state>` strings, e.g.
//! `check_version:STARTED` or `finish:FINISHED`. Exactly one of them ends a
//! command; everything else, including statuses this crate has never heard
//! of, is intermediate. Unclassifiable input never raises an error.

use serde::{Deserialize, Serialize};

const TERMINAL_PHASE: &str = "finish";
const TERMINAL_STATE: &str = "FINISHED";
const STARTED_PHASE: &str = "check_version";
const STARTED_STATE: &str = "STARTED";

/// Parsed command status.
///
/// | raw                     | parsed     |
/// |-------------------------|------------|
/// | `finish:FINISHED`       | `Finished` |
/// | `check_version:STARTED` | `Started`  |
/// | anything else           | `Other`    |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    /// The backend acknowledged the command and began work. Advisory only;
    /// callers may surface a notification, the engine does not act on it.
    Started,
    /// The command finished and no further events for it will arrive.
    Finished,
    /// Any other phase/state pair, including malformed input.
    Other,
}

/// What a status means for the listen cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Intermediate,
    Terminal,
}

impl CommandStatus {
    /// Parse a raw status string on its first `:`.
    ///
    /// Matching is exact and case-sensitive. A string with no `:` is treated
    /// as a bare phase and is never terminal.
    pub fn parse(raw: &str) -> Self {
        match raw.split_once(':') {
            Some((TERMINAL_PHASE, TERMINAL_STATE)) => Self::Finished,
            Some((STARTED_PHASE, STARTED_STATE)) => Self::Started,
            _ => Self::Other,
        }
    }

    pub fn class(self) -> StatusClass {
        match self {
            Self::Finished => StatusClass::Terminal,
            Self::Started | Self::Other => StatusClass::Intermediate,
        }
    }

    pub fn is_terminal(self) -> bool {
        self.class() == StatusClass::Terminal
    }
}

/// Classify a raw status string.
pub fn classify(raw: &str) -> StatusClass {
    CommandStatus::parse(raw).class()
}
