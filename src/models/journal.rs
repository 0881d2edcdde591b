use serde::{Deserialize, Serialize};

use crate::models::placement::PlacementRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Placed,
    RolledBack,
    Cleaned,
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Placed => write!(f, "placed"),
            Self::RolledBack => write!(f, "rolled_back"),
            Self::Cleaned => write!(f, "cleaned"),
        }
    }
}

impl std::str::FromStr for RunState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "placed" => Ok(Self::Placed),
            "rolled_back" => Ok(Self::RolledBack),
            "cleaned" => Ok(Self::Cleaned),
            _ => Err(format!("unknown run state: {s}")),
        }
    }
}

/// A filing run as persisted in the placement journal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalRun {
    pub run_id: String,
    pub source_folder: String,
    pub state: RunState,
    pub filed_at: String,
    pub record: PlacementRecord,
}
