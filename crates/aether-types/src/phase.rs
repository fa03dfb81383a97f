//! The six phases of the 72-hour ATO cycle.

use serde::{Deserialize, Serialize};

/// ATO cycle phases, in cycle order. The legal transition graph is strictly
/// linear with a single restart edge from PHASE6 back to PHASE1.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AtoPhase {
    Phase1Oeg,
    Phase2TargetDevelopment,
    Phase3Weaponeering,
    Phase4AtoProduction,
    Phase5Execution,
    Phase6Assessment,
}

impl AtoPhase {
    pub const ALL: [AtoPhase; 6] = [
        Self::Phase1Oeg,
        Self::Phase2TargetDevelopment,
        Self::Phase3Weaponeering,
        Self::Phase4AtoProduction,
        Self::Phase5Execution,
        Self::Phase6Assessment,
    ];

    /// Zero-based position in the cycle.
    pub fn index(self) -> usize {
        match self {
            Self::Phase1Oeg => 0,
            Self::Phase2TargetDevelopment => 1,
            Self::Phase3Weaponeering => 2,
            Self::Phase4AtoProduction => 3,
            Self::Phase5Execution => 4,
            Self::Phase6Assessment => 5,
        }
    }

    /// The next phase in the transition graph. PHASE6 wraps to PHASE1, which
    /// in the orchestrator corresponds to a cycle restart.
    pub fn next(self) -> AtoPhase {
        Self::ALL[(self.index() + 1) % Self::ALL.len()]
    }

    /// Critical phases may never be skipped, even with an override.
    pub fn is_critical(self) -> bool {
        matches!(self, Self::Phase3Weaponeering | Self::Phase4AtoProduction)
    }
}

impl std::fmt::Display for AtoPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Phase1Oeg => "PHASE1_OEG",
            Self::Phase2TargetDevelopment => "PHASE2_TARGET_DEVELOPMENT",
            Self::Phase3Weaponeering => "PHASE3_WEAPONEERING",
            Self::Phase4AtoProduction => "PHASE4_ATO_PRODUCTION",
            Self::Phase5Execution => "PHASE5_EXECUTION",
            Self::Phase6Assessment => "PHASE6_ASSESSMENT",
        };
        write!(f, "{name}")
    }
}
