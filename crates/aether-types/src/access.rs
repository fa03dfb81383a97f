//! Organizational access levels and information categories.
//!
//! Access levels are an organizational rank ordering, not a classification
//! scheme. Comparison against a category's minimum level is the sole
//! level-based authorization predicate.

use serde::{Deserialize, Serialize};

/// Organizational access levels, totally ordered.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum AccessLevel {
    Public,
    Internal,
    Operational,
    Sensitive,
    Critical,
}

impl AccessLevel {
    /// Numeric rank, 1 (Public) through 5 (Critical).
    pub fn rank(self) -> u8 {
        match self {
            Self::Public => 1,
            Self::Internal => 2,
            Self::Operational => 3,
            Self::Sensitive => 4,
            Self::Critical => 5,
        }
    }
}

impl std::fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Public => "PUBLIC",
            Self::Internal => "INTERNAL",
            Self::Operational => "OPERATIONAL",
            Self::Sensitive => "SENSITIVE",
            Self::Critical => "CRITICAL",
        };
        write!(f, "{name}")
    }
}

/// Categories of information managed by AetherOS. Closed enumeration; every
/// brokered read is routed and policed by category.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum InformationCategory {
    Doctrine,
    ThreatData,
    AssetStatus,
    SpectrumAllocation,
    MissionPlan,
    Organizational,
    ProcessMetrics,
}

impl InformationCategory {
    pub const ALL: [InformationCategory; 7] = [
        Self::Doctrine,
        Self::ThreatData,
        Self::AssetStatus,
        Self::SpectrumAllocation,
        Self::MissionPlan,
        Self::Organizational,
        Self::ProcessMetrics,
    ];
}

impl std::fmt::Display for InformationCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Doctrine => "doctrine",
            Self::ThreatData => "threat_data",
            Self::AssetStatus => "asset_status",
            Self::SpectrumAllocation => "spectrum_allocation",
            Self::MissionPlan => "mission_plan",
            Self::Organizational => "organizational",
            Self::ProcessMetrics => "process_metrics",
        };
        write!(f, "{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_levels_are_totally_ordered() {
        assert!(AccessLevel::Public < AccessLevel::Internal);
        assert!(AccessLevel::Internal < AccessLevel::Operational);
        assert!(AccessLevel::Operational < AccessLevel::Sensitive);
        assert!(AccessLevel::Sensitive < AccessLevel::Critical);
        assert_eq!(AccessLevel::Critical.rank(), 5);
    }

    #[test]
    fn category_serde_round_trip() {
        let json = serde_json::to_string(&InformationCategory::ThreatData).unwrap();
        assert_eq!(json, "\"threat_data\"");
        let back: InformationCategory = serde_json::from_str(&json).unwrap();
        assert_eq!(back, InformationCategory::ThreatData);
    }
}
