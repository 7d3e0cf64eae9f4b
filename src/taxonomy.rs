use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::DashboardError;

/// The four store categories produced by the upstream clustering run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ClusterLabel {
    #[serde(rename = "Best stores")]
    BestStores,
    #[serde(rename = "Middle Tier")]
    MiddleTier,
    #[serde(rename = "Redundant")]
    Redundant,
    #[serde(rename = "Weaker Store")]
    WeakerStore,
}

impl ClusterLabel {
    /// Canonical display order.
    pub const ALL: [ClusterLabel; 4] = [
        ClusterLabel::BestStores,
        ClusterLabel::MiddleTier,
        ClusterLabel::Redundant,
        ClusterLabel::WeakerStore,
    ];

    /// Closure candidates.
    pub const AT_RISK: [ClusterLabel; 2] = [ClusterLabel::Redundant, ClusterLabel::WeakerStore];

    pub fn order() -> &'static [ClusterLabel] {
        &Self::ALL
    }

    pub fn index(self) -> usize {
        match self {
            ClusterLabel::BestStores => 0,
            ClusterLabel::MiddleTier => 1,
            ClusterLabel::Redundant => 2,
            ClusterLabel::WeakerStore => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ClusterLabel::BestStores => "Best stores",
            ClusterLabel::MiddleTier => "Middle Tier",
            ClusterLabel::Redundant => "Redundant",
            ClusterLabel::WeakerStore => "Weaker Store",
        }
    }

    pub fn color(self) -> &'static str {
        match self {
            ClusterLabel::BestStores => "#2ca02c",
            ClusterLabel::MiddleTier => "#1f77b4",
            ClusterLabel::Redundant => "#ff7f0e",
            ClusterLabel::WeakerStore => "#d62728",
        }
    }

    pub fn card_background(self) -> &'static str {
        match self {
            ClusterLabel::BestStores => "#e8f5e9",
            ClusterLabel::MiddleTier => "#e3f2fd",
            ClusterLabel::Redundant => "#fff3e0",
            ClusterLabel::WeakerStore => "#ffebee",
        }
    }

    /// Maps the numeric id written by the clustering run. Ids outside the
    /// fixed table have no label.
    pub fn from_cluster_id(id: i64) -> Option<ClusterLabel> {
        match id {
            0 => Some(ClusterLabel::MiddleTier),
            1 => Some(ClusterLabel::WeakerStore),
            2 => Some(ClusterLabel::BestStores),
            3 => Some(ClusterLabel::Redundant),
            _ => None,
        }
    }

    pub fn is_at_risk(self) -> bool {
        Self::AT_RISK.contains(&self)
    }

    pub fn closure_priority(self) -> &'static str {
        match self {
            ClusterLabel::WeakerStore => "Priority 1: close",
            ClusterLabel::Redundant => "Priority 2: consolidate",
            ClusterLabel::MiddleTier => "Evaluate case by case",
            ClusterLabel::BestStores => "Retain",
        }
    }

    pub fn closure_reasons(self) -> &'static [&'static str] {
        match self {
            ClusterLabel::WeakerStore => &[
                "Lack of omni-channel capabilities (in-store pickup, same-day delivery)",
                "Lack Next Gen or flagship features",
                "Limited service offering (balloon delivery)",
                "Low competitive positioning",
            ],
            ClusterLabel::Redundant => &[
                "High market overlap with nearby stores",
                "Cannibalization risk (stores within 3-6 miles)",
                "Inefficient geographic footprint",
                "Potential to consolidate without coverage loss",
            ],
            ClusterLabel::MiddleTier | ClusterLabel::BestStores => &[],
        }
    }
}

impl fmt::Display for ClusterLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClusterLabel {
    type Err = DashboardError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let needle = value.trim();
        ClusterLabel::ALL
            .into_iter()
            .find(|label| label.as_str().eq_ignore_ascii_case(needle))
            .ok_or_else(|| DashboardError::UnknownCategory(value.to_string()))
    }
}

/// String-keyed color query over the four categories.
pub fn color_of(category: &str) -> Result<&'static str, DashboardError> {
    category.parse::<ClusterLabel>().map(ClusterLabel::color)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClusterFilter {
    #[default]
    All,
    Only(ClusterLabel),
}

impl ClusterFilter {
    pub fn matches(self, label: Option<ClusterLabel>) -> bool {
        match self {
            ClusterFilter::All => true,
            ClusterFilter::Only(wanted) => label == Some(wanted),
        }
    }
}

impl FromStr for ClusterFilter {
    type Err = DashboardError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.trim().eq_ignore_ascii_case("all") {
            return Ok(ClusterFilter::All);
        }
        value.parse().map(ClusterFilter::Only)
    }
}
