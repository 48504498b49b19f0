//! Segment knowledge base: names, descriptions and marketing strategies
//!
//! The built-in table covers the five segments produced by the standard
//! training run. An optional JSON file can replace any subset of entries
//! without a rebuild; keys must be known segment kinds.

use crate::error::{Result, SegmentError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

pub const UNKNOWN_NAME: &str = "Unknown";
pub const UNKNOWN_DESCRIPTION: &str = "Unknown segment";
pub const UNKNOWN_STRATEGY: &str = "General marketing approach";

/// Closed set of segments with configured business meaning
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentKind {
    AverageCustomer,
    VipWhale,
    YoungTrendsetter,
    HighEarnerSaver,
    BudgetConscious,
}

impl SegmentKind {
    pub const ALL: [SegmentKind; 5] = [
        SegmentKind::AverageCustomer,
        SegmentKind::VipWhale,
        SegmentKind::YoungTrendsetter,
        SegmentKind::HighEarnerSaver,
        SegmentKind::BudgetConscious,
    ];

    /// Cluster index this segment corresponds to
    pub fn id(self) -> usize {
        match self {
            SegmentKind::AverageCustomer => 0,
            SegmentKind::VipWhale => 1,
            SegmentKind::YoungTrendsetter => 2,
            SegmentKind::HighEarnerSaver => 3,
            SegmentKind::BudgetConscious => 4,
        }
    }

    pub fn from_id(id: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.id() as i64 == id)
    }

    fn builtin_profile(self) -> SegmentProfile {
        let (name, description, strategy) = match self {
            SegmentKind::AverageCustomer => (
                "Average Customer",
                "Average customers with moderate income and spending habits. Balanced segment.",
                "Standard promotions, seasonal offers, and loyalty programs. Focus on value for money.",
            ),
            SegmentKind::VipWhale => (
                "VIP / Whale",
                "VIP customers with high income and high spending. Premium segment.",
                "Premium products, exclusive offers, VIP experiences, and personalized service. No discount needed.",
            ),
            SegmentKind::YoungTrendsetter => (
                "Young Trendsetter",
                "Young trendsetters with moderate to low income but high spending scores.",
                "Trendy products, social media marketing, influencer partnerships, and flexible payment options.",
            ),
            SegmentKind::HighEarnerSaver => (
                "High Earner Saver",
                "High earners who are conservative spenders. Save more than they spend.",
                "Investment opportunities, quality products, long-term value propositions, and savings programs.",
            ),
            SegmentKind::BudgetConscious => (
                "Budget Conscious",
                "Budget-conscious customers with lower income and spending scores.",
                "Discounts, budget-friendly options, clearance sales, and basic product lines.",
            ),
        };
        SegmentProfile {
            name: name.to_string(),
            description: description.to_string(),
            marketing_strategy: strategy.to_string(),
        }
    }
}

/// Business-facing text attached to a segment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SegmentProfile {
    pub name: String,
    pub description: String,
    pub marketing_strategy: String,
}

impl SegmentProfile {
    fn fallback() -> Self {
        Self {
            name: UNKNOWN_NAME.to_string(),
            description: UNKNOWN_DESCRIPTION.to_string(),
            marketing_strategy: UNKNOWN_STRATEGY.to_string(),
        }
    }
}

/// Immutable segment table, built once at startup
#[derive(Debug, Clone)]
pub struct KnowledgeBase {
    profiles: BTreeMap<SegmentKind, SegmentProfile>,
    fallback: SegmentProfile,
}

impl Default for KnowledgeBase {
    fn default() -> Self {
        Self {
            profiles: SegmentKind::ALL
                .into_iter()
                .map(|kind| (kind, kind.builtin_profile()))
                .collect(),
            fallback: SegmentProfile::fallback(),
        }
    }
}

impl KnowledgeBase {
    /// Load overrides from a JSON object keyed by segment kind
    ///
    /// Entries absent from the file keep their built-in text. Unknown keys,
    /// unknown fields and empty strings are rejected.
    pub fn from_file(path: &Path) -> Result<Self> {
        let reject = |reason: String| SegmentError::KnowledgeBase {
            path: path.to_path_buf(),
            reason,
        };

        let raw = fs::read_to_string(path).map_err(|e| reject(e.to_string()))?;
        let overrides: BTreeMap<SegmentKind, SegmentProfile> =
            serde_json::from_str(&raw).map_err(|e| reject(e.to_string()))?;

        for (kind, profile) in &overrides {
            if profile.name.trim().is_empty()
                || profile.description.trim().is_empty()
                || profile.marketing_strategy.trim().is_empty()
            {
                return Err(reject(format!("entry {kind:?} has an empty field")));
            }
        }

        let mut base = Self::default();
        base.profiles.extend(overrides);
        tracing::info!(path = %path.display(), "Segment knowledge base overrides loaded");
        Ok(base)
    }

    /// Profile for a segment id; unmapped ids get the generic fallback
    pub fn profile(&self, id: i64) -> &SegmentProfile {
        SegmentKind::from_id(id)
            .and_then(|kind| self.profiles.get(&kind))
            .unwrap_or(&self.fallback)
    }

    pub fn name(&self, id: i64) -> &str {
        &self.profile(id).name
    }

    pub fn description(&self, id: i64) -> &str {
        &self.profile(id).description
    }

    pub fn marketing_strategy(&self, id: i64) -> &str {
        &self.profile(id).marketing_strategy
    }

    /// Configured segments in ascending id order
    pub fn iter(&self) -> impl Iterator<Item = (usize, &SegmentProfile)> {
        self.profiles.iter().map(|(kind, profile)| (kind.id(), profile))
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}
