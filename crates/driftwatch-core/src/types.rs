//! Core type definitions for Driftwatch.
//!
//! Identifiers, production context, the composite detector key, and the
//! small enums shared by every crate.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which direction(s) of drift a detector monitors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitoringSide {
    /// Upward shifts only
    Upper,
    /// Downward shifts only
    Lower,
    /// Both directions
    Both,
}

impl MonitoringSide {
    /// Whether the upper accumulator participates
    pub fn watches_upper(self) -> bool {
        matches!(self, MonitoringSide::Upper | MonitoringSide::Both)
    }

    /// Whether the lower accumulator participates
    pub fn watches_lower(self) -> bool {
        matches!(self, MonitoringSide::Lower | MonitoringSide::Both)
    }
}

impl fmt::Display for MonitoringSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonitoringSide::Upper => write!(f, "upper"),
            MonitoringSide::Lower => write!(f, "lower"),
            MonitoringSide::Both => write!(f, "both"),
        }
    }
}

/// Kind of monitored quantity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    /// Binomial rate; sigma derives from `p(1-p)/n`
    Yield,
    /// Arbitrary real; sigma estimated from a rolling window
    Parameter,
}

impl ItemType {
    /// Default monitoring side when the configuration leaves it unset
    pub fn default_side(self) -> MonitoringSide {
        match self {
            ItemType::Yield => MonitoringSide::Upper,
            ItemType::Parameter => MonitoringSide::Both,
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemType::Yield => write!(f, "yield"),
            ItemType::Parameter => write!(f, "parameter"),
        }
    }
}

/// Direction of a fired alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSide {
    /// The positive accumulator crossed the threshold
    Upper,
    /// The negative accumulator crossed the threshold
    Lower,
}

impl fmt::Display for AlertSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertSide::Upper => write!(f, "upper"),
            AlertSide::Lower => write!(f, "lower"),
        }
    }
}

/// Why a sample was excluded from the CUSUM step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Throughput below `min_detection_ratio * base_n`
    LowThroughput,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::LowThroughput => write!(f, "low_throughput"),
        }
    }
}

/// Monitored item identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemId(String);

impl ItemId {
    /// Create a new item ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the item ID as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ItemId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ItemId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Production context attached to a sample
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProcessContext {
    /// Product identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product: Option<String>,
    /// Production line identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<String>,
    /// Station identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub station: Option<String>,
}

impl ProcessContext {
    /// Whether every context field is absent
    pub fn is_empty(&self) -> bool {
        self.product.is_none() && self.line.is_none() && self.station.is_none()
    }
}

/// Composite detector identity: `(product, line, station, item)`.
///
/// Two samples share a detector iff they share a canonical key. The
/// canonical form is lowercase and joined with `::`; missing context
/// components are substituted with `Unknown<Component>`, and a fully
/// empty context degrades to the bare item identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DetectorKey {
    /// Production context
    pub context: ProcessContext,
    /// Monitored item
    pub item: ItemId,
}

impl DetectorKey {
    /// Create a key from an item and its context
    pub fn new(item: ItemId, context: ProcessContext) -> Self {
        Self { context, item }
    }

    /// Create a context-free key from a bare item name
    pub fn bare(item: impl Into<ItemId>) -> Self {
        Self {
            context: ProcessContext::default(),
            item: item.into(),
        }
    }

    /// Canonical serialization used as the routing and persistence key
    pub fn canonical(&self) -> String {
        if self.context.is_empty() {
            return self.item.as_str().to_lowercase();
        }

        let product = self.context.product.as_deref().unwrap_or("UnknownProduct");
        let line = self.context.line.as_deref().unwrap_or("UnknownLine");
        let station = self.context.station.as_deref().unwrap_or("UnknownStation");

        format!("{}::{}::{}::{}", product, line, station, self.item.as_str()).to_lowercase()
    }
}

impl fmt::Display for DetectorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monitoring_side_watches() {
        assert!(MonitoringSide::Upper.watches_upper());
        assert!(!MonitoringSide::Upper.watches_lower());
        assert!(MonitoringSide::Both.watches_upper());
        assert!(MonitoringSide::Both.watches_lower());
    }

    #[test]
    fn test_item_type_default_side() {
        assert_eq!(ItemType::Yield.default_side(), MonitoringSide::Upper);
        assert_eq!(ItemType::Parameter.default_side(), MonitoringSide::Both);
    }

    #[test]
    fn test_canonical_key_full_context() {
        let key = DetectorKey::new(
            ItemId::new("Solder-Voids"),
            ProcessContext {
                product: Some("PhoneX".to_string()),
                line: Some("L1".to_string()),
                station: Some("AOI-3".to_string()),
            },
        );
        assert_eq!(key.canonical(), "phonex::l1::aoi-3::solder-voids");
    }

    #[test]
    fn test_canonical_key_missing_components() {
        let key = DetectorKey::new(
            ItemId::new("scrap_rate"),
            ProcessContext {
                product: Some("PhoneX".to_string()),
                line: None,
                station: None,
            },
        );
        assert_eq!(
            key.canonical(),
            "phonex::unknownline::unknownstation::scrap_rate"
        );
    }

    #[test]
    fn test_canonical_key_bare_item() {
        let key = DetectorKey::bare("Scrap_Rate");
        assert_eq!(key.canonical(), "scrap_rate");
    }

    #[test]
    fn test_keys_case_insensitive() {
        let a = DetectorKey::new(
            ItemId::new("X"),
            ProcessContext {
                product: Some("A".to_string()),
                ..Default::default()
            },
        );
        let b = DetectorKey::new(
            ItemId::new("x"),
            ProcessContext {
                product: Some("a".to_string()),
                ..Default::default()
            },
        );
        assert_eq!(a.canonical(), b.canonical());
    }

    #[test]
    fn test_side_serialization() {
        let json = serde_json::to_string(&MonitoringSide::Both).unwrap();
        assert_eq!(json, "\"both\"");
        let side: MonitoringSide = serde_json::from_str("\"upper\"").unwrap();
        assert_eq!(side, MonitoringSide::Upper);
    }
}
