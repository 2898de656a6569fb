//! Canonical identification record
//!
//! `ComponentRecord` is the depth-independent result shape. Every field is
//! always populated (empty defaults for what the service did not provide),
//! and the record is never mutated after the ledger mints it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::{Identity, ImagePayload};

/// Requested analysis depth
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisLevel {
    #[default]
    Basic,
    Advanced,
}

impl AnalysisLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisLevel::Basic => "basic",
            AnalysisLevel::Advanced => "advanced",
        }
    }
}

impl fmt::Display for AnalysisLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "basic" => Ok(AnalysisLevel::Basic),
            "advanced" => Ok(AnalysisLevel::Advanced),
            other => Err(format!("unknown analysis level: {}", other)),
        }
    }
}

/// Identification confidence reported by the recognition service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Confidence {
    High,
    Medium,
    Low,
    /// Not identified; the record's usage text carries the reason
    Uncertain,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::High => "High",
            Confidence::Medium => "Medium",
            Confidence::Low => "Low",
            Confidence::Uncertain => "Uncertain",
        }
    }

    /// Badge text shown next to a result
    pub fn label(&self) -> String {
        format!("{} Confidence", self.as_str())
    }

    pub fn is_identified(&self) -> bool {
        !matches!(self, Confidence::Uncertain)
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Confidence {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "High" => Ok(Confidence::High),
            "Medium" => Ok(Confidence::Medium),
            "Low" => Ok(Confidence::Low),
            "Uncertain" => Ok(Confidence::Uncertain),
            other => Err(format!("unknown confidence: {}", other)),
        }
    }
}

/// Ledger-assigned record identifier (UUIDv7, creation-time derived)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(Uuid);

impl RecordId {
    pub(crate) fn mint() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for RecordId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Named specification value; order is display order, names may repeat
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Specification {
    pub name: String,
    pub value: String,
}

/// One pin of a component's pinout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pin {
    pub pin_number: u32,
    pub pin_name: String,
    pub pin_description: String,
}

/// Canonical identification record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentRecord {
    pub id: RecordId,
    pub owner_id: Identity,
    pub name: String,
    pub category: String,
    pub description: String,
    pub manufacturer: String,
    pub package_type: String,
    pub application_category: String,
    pub key_features: Vec<String>,
    pub substitutes: Vec<String>,
    pub functional_blocks: Vec<String>,
    pub pinout: Vec<Pin>,
    pub specifications: Vec<Specification>,
    pub common_usage: String,
    pub confidence: Confidence,
    pub datasheet_url: String,
    /// Depth that produced this record (traceability only)
    pub analysis_level: AnalysisLevel,
    pub image: ImagePayload,
    pub created_at: DateTime<Utc>,
}

impl ComponentRecord {
    /// Ordering key: newest first when iterated in reverse
    pub fn order_key(&self) -> (DateTime<Utc>, RecordId) {
        (self.created_at, self.id)
    }

    pub fn summary(&self) -> HistoryEntrySummary {
        HistoryEntrySummary {
            id: self.id,
            name: self.name.clone(),
            category: self.category.clone(),
            confidence: self.confidence,
            created_at: self.created_at,
        }
    }
}

/// Compact list-row form of a record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntrySummary {
    pub id: RecordId,
    pub name: String,
    pub category: String,
    pub confidence: Confidence,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_parsing_is_exact() {
        assert_eq!("High".parse::<Confidence>(), Ok(Confidence::High));
        assert_eq!("Uncertain".parse::<Confidence>(), Ok(Confidence::Uncertain));
        assert!("high".parse::<Confidence>().is_err());
        assert!("Certain".parse::<Confidence>().is_err());
    }

    #[test]
    fn test_confidence_label() {
        assert_eq!(Confidence::Medium.label(), "Medium Confidence");
        assert!(Confidence::Low.is_identified());
        assert!(!Confidence::Uncertain.is_identified());
    }

    #[test]
    fn test_analysis_level_parsing() {
        assert_eq!("Advanced".parse::<AnalysisLevel>(), Ok(AnalysisLevel::Advanced));
        assert_eq!(" basic ".parse::<AnalysisLevel>(), Ok(AnalysisLevel::Basic));
        assert!("deep".parse::<AnalysisLevel>().is_err());
        assert_eq!(AnalysisLevel::default(), AnalysisLevel::Basic);
    }

    #[test]
    fn test_record_id_roundtrip_through_string() {
        let id = RecordId::mint();
        let parsed: RecordId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }
}
