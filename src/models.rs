//! Data types shared across the pipeline: parishes, sources, mass times and
//! extraction results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Days of the week in canonical Monday-first order.
///
/// `Ord` follows declaration order, so a `BTreeMap<Day, _>` iterates (and
/// serialises) Monday through Sunday. Serialised form is the full English
/// name (`"Monday"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Day {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

pub const ALL_DAYS: [Day; 7] = [
    Day::Monday,
    Day::Tuesday,
    Day::Wednesday,
    Day::Thursday,
    Day::Friday,
    Day::Saturday,
    Day::Sunday,
];

impl Day {
    /// Zero-based index in the Monday-first week.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(idx: usize) -> Day {
        ALL_DAYS[idx % 7]
    }

    pub fn name(self) -> &'static str {
        match self {
            Day::Monday => "Monday",
            Day::Tuesday => "Tuesday",
            Day::Wednesday => "Wednesday",
            Day::Thursday => "Thursday",
            Day::Friday => "Friday",
            Day::Saturday => "Saturday",
            Day::Sunday => "Sunday",
        }
    }

    /// Match a canonical full-form day name.
    pub fn from_name(name: &str) -> Option<Day> {
        ALL_DAYS.iter().copied().find(|d| d.name() == name)
    }
}

impl std::fmt::Display for Day {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Source types in priority order (lower = more reliable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    IcalFeed,
    StructuredData,
    WebsitePage,
    PdfBulletin,
    FacebookPage,
}

impl SourceType {
    /// Numeric priority; lower wins when choosing between sources.
    pub fn priority(self) -> u8 {
        match self {
            SourceType::IcalFeed => 0,
            SourceType::StructuredData => 1,
            SourceType::WebsitePage => 2,
            SourceType::PdfBulletin => 3,
            SourceType::FacebookPage => 4,
        }
    }
}

/// The three escalating extraction strategies.
///
/// Serialises as the bare tier number (1, 2, 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum ExtractionTier {
    Static,
    Code,
    Llm,
}

impl From<ExtractionTier> for u8 {
    fn from(tier: ExtractionTier) -> u8 {
        match tier {
            ExtractionTier::Static => 1,
            ExtractionTier::Code => 2,
            ExtractionTier::Llm => 3,
        }
    }
}

impl TryFrom<u8> for ExtractionTier {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(ExtractionTier::Static),
            2 => Ok(ExtractionTier::Code),
            3 => Ok(ExtractionTier::Llm),
            other => Err(format!("invalid extraction tier {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Confirmed,
    Provisional,
    Flagged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParishStatus {
    Active,
    Closed,
    Merged,
}

impl Default for ParishStatus {
    fn default() -> Self {
        ParishStatus::Active
    }
}

/// A Catholic parish. `id` is a deterministic slug stable across runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parish {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub lat: f64,
    #[serde(default)]
    pub lng: f64,
    #[serde(default)]
    pub distance_km: f64,
    #[serde(default)]
    pub website: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub archdiocese_id: String,
    #[serde(default)]
    pub status: ParishStatus,
}

impl Parish {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Parish {
            id: id.into(),
            name: name.into(),
            address: String::new(),
            lat: 0.0,
            lng: 0.0,
            distance_km: 0.0,
            website: String::new(),
            phone: String::new(),
            email: String::new(),
            archdiocese_id: String::new(),
            status: ParishStatus::Active,
        }
    }
}

/// A discovered source for a parish's mass times.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceEndpoint {
    pub parish_id: String,
    pub source_type: SourceType,
    pub url: String,
    #[serde(default)]
    pub is_primary: bool,
    #[serde(default = "default_check_frequency")]
    pub check_frequency_hours: u32,
}

fn default_check_frequency() -> u32 {
    48
}

/// A single scheduled mass. Cross-reference equality is `(day, time)` only;
/// see [`MassTime::key`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MassTime {
    pub day: Day,
    /// Canonical `H:MM AM|PM` form.
    pub time: String,
    #[serde(default = "default_mass_type")]
    pub mass_type: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub notes: String,
}

fn default_mass_type() -> String {
    "Regular".to_string()
}

fn default_language() -> String {
    "English".to_string()
}

impl MassTime {
    pub fn new(day: Day, time: impl Into<String>) -> Self {
        MassTime {
            day,
            time: time.into(),
            mass_type: default_mass_type(),
            language: default_language(),
            notes: String::new(),
        }
    }

    /// Identity used for cross-referencing and change detection.
    pub fn key(&self) -> (Day, &str) {
        (self.day, self.time.as_str())
    }
}

/// Result of one extraction run for one parish. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub parish_id: String,
    pub times: Vec<MassTime>,
    pub tier: ExtractionTier,
    pub confidence: f64,
    pub validation_status: ValidationStatus,
    pub source_url: String,
    pub source_type: SourceType,
    pub content_hash: String,
    pub llm_model: Option<String>,
    pub llm_cost_usd: f64,
    pub extracted_at: DateTime<Utc>,
    #[serde(default)]
    pub changes_from_previous: Vec<String>,
}

impl ExtractionResult {
    /// An empty result in the default (tier-1, confirmed) state; the
    /// extractor overwrites the fields as the pipeline progresses.
    pub fn empty(parish_id: impl Into<String>, source_type: SourceType) -> Self {
        ExtractionResult {
            parish_id: parish_id.into(),
            times: Vec::new(),
            tier: ExtractionTier::Static,
            confidence: 1.0,
            validation_status: ValidationStatus::Confirmed,
            source_url: String::new(),
            source_type,
            content_hash: String::new(),
            llm_model: None,
            llm_cost_usd: 0.0,
            extracted_at: Utc::now(),
            changes_from_previous: Vec::new(),
        }
    }

    /// The persisted result-file form: exactly the published field set, in a
    /// stable order.
    pub fn to_file_json(&self) -> serde_json::Value {
        serde_json::json!({
            "parish_id": self.parish_id,
            "times": self.times,
            "tier": self.tier,
            "confidence": self.confidence,
            "validation_status": self.validation_status,
            "content_hash": self.content_hash,
            "source_url": self.source_url,
            "llm_model": self.llm_model,
            "llm_cost_usd": self.llm_cost_usd,
            "extracted_at": self.extracted_at.to_rfc3339(),
        })
    }
}
