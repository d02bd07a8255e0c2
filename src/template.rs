//! Extraction template records and the on-disk template store.
//!
//! A template is the persisted recipe for pulling mass times out of one
//! parish's source, plus the baseline day→times map captured when it was
//! built. Templates serialise to `<parish_id>.json`, pretty-printed, with
//! absent sub-templates omitted.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::models::{Day, SourceType};

/// How the extractor should read the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    CssSelectorRegex,
    PdfFulltextRegex,
    PdfRegionRegex,
}

/// Template for extracting mass times from a web page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebTemplate {
    pub url: String,
    pub section_selector: String,
    #[serde(default)]
    pub fallback_selectors: Vec<String>,
    #[serde(default = "default_time_regex")]
    pub time_regex: String,
    #[serde(default = "default_day_regex")]
    pub day_regex: String,
    #[serde(default = "default_encoding")]
    pub encoding: String,
}

fn default_time_regex() -> String {
    r"\d{1,2}[:.]\d{2}\s*[AaPp]\.?[Mm]\.?".to_string()
}

fn default_day_regex() -> String {
    r"(Monday|Tuesday|Wednesday|Thursday|Friday|Saturday|Sunday)".to_string()
}

fn default_encoding() -> String {
    "utf-8".to_string()
}

impl WebTemplate {
    pub fn new(url: impl Into<String>, section_selector: impl Into<String>) -> Self {
        WebTemplate {
            url: url.into(),
            section_selector: section_selector.into(),
            fallback_selectors: Vec::new(),
            time_regex: default_time_regex(),
            day_regex: default_day_regex(),
            encoding: default_encoding(),
        }
    }
}

/// Axis-aligned page region in PDF points, top-left origin.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingRegion {
    pub x_min: f64,
    pub y_min: f64,
    pub x_max: f64,
    pub y_max: f64,
}

impl BoundingRegion {
    /// A zero `x_max` marks "no region"; the extractor then falls back to
    /// whole-document text.
    pub fn is_empty(&self) -> bool {
        self.x_max <= 0.0
    }
}

/// Template for extracting mass times from a bulletin PDF.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PdfTemplate {
    /// Archive page listing bulletin issues.
    pub bulletin_page_url: String,
    /// Regex picking the right PDF link when the archive lists several.
    #[serde(default)]
    pub pdf_link_pattern: String,
    /// 0-indexed page carrying the mass-times section.
    #[serde(default)]
    pub mass_times_page: usize,
    #[serde(default)]
    pub bounding_region: BoundingRegion,
    #[serde(default)]
    pub heading_text: String,
    #[serde(default)]
    pub heading_font_size: f64,
    /// Whether the region text is materially unchanged across issues.
    #[serde(default = "default_true")]
    pub section_static: bool,
}

fn default_true() -> bool {
    true
}

impl PdfTemplate {
    pub fn new(bulletin_page_url: impl Into<String>) -> Self {
        PdfTemplate {
            bulletin_page_url: bulletin_page_url.into(),
            pdf_link_pattern: String::new(),
            mass_times_page: 0,
            bounding_region: BoundingRegion::default(),
            heading_text: String::new(),
            heading_font_size: 0.0,
            section_static: true,
        }
    }
}

/// Quantitative gates applied by the validator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationRules {
    pub min_weekly_masses: usize,
    pub max_weekly_masses: usize,
    pub expected_sunday_count: usize,
    pub alert_if_all_change: bool,
}

impl Default for ValidationRules {
    fn default() -> Self {
        ValidationRules {
            min_weekly_masses: 5,
            max_weekly_masses: 20,
            expected_sunday_count: 3,
            alert_if_all_change: true,
        }
    }
}

fn default_change_indicators() -> Vec<String> {
    ["No Mass", "Mass cancelled", "changed to", "Note:", "Please note"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_language_markers() -> Vec<String> {
    ["Italian", "Vietnamese", "Latin", "Polish"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_special_mass_markers() -> Vec<String> {
    ["Vigil", "Reconciliation", "Adoration", "Latin", "Children"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Complete extraction template for one parish.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParishTemplate {
    pub parish_id: String,
    pub parish_name: String,
    pub source_type: SourceType,
    #[serde(default)]
    pub source_priority: Vec<SourceType>,
    pub extraction_method: ExtractionMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_template: Option<WebTemplate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_template: Option<PdfTemplate>,
    /// Day → ordered canonical time strings captured at build time; the
    /// tier-1 confirmation source.
    pub baseline_times: BTreeMap<Day, Vec<String>>,
    #[serde(default = "default_change_indicators")]
    pub change_indicators: Vec<String>,
    #[serde(default = "default_language_markers")]
    pub language_markers: Vec<String>,
    #[serde(default = "default_special_mass_markers")]
    pub special_mass_markers: Vec<String>,
    #[serde(default)]
    pub validation_rules: ValidationRules,
    pub template_version: u32,
    pub created_at: DateTime<Utc>,
    pub last_validated: DateTime<Utc>,
    #[serde(default)]
    pub validation_accuracy: f64,
    #[serde(default = "default_build_method")]
    pub build_method: String,
    #[serde(default)]
    pub notes: String,
}

fn default_build_method() -> String {
    "automated".to_string()
}

impl ParishTemplate {
    pub fn new(
        parish_id: impl Into<String>,
        parish_name: impl Into<String>,
        source_type: SourceType,
        extraction_method: ExtractionMethod,
    ) -> Self {
        let now = Utc::now();
        ParishTemplate {
            parish_id: parish_id.into(),
            parish_name: parish_name.into(),
            source_type,
            source_priority: vec![source_type],
            extraction_method,
            web_template: None,
            pdf_template: None,
            baseline_times: BTreeMap::new(),
            change_indicators: default_change_indicators(),
            language_markers: default_language_markers(),
            special_mass_markers: default_special_mass_markers(),
            validation_rules: ValidationRules::default(),
            template_version: 1,
            created_at: now,
            last_validated: now,
            validation_accuracy: 0.0,
            build_method: default_build_method(),
            notes: String::new(),
        }
    }

    /// The URL the extractor should start from.
    pub fn source_url(&self) -> &str {
        if let Some(web) = &self.web_template {
            &web.url
        } else if let Some(pdf) = &self.pdf_template {
            &pdf.bulletin_page_url
        } else {
            ""
        }
    }

    pub fn total_baseline_times(&self) -> usize {
        self.baseline_times.values().map(Vec::len).sum()
    }
}

/// Directory of `<parish_id>.json` template files.
pub struct TemplateStore {
    dir: PathBuf,
}

impl TemplateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        TemplateStore { dir: dir.into() }
    }

    pub fn path_for(&self, parish_id: &str) -> PathBuf {
        self.dir.join(format!("{parish_id}.json"))
    }

    /// Persist a template, bumping `template_version` past any version
    /// already on disk for the same parish.
    pub fn save(&self, template: &mut ParishTemplate) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating template dir {}", self.dir.display()))?;

        if let Some(existing) = self.load(&template.parish_id)? {
            template.template_version = existing.template_version + 1;
        }

        let path = self.path_for(&template.parish_id);
        let json = serde_json::to_string_pretty(template)?;
        fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
        info!(parish = %template.parish_id, version = template.template_version, path = %path.display(), "template saved");
        Ok(path)
    }

    pub fn load(&self, parish_id: &str) -> Result<Option<ParishTemplate>> {
        let path = self.path_for(parish_id);
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
        let template = serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
        Ok(Some(template))
    }

    /// Load every template in the directory, sorted by file name. Unreadable
    /// files are skipped with a log line rather than failing the run.
    pub fn load_all(&self) -> Result<Vec<ParishTemplate>> {
        let mut templates = Vec::new();
        if !self.dir.exists() {
            return Ok(templates);
        }
        let mut paths: Vec<PathBuf> = fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();

        for path in paths {
            match fs::read_to_string(&path)
                .map_err(anyhow::Error::from)
                .and_then(|raw| serde_json::from_str::<ParishTemplate>(&raw).map_err(Into::into))
            {
                Ok(template) => templates.push(template),
                Err(err) => {
                    debug!(path = %path.display(), error = %err, "skipping unreadable template");
                }
            }
        }
        Ok(templates)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}
