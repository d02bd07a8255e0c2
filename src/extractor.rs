//! Three-tier extraction pipeline.
//!
//! Tier 1 confirms the baseline statically, tier 2 re-parses the source with
//! the deterministic recognisers, tier 3 falls back to an LLM. Tiers run
//! strictly in order; the first success wins, and a total miss produces a
//! flagged result rather than an error.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use serde::Deserialize;
use tracing::{error, info, warn};

use crate::builder::text_lines;
use crate::fetcher::Fetcher;
use crate::llm::{LlmClient, LlmRates, build_extraction_prompt};
use crate::models::{
    Day, ExtractionResult, ExtractionTier, MassTime, SourceType, ValidationStatus,
};
use crate::parser::{detect_change_indicators, detect_language, detect_special_type, parse_day_time_block, parse_time};
use crate::template::ParishTemplate;

static FENCED_JSON_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:json)?\s*(.*?)```").expect("valid fence regex"));

const LLM_MAX_TOKENS: u32 = 1024;

pub struct Extractor<'a, F: Fetcher, L: LlmClient> {
    fetcher: &'a F,
    llm: Option<&'a L>,
    fallback_model: String,
    rates: LlmRates,
}

impl<'a, F: Fetcher, L: LlmClient> Extractor<'a, F, L> {
    pub fn new(fetcher: &'a F, llm: Option<&'a L>, fallback_model: impl Into<String>, rates: LlmRates) -> Self {
        Extractor {
            fetcher,
            llm,
            fallback_model: fallback_model.into(),
            rates,
        }
    }

    /// Run the pipeline for one parish template.
    ///
    /// Never fails: when the source is unreachable or every tier misses, the
    /// result comes back flagged with zero confidence and empty times.
    pub async fn extract(&self, template: &ParishTemplate, dry_run: bool) -> ExtractionResult {
        let mut result = ExtractionResult::empty(&template.parish_id, template.source_type);
        result.source_url = template.source_url().to_string();

        let Some((text, content_hash)) = self.fetch_content(template).await else {
            error!(parish = %template.parish_id, "could not fetch content");
            result.validation_status = ValidationStatus::Flagged;
            result.confidence = 0.0;
            return result;
        };
        result.content_hash = content_hash;

        if let Some(times) = tier1_static(template, &text) {
            info!(parish = %template.parish_id, times = times.len(), "tier 1 static confirmation");
            result.times = times;
            result.tier = ExtractionTier::Static;
            result.confidence = 1.0;
            result.validation_status = ValidationStatus::Confirmed;
            return result;
        }

        if let Some(times) = tier2_code(template, &text) {
            info!(parish = %template.parish_id, times = times.len(), "tier 2 code extraction");
            result.times = times;
            result.tier = ExtractionTier::Code;
            result.confidence = 0.85;
            result.validation_status = ValidationStatus::Confirmed;
            return result;
        }

        if !dry_run {
            if let Some((times, cost)) = self.tier3_llm(template, &text).await {
                info!(parish = %template.parish_id, times = times.len(), cost, "tier 3 llm extraction");
                result.times = times;
                result.tier = ExtractionTier::Llm;
                result.confidence = 0.7;
                result.validation_status = ValidationStatus::Provisional;
                result.llm_model = Some(self.fallback_model.clone());
                result.llm_cost_usd = cost;
                return result;
            }
        }

        warn!(parish = %template.parish_id, "all extraction tiers failed");
        result.validation_status = ValidationStatus::Flagged;
        result.confidence = 0.0;
        result
    }

    /// Fetch the source text the tiers run over, plus its content hash.
    async fn fetch_content(&self, template: &ParishTemplate) -> Option<(String, String)> {
        match template.source_type {
            SourceType::WebsitePage | SourceType::StructuredData => {
                let web = template.web_template.as_ref()?;
                let (html, content_hash) = self.fetcher.fetch_page(&web.url).await?;
                let mut selectors = vec![web.section_selector.clone()];
                selectors.extend(web.fallback_selectors.iter().cloned());
                let text = select_section_text(&html, &selectors);
                Some((text, content_hash))
            }
            SourceType::PdfBulletin => {
                let pdf = template.pdf_template.as_ref()?;
                if pdf.bulletin_page_url.is_empty() {
                    return None;
                }
                let pdf_url = self
                    .fetcher
                    .find_latest_pdf_link(&pdf.bulletin_page_url, &pdf.pdf_link_pattern)
                    .await?;
                let (bytes, content_hash) = self.fetcher.fetch_pdf(&pdf_url).await?;

                let text = if !pdf.bounding_region.is_empty() {
                    let region = &pdf.bounding_region;
                    let region_text = self.fetcher.extract_text_from_region(
                        &bytes,
                        pdf.mass_times_page,
                        region.x_min,
                        region.y_min,
                        region.x_max,
                        region.y_max,
                    );
                    if region_text.trim().is_empty() {
                        self.fetcher.extract_text_from_pdf(&bytes)
                    } else {
                        region_text
                    }
                } else {
                    self.fetcher.extract_text_from_pdf(&bytes)
                };
                Some((text, content_hash))
            }
            SourceType::IcalFeed | SourceType::FacebookPage => None,
        }
    }

    /// Tier 3: send the text to the LLM and parse its strict-JSON reply.
    ///
    /// Any failure (missing client, API error, malformed JSON) is terminal
    /// and reported as `None`.
    async fn tier3_llm(&self, template: &ParishTemplate, text: &str) -> Option<(Vec<MassTime>, f64)> {
        let llm = self.llm?;
        let prompt = build_extraction_prompt(&template.baseline_times, text);

        let reply = match llm.complete(&self.fallback_model, LLM_MAX_TOKENS, &prompt).await {
            Ok(reply) => reply,
            Err(err) => {
                error!(parish = %template.parish_id, error = %err, "tier 3 llm request failed");
                return None;
            }
        };
        let cost = self.rates.cost_usd(reply.usage);

        let raw = reply.text.trim();
        let json_text = if raw.contains("```") {
            match FENCED_JSON_RE.captures(raw) {
                Some(caps) => caps.get(1).map(|m| m.as_str().trim().to_string())?,
                None => return None,
            }
        } else {
            raw.to_string()
        };

        let payload: LlmTimesPayload = match serde_json::from_str(&json_text) {
            Ok(payload) => payload,
            Err(err) => {
                error!(parish = %template.parish_id, error = %err, "tier 3 returned invalid json");
                return None;
            }
        };

        let times: Vec<MassTime> = payload
            .times
            .into_iter()
            .filter_map(|entry| {
                let Some(day) = Day::from_name(&entry.day) else {
                    warn!(day = %entry.day, "tier 3 returned unknown day, skipping");
                    return None;
                };
                // Normalise to the canonical clock form where possible.
                let time = parse_time(&entry.time)
                    .map(|t| t.formatted())
                    .unwrap_or(entry.time);
                Some(MassTime {
                    day,
                    time,
                    mass_type: entry.mass_type,
                    language: entry.language,
                    notes: entry.notes,
                })
            })
            .collect();

        if times.is_empty() {
            return None;
        }
        Some((times, cost))
    }
}

#[derive(Debug, Deserialize)]
struct LlmTimesPayload {
    #[serde(default)]
    times: Vec<LlmTimeEntry>,
}

#[derive(Debug, Deserialize)]
struct LlmTimeEntry {
    #[serde(default)]
    day: String,
    #[serde(default)]
    time: String,
    #[serde(default = "default_type", rename = "type")]
    mass_type: String,
    #[serde(default = "default_language")]
    language: String,
    #[serde(default)]
    notes: String,
}

fn default_type() -> String {
    "Regular".to_string()
}

fn default_language() -> String {
    "English".to_string()
}

/// Pick the section text using the template's selectors, in order; fall back
/// to the whole document when none select anything.
fn select_section_text(html: &str, selectors: &[String]) -> String {
    let doc = Html::parse_document(html);

    for selector in selectors {
        if selector.is_empty() {
            continue;
        }
        let Ok(parsed) = Selector::parse(selector) else {
            continue;
        };
        if let Some(element) = doc.select(&parsed).next() {
            return text_lines(&element);
        }
    }

    text_lines(&doc.root_element())
}

/// Tier 1: re-emit the baseline when nothing suggests it changed.
///
/// Requires a non-empty baseline, no change indicators in the fetched text,
/// and (for PDF templates) a section classified static.
fn tier1_static(template: &ParishTemplate, text: &str) -> Option<Vec<MassTime>> {
    if template.baseline_times.is_empty() {
        return None;
    }

    let changes = detect_change_indicators(text);
    if !changes.is_empty() {
        info!(parish = %template.parish_id, indicators = ?changes, "change indicators found, escalating");
        return None;
    }

    if let Some(pdf) = &template.pdf_template {
        if !pdf.section_static {
            return None;
        }
    }

    let times: Vec<MassTime> = template
        .baseline_times
        .iter()
        .flat_map(|(day, times)| times.iter().map(|time| MassTime::new(*day, time.clone())))
        .collect();

    if times.is_empty() { None } else { Some(times) }
}

/// Tier 2: parse the fetched text and enrich each time with language and
/// special-type context from the line it appeared on.
fn tier2_code(template: &ParishTemplate, text: &str) -> Option<Vec<MassTime>> {
    let day_time_map = parse_day_time_block(text);
    if day_time_map.is_empty() {
        return None;
    }

    let total: usize = day_time_map.values().map(Vec::len).sum();
    if total < template.validation_rules.min_weekly_masses {
        warn!(
            parish = %template.parish_id,
            total,
            min = template.validation_rules.min_weekly_masses,
            "tier 2 extracted too few times"
        );
        return None;
    }

    let mut times = Vec::new();
    for (day, day_times) in &day_time_map {
        for time in day_times {
            // Whitespace-insensitive search for the line carrying this time;
            // the first match wins, which can mislabel a time that repeats on
            // several lines.
            let context = find_context_line(text, time);
            let (mass_type, language) = match context {
                Some(line) => (detect_special_type(line), detect_language(line)),
                None => ("Regular".to_string(), "English".to_string()),
            };
            times.push(MassTime {
                day: *day,
                time: time.clone(),
                mass_type,
                language,
                notes: String::new(),
            });
        }
    }

    if times.is_empty() { None } else { Some(times) }
}

fn find_context_line<'t>(text: &'t str, time: &str) -> Option<&'t str> {
    let needle: String = time.to_lowercase().split_whitespace().collect();
    text.lines().find(|line| {
        let haystack: String = line.to_lowercase().split_whitespace().collect();
        haystack.contains(&needle)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Day;
    use crate::template::{ExtractionMethod, PdfTemplate, ValidationRules, WebTemplate};

    fn make_template() -> ParishTemplate {
        let mut template = ParishTemplate::new(
            "test-parish",
            "Test Parish",
            SourceType::WebsitePage,
            ExtractionMethod::CssSelectorRegex,
        );
        for (day, times) in [
            (Day::Saturday, vec!["6:00 PM"]),
            (Day::Sunday, vec!["8:00 AM", "10:00 AM", "5:30 PM"]),
            (Day::Monday, vec!["9:15 AM"]),
            (Day::Tuesday, vec!["9:15 AM"]),
            (Day::Wednesday, vec!["9:15 AM"]),
            (Day::Thursday, vec!["9:15 AM"]),
            (Day::Friday, vec!["9:15 AM"]),
        ] {
            template
                .baseline_times
                .insert(day, times.into_iter().map(String::from).collect());
        }
        template
    }

    #[test]
    fn tier1_confirms_when_no_changes() {
        let template = make_template();
        let text = "Saturday: 6:00 PM\nSunday: 8:00 AM, 10:00 AM, 5:30 PM";
        let times = tier1_static(&template, text).unwrap();
        // 1 Saturday + 3 Sundays + 5 weekdays.
        assert_eq!(times.len(), 9);
        assert!(times.iter().all(|t| t.mass_type == "Regular"));
    }

    #[test]
    fn tier1_escalates_on_change_indicator() {
        let template = make_template();
        assert!(tier1_static(&template, "No Mass this Tuesday due to maintenance").is_none());
    }

    #[test]
    fn tier1_escalates_without_baseline() {
        let mut template = make_template();
        template.baseline_times.clear();
        assert!(tier1_static(&template, "Saturday: 6:00 PM").is_none());
    }

    #[test]
    fn tier1_escalates_for_dynamic_pdf_section() {
        let mut template = make_template();
        template.source_type = SourceType::PdfBulletin;
        let mut pdf = PdfTemplate::new("https://example.com/bulletin");
        pdf.section_static = false;
        template.pdf_template = Some(pdf);

        assert!(tier1_static(&template, "Saturday: 6:00 PM").is_none());
    }

    #[test]
    fn tier2_extracts_from_simple_text() {
        let template = make_template();
        let text = "Saturday: 6:00 PM\nSunday: 8:00 AM, 10:00 AM, 5:30 PM\nMonday-Friday: 9:15 AM";
        let times = tier2_code(&template, text).unwrap();
        assert!(times.len() >= 8);
        assert!(times.iter().any(|t| t.day == Day::Saturday));
        assert!(times.iter().any(|t| t.day == Day::Sunday));
        assert!(times.iter().any(|t| t.day == Day::Wednesday));
    }

    #[test]
    fn tier2_detects_vigil_mass() {
        let mut template = make_template();
        template.validation_rules = ValidationRules {
            min_weekly_masses: 1,
            ..ValidationRules::default()
        };
        let times = tier2_code(&template, "Saturday Vigil: 6:00 PM\nSunday: 10:00 AM").unwrap();
        let saturday = times.iter().find(|t| t.day == Day::Saturday).unwrap();
        assert_eq!(saturday.mass_type, "Vigil");
    }

    #[test]
    fn tier2_detects_language_from_context_line() {
        let template = make_template();
        let text = "Sunday: 10:00 AM\nSunday Italian Mass: 11:30 AM\nMonday: 9:00 AM\nTuesday: 9:00 AM\nWednesday: 9:00 AM\nThursday: 9:00 AM\nFriday: 9:00 AM";
        let times = tier2_code(&template, text).unwrap();

        let italian: Vec<&MassTime> = times.iter().filter(|t| t.language == "Italian").collect();
        assert_eq!(italian.len(), 1);
        assert_eq!(italian[0].time, "11:30 AM");
        let english = times.iter().find(|t| t.time == "10:00 AM").unwrap();
        assert_eq!(english.language, "English");
    }

    #[test]
    fn tier2_escalates_when_too_few() {
        let template = make_template();
        assert!(tier2_code(&template, "Sunday: 10:00 AM").is_none());
    }

    #[test]
    fn tier2_escalates_on_no_content() {
        let template = make_template();
        assert!(tier2_code(&template, "Welcome to our parish").is_none());
    }

    #[test]
    fn selects_primary_then_fallback_selectors() {
        let html = r#"<html><body>
            <div id="mass-times"><p>Saturday: 6:00 PM</p></div>
            <div class="backup"><p>Sunday: 10:00 AM</p></div>
        </body></html>"#;

        let text = select_section_text(html, &["#mass-times".to_string()]);
        assert!(text.contains("Saturday"));
        assert!(!text.contains("Sunday"));

        let text = select_section_text(
            html,
            &["#missing".to_string(), ".backup".to_string()],
        );
        assert!(text.contains("Sunday"));

        // All selectors missing: whole document.
        let text = select_section_text(html, &["#missing".to_string()]);
        assert!(text.contains("Saturday"));
        assert!(text.contains("Sunday"));
    }

    struct StubFetcher {
        html: Option<String>,
    }

    impl Fetcher for StubFetcher {
        async fn fetch_page(&self, _url: &str) -> Option<(String, String)> {
            self.html.clone().map(|html| (html, "hash123".to_string()))
        }
        async fn fetch_pdf(&self, _url: &str) -> Option<(Vec<u8>, String)> {
            None
        }
        async fn find_latest_pdf_link(&self, _archive_url: &str, _pattern: &str) -> Option<String> {
            None
        }
        fn extract_text_from_pdf(&self, _bytes: &[u8]) -> String {
            String::new()
        }
        fn extract_text_with_coords(&self, _bytes: &[u8]) -> Vec<crate::pdf::Glyph> {
            Vec::new()
        }
        fn extract_text_from_region(
            &self,
            _bytes: &[u8],
            _page: usize,
            _x_min: f64,
            _y_min: f64,
            _x_max: f64,
            _y_max: f64,
        ) -> String {
            String::new()
        }
    }

    struct FakeLlm {
        reply: String,
    }

    impl LlmClient for FakeLlm {
        async fn complete(
            &self,
            _model: &str,
            _max_tokens: u32,
            _prompt: &str,
        ) -> anyhow::Result<crate::llm::LlmReply> {
            Ok(crate::llm::LlmReply {
                text: self.reply.clone(),
                usage: crate::llm::LlmUsage {
                    input_tokens: 1000,
                    output_tokens: 200,
                },
            })
        }
    }

    fn web_template() -> ParishTemplate {
        let mut template = make_template();
        template.web_template = Some(WebTemplate::new(
            "https://example.com/mass-times",
            "#mass-times",
        ));
        template
    }

    #[tokio::test]
    async fn full_pipeline_tier1_success() {
        let html = r#"<html><body>
            <div id="mass-times">
                <p>Saturday: 6:00 PM</p>
                <p>Sunday: 8:00 AM, 10:00 AM, 5:30 PM</p>
            </div>
        </body></html>"#;
        let fetcher = StubFetcher {
            html: Some(html.to_string()),
        };
        let extractor: Extractor<'_, _, FakeLlm> =
            Extractor::new(&fetcher, None, "test-model", LlmRates::default());

        let result = extractor.extract(&web_template(), false).await;
        assert_eq!(result.tier, ExtractionTier::Static);
        assert_eq!(result.confidence, 1.0);
        assert_eq!(result.validation_status, ValidationStatus::Confirmed);
        assert_eq!(result.times.len(), 9);
        assert_eq!(result.content_hash, "hash123");
    }

    #[tokio::test]
    async fn full_pipeline_escalates_to_tier2_on_change_indicator() {
        let html = r#"<html><body>
            <div id="mass-times">
                <p>Note: No 7am Mass this week</p>
                <p>Saturday: 6:00 PM</p>
                <p>Sunday: 8:00 AM, 10:00 AM, 5:30 PM</p>
                <p>Monday-Friday: 9:15 AM</p>
            </div>
        </body></html>"#;
        let fetcher = StubFetcher {
            html: Some(html.to_string()),
        };
        let extractor: Extractor<'_, _, FakeLlm> =
            Extractor::new(&fetcher, None, "test-model", LlmRates::default());

        let result = extractor.extract(&web_template(), false).await;
        assert_eq!(result.tier, ExtractionTier::Code);
        assert_eq!(result.confidence, 0.85);
        assert!(result.times.len() >= 5);
    }

    #[tokio::test]
    async fn full_pipeline_flags_when_all_fail() {
        let fetcher = StubFetcher { html: None };
        let extractor: Extractor<'_, _, FakeLlm> =
            Extractor::new(&fetcher, None, "test-model", LlmRates::default());

        let result = extractor.extract(&web_template(), false).await;
        assert_eq!(result.validation_status, ValidationStatus::Flagged);
        assert_eq!(result.confidence, 0.0);
        assert!(result.times.is_empty());
        assert!(result.content_hash.is_empty());
    }

    #[tokio::test]
    async fn full_pipeline_tier3_llm_fallback() {
        // A sparse page: baseline cleared so tier 1 skips, too few parseable
        // times so tier 2 escalates.
        let html = r#"<html><body><div id="mass-times">
            <p>See our newsletter for Sunday worship at ten</p>
        </div></body></html>"#;
        let fetcher = StubFetcher {
            html: Some(html.to_string()),
        };
        let llm = FakeLlm {
            reply: r#"```json
{"times": [
  {"day": "Sunday", "time": "10:00 AM", "type": "Regular", "language": "English", "notes": ""},
  {"day": "Saturday", "time": "6pm", "type": "Vigil", "language": "English", "notes": ""}
]}
```"#
                .to_string(),
        };
        let extractor = Extractor::new(&fetcher, Some(&llm), "test-model", LlmRates::default());

        let mut template = web_template();
        template.baseline_times.clear();

        let result = extractor.extract(&template, false).await;
        assert_eq!(result.tier, ExtractionTier::Llm);
        assert_eq!(result.confidence, 0.7);
        assert_eq!(result.validation_status, ValidationStatus::Provisional);
        assert_eq!(result.llm_model.as_deref(), Some("test-model"));
        assert!(result.llm_cost_usd > 0.0);
        // The bare "6pm" is normalised to canonical form.
        let saturday = result.times.iter().find(|t| t.day == Day::Saturday).unwrap();
        assert_eq!(saturday.time, "6:00 PM");
        assert_eq!(saturday.mass_type, "Vigil");
    }

    #[tokio::test]
    async fn dry_run_skips_tier3() {
        let html = r#"<html><body><div id="mass-times">
            <p>See our newsletter</p>
        </div></body></html>"#;
        let fetcher = StubFetcher {
            html: Some(html.to_string()),
        };
        let llm = FakeLlm {
            reply: r#"{"times": [{"day": "Sunday", "time": "10:00 AM"}]}"#.to_string(),
        };
        let extractor = Extractor::new(&fetcher, Some(&llm), "test-model", LlmRates::default());

        let mut template = web_template();
        template.baseline_times.clear();

        let result = extractor.extract(&template, true).await;
        assert_eq!(result.validation_status, ValidationStatus::Flagged);
        assert!(result.times.is_empty());
    }

    #[tokio::test]
    async fn malformed_llm_json_degrades_to_flagged() {
        let html = r#"<html><body><p>nothing here</p></body></html>"#;
        let fetcher = StubFetcher {
            html: Some(html.to_string()),
        };
        let llm = FakeLlm {
            reply: "I could not find any mass times.".to_string(),
        };
        let extractor = Extractor::new(&fetcher, Some(&llm), "test-model", LlmRates::default());

        let mut template = web_template();
        template.baseline_times.clear();

        let result = extractor.extract(&template, false).await;
        assert_eq!(result.validation_status, ValidationStatus::Flagged);
        assert_eq!(result.confidence, 0.0);
    }
}
