//! Automated template building.
//!
//! Analyses parish web pages and bulletin PDFs to build extraction templates
//! using code-based structural analysis, no LLM involved:
//!
//! 1. HTML: rank candidate mass-times sections, derive a stable CSS selector,
//!    capture baseline times.
//! 2. PDF: find the mass-times heading among positioned text lines, grow a
//!    bounding region from it, capture baseline times, and classify the
//!    section as static or dynamic by diffing several issues.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, warn};

use crate::fetcher::Fetcher;
use crate::models::Parish;
use crate::parser::{find_days, find_times, has_mass_times_heading, parse_day_time_block};
use crate::pdf::{TextLine, group_into_lines};
use crate::similarity::similarity_ratio;
use crate::template::{
    BoundingRegion, ExtractionMethod, ParishTemplate, PdfTemplate, WebTemplate,
};

static SECTION_ATTR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)mass|times|schedule|liturgy").expect("valid attr regex"));

/// Region bounding boxes are inflated by this margin, in points.
const REGION_MARGIN: f64 = 20.0;

/// All pairwise similarity ratios must reach this for a section to be static.
const STATIC_SIMILARITY_THRESHOLD: f64 = 0.95;

pub struct TemplateBuilder<'f, F: Fetcher> {
    fetcher: &'f F,
}

impl<'f, F: Fetcher> TemplateBuilder<'f, F> {
    pub fn new(fetcher: &'f F) -> Self {
        TemplateBuilder { fetcher }
    }

    /// Build a template from a parish's mass-times web page.
    ///
    /// Returns `None` when the page cannot be fetched, no section is found,
    /// or the section yields no baseline times.
    pub async fn build_web_template(&self, url: &str, parish: &Parish) -> Option<ParishTemplate> {
        let Some((html, _content_hash)) = self.fetcher.fetch_page(url).await else {
            warn!(url = %url, "could not fetch page");
            return None;
        };

        let Some(analysis) = analyze_page(&html) else {
            warn!(url = %url, "could not find mass times section");
            return None;
        };

        let baseline_times = parse_day_time_block(&analysis.section_text);
        if baseline_times.is_empty() {
            warn!(url = %url, "no times found in mass times section");
            return None;
        }

        let mut template = ParishTemplate::new(
            &parish.id,
            &parish.name,
            crate::models::SourceType::WebsitePage,
            ExtractionMethod::CssSelectorRegex,
        );
        let mut web = WebTemplate::new(url, analysis.selector);
        web.fallback_selectors = analysis.fallback_selectors;
        template.web_template = Some(web);
        template.baseline_times = baseline_times;

        info!(
            parish = %parish.id,
            selector = %template.web_template.as_ref().map(|w| w.section_selector.as_str()).unwrap_or(""),
            times = template.total_baseline_times(),
            "built web template"
        );
        Some(template)
    }

    /// Build a template from one or more bulletin PDF issues.
    ///
    /// The first issue drives structure discovery; the rest feed the
    /// static/dynamic classification.
    pub async fn build_pdf_template(
        &self,
        pdf_issues: &[Vec<u8>],
        parish: &Parish,
        bulletin_page_url: &str,
        pdf_link_pattern: &str,
    ) -> Option<ParishTemplate> {
        let primary = pdf_issues.first()?;
        let glyphs = self.fetcher.extract_text_with_coords(primary);
        let lines = group_into_lines(glyphs);

        let Some(section) = find_pdf_mass_times_section(&lines) else {
            // No anchored section; fall back to whole-document text.
            let full_text = self.fetcher.extract_text_from_pdf(primary);
            let baseline_times = parse_day_time_block(&full_text);
            if baseline_times.is_empty() {
                warn!(parish = %parish.name, "no times found in pdf");
                return None;
            }

            let mut template = ParishTemplate::new(
                &parish.id,
                &parish.name,
                crate::models::SourceType::PdfBulletin,
                ExtractionMethod::PdfFulltextRegex,
            );
            let mut pdf = PdfTemplate::new(bulletin_page_url);
            pdf.pdf_link_pattern = pdf_link_pattern.to_string();
            template.pdf_template = Some(pdf);
            template.baseline_times = baseline_times;
            info!(parish = %parish.id, "built pdf full-text template");
            return Some(template);
        };

        let region_text = self.fetcher.extract_text_from_region(
            primary,
            section.page,
            section.region.x_min,
            section.region.y_min,
            section.region.x_max,
            section.region.y_max,
        );
        let mut baseline_times = parse_day_time_block(&region_text);
        if baseline_times.is_empty() {
            let full_text = self.fetcher.extract_text_from_pdf(primary);
            baseline_times = parse_day_time_block(&full_text);
        }
        if baseline_times.is_empty() {
            warn!(parish = %parish.name, "no times found in pdf region or full text");
            return None;
        }

        let section_static = self
            .classify_static_dynamic(pdf_issues, section.page, &section.region)
            .await;

        let mut template = ParishTemplate::new(
            &parish.id,
            &parish.name,
            crate::models::SourceType::PdfBulletin,
            ExtractionMethod::PdfRegionRegex,
        );
        let mut pdf = PdfTemplate::new(bulletin_page_url);
        pdf.pdf_link_pattern = pdf_link_pattern.to_string();
        pdf.mass_times_page = section.page;
        pdf.bounding_region = section.region;
        pdf.heading_text = section.heading_text;
        pdf.heading_font_size = section.heading_font_size;
        pdf.section_static = section_static;
        template.pdf_template = Some(pdf);
        template.baseline_times = baseline_times;

        info!(
            parish = %parish.id,
            page = section.page,
            section_static,
            times = template.total_baseline_times(),
            "built pdf region template"
        );
        Some(template)
    }

    /// Diff the region text across issues; static iff every pair of issues
    /// is at least 95% similar. A single issue defaults to static.
    async fn classify_static_dynamic(
        &self,
        pdf_issues: &[Vec<u8>],
        page: usize,
        region: &BoundingRegion,
    ) -> bool {
        if pdf_issues.len() < 2 {
            return true;
        }

        let texts: Vec<String> = pdf_issues
            .iter()
            .map(|bytes| {
                self.fetcher
                    .extract_text_from_region(
                        bytes, page, region.x_min, region.y_min, region.x_max, region.y_max,
                    )
                    .trim()
                    .to_string()
            })
            .collect();

        for i in 0..texts.len() {
            for j in (i + 1)..texts.len() {
                let ratio = similarity_ratio(&texts[i], &texts[j]);
                if ratio < STATIC_SIMILARITY_THRESHOLD {
                    debug!(ratio, "section classified dynamic");
                    return false;
                }
            }
        }
        true
    }
}

struct PageAnalysis {
    selector: String,
    fallback_selectors: Vec<String>,
    section_text: String,
}

/// Locate the mass-times section of an HTML page via ranked heuristics and
/// return the chosen selector, up to three fallbacks, and the section text.
fn analyze_page(html: &str) -> Option<PageAnalysis> {
    let doc = Html::parse_document(html);

    // (serialized element html, selector, priority); lower priority wins,
    // document order breaks ties via the stable sort.
    let mut candidates: Vec<(ElementRef<'_>, String, u8)> = Vec::new();

    let heading_sel = Selector::parse("h1, h2, h3, h4, h5, h6").expect("valid selector");
    for heading in doc.select(&heading_sel) {
        let text: String = heading.text().collect();
        if !has_mass_times_heading(text.trim()) {
            continue;
        }
        if let Some(parent) = heading.parent().and_then(ElementRef::wrap) {
            let selector = build_selector(&parent);
            candidates.push((parent, selector, 1));
        }
        if let Some(sibling) = heading
            .next_siblings()
            .find_map(ElementRef::wrap)
        {
            let selector = build_selector(&sibling);
            candidates.push((sibling, selector, 2));
        }
    }

    let any_sel = Selector::parse("*").expect("valid selector");
    for element in doc.select(&any_sel) {
        if let Some(id) = element.value().id() {
            if SECTION_ATTR_RE.is_match(id) {
                candidates.push((element, format!("#{id}"), 3));
            }
        }
        if let Some(class) = element.value().classes().find(|c| SECTION_ATTR_RE.is_match(c)) {
            candidates.push((element, format!(".{class}"), 4));
        }
    }

    let table_sel = Selector::parse("table").expect("valid selector");
    for table in doc.select(&table_sel) {
        let text = joined_text(&table);
        if !find_days(&text).is_empty() && !find_times(&text).is_empty() {
            let selector = build_selector(&table);
            candidates.push((table, selector, 5));
        }
    }

    let list_sel = Selector::parse("ul, ol").expect("valid selector");
    for list in doc.select(&list_sel) {
        let text = joined_text(&list);
        if !find_times(&text).is_empty()
            && (!find_days(&text).is_empty() || has_mass_times_heading(&text))
        {
            let selector = build_selector(&list);
            candidates.push((list, selector, 6));
        }
    }

    if candidates.is_empty() {
        return None;
    }

    candidates.sort_by_key(|(_, _, priority)| *priority);
    let (best, selector, _) = candidates.first()?.clone();
    let fallback_selectors = candidates
        .iter()
        .skip(1)
        .take(3)
        .map(|(_, sel, _)| sel.clone())
        .collect();

    Some(PageAnalysis {
        selector,
        fallback_selectors,
        section_text: extract_section_text(&best),
    })
}

/// Build a stable CSS-style selector: `#id`, else `tag.classes`, else
/// `parent > tag` with the parent's id/classes when it has any.
fn build_selector(element: &ElementRef<'_>) -> String {
    if let Some(id) = element.value().id() {
        return format!("#{id}");
    }

    let classes: Vec<&str> = element.value().classes().collect();
    if !classes.is_empty() {
        return format!("{}.{}", element.value().name(), classes.join("."));
    }

    if let Some(parent) = element.parent().and_then(ElementRef::wrap) {
        if parent.value().name() != "html" {
            let parent_selector = if let Some(id) = parent.value().id() {
                format!("#{id}")
            } else {
                let parent_classes: Vec<&str> = parent.value().classes().collect();
                if parent_classes.is_empty() {
                    parent.value().name().to_string()
                } else {
                    format!("{}.{}", parent.value().name(), parent_classes.join("."))
                }
            };
            return format!("{parent_selector} > {}", element.value().name());
        }
    }

    element.value().name().to_string()
}

/// Section text with tables flattened row-by-row.
///
/// Table rows are joined cell-by-cell with single spaces so the day and its
/// times land on one line, which the block parser depends on. Non-table
/// children contribute one line each.
pub fn extract_section_text(section: &ElementRef<'_>) -> String {
    let mut lines: Vec<String> = Vec::new();

    let table_sel = Selector::parse("table").expect("valid selector");
    let row_sel = Selector::parse("tr").expect("valid selector");
    let cell_sel = Selector::parse("td, th").expect("valid selector");

    let is_table = section.value().name() == "table";
    let tables: Vec<ElementRef<'_>> = if is_table {
        vec![*section]
    } else {
        section.select(&table_sel).collect()
    };

    for table in &tables {
        for row in table.select(&row_sel) {
            let cells: Vec<String> = row.select(&cell_sel).map(|cell| joined_text(&cell)).collect();
            let line = cells.join(" ");
            if !line.trim().is_empty() {
                lines.push(line);
            }
        }
    }

    if !is_table {
        for child in section.children() {
            if let Some(element) = ElementRef::wrap(child) {
                if element.value().name() == "table" {
                    continue;
                }
                let text = joined_text(&element);
                if !text.is_empty() {
                    lines.push(text);
                }
            } else if let Some(text) = child.value().as_text() {
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    lines.push(trimmed.to_string());
                }
            }
        }
    }

    if lines.is_empty() {
        return text_lines(section);
    }
    lines.join("\n")
}

/// All of an element's text, whitespace-normalised onto one line.
fn joined_text(element: &ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// All of an element's text with one line per text node.
pub fn text_lines(element: &ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

struct PdfSection {
    page: usize,
    region: BoundingRegion,
    heading_text: String,
    heading_font_size: f64,
}

/// Find the mass-times section among positioned lines.
///
/// Anchors on the first line matching a mass-times heading, then grows the
/// region down the same page through lines carrying times or days. A later
/// line with near-heading font size and no schedule content ends the region.
/// Anchors with fewer than two lines are rejected and the scan continues.
fn find_pdf_mass_times_section(lines: &[TextLine]) -> Option<PdfSection> {
    for (idx, anchor) in lines.iter().enumerate() {
        if !has_mass_times_heading(&anchor.text) {
            continue;
        }

        let mut region_lines: Vec<&TextLine> = vec![anchor];
        for other in &lines[idx + 1..] {
            if other.page != anchor.page || other.y0 <= anchor.y0 {
                continue;
            }
            let has_schedule_content =
                !find_times(&other.text).is_empty() || !find_days(&other.text).is_empty();
            if has_schedule_content {
                region_lines.push(other);
            } else if other.size >= anchor.size * 0.9
                && other.text.trim().len() > 3
                && !has_mass_times_heading(&other.text)
            {
                // Next section header.
                break;
            }
        }

        if region_lines.len() < 2 {
            // Heading with no schedule under it; keep scanning.
            continue;
        }

        let x_min = region_lines.iter().map(|l| l.x0).fold(f64::INFINITY, f64::min);
        let y_min = region_lines.iter().map(|l| l.y0).fold(f64::INFINITY, f64::min);
        let x_max = region_lines.iter().map(|l| l.x1).fold(f64::NEG_INFINITY, f64::max);
        let y_max = region_lines.iter().map(|l| l.y1).fold(f64::NEG_INFINITY, f64::max);

        return Some(PdfSection {
            page: anchor.page,
            region: BoundingRegion {
                x_min: (x_min - REGION_MARGIN).max(0.0),
                y_min: (y_min - REGION_MARGIN).max(0.0),
                x_max: x_max + REGION_MARGIN,
                y_max: y_max + REGION_MARGIN,
            },
            heading_text: anchor.text.clone(),
            heading_font_size: anchor.size,
        });
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceType;
    use crate::pdf::Glyph;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct FakeFetcher {
        page: Option<String>,
        glyphs: Vec<Glyph>,
        full_text: String,
        region_texts: Mutex<VecDeque<String>>,
    }

    impl FakeFetcher {
        fn with_page(html: &str) -> Self {
            FakeFetcher {
                page: Some(html.to_string()),
                glyphs: Vec::new(),
                full_text: String::new(),
                region_texts: Mutex::new(VecDeque::new()),
            }
        }

        fn with_pdf(glyphs: Vec<Glyph>, full_text: &str, region_texts: Vec<&str>) -> Self {
            FakeFetcher {
                page: None,
                glyphs,
                full_text: full_text.to_string(),
                region_texts: Mutex::new(region_texts.iter().map(|s| s.to_string()).collect()),
            }
        }
    }

    impl Fetcher for FakeFetcher {
        async fn fetch_page(&self, _url: &str) -> Option<(String, String)> {
            self.page.clone().map(|html| (html, "abc123".to_string()))
        }

        async fn fetch_pdf(&self, _url: &str) -> Option<(Vec<u8>, String)> {
            None
        }

        async fn find_latest_pdf_link(&self, _archive_url: &str, _pattern: &str) -> Option<String> {
            None
        }

        fn extract_text_from_pdf(&self, _bytes: &[u8]) -> String {
            self.full_text.clone()
        }

        fn extract_text_with_coords(&self, _bytes: &[u8]) -> Vec<Glyph> {
            self.glyphs.clone()
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
            self.region_texts
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_default()
        }
    }

    fn make_html(body: &str) -> String {
        format!("<html><head></head><body>{body}</body></html>")
    }

    fn parish() -> Parish {
        Parish::new("test-parish", "Test Parish")
    }

    #[tokio::test]
    async fn finds_section_by_heading() {
        let html = make_html(
            r#"<div id="content">
                <h2>Mass Times</h2>
                <p>Saturday: 6:00 PM</p>
                <p>Sunday: 8:00 AM, 10:00 AM, 5:30 PM</p>
                <p>Monday-Friday: 9:15 AM</p>
            </div>"#,
        );
        let fetcher = FakeFetcher::with_page(&html);
        let builder = TemplateBuilder::new(&fetcher);

        let template = builder
            .build_web_template("https://example.com/mass-times", &parish())
            .await
            .unwrap();

        assert_eq!(template.parish_id, "test-parish");
        assert_eq!(template.extraction_method, ExtractionMethod::CssSelectorRegex);
        assert_eq!(template.source_type, SourceType::WebsitePage);
        assert!(template.baseline_times.contains_key(&crate::models::Day::Saturday));
        assert_eq!(
            template.baseline_times[&crate::models::Day::Sunday].len(),
            3
        );
    }

    #[tokio::test]
    async fn finds_section_by_id() {
        let html = make_html(
            r#"<div id="mass-times">
                <p>Saturday: 6:00 PM</p>
                <p>Sunday: 10:00 AM</p>
            </div>"#,
        );
        let fetcher = FakeFetcher::with_page(&html);
        let builder = TemplateBuilder::new(&fetcher);

        let template = builder
            .build_web_template("https://example.com", &parish())
            .await
            .unwrap();

        assert_eq!(
            template.web_template.unwrap().section_selector,
            "#mass-times"
        );
    }

    #[tokio::test]
    async fn finds_section_by_class() {
        let html = make_html(
            r#"<div class="liturgy-schedule">
                <p>Saturday: 6:00 PM</p>
                <p>Sunday: 10:00 AM</p>
            </div>"#,
        );
        let fetcher = FakeFetcher::with_page(&html);
        let builder = TemplateBuilder::new(&fetcher);

        let template = builder
            .build_web_template("https://example.com", &parish())
            .await;
        assert!(template.is_some());
    }

    #[tokio::test]
    async fn finds_table_with_times() {
        let html = make_html(
            r#"<table>
                <tr><td>Saturday</td><td>6:00 PM</td></tr>
                <tr><td>Sunday</td><td>8:00 AM</td><td>10:00 AM</td></tr>
            </table>"#,
        );
        let fetcher = FakeFetcher::with_page(&html);
        let builder = TemplateBuilder::new(&fetcher);

        let template = builder
            .build_web_template("https://example.com", &parish())
            .await
            .unwrap();

        assert_eq!(
            template.baseline_times[&crate::models::Day::Saturday],
            ["6:00 PM"]
        );
        assert_eq!(
            template.baseline_times[&crate::models::Day::Sunday],
            ["8:00 AM", "10:00 AM"]
        );
    }

    #[tokio::test]
    async fn returns_none_without_section() {
        let html = make_html("<p>Welcome to our parish</p>");
        let fetcher = FakeFetcher::with_page(&html);
        let builder = TemplateBuilder::new(&fetcher);

        assert!(builder
            .build_web_template("https://example.com", &parish())
            .await
            .is_none());
    }

    #[tokio::test]
    async fn returns_none_on_fetch_failure() {
        let fetcher = FakeFetcher {
            page: None,
            glyphs: Vec::new(),
            full_text: String::new(),
            region_texts: Mutex::new(VecDeque::new()),
        };
        let builder = TemplateBuilder::new(&fetcher);

        assert!(builder
            .build_web_template("https://example.com", &parish())
            .await
            .is_none());
    }

    #[tokio::test]
    async fn first_heading_in_document_order_wins() {
        let html = make_html(
            r#"<div id="first">
                <h2>Mass Times</h2>
                <p>Sunday: 9:00 AM</p>
            </div>
            <div id="second">
                <h2>Mass Schedule</h2>
                <p>Sunday: 11:00 AM</p>
            </div>"#,
        );
        let fetcher = FakeFetcher::with_page(&html);
        let builder = TemplateBuilder::new(&fetcher);

        let template = builder
            .build_web_template("https://example.com", &parish())
            .await
            .unwrap();
        assert_eq!(template.web_template.unwrap().section_selector, "#first");
    }

    fn word_line(page: usize, x: f64, y: f64, text: &str, size: f64) -> Vec<Glyph> {
        text.chars()
            .enumerate()
            .map(|(i, c)| Glyph {
                page,
                x0: x + i as f64 * 6.0,
                y0: y,
                x1: x + (i + 1) as f64 * 6.0,
                y1: y + size,
                text: c.to_string(),
                size,
            })
            .collect()
    }

    fn bulletin_glyphs() -> Vec<Glyph> {
        let mut glyphs = Vec::new();
        glyphs.extend(word_line(0, 50.0, 80.0, "Parish Newsletter", 18.0));
        glyphs.extend(word_line(0, 50.0, 120.0, "Mass Times", 14.0));
        glyphs.extend(word_line(0, 50.0, 140.0, "Saturday: 6:00 PM", 10.0));
        glyphs.extend(word_line(0, 50.0, 160.0, "Sunday: 8:00 AM, 10:00 AM", 10.0));
        glyphs.extend(word_line(0, 50.0, 190.0, "Parish Notices", 14.0));
        glyphs.extend(word_line(0, 50.0, 210.0, "Cake stall next weekend", 10.0));
        glyphs
    }

    #[test]
    fn pdf_section_anchors_on_heading_and_stops_at_next_header() {
        let lines = group_into_lines(bulletin_glyphs());
        let section = find_pdf_mass_times_section(&lines).unwrap();

        assert_eq!(section.page, 0);
        assert!(section.heading_text.contains("Mass"));
        assert_eq!(section.heading_font_size, 14.0);
        // Region covers heading through the Sunday line, not the notices.
        assert!(section.region.y_max < 190.0 + REGION_MARGIN);
        assert!(section.region.x_min <= 50.0);
        assert!(section.region.y_min <= 120.0);
    }

    #[test]
    fn pdf_heading_without_content_is_rejected() {
        let mut glyphs = Vec::new();
        glyphs.extend(word_line(0, 50.0, 120.0, "Mass Times", 14.0));
        glyphs.extend(word_line(0, 50.0, 190.0, "Parish Notices", 14.0));
        let lines = group_into_lines(glyphs);
        assert!(find_pdf_mass_times_section(&lines).is_none());
    }

    #[tokio::test]
    async fn builds_pdf_region_template() {
        let region_text = "Mass Times\nSaturday: 6:00 PM\nSunday: 8:00 AM, 10:00 AM";
        let fetcher = FakeFetcher::with_pdf(bulletin_glyphs(), "", vec![region_text]);
        let builder = TemplateBuilder::new(&fetcher);

        let template = builder
            .build_pdf_template(
                &[b"pdf1".to_vec()],
                &parish(),
                "https://example.com/bulletin",
                "",
            )
            .await
            .unwrap();

        assert_eq!(template.extraction_method, ExtractionMethod::PdfRegionRegex);
        let pdf = template.pdf_template.unwrap();
        assert_eq!(pdf.mass_times_page, 0);
        assert!(!pdf.bounding_region.is_empty());
        // Single issue defaults to static.
        assert!(pdf.section_static);
        assert_eq!(
            template.baseline_times[&crate::models::Day::Sunday],
            ["8:00 AM", "10:00 AM"]
        );
    }

    #[tokio::test]
    async fn falls_back_to_full_text_without_heading() {
        let fetcher = FakeFetcher::with_pdf(
            Vec::new(),
            "Saturday: 6:00 PM\nSunday: 10:00 AM",
            vec![],
        );
        let builder = TemplateBuilder::new(&fetcher);

        let template = builder
            .build_pdf_template(&[b"pdf1".to_vec()], &parish(), "https://example.com", "")
            .await
            .unwrap();

        assert_eq!(template.extraction_method, ExtractionMethod::PdfFulltextRegex);
        let pdf = template.pdf_template.unwrap();
        assert!(pdf.bounding_region.is_empty());
    }

    #[tokio::test]
    async fn identical_issues_classify_static() {
        let schedule = "Mass Times\nSaturday: 6:00 PM\nSunday: 8:00 AM, 10:00 AM";
        // One extraction for the baseline, then one per issue for the diff.
        let fetcher = FakeFetcher::with_pdf(
            bulletin_glyphs(),
            "",
            vec![schedule, schedule, schedule, schedule],
        );
        let builder = TemplateBuilder::new(&fetcher);

        let template = builder
            .build_pdf_template(
                &[b"a".to_vec(), b"b".to_vec(), b"c".to_vec()],
                &parish(),
                "https://example.com",
                "",
            )
            .await
            .unwrap();

        assert!(template.pdf_template.unwrap().section_static);
    }

    #[tokio::test]
    async fn changed_issues_classify_dynamic() {
        let fetcher = FakeFetcher::with_pdf(
            bulletin_glyphs(),
            "",
            vec![
                "Mass Times\nSaturday: 6:00 PM\nSunday: 8:00 AM, 10:00 AM",
                "Saturday: 6:00 PM\nSunday: 10:00 AM",
                "Saturday: 6:00 PM\nSunday: 9:00 AM\nNote: No 10am Mass this week",
                "Saturday: 6:00 PM\nSunday: 10:00 AM, 5:00 PM",
            ],
        );
        let builder = TemplateBuilder::new(&fetcher);

        let template = builder
            .build_pdf_template(
                &[b"a".to_vec(), b"b".to_vec(), b"c".to_vec()],
                &parish(),
                "https://example.com",
                "",
            )
            .await
            .unwrap();

        assert!(!template.pdf_template.unwrap().section_static);
    }
}
