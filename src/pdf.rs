//! Glyph-level PDF text extraction.
//!
//! Full-document text comes straight from `pdf_extract`. The coordinate
//! path drives `pdf_extract`'s rendering through a custom [`OutputDev`]
//! that records every character with its position and effective font size,
//! converted to top-left-origin page coordinates (larger `y0` = lower on
//! the page). Line grouping and region cropping operate on those glyphs.

use anyhow::{Context, Result};
use lopdf::Document;
use pdf_extract::{MediaBox, OutputDev, OutputError, Transform, output_doc};

/// One positioned character from a PDF page. Coordinates are PDF points
/// with a top-left origin; `page` is 0-indexed.
#[derive(Debug, Clone, PartialEq)]
pub struct Glyph {
    pub page: usize,
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
    pub text: String,
    pub size: f64,
}

/// A horizontal run of glyphs, text in x-order, size = max glyph size.
#[derive(Debug, Clone, PartialEq)]
pub struct TextLine {
    pub page: usize,
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
    pub text: String,
    pub size: f64,
}

/// Glyphs on consecutive rows merge into one line when their `y0` differ by
/// less than this many points.
const LINE_TOLERANCE: f64 = 3.0;

struct GlyphCollector {
    glyphs: Vec<Glyph>,
    page: usize,
    page_height: f64,
}

impl GlyphCollector {
    fn new() -> Self {
        GlyphCollector {
            glyphs: Vec::new(),
            page: 0,
            page_height: 0.0,
        }
    }
}

impl OutputDev for GlyphCollector {
    fn begin_page(
        &mut self,
        page_num: u32,
        media_box: &MediaBox,
        _art_box: Option<(f64, f64, f64, f64)>,
    ) -> Result<(), OutputError> {
        self.page = page_num.saturating_sub(1) as usize;
        self.page_height = media_box.ury - media_box.lly;
        Ok(())
    }

    fn end_page(&mut self) -> Result<(), OutputError> {
        Ok(())
    }

    fn output_character(
        &mut self,
        trm: &Transform,
        width: f64,
        _spacing: f64,
        font_size: f64,
        char: &str,
    ) -> Result<(), OutputError> {
        if char.trim().is_empty() {
            return Ok(());
        }
        // Effective glyph size under the text matrix; the determinant root
        // absorbs scale from both axes.
        let det = (trm.m11 * trm.m22 - trm.m12 * trm.m21).abs();
        let size = font_size * det.sqrt();
        let advance = width * font_size * (trm.m11 * trm.m11 + trm.m12 * trm.m12).sqrt();

        let x0 = trm.m31;
        let baseline_top = (self.page_height - trm.m32).max(0.0);
        self.glyphs.push(Glyph {
            page: self.page,
            x0,
            y0: (baseline_top - size).max(0.0),
            x1: x0 + advance,
            y1: baseline_top,
            text: char.to_string(),
            size,
        });
        Ok(())
    }

    fn begin_word(&mut self) -> Result<(), OutputError> {
        Ok(())
    }

    fn end_word(&mut self) -> Result<(), OutputError> {
        Ok(())
    }

    fn end_line(&mut self) -> Result<(), OutputError> {
        Ok(())
    }
}

/// Whole-document plain text.
pub fn extract_full_text(bytes: &[u8]) -> Result<String> {
    pdf_extract::extract_text_from_mem(bytes).context("extracting pdf text")
}

/// Every positioned character in the document.
pub fn extract_glyphs(bytes: &[u8]) -> Result<Vec<Glyph>> {
    let doc = Document::load_mem(bytes).context("loading pdf document")?;
    let mut collector = GlyphCollector::new();
    output_doc(&doc, &mut collector).context("walking pdf content")?;
    Ok(collector.glyphs)
}

/// Group glyphs into text lines: sorted by `(page, y0, x0)`, a glyph joins
/// the current line while it stays on the same page within the vertical
/// tolerance. Whitespace-only lines are dropped.
pub fn group_into_lines(mut glyphs: Vec<Glyph>) -> Vec<TextLine> {
    if glyphs.is_empty() {
        return Vec::new();
    }
    glyphs.sort_by(|a, b| {
        (a.page, a.y0, a.x0)
            .partial_cmp(&(b.page, b.y0, b.x0))
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut lines: Vec<TextLine> = Vec::new();
    let mut current: Option<TextLine> = None;

    for glyph in glyphs {
        match current.as_mut() {
            Some(line) if line.page == glyph.page && (glyph.y0 - line.y0).abs() < LINE_TOLERANCE => {
                line.text.push_str(&glyph.text);
                line.x0 = line.x0.min(glyph.x0);
                line.x1 = line.x1.max(glyph.x1);
                line.y1 = line.y1.max(glyph.y1);
                line.size = line.size.max(glyph.size);
            }
            _ => {
                if let Some(line) = current.take() {
                    if !line.text.trim().is_empty() {
                        lines.push(line);
                    }
                }
                current = Some(TextLine {
                    page: glyph.page,
                    x0: glyph.x0,
                    y0: glyph.y0,
                    x1: glyph.x1,
                    y1: glyph.y1,
                    text: glyph.text,
                    size: glyph.size,
                });
            }
        }
    }
    if let Some(line) = current {
        if !line.text.trim().is_empty() {
            lines.push(line);
        }
    }
    lines
}

/// Text of the glyphs whose centre falls inside the given region of one
/// page, grouped into lines and joined with newlines.
pub fn region_text(
    glyphs: &[Glyph],
    page: usize,
    x_min: f64,
    y_min: f64,
    x_max: f64,
    y_max: f64,
) -> String {
    let contained: Vec<Glyph> = glyphs
        .iter()
        .filter(|g| {
            let cx = (g.x0 + g.x1) / 2.0;
            let cy = (g.y0 + g.y1) / 2.0;
            g.page == page && cx >= x_min && cx <= x_max && cy >= y_min && cy <= y_max
        })
        .cloned()
        .collect();

    group_into_lines(contained)
        .into_iter()
        .map(|line| line.text)
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn glyph(page: usize, x: f64, y: f64, text: &str, size: f64) -> Glyph {
        Glyph {
            page,
            x0: x,
            y0: y,
            x1: x + 6.0,
            y1: y + size,
            text: text.to_string(),
            size,
        }
    }

    fn word(page: usize, x: f64, y: f64, text: &str, size: f64) -> Vec<Glyph> {
        text.chars()
            .enumerate()
            .map(|(i, c)| glyph(page, x + i as f64 * 6.0, y, &c.to_string(), size))
            .collect()
    }

    #[test]
    fn groups_same_row_glyphs_into_one_line() {
        let mut glyphs = word(0, 10.0, 100.0, "Mass", 14.0);
        glyphs.extend(word(0, 60.0, 101.5, "Times", 14.0));
        let lines = group_into_lines(glyphs);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].text, "MassTimes");
        assert_eq!(lines[0].size, 14.0);
    }

    #[test]
    fn separates_rows_beyond_tolerance() {
        let mut glyphs = word(0, 10.0, 100.0, "Saturday", 10.0);
        glyphs.extend(word(0, 10.0, 115.0, "Sunday", 10.0));
        let lines = group_into_lines(glyphs);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text, "Saturday");
        assert_eq!(lines[1].text, "Sunday");
        assert!(lines[0].y0 < lines[1].y0);
    }

    #[test]
    fn separates_pages() {
        let mut glyphs = word(0, 10.0, 100.0, "a", 10.0);
        glyphs.extend(word(1, 10.0, 100.0, "b", 10.0));
        let lines = group_into_lines(glyphs);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].page, 0);
        assert_eq!(lines[1].page, 1);
    }

    #[test]
    fn line_bounds_cover_member_glyphs() {
        let mut glyphs = word(0, 40.0, 200.0, "10am", 9.0);
        glyphs.extend(word(0, 10.0, 201.0, "Sun", 9.0));
        let lines = group_into_lines(glyphs);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].x0, 10.0);
        assert!(lines[0].x1 >= 40.0 + 4.0 * 6.0);
    }

    #[test]
    fn region_text_crops_by_page_and_bounds() {
        let mut glyphs = word(0, 10.0, 100.0, "inside", 10.0);
        glyphs.extend(word(0, 10.0, 400.0, "below", 10.0));
        glyphs.extend(word(1, 10.0, 100.0, "otherpage", 10.0));

        let text = region_text(&glyphs, 0, 0.0, 80.0, 200.0, 150.0);
        assert_eq!(text, "inside");
    }

    #[test]
    fn region_text_keeps_line_structure() {
        let mut glyphs = word(0, 10.0, 100.0, "Sat6pm", 10.0);
        glyphs.extend(word(0, 10.0, 120.0, "Sun10am", 10.0));
        let text = region_text(&glyphs, 0, 0.0, 0.0, 300.0, 300.0);
        assert_eq!(text, "Sat6pm\nSun10am");
    }
}
