//! Aggregate reporting over the extraction results directory.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

#[derive(Debug, Clone, Serialize)]
pub struct ParishSummary {
    pub id: String,
    pub tier: u8,
    pub status: String,
    pub times_count: usize,
    pub confidence: f64,
}

#[derive(Debug, Serialize)]
pub struct Report {
    pub generated_at: DateTime<Utc>,
    pub total_parishes: usize,
    pub tier_distribution: BTreeMap<u8, usize>,
    pub status_distribution: BTreeMap<String, usize>,
    pub total_times: usize,
    pub total_llm_cost_usd: f64,
    pub parishes: Vec<ParishSummary>,
}

/// Aggregate every result file in the directory. Files that fail to parse
/// are skipped; the report reflects what could be read.
pub fn build_report(results_dir: &Path) -> Result<Report> {
    let mut paths: Vec<_> = fs::read_dir(results_dir)
        .with_context(|| format!("reading results dir {}", results_dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();

    let mut tier_distribution: BTreeMap<u8, usize> = BTreeMap::new();
    let mut status_distribution: BTreeMap<String, usize> = BTreeMap::new();
    let mut total_times = 0usize;
    let mut total_llm_cost_usd = 0.0f64;
    let mut parishes = Vec::new();

    for path in &paths {
        let data: Value = match fs::read_to_string(path)
            .map_err(anyhow::Error::from)
            .and_then(|raw| serde_json::from_str(&raw).map_err(Into::into))
        {
            Ok(data) => data,
            Err(err) => {
                debug!(path = %path.display(), error = %err, "skipping unreadable result");
                continue;
            }
        };

        let tier = data["tier"].as_u64().unwrap_or(0) as u8;
        let status = data["validation_status"].as_str().unwrap_or("unknown").to_string();
        let times_count = data["times"].as_array().map_or(0, Vec::len);
        let confidence = data["confidence"].as_f64().unwrap_or(0.0);
        let id = data["parish_id"]
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| {
                path.file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default()
            });

        *tier_distribution.entry(tier).or_default() += 1;
        *status_distribution.entry(status.clone()).or_default() += 1;
        total_times += times_count;
        total_llm_cost_usd += data["llm_cost_usd"].as_f64().unwrap_or(0.0);

        parishes.push(ParishSummary {
            id,
            tier,
            status,
            times_count,
            confidence,
        });
    }

    Ok(Report {
        generated_at: Utc::now(),
        total_parishes: parishes.len(),
        tier_distribution,
        status_distribution,
        total_times,
        total_llm_cost_usd,
        parishes,
    })
}

pub fn render_text(report: &Report) -> String {
    let mut out = String::new();
    let rule = "=".repeat(60);

    out.push_str(&rule);
    out.push_str(&format!(
        "\nMass Times Extraction Report - {}\n",
        report.generated_at.format("%Y-%m-%d %H:%M")
    ));
    out.push_str(&rule);
    out.push_str(&format!(
        "\n\nParishes:       {}\nTotal times:    {}\n\n",
        report.total_parishes, report.total_times
    ));

    out.push_str("Tier distribution:\n");
    out.push_str(&format!(
        "  Tier 1 (static):  {}\n",
        report.tier_distribution.get(&1).copied().unwrap_or(0)
    ));
    out.push_str(&format!(
        "  Tier 2 (code):    {}\n",
        report.tier_distribution.get(&2).copied().unwrap_or(0)
    ));
    out.push_str(&format!(
        "  Tier 3 (llm):     {}\n\n",
        report.tier_distribution.get(&3).copied().unwrap_or(0)
    ));

    out.push_str("Validation status:\n");
    for (status, count) in &report.status_distribution {
        out.push_str(&format!("  {status:<15} {count}\n"));
    }
    out.push_str(&format!("\nLLM cost:       ${:.4}\n\n", report.total_llm_cost_usd));

    let flagged: Vec<&ParishSummary> = report
        .parishes
        .iter()
        .filter(|p| p.status == "flagged")
        .collect();
    if !flagged.is_empty() {
        out.push_str("Flagged parishes (need attention):\n");
        for parish in flagged {
            out.push_str(&format!(
                "  - {} (tier {}, {} times)\n",
                parish.id, parish.tier, parish.times_count
            ));
        }
        out.push('\n');
    }

    out.push_str(&rule);
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_result(dir: &Path, id: &str, tier: u8, status: &str, times: usize, cost: f64) {
        let times_json: Vec<Value> = (0..times)
            .map(|_| serde_json::json!({"day": "Sunday", "time": "10:00 AM"}))
            .collect();
        let data = serde_json::json!({
            "parish_id": id,
            "times": times_json,
            "tier": tier,
            "confidence": 0.85,
            "validation_status": status,
            "content_hash": "abc",
            "source_url": "https://example.com",
            "llm_model": null,
            "llm_cost_usd": cost,
            "extracted_at": "2026-02-10T00:00:00Z",
        });
        fs::write(
            dir.join(format!("{id}.json")),
            serde_json::to_string_pretty(&data).unwrap(),
        )
        .unwrap();
    }

    #[test]
    fn aggregates_result_files() {
        let dir = tempfile::tempdir().unwrap();
        write_result(dir.path(), "st-annes", 1, "confirmed", 9, 0.0);
        write_result(dir.path(), "st-marys", 2, "confirmed", 7, 0.0);
        write_result(dir.path(), "sacred-heart", 3, "provisional", 4, 0.0123);
        write_result(dir.path(), "our-lady", 1, "flagged", 0, 0.0);

        let report = build_report(dir.path()).unwrap();
        assert_eq!(report.total_parishes, 4);
        assert_eq!(report.total_times, 20);
        assert_eq!(report.tier_distribution.get(&1), Some(&2));
        assert_eq!(report.tier_distribution.get(&3), Some(&1));
        assert_eq!(report.status_distribution.get("confirmed"), Some(&2));
        assert!((report.total_llm_cost_usd - 0.0123).abs() < 1e-9);
    }

    #[test]
    fn unreadable_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        write_result(dir.path(), "good", 1, "confirmed", 3, 0.0);
        fs::write(dir.path().join("bad.json"), "{not json").unwrap();

        let report = build_report(dir.path()).unwrap();
        assert_eq!(report.total_parishes, 1);
    }

    #[test]
    fn text_rendering_lists_flagged_parishes() {
        let dir = tempfile::tempdir().unwrap();
        write_result(dir.path(), "st-annes", 1, "confirmed", 9, 0.0);
        write_result(dir.path(), "our-lady", 2, "flagged", 0, 0.0);

        let report = build_report(dir.path()).unwrap();
        let text = render_text(&report);
        assert!(text.contains("Parishes:       2"));
        assert!(text.contains("Flagged parishes"));
        assert!(text.contains("our-lady"));
    }
}
