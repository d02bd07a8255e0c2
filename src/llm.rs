//! LLM client seam for tier-3 fallback extraction.
//!
//! The extractor only ever talks to the [`LlmClient`] trait; production uses
//! the Messages-API client below, tests inject a fake returning canned JSON.

use std::collections::BTreeMap;

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use serde_json::json;

use crate::models::Day;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Raw text is truncated to this many characters before prompting.
pub const PROMPT_TEXT_LIMIT: usize = 4_000;

#[derive(Debug, Clone, Copy, Default)]
pub struct LlmUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

#[derive(Debug, Clone)]
pub struct LlmReply {
    pub text: String,
    pub usage: LlmUsage,
}

/// Chat-completion seam: one user prompt in, text plus token usage out.
#[allow(async_fn_in_trait)]
pub trait LlmClient {
    async fn complete(&self, model: &str, max_tokens: u32, prompt: &str) -> Result<LlmReply>;
}

/// Per-million-token pricing used to account tier-3 cost.
#[derive(Debug, Clone, Copy)]
pub struct LlmRates {
    pub input_usd_per_mtok: f64,
    pub output_usd_per_mtok: f64,
}

impl Default for LlmRates {
    fn default() -> Self {
        // Sonnet pricing.
        LlmRates {
            input_usd_per_mtok: 3.0,
            output_usd_per_mtok: 15.0,
        }
    }
}

impl LlmRates {
    pub fn cost_usd(&self, usage: LlmUsage) -> f64 {
        (usage.input_tokens as f64 * self.input_usd_per_mtok
            + usage.output_tokens as f64 * self.output_usd_per_mtok)
            / 1_000_000.0
    }
}

/// HTTP client for an Anthropic-style `/v1/messages` endpoint.
pub struct AnthropicClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    usage: UsageBlock,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct UsageBlock {
    input_tokens: u64,
    output_tokens: u64,
}

impl AnthropicClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(AnthropicClient {
            client,
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

impl LlmClient for AnthropicClient {
    async fn complete(&self, model: &str, max_tokens: u32, prompt: &str) -> Result<LlmReply> {
        let body = json!({
            "model": model,
            "max_tokens": max_tokens,
            "messages": [{"role": "user", "content": prompt}],
        });

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .context("sending messages request")?
            .error_for_status()
            .context("messages request failed")?;

        let parsed: MessagesResponse = response.json().await.context("decoding messages response")?;
        let text = parsed
            .content
            .first()
            .map(|block| block.text.clone())
            .ok_or_else(|| anyhow!("empty content in messages response"))?;

        Ok(LlmReply {
            text,
            usage: LlmUsage {
                input_tokens: parsed.usage.input_tokens,
                output_tokens: parsed.usage.output_tokens,
            },
        })
    }
}

/// Truncate to at most `max_chars` characters on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

/// The strict-JSON extraction prompt, with the template's baseline times as a
/// hint when present.
pub fn build_extraction_prompt(baseline_times: &BTreeMap<Day, Vec<String>>, text: &str) -> String {
    let baseline_hint = if baseline_times.is_empty() {
        String::new()
    } else {
        let baseline_json = serde_json::to_string(baseline_times).unwrap_or_default();
        format!(
            "\nKnown baseline times for this parish: {baseline_json}\nFlag any differences from the baseline."
        )
    };

    format!(
        "Extract all Catholic mass times from this text. Return ONLY valid JSON with no other text.\n\
         \n\
         Format:\n\
         {{\"times\": [{{\"day\": \"Sunday\", \"time\": \"10:00 AM\", \"type\": \"Regular\", \"language\": \"English\", \"notes\": \"\"}}]}}\n\
         \n\
         Valid days: Monday, Tuesday, Wednesday, Thursday, Friday, Saturday, Sunday\n\
         Valid types: Regular, Vigil, Holy Day, Reconciliation, Adoration, Latin Rite, Children's Liturgy\n\
         {baseline_hint}\n\
         \n\
         Text:\n\
         {}",
        truncate_chars(text, PROMPT_TEXT_LIMIT)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cost_uses_per_mtok_rates() {
        let rates = LlmRates::default();
        let usage = LlmUsage {
            input_tokens: 1_000_000,
            output_tokens: 1_000_000,
        };
        assert!((rates.cost_usd(usage) - 18.0).abs() < 1e-9);

        let small = LlmUsage {
            input_tokens: 1_000,
            output_tokens: 200,
        };
        assert!((rates.cost_usd(small) - (3e-3 + 3e-3)).abs() < 1e-9);
    }

    #[test]
    fn truncation_is_char_boundary_safe() {
        assert_eq!(truncate_chars("hello", 10), "hello");
        assert_eq!(truncate_chars("hello", 3), "hel");
        // Multibyte input must not split a char.
        let text = "ábcdé";
        assert_eq!(truncate_chars(text, 2), "áb");
    }

    #[test]
    fn prompt_includes_baseline_hint_when_present() {
        let mut baseline = BTreeMap::new();
        baseline.insert(Day::Sunday, vec!["10:00 AM".to_string()]);
        let prompt = build_extraction_prompt(&baseline, "Sunday: 10:00 AM");
        assert!(prompt.contains("Known baseline times"));
        assert!(prompt.contains("\"Sunday\""));

        let empty = build_extraction_prompt(&BTreeMap::new(), "text");
        assert!(!empty.contains("Known baseline times"));
    }

    #[test]
    fn prompt_truncates_long_text() {
        let long_text = "x".repeat(10_000);
        let prompt = build_extraction_prompt(&BTreeMap::new(), &long_text);
        assert!(prompt.len() < 6_000);
    }
}
