//! Discovers the public sources that publish Catholic parish mass schedules,
//! builds per-parish extraction templates from their HTML or bulletin-PDF
//! structure, and re-extracts times through a three-tier pipeline: static
//! confirmation against the template baseline, deterministic regex parsing,
//! and an LLM fallback. A validator and cross-referencer gate what gets
//! published downstream.

pub mod builder;
pub mod config;
pub mod extractor;
pub mod fetcher;
pub mod llm;
pub mod models;
pub mod parser;
pub mod pdf;
pub mod report;
pub mod similarity;
pub mod template;
pub mod validator;

pub use builder::TemplateBuilder;
pub use config::Config;
pub use extractor::Extractor;
pub use fetcher::{Fetcher, HttpFetcher};
pub use llm::{AnthropicClient, LlmClient};
pub use template::{ParishTemplate, TemplateStore};
