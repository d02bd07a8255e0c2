use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use mass_times::config::Config;
use mass_times::fetcher::{Fetcher, HttpFetcher, scan_pdf_links};
use mass_times::llm::AnthropicClient;
use mass_times::models::{ExtractionResult, MassTime, Parish, SourceEndpoint, SourceType, ValidationStatus};
use mass_times::report::{build_report, render_text};
use mass_times::template::TemplateStore;
use mass_times::validator::{cross_reference, validate};
use mass_times::{Extractor, TemplateBuilder};

/// How many recent bulletin issues feed the static/dynamic classification.
const PDF_ISSUES_FOR_BUILD: usize = 3;

#[derive(Parser)]
#[command(name = "mass-times", about = "Builds parish mass-time extraction templates and runs the extraction pipeline")]
struct Cli {
    /// Path to a config file (defaults to ./mass-times.toml when present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build extraction templates from discovered parishes and sources.
    Build {
        /// Build for a single parish slug.
        #[arg(long)]
        parish: Option<String>,
    },
    /// Run the three-tier extraction over saved templates.
    Extract {
        /// Fetch and extract but persist nothing; skips the LLM tier.
        #[arg(long)]
        dry_run: bool,
        /// Extract for a single parish slug.
        #[arg(long)]
        parish: Option<String>,
        /// Mark every result provisional regardless of tier.
        #[arg(long)]
        shadow: bool,
    },
    /// Aggregate extraction results into a report.
    Report {
        #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
        format: ReportFormat,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ReportFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Command::Build { parish } => run_build(&config, parish.as_deref()).await,
        Command::Extract {
            dry_run,
            parish,
            shadow,
        } => run_extract(&config, dry_run, parish.as_deref(), shadow).await,
        Command::Report { format } => run_report(&config, format),
    }
}

fn load_discovery(data_dir: &Path) -> Result<(Vec<Parish>, Vec<SourceEndpoint>)> {
    let parishes_file = data_dir.join("parishes.json");
    let sources_file = data_dir.join("sources.json");

    let parishes = if parishes_file.exists() {
        serde_json::from_str(&fs::read_to_string(&parishes_file)?)
            .with_context(|| format!("parsing {}", parishes_file.display()))?
    } else {
        Vec::new()
    };
    let sources = if sources_file.exists() {
        serde_json::from_str(&fs::read_to_string(&sources_file)?)
            .with_context(|| format!("parsing {}", sources_file.display()))?
    } else {
        Vec::new()
    };
    Ok((parishes, sources))
}

async fn run_build(config: &Config, only_parish: Option<&str>) -> Result<()> {
    let (mut parishes, sources) = load_discovery(&config.data_dir)?;
    if parishes.is_empty() {
        bail!("no parishes discovered yet; populate {}/parishes.json first", config.data_dir.display());
    }
    if let Some(slug) = only_parish {
        parishes.retain(|p| p.id == slug);
        if parishes.is_empty() {
            bail!("parish '{slug}' not found");
        }
    }

    let mut source_map: HashMap<&str, Vec<&SourceEndpoint>> = HashMap::new();
    for source in &sources {
        source_map.entry(source.parish_id.as_str()).or_default().push(source);
    }

    let fetcher = HttpFetcher::new(&config.data_dir)?;
    let builder = TemplateBuilder::new(&fetcher);
    let store = TemplateStore::new(&config.templates_dir);

    let mut built = 0usize;
    let mut failed = 0usize;

    for parish in &parishes {
        let Some(mut parish_sources) = source_map.get(parish.id.as_str()).cloned() else {
            info!(parish = %parish.id, "no sources, skipping");
            continue;
        };
        parish_sources.sort_by_key(|s| s.source_type.priority());
        let primary = parish_sources[0];

        let template = match primary.source_type {
            SourceType::WebsitePage | SourceType::StructuredData => {
                builder.build_web_template(&primary.url, parish).await
            }
            SourceType::PdfBulletin => {
                let issues = fetch_recent_issues(&fetcher, &primary.url).await;
                if issues.is_empty() {
                    warn!(parish = %parish.id, "no bulletin pdfs found");
                    None
                } else {
                    builder
                        .build_pdf_template(&issues, parish, &primary.url, "")
                        .await
                }
            }
            other => {
                info!(parish = %parish.id, source_type = ?other, "unsupported source type, skipping");
                continue;
            }
        };

        match template {
            Some(mut template) => {
                template.source_type = primary.source_type;
                template.source_priority =
                    parish_sources.iter().map(|s| s.source_type).collect();
                store.save(&mut template)?;
                built += 1;
            }
            None => {
                warn!(parish = %parish.id, "failed to build template");
                failed += 1;
            }
        }
    }

    info!(built, failed, "template build complete");
    Ok(())
}

/// The most recent bulletin issues from an archive page, oldest first.
async fn fetch_recent_issues(fetcher: &HttpFetcher, archive_url: &str) -> Vec<Vec<u8>> {
    let Some((html, _)) = fetcher.fetch_page(archive_url).await else {
        return Vec::new();
    };
    let links = scan_pdf_links(&html, archive_url, "");
    let recent: Vec<&String> = links.iter().rev().take(PDF_ISSUES_FOR_BUILD).rev().collect();

    let mut issues = Vec::new();
    for link in recent {
        if let Some((bytes, _)) = fetcher.fetch_pdf(link).await {
            issues.push(bytes);
        }
    }
    issues
}

fn load_previous_times(results_dir: &Path, parish_id: &str) -> Option<Vec<MassTime>> {
    let path = results_dir.join(format!("{parish_id}.json"));
    let raw = fs::read_to_string(path).ok()?;
    let value: serde_json::Value = serde_json::from_str(&raw).ok()?;
    serde_json::from_value(value.get("times")?.clone()).ok()
}

fn save_result(result: &ExtractionResult, results_dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(results_dir)?;
    let path = results_dir.join(format!("{}.json", result.parish_id));
    let json = serde_json::to_string_pretty(&result.to_file_json())?;
    fs::write(&path, json)?;
    Ok(path)
}

async fn run_extract(
    config: &Config,
    dry_run: bool,
    only_parish: Option<&str>,
    shadow_flag: bool,
) -> Result<()> {
    let store = TemplateStore::new(&config.templates_dir);
    let mut templates = store.load_all()?;
    if templates.is_empty() {
        bail!(
            "no templates found in {}; run `mass-times build` first",
            config.templates_dir.display()
        );
    }
    if let Some(slug) = only_parish {
        templates.retain(|t| t.parish_id == slug);
        if templates.is_empty() {
            bail!("template not found for parish '{slug}'");
        }
    }

    let shadow_mode = shadow_flag || config.shadow_mode;
    if shadow_mode {
        info!("shadow mode enabled, all results will be marked provisional");
    }
    info!(templates = templates.len(), "loaded templates");

    let fetcher = HttpFetcher::new(&config.data_dir)?;
    let llm: Option<AnthropicClient> = if config.api_key.is_empty() {
        None
    } else {
        Some(AnthropicClient::new(&config.api_key)?)
    };
    let extractor = Extractor::new(&fetcher, llm.as_ref(), &config.fallback_model, config.llm_rates());

    let results_dir = config.results_dir();
    let mut tier_counts = [0usize; 3];
    let mut total_cost = 0.0f64;
    let mut failures = 0usize;
    let mut by_parish: HashMap<String, Vec<ExtractionResult>> = HashMap::new();

    for template in &templates {
        info!(parish = %template.parish_id, "extracting");
        let mut result = extractor.extract(template, dry_run).await;

        if shadow_mode {
            result.validation_status = ValidationStatus::Provisional;
        }

        let previous = load_previous_times(&results_dir, &template.parish_id);
        validate(&mut result, &template.validation_rules, previous.as_deref());

        tier_counts[usize::from(u8::from(result.tier)) - 1] += 1;
        total_cost += result.llm_cost_usd;
        if result.validation_status == ValidationStatus::Flagged {
            failures += 1;
        }

        if !dry_run {
            if let Err(err) = save_result(&result, &results_dir) {
                error!(parish = %result.parish_id, error = %err, "could not save result");
            }
        }

        by_parish.entry(result.parish_id.clone()).or_default().push(result);
    }

    for (parish_id, parish_results) in by_parish {
        if parish_results.len() > 1 {
            if let Some(best) = cross_reference(parish_results) {
                info!(parish = %parish_id, confidence = best.confidence, "cross-reference complete");
            }
        }
    }

    info!(
        parishes = templates.len(),
        tier1 = tier_counts[0],
        tier2 = tier_counts[1],
        tier3 = tier_counts[2],
        failures,
        llm_cost_usd = format!("{total_cost:.4}"),
        "extraction complete"
    );

    if failures > 0 {
        std::process::exit(1);
    }
    Ok(())
}

fn run_report(config: &Config, format: ReportFormat) -> Result<()> {
    let results_dir = config.results_dir();
    if !results_dir.exists() {
        bail!("no results directory found; run `mass-times extract` first");
    }

    let report = build_report(&results_dir)?;
    match format {
        ReportFormat::Text => print!("{}", render_text(&report)),
        ReportFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }
    Ok(())
}
