//! Web and PDF fetching.
//!
//! The core consumes fetching through the [`Fetcher`] trait so tests can
//! substitute canned content. The production [`HttpFetcher`] is polite:
//! per-domain rate limiting (at least two seconds between requests),
//! robots.txt respect, bounded retries with exponential back-off, content
//! hashing for change detection, and archiving of everything fetched.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::Result;
use reqwest::{Client, StatusCode, Url};
use scraper::{Html, Selector};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::pdf::{self, Glyph};

const USER_AGENT: &str = "mass-times/0.1 (Catholic mass times aggregator; polite crawler)";
const REQUEST_DELAY: Duration = Duration::from_secs(2);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_RETRIES: u32 = 3;

/// The fetching seam the template builder and extractor depend on.
///
/// `fetch_*` return `None` on any failure; callers treat that as an opaque
/// miss and carry on.
#[allow(async_fn_in_trait)]
pub trait Fetcher {
    /// Fetch an HTML page. Returns `(html, sha256_hex)`.
    async fn fetch_page(&self, url: &str) -> Option<(String, String)>;

    /// Fetch a PDF. Returns `(bytes, sha256_hex)`.
    async fn fetch_pdf(&self, url: &str) -> Option<(Vec<u8>, String)>;

    /// Resolve the most recent PDF link on a bulletin archive page,
    /// optionally filtered by a link regex. The last matching link wins.
    async fn find_latest_pdf_link(&self, archive_url: &str, link_pattern: &str) -> Option<String>;

    fn extract_text_from_pdf(&self, bytes: &[u8]) -> String;

    fn extract_text_with_coords(&self, bytes: &[u8]) -> Vec<Glyph>;

    fn extract_text_from_region(
        &self,
        bytes: &[u8],
        page: usize,
        x_min: f64,
        y_min: f64,
        x_max: f64,
        y_max: f64,
    ) -> String;
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// One host's robots.txt rules as they apply to this crawler.
#[derive(Debug, Clone, Default)]
struct RobotsPolicy {
    /// `(allow, path_prefix)`; longest matching prefix wins, default allow.
    rules: Vec<(bool, String)>,
}

impl RobotsPolicy {
    fn parse(body: &str) -> RobotsPolicy {
        let mut rules = Vec::new();
        let mut group_applies = false;
        let mut in_group_header = false;

        for line in body.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let Some((field, value)) = line.split_once(':') else {
                continue;
            };
            let field = field.trim().to_ascii_lowercase();
            let value = value.trim();

            match field.as_str() {
                "user-agent" => {
                    // Consecutive user-agent lines open one group.
                    if !in_group_header {
                        group_applies = false;
                        in_group_header = true;
                    }
                    let agent = value.to_ascii_lowercase();
                    if agent == "*" || USER_AGENT.to_ascii_lowercase().starts_with(&agent) {
                        group_applies = true;
                    }
                }
                "disallow" | "allow" => {
                    in_group_header = false;
                    if group_applies && !value.is_empty() {
                        rules.push((field == "allow", value.to_string()));
                    }
                }
                _ => {
                    in_group_header = false;
                }
            }
        }
        RobotsPolicy { rules }
    }

    fn can_fetch(&self, path: &str) -> bool {
        self.rules
            .iter()
            .filter(|(_, prefix)| path.starts_with(prefix.as_str()))
            .max_by_key(|(_, prefix)| prefix.len())
            .map(|(allow, _)| *allow)
            .unwrap_or(true)
    }
}

/// Production fetcher. Safe to share across workers: the per-domain
/// last-request map and the robots cache are the only mutable state and
/// both sit behind a mutex.
pub struct HttpFetcher {
    client: Client,
    data_dir: PathBuf,
    archive: bool,
    last_request: Mutex<HashMap<String, Instant>>,
    robots: Mutex<HashMap<String, RobotsPolicy>>,
}

impl HttpFetcher {
    pub fn new(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(HttpFetcher {
            client,
            data_dir: data_dir.into(),
            archive: true,
            last_request: Mutex::new(HashMap::new()),
            robots: Mutex::new(HashMap::new()),
        })
    }

    /// Disable on-disk archiving (dry runs).
    pub fn without_archiving(mut self) -> Self {
        self.archive = false;
        self
    }

    async fn rate_limit(&self, url: &str) {
        let Some(domain) = host_of(url) else {
            return;
        };
        let wait = {
            let map = self.last_request.lock().expect("rate-limit map poisoned");
            map.get(&domain).and_then(|last| {
                let elapsed = last.elapsed();
                (elapsed < REQUEST_DELAY).then(|| REQUEST_DELAY - elapsed)
            })
        };
        if let Some(wait) = wait {
            debug!(domain = %domain, wait_ms = wait.as_millis() as u64, "rate limiting");
            tokio::time::sleep(wait).await;
        }
        self.last_request
            .lock()
            .expect("rate-limit map poisoned")
            .insert(domain, Instant::now());
    }

    async fn check_robots(&self, url: &str) -> bool {
        let Ok(parsed) = Url::parse(url) else {
            return false;
        };
        let Some(host) = parsed.host_str().map(str::to_string) else {
            return false;
        };

        let cached = {
            let cache = self.robots.lock().expect("robots cache poisoned");
            cache.get(&host).cloned()
        };
        let policy = match cached {
            Some(policy) => policy,
            None => {
                let robots_url = format!("{}://{}/robots.txt", parsed.scheme(), host);
                // Unreadable robots.txt means assume allowed.
                let policy = match self.client.get(&robots_url).send().await {
                    Ok(resp) if resp.status().is_success() => match resp.text().await {
                        Ok(body) => RobotsPolicy::parse(&body),
                        Err(_) => RobotsPolicy::default(),
                    },
                    _ => RobotsPolicy::default(),
                };
                self.robots
                    .lock()
                    .expect("robots cache poisoned")
                    .insert(host, policy.clone());
                policy
            }
        };

        policy.can_fetch(parsed.path())
    }

    /// GET with robots check, rate limiting and retry. Permanent failures
    /// (robots disallow, 4xx other than 429) abort immediately.
    async fn get_bytes(&self, url: &str) -> Option<Vec<u8>> {
        if !self.check_robots(url).await {
            info!(url = %url, "blocked by robots.txt");
            return None;
        }

        for attempt in 0..MAX_RETRIES {
            self.rate_limit(url).await;
            match self.client.get(url).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        match resp.bytes().await {
                            Ok(body) => return Some(body.to_vec()),
                            Err(err) => {
                                warn!(url = %url, error = %err, "failed reading response body");
                            }
                        }
                    } else if status.is_client_error() && status != StatusCode::TOO_MANY_REQUESTS {
                        warn!(url = %url, status = %status, "permanent fetch failure");
                        return None;
                    } else {
                        warn!(
                            url = %url,
                            status = %status,
                            attempt = attempt + 1,
                            max = MAX_RETRIES,
                            "fetch attempt failed"
                        );
                    }
                }
                Err(err) => {
                    warn!(
                        url = %url,
                        error = %err,
                        attempt = attempt + 1,
                        max = MAX_RETRIES,
                        "fetch attempt failed"
                    );
                }
            }
            if attempt + 1 < MAX_RETRIES {
                tokio::time::sleep(Duration::from_secs(1u64 << (attempt + 1))).await;
            }
        }
        None
    }

    fn archive_page(&self, url: &str, html: &str, content_hash: &str) {
        if !self.archive {
            return;
        }
        let pages_dir = self.data_dir.join("pages");
        if let Err(err) = fs::create_dir_all(&pages_dir) {
            warn!(error = %err, "could not create pages archive dir");
            return;
        }
        let domain = host_of(url).unwrap_or_else(|| "unknown".to_string()).replace('.', "-");
        let timestamp = chrono::Utc::now().format("%Y%m%d-%H%M%S");
        let filename = format!("{domain}_{timestamp}_{}.html", &content_hash[..8]);
        if let Err(err) = fs::write(pages_dir.join(&filename), html) {
            warn!(error = %err, "could not archive page");
        } else {
            debug!(file = %filename, "archived page");
        }
    }

    fn archive_pdf(&self, pdf_bytes: &[u8], content_hash: &str) {
        if !self.archive {
            return;
        }
        let bulletins_dir = self.data_dir.join("bulletins");
        if let Err(err) = fs::create_dir_all(&bulletins_dir) {
            warn!(error = %err, "could not create bulletins archive dir");
            return;
        }
        // Hash-named, so re-fetching an unchanged issue is a no-op.
        let path = bulletins_dir.join(format!("{}.pdf", &content_hash[..16]));
        if path.exists() {
            return;
        }
        if let Err(err) = fs::write(&path, pdf_bytes) {
            warn!(error = %err, "could not archive pdf");
        } else {
            debug!(file = %path.display(), "archived pdf");
        }
    }
}

impl Fetcher for HttpFetcher {
    async fn fetch_page(&self, url: &str) -> Option<(String, String)> {
        let body = self.get_bytes(url).await?;
        let html = String::from_utf8_lossy(&body).into_owned();
        let content_hash = sha256_hex(html.as_bytes());
        self.archive_page(url, &html, &content_hash);
        Some((html, content_hash))
    }

    async fn fetch_pdf(&self, url: &str) -> Option<(Vec<u8>, String)> {
        let body = self.get_bytes(url).await?;
        if !url.to_lowercase().ends_with(".pdf") && !body.starts_with(b"%PDF") {
            warn!(url = %url, "response does not look like a pdf");
        }
        let content_hash = sha256_hex(&body);
        self.archive_pdf(&body, &content_hash);
        Some((body, content_hash))
    }

    async fn find_latest_pdf_link(&self, archive_url: &str, link_pattern: &str) -> Option<String> {
        let body = self.get_bytes(archive_url).await?;
        let html = String::from_utf8_lossy(&body).into_owned();
        let links = scan_pdf_links(&html, archive_url, link_pattern);
        links.last().cloned()
    }

    fn extract_text_from_pdf(&self, bytes: &[u8]) -> String {
        match pdf::extract_full_text(bytes) {
            Ok(text) => text,
            Err(err) => {
                warn!(error = %err, "pdf text extraction failed");
                String::new()
            }
        }
    }

    fn extract_text_with_coords(&self, bytes: &[u8]) -> Vec<Glyph> {
        match pdf::extract_glyphs(bytes) {
            Ok(glyphs) => glyphs,
            Err(err) => {
                warn!(error = %err, "pdf glyph extraction failed");
                Vec::new()
            }
        }
    }

    fn extract_text_from_region(
        &self,
        bytes: &[u8],
        page: usize,
        x_min: f64,
        y_min: f64,
        x_max: f64,
        y_max: f64,
    ) -> String {
        let glyphs = self.extract_text_with_coords(bytes);
        pdf::region_text(&glyphs, page, x_min, y_min, x_max, y_max)
    }
}

fn host_of(url: &str) -> Option<String> {
    Url::parse(url).ok()?.host_str().map(str::to_string)
}

/// All absolute PDF link URLs on an archive page, in document order,
/// optionally filtered by a case-insensitive href regex.
pub fn scan_pdf_links(html: &str, base_url: &str, link_pattern: &str) -> Vec<String> {
    let doc = Html::parse_document(html);
    let anchor = Selector::parse("a[href]").expect("valid selector");
    let base = match Url::parse(base_url) {
        Ok(base) => base,
        Err(_) => return Vec::new(),
    };
    let pattern = if link_pattern.is_empty() {
        None
    } else {
        match regex::RegexBuilder::new(link_pattern).case_insensitive(true).build() {
            Ok(re) => Some(re),
            Err(err) => {
                warn!(pattern = %link_pattern, error = %err, "invalid pdf link pattern, ignoring");
                None
            }
        }
    };

    let mut links = Vec::new();
    for element in doc.select(&anchor) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let path_part = href.split(['?', '#']).next().unwrap_or(href);
        if !path_part.to_lowercase().ends_with(".pdf") {
            continue;
        }
        if let Some(re) = &pattern {
            if !re.is_match(href) {
                continue;
            }
        }
        if let Ok(link) = base.join(href) {
            links.push(link.to_string());
        }
    }
    links
}
