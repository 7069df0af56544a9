use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use trawl_scanner::{CrawlStats, SiteMap};

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Text,
    Json,
}

impl ReportFormat {
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Some(ReportFormat::Text),
            "json" => Some(ReportFormat::Json),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Text => "txt",
            ReportFormat::Json => "json",
        }
    }
}

/// One mapped page and the distinct links it points to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageReport {
    pub url: String,
    pub out_links: Vec<String>,
}

/// Everything a report is rendered from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportData {
    pub seed: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub stats: CrawlStats,
    /// Sorted by URL.
    pub pages: Vec<PageReport>,
}

impl ReportData {
    pub fn duration_secs(&self) -> f64 {
        (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }

    pub fn total_links(&self) -> usize {
        self.pages.iter().map(|p| p.out_links.len()).sum()
    }
}

/// Flatten a site map into report data.
///
/// Out-links are listed once each, in the order the page first links to them.
pub fn gather_report_data(
    seed: &str,
    site_map: &SiteMap,
    stats: &CrawlStats,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
) -> ReportData {
    let pages: Vec<PageReport> = site_map
        .pages_by_url()
        .into_iter()
        .map(|page| PageReport {
            url: page.link.url().to_string(),
            out_links: page
                .unique_out_links()
                .into_iter()
                .map(|link| link.url().to_string())
                .collect(),
        })
        .collect();

    ReportData {
        seed: seed.to_string(),
        started_at,
        finished_at,
        stats: stats.clone(),
        pages,
    }
}

pub fn generate_text_report(data: &ReportData, use_color: bool) -> String {
    let mut report = String::new();
    report.push_str(RULE);
    report.push_str("\n\n# Summary:\n");
    report.push_str(&format!("  Seed: {}\n", data.seed));
    report.push_str(&format!("  Pages mapped: {}\n", data.pages.len()));
    report.push_str(&format!("  Distinct out-links: {}\n", data.total_links()));
    report.push_str(&format!("  Rounds: {}\n", data.stats.rounds));
    report.push_str(&format!("  Fetch failures: {}\n", data.stats.fetch_failures));
    report.push_str(&format!("  Off-domain links skipped: {}\n", data.stats.off_domain_links));
    report.push_str(&format!("  Hrefs discarded: {}\n", data.stats.discarded_hrefs));
    report.push_str(&format!("  Started: {}\n", data.started_at.to_rfc3339()));
    report.push_str(&format!("  Duration: {:.2}s\n", data.duration_secs()));

    if data.stats.cancelled {
        let note = "[!] Deadline reached before the crawl finished, map is partial";
        report.push_str(&format!("  {}\n", paint_warning(note, use_color)));
    }
    if data.stats.depth_limited {
        let note = "[!] Depth limit reached, some links were not visited";
        report.push_str(&format!("  {}\n", paint_warning(note, use_color)));
    }

    report.push('\n');
    report.push_str(RULE);
    report.push_str("\n\n");

    for page in &data.pages {
        if use_color {
            report.push_str(&format!("{} {}\n", "Page:".bold(), page.url.cyan()));
        } else {
            report.push_str(&format!("Page: {}\n", page.url));
        }
        report.push_str("    Outbound Links:\n");
        for link in &page.out_links {
            report.push_str(&format!("        {}\n", link));
        }
        report.push('\n');
    }

    report
}

fn paint_warning(text: &str, use_color: bool) -> String {
    if use_color {
        text.yellow().to_string()
    } else {
        text.to_string()
    }
}

pub fn generate_json_report(data: &ReportData) -> Result<String, serde_json::Error> {
    let json_report = serde_json::json!({
        "generator": "Trawl",
        "version": env!("CARGO_PKG_VERSION"),
        "seed": data.seed,
        "started_at": data.started_at.to_rfc3339(),
        "finished_at": data.finished_at.to_rfc3339(),
        "duration_seconds": data.duration_secs(),
        "stats": data.stats,
        "pages": data.pages,
    });

    serde_json::to_string_pretty(&json_report)
}

pub fn render_report(
    data: &ReportData,
    format: ReportFormat,
    use_color: bool,
) -> Result<String, serde_json::Error> {
    match format {
        ReportFormat::Text => Ok(generate_text_report(data, use_color)),
        ReportFormat::Json => generate_json_report(data),
    }
}

/// Write a rendered report to disk, replacing any existing file.
pub fn save_report(content: &str, path: &Path) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(content.as_bytes())?;
    file.flush()?;
    Ok(())
}
