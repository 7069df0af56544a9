use chrono::Utc;
use clap::ArgMatches;
use colored::Colorize;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Level, debug};
use trawl_core::crawl::{CrawlOptions, CrawlProgressCallback, execute_crawl};
use trawl_core::report::{ReportFormat, gather_report_data, render_report, save_report};

/// Turn a command-line domain into a seed URL, assuming `http://` when no
/// scheme is given.
pub fn parse_seed(domain: &str) -> Result<String, String> {
    let domain = domain.trim();
    if domain.is_empty() {
        return Err("A domain to crawl must be provided".to_string());
    }

    let seed = if domain.contains("://") {
        domain.to_string()
    } else {
        format!("http://{}", domain)
    };

    trawl_scanner::Link::seed(&seed).map_err(|e| format!("Invalid domain '{}': {}", domain, e))?;
    Ok(seed)
}

/// Expand a leading `~` in a report path.
pub fn resolve_output_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).as_ref())
}

/// Resolve a report path, adding the format's extension when the path has none.
pub fn output_path_for(path: &str, format: ReportFormat) -> PathBuf {
    let mut path = resolve_output_path(path);
    if path.extension().is_none() {
        path.set_extension(format.extension());
    }
    path
}

pub fn log_level(verbose: bool) -> Level {
    if verbose { Level::INFO } else { Level::WARN }
}

/// Install the stderr log subscriber. A second call is a no-op.
pub fn init_logging(verbose: bool) {
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(log_level(verbose))
        .try_init();
}

pub fn print_banner() {
    println!(
        "{} {}",
        "trawl".bright_cyan().bold(),
        concat!("v", env!("CARGO_PKG_VERSION")).bright_black()
    );
}

/// Run a crawl as described by the command line and print or save its report.
pub async fn handle_crawl(args: &ArgMatches) -> Result<(), String> {
    let verbose = args.get_flag("verbose");
    let quiet = args.get_flag("quiet");
    init_logging(verbose);

    let domain = args
        .get_one::<String>("domain")
        .ok_or_else(|| "A domain to crawl must be provided".to_string())?;
    let seed = parse_seed(domain)?;

    let format_name = args
        .get_one::<String>("format")
        .map(String::as_str)
        .unwrap_or("text");
    let format = ReportFormat::from_str(format_name)
        .ok_or_else(|| format!("Unsupported report format '{}'", format_name))?;
    let output = args
        .get_one::<String>("output")
        .map(|p| output_path_for(p, format));

    let mut options = CrawlOptions::new(seed.clone());
    options.workers = *args.get_one::<usize>("threads").unwrap_or(&10);
    options.max_depth = args.get_one::<usize>("max-depth").copied();
    options.deadline = args.get_one::<u64>("deadline").map(|s| Duration::from_secs(*s));
    options.timeout_secs = *args.get_one::<u64>("timeout").unwrap_or(&10);
    options.show_progress_bars = !quiet;

    if !quiet {
        print_banner();
        println!("\nCrawling {}", seed.bright_white());
        println!("Workers: {}", options.workers);
        match options.max_depth {
            Some(depth) => println!("Max depth: {}", depth),
            None => println!("Max depth: unlimited"),
        }
        if let Some(deadline) = options.deadline {
            println!("Deadline: {}s", deadline.as_secs());
        }
        println!();
    }

    let progress_callback: Option<CrawlProgressCallback> = if quiet {
        None
    } else {
        Some(Arc::new(|msg: String| println!("{}", msg)))
    };

    let started_at = Utc::now();
    let outcome = execute_crawl(options, progress_callback).await?;
    let finished_at = Utc::now();

    if !quiet {
        println!("\n{} Crawl complete!\n", "✓".green().bold());
    }

    let data = gather_report_data(&seed, &outcome.site_map, &outcome.stats, started_at, finished_at);
    debug!("Rendering {} pages as {:?}", data.pages.len(), format);

    match output {
        Some(path) => {
            let report = render_report(&data, format, false)
                .map_err(|e| format!("Failed to render report: {}", e))?;
            save_report(&report, &path)
                .map_err(|e| format!("Failed to write report to {}: {}", path.display(), e))?;
            if !quiet {
                println!("{} Report saved to {}", "✓".green().bold(), path.display());
            }
        }
        None => {
            let use_color = std::io::stdout().is_terminal();
            let report = render_report(&data, format, use_color)
                .map_err(|e| format!("Failed to render report: {}", e))?;
            print!("{}", report);
        }
    }

    Ok(())
}
