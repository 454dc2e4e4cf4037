//! CLI binary for dropbox2pages.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `MigrationConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use dropbox2pages::{
    migrate_to_files, plan, CollisionPolicy, MigrationConfig, MigrationConfigBuilder,
    MigrationProgressCallback, MigrationStats, OutputPaths, ProgressCallback, RepoCoordinates,
    RewriteMode,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

/// Shorten `s` to at most `max` characters for a single terminal line.
fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        let head: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{head}\u{2026}")
    } else {
        s.to_string()
    }
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Live progress bar plus one log line per image.
struct CliProgressCallback {
    bar: ProgressBar,
    /// Start of the item currently in flight.
    item_start: Mutex<Option<Instant>>,
}

impl CliProgressCallback {
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Reading spreadsheet…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            item_start: Mutex::new(None),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>4}/{len} images  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Migrating");
        self.bar.reset_eta();
    }

    fn item_elapsed(&self) -> String {
        let ms = self
            .item_start
            .lock()
            .ok()
            .and_then(|mut t| t.take())
            .map(|t| t.elapsed().as_millis())
            .unwrap_or(0);
        dim(&format!("{:.1}s", ms as f64 / 1000.0))
    }
}

impl MigrationProgressCallback for CliProgressCallback {
    fn on_migration_start(&self, total: usize) {
        self.activate_bar(total);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Migrating {total} images…"))
        ));
    }

    fn on_item_start(&self, _index: usize, _total: usize, url: &str) {
        if let Ok(mut t) = self.item_start.lock() {
            *t = Some(Instant::now());
        }
        self.bar.set_message(truncate(url, 60));
    }

    fn on_item_complete(&self, index: usize, total: usize, published_url: &str) {
        self.bar.println(format!(
            "  {} {:>4}/{:<4}  {}  {}",
            green("✓"),
            index,
            total,
            truncate(published_url, 90),
            self.item_elapsed(),
        ));
        self.bar.inc(1);
    }

    fn on_item_error(&self, index: usize, total: usize, error: &str) {
        self.bar.println(format!(
            "  {} {:>4}/{:<4}  {}  {}",
            red("✗"),
            index,
            total,
            red(&truncate(error, 90)),
            self.item_elapsed(),
        ));
        self.bar.inc(1);
    }

    fn on_pause(&self, duration: Duration) {
        self.bar
            .set_message(format!("pausing {}s for rate limits", duration.as_secs()));
    }

    fn on_migration_complete(&self, total: usize, success_count: usize) {
        let failed = total.saturating_sub(success_count);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} images migrated successfully",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} images migrated  ({} failed)",
                if failed == total { red("✘") } else { cyan("⚠") },
                bold(&success_count.to_string()),
                total,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Migrate every Dropbox image in a product export
  dropbox2pages products.csv --repo acme/product-images

  # Preview what would be uploaded (no token, no network)
  dropbox2pages products.csv --repo acme/product-images --dry-run

  # Keep the original columns, add GitHub_<Column> next to them
  dropbox2pages products.csv --repo acme/acme.github.io --mode augment

  # Only the "Image Src" column, store under assets/products on gh-pages
  dropbox2pages products.csv --repo acme/site --branch gh-pages \
      --dest-dir assets/products --column "Image Src"

OUTPUT:
  <stem>_with_github_urls.csv   the input with migrated URLs substituted
  <stem>_url_mappings.csv       original_url, published_url, status, detail

  Rows whose image failed to migrate keep their original URL (or the
  --failure-marker text). Per-image failures do not change the exit code.

ENVIRONMENT VARIABLES:
  GITHUB_TOKEN     Token with contents:write on the target repository
  GITHUB_REPO      Target repository as owner/name
  RUST_LOG         Overrides the log filter (e.g. dropbox2pages=debug)
"#;

/// Move spreadsheet images from Dropbox to GitHub Pages.
#[derive(Parser, Debug)]
#[command(
    name = "dropbox2pages",
    version,
    about = "Move spreadsheet images from Dropbox to GitHub Pages",
    long_about = "Find every Dropbox image URL in a CSV export, upload each image once to a \
GitHub repository served by GitHub Pages, and write a copy of the CSV that points at the \
new URLs together with an original-to-published mapping.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Input CSV file.
    input: PathBuf,

    /// GitHub token with contents:write on the repository.
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Target repository as owner/name.
    #[arg(long, env = "GITHUB_REPO")]
    repo: String,

    /// Branch served by GitHub Pages.
    #[arg(long, env = "DROPBOX2PAGES_BRANCH", default_value = "main")]
    branch: String,

    /// Directory inside the repository that receives the images.
    #[arg(long, env = "DROPBOX2PAGES_DEST_DIR", default_value = "images")]
    dest_dir: String,

    /// Uploads between rate-limit pauses.
    #[arg(long, env = "DROPBOX2PAGES_BATCH_SIZE", default_value_t = 10,
          value_parser = clap::value_parser!(u64).range(1..))]
    batch_size: u64,

    /// Seconds to pause after every batch (0 disables pausing).
    #[arg(long, env = "DROPBOX2PAGES_PAUSE_SECS", default_value_t = 10)]
    pause_secs: u64,

    /// Per-image download timeout in seconds.
    #[arg(long, env = "DROPBOX2PAGES_FETCH_TIMEOUT", default_value_t = 30)]
    fetch_timeout: u64,

    /// Per-request GitHub API timeout in seconds.
    #[arg(long, env = "DROPBOX2PAGES_API_TIMEOUT", default_value_t = 30)]
    api_timeout: u64,

    /// Host whose URLs are migrated (repeatable). Default: dropbox.com, dropboxusercontent.com.
    #[arg(long = "source-host", value_name = "HOST")]
    source_hosts: Vec<String>,

    /// Column holding image URLs (repeatable). Default: detected from headers and values.
    #[arg(long = "column", value_name = "NAME")]
    columns: Vec<String>,

    /// What to do when the image already exists in the repository.
    #[arg(long, env = "DROPBOX2PAGES_COLLISION", value_enum, default_value = "skip")]
    collision: CollisionArg,

    /// Replace URLs in place, or append GitHub_<Column> columns.
    #[arg(long, env = "DROPBOX2PAGES_MODE", value_enum, default_value = "replace")]
    mode: ModeArg,

    /// Text written in place of URLs that failed to migrate.
    #[arg(long, env = "DROPBOX2PAGES_FAILURE_MARKER")]
    failure_marker: Option<String>,

    /// Rewritten CSV path. Default: <stem>_with_github_urls.csv beside the input.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Mapping CSV path. Default: <stem>_url_mappings.csv beside the input.
    #[arg(long)]
    mapping_output: Option<PathBuf>,

    /// Skip the repository access check before the first download.
    #[arg(long)]
    no_verify: bool,

    /// List what would be migrated without downloading or uploading.
    #[arg(long)]
    dry_run: bool,

    /// Print the run summary (or the plan) as JSON on stdout.
    #[arg(long, env = "DROPBOX2PAGES_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "DROPBOX2PAGES_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DROPBOX2PAGES_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "DROPBOX2PAGES_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum CollisionArg {
    Skip,
    Overwrite,
}

impl From<CollisionArg> for CollisionPolicy {
    fn from(v: CollisionArg) -> Self {
        match v {
            CollisionArg::Skip => CollisionPolicy::Skip,
            CollisionArg::Overwrite => CollisionPolicy::Overwrite,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum ModeArg {
    Replace,
    Augment,
}

impl From<ModeArg> for RewriteMode {
    fn from(v: ModeArg) -> Self {
        match v {
            ModeArg::Replace => RewriteMode::Replace,
            ModeArg::Augment => RewriteMode::Augment,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level library logs.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.dry_run;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Dry run ──────────────────────────────────────────────────────────
    if cli.dry_run {
        let config = config_builder(&cli)?
            .build_offline()
            .context("Invalid configuration")?;
        let plan = plan(&cli.input, &config).context("Failed to plan migration")?;

        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&plan).context("Failed to serialise plan")?
            );
        } else {
            println!("File:         {}", cli.input.display());
            println!("Rows:         {}", plan.rows);
            println!("URL columns:  {}", plan.url_columns.join(", "));
            println!("Images:       {}", plan.items.len());
            for item in &plan.items {
                println!("  {}", item.original_url);
                println!("    {} {}", dim("→"), item.published_url);
            }
        }
        return Ok(());
    }

    // ── Build config ─────────────────────────────────────────────────────
    let cli_cb = show_progress.then(CliProgressCallback::new_dynamic);

    let mut builder = config_builder(&cli)?;
    if let Some(ref cb) = cli_cb {
        let cb: ProgressCallback = Arc::clone(cb) as Arc<dyn MigrationProgressCallback>;
        builder = builder.progress_callback(cb);
    }
    let config: MigrationConfig = builder.build().context("Invalid configuration")?;

    let mut paths = OutputPaths::beside(&cli.input);
    if let Some(ref p) = cli.output {
        paths.table = p.clone();
    }
    if let Some(ref p) = cli.mapping_output {
        paths.mapping = p.clone();
    }

    // ── Run migration ────────────────────────────────────────────────────
    let result = migrate_to_files(&cli.input, &paths, &config).await;
    if let (Err(_), Some(cb)) = (&result, &cli_cb) {
        cb.bar.finish_and_clear();
    }
    let stats = result.context("Migration failed")?;

    if cli.json {
        let summary = serde_json::json!({ "stats": &stats, "outputs": &paths });
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("Failed to serialise summary")?
        );
    } else if !cli.quiet {
        print_summary(&stats, &paths, show_progress);
    }

    Ok(())
}

fn print_summary(stats: &MigrationStats, paths: &OutputPaths, show_progress: bool) {
    if !show_progress {
        eprintln!(
            "Migrated {}/{} images in {}ms",
            stats.succeeded(),
            stats.candidates,
            stats.total_duration_ms
        );
        if stats.failed() > 0 {
            eprintln!("  {} images failed", stats.failed());
        }
    }
    eprintln!(
        "   {} uploaded  /  {} already present  /  {} failed  —  {}ms total",
        dim(&stats.uploaded.to_string()),
        dim(&stats.skipped_existing.to_string()),
        dim(&stats.failed().to_string()),
        stats.total_duration_ms,
    );
    eprintln!(
        "{}  {}",
        if stats.failed() == 0 { green("✔") } else { cyan("⚠") },
        bold(&paths.table.display().to_string()),
    );
    eprintln!("   {}", dim(&paths.mapping.display().to_string()));
}

/// Map CLI args to a `MigrationConfigBuilder`.
fn config_builder(cli: &Cli) -> Result<MigrationConfigBuilder> {
    let repo = RepoCoordinates::parse(&cli.repo)
        .with_context(|| format!("Invalid --repo '{}'", cli.repo))?;

    let mut builder = MigrationConfig::builder()
        .repo(repo)
        .branch(&cli.branch)
        .destination(&cli.dest_dir)
        .batch_size(cli.batch_size as usize)
        .pause_secs(cli.pause_secs)
        .fetch_timeout_secs(cli.fetch_timeout)
        .api_timeout_secs(cli.api_timeout)
        .collision(cli.collision.clone().into())
        .rewrite_mode(cli.mode.clone().into())
        .verify_repository(!cli.no_verify);

    if let Some(ref token) = cli.token {
        builder = builder.token(token);
    }
    if !cli.source_hosts.is_empty() {
        builder = builder.source_hosts(&cli.source_hosts);
    }
    if !cli.columns.is_empty() {
        builder = builder.url_columns(&cli.columns);
    }
    if let Some(ref marker) = cli.failure_marker {
        builder = builder.failure_marker(marker);
    }
    Ok(builder)
}
