//! CLI entry point for `mboxcontacts`.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use clap::{CommandFactory, Parser, Subcommand};
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};

use mboxcontacts::config::{Config, EnrichmentProvider};
use mboxcontacts::enrich::{self, Enricher};
use mboxcontacts::export::json::{self as table_json, ContactTable};
use mboxcontacts::export::report::{self, Summary};
use mboxcontacts::export::{self, csv as table_csv};
use mboxcontacts::filter;

/// Set by the Ctrl+C handler; `extract` stops reading and writes partial results.
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Extract deduplicated external contacts from sent mail.
#[derive(Parser)]
#[command(name = "mboxcontacts", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract contacts from an MBOX file or a directory of .eml files
    Extract {
        path: PathBuf,
        /// Output directory (defaults to general.output_dir)
        #[arg(short, long, env = "MBOXCONTACTS_OUTPUT")]
        output: Option<PathBuf>,
        /// Internal domain (repeatable, replaces domains.internal)
        #[arg(long = "internal-domain", value_name = "DOMAIN")]
        internal_domains: Vec<String>,
        /// Target domain suffix (repeatable, replaces domains.target_patterns)
        #[arg(long = "target-pattern", value_name = "SUFFIX")]
        target_patterns: Vec<String>,
        /// Samples kept per contact
        #[arg(long, value_name = "N")]
        sample_cap: Option<usize>,
        /// Print the run summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove automated addresses and internal collaborators from a contact table
    Clean {
        /// contacts.json written by `extract`
        table: PathBuf,
        /// Output directory (defaults to a `cleaned` directory next to the table)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Add LLM relationship analysis to a contact table
    Enrich {
        /// contacts.json written by `extract` or `clean`
        table: PathBuf,
        /// Output directory (defaults to the table's directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Only analyze the first N contacts in export order
        #[arg(long, value_name = "N")]
        max_contacts: Option<usize>,
        /// LLM provider (openai or anthropic; defaults to enrichment.provider)
        #[arg(long)]
        provider: Option<EnrichmentProvider>,
    },
    /// Show statistics for a contact table
    Stats {
        table: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = mboxcontacts::config::load_config();

    // Configure logging: stderr + optional log file
    let log_level = match cli.verbose {
        0 => config.general.log_level.clone(),
        1 => "info".to_string(),
        2 => "debug".to_string(),
        _ => "trace".to_string(),
    };
    setup_logging(&log_level, &config);

    match cli.command {
        Commands::Extract {
            path,
            output,
            internal_domains,
            target_patterns,
            sample_cap,
            json,
        } => {
            if !internal_domains.is_empty() {
                config.domains.internal = internal_domains;
            }
            if !target_patterns.is_empty() {
                config.domains.target_patterns = target_patterns;
            }
            if let Some(cap) = sample_cap {
                config.aggregation.sample_cap = cap;
            }
            config.validate()?;
            let output = output.unwrap_or_else(|| config.general.output_dir.clone());
            cmd_extract(&path, &output, &config, json)
        }
        Commands::Clean { table, output } => {
            config.validate_filter()?;
            let output = output.unwrap_or_else(|| sibling_dir(&table, "cleaned"));
            cmd_clean(&table, &output, &config)
        }
        Commands::Enrich {
            table,
            output,
            max_contacts,
            provider,
        } => {
            if let Some(provider) = provider {
                config.enrichment.provider = provider;
            }
            let output = output.unwrap_or_else(|| sibling_dir(&table, ""));
            let max = max_contacts.or(config.enrichment.max_contacts);
            cmd_enrich(&table, &output, max, &config)
        }
        Commands::Stats { table, json } => cmd_stats(&table, json, &config),
        Commands::Completions { shell } => cmd_completions(shell),
        Commands::Manpage => cmd_manpage(),
    }
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let log_dir = mboxcontacts::config::cache_dir(config);
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(&log_dir, "mboxcontacts.log");
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

/// `parent(table)/name`, or the table's own directory when `name` is empty.
fn sibling_dir(table: &Path, name: &str) -> PathBuf {
    let parent = table
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    if name.is_empty() {
        parent.to_path_buf()
    } else {
        parent.join(name)
    }
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "mboxcontacts", &mut std::io::stdout());
    Ok(())
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<()> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::Write::write_all(&mut std::io::stdout(), &buf)?;
    Ok(())
}

/// Stream the archive, aggregate contacts, and write every output file.
fn cmd_extract(path: &Path, output: &Path, config: &Config, json: bool) -> anyhow::Result<()> {
    if !path.exists() {
        anyhow::bail!("File not found: {}", path.display());
    }

    let pb = ProgressBar::new(0);
    let template = if mboxcontacts::parser::is_eml_path(path) {
        "{spinner:.green} Extracting [{bar:40.cyan/blue}] {pos}/{len} files ({eta})"
    } else {
        "{spinner:.green} Extracting [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})"
    };
    pb.set_style(
        ProgressStyle::default_bar()
            .template(template)
            .expect("valid template")
            .progress_chars("#>-"),
    );

    // First Ctrl+C stops reading; a second one exits immediately.
    ctrlc::set_handler(|| {
        if INTERRUPTED.swap(true, Ordering::SeqCst) {
            std::process::exit(130);
        }
        eprintln!("\n  Interrupted, writing partial results (press Ctrl+C again to abort)...");
    })?;

    let start = Instant::now();
    let aggregation =
        mboxcontacts::extract_contacts_until(path, config, &INTERRUPTED, |done, total| {
            pb.set_length(total);
            pb.set_position(done);
        })?;
    pb.finish_and_clear();
    let elapsed = start.elapsed();

    if INTERRUPTED.load(Ordering::SeqCst) {
        eprintln!("  Warning: extraction was interrupted; results are partial.");
    } else if aggregation.truncated {
        eprintln!("  Warning: the source could not be read to the end; results are partial.");
    }

    let table = ContactTable::from_aggregation(aggregation, Some(path.display().to_string()));
    let written = export::write_outputs(&table, output, config)?;
    let summary = Summary::from_contacts(&table.contacts, &config.domains.personal);

    if json {
        print_summary_json(&table, &summary, Some(elapsed))?;
    } else {
        print_summary_table(&table, &summary, Some(elapsed));
        if let Ok(meta) = std::fs::metadata(path) {
            if meta.is_file() {
                println!("  {:<24} {}", "Archive size:", format_size(meta.len(), BINARY));
            }
        }
        println!("  Files written:");
        for file in &written {
            println!("    {}", file.display());
        }
        println!();
    }
    Ok(())
}

/// Drop automated and internal contacts, then rewrite every output.
fn cmd_clean(table_path: &Path, output: &Path, config: &Config) -> anyhow::Result<()> {
    let mut table = table_json::load_table(table_path)?;
    let initial = table.contacts.len();

    let mut outcome = filter::clean(std::mem::take(&mut table.contacts), &config.filter)?;
    let kept = outcome.kept.len();
    let cleaned = table.with_contacts(std::mem::take(&mut outcome.kept));
    let written = export::write_outputs(&cleaned, output, config)?;

    println!();
    println!("  {:<28} {}", "Initial contacts:", initial);
    println!(
        "  {:<28} {}",
        "Automated/bounce removed:",
        outcome.removed_automated.len()
    );
    println!(
        "  {:<28} {}",
        "Internal collaborators:",
        outcome.removed_internal.len()
    );
    println!("  {:<28} {}", "Final contacts:", kept);
    if initial > 0 {
        println!(
            "  {:<28} {:.1}%",
            "Retained:",
            kept as f64 / initial as f64 * 100.0
        );
    }
    if !outcome.removed_automated.is_empty() {
        println!();
        println!("  Example automated addresses removed:");
        for contact in outcome.removed_automated.iter().take(10) {
            println!("    {}", contact.email);
        }
        if outcome.removed_automated.len() > 10 {
            println!("    ... and {} more", outcome.removed_automated.len() - 10);
        }
    }
    println!();
    println!("  Files written:");
    for file in &written {
        println!("    {}", file.display());
    }
    println!();
    Ok(())
}

/// Analyze contacts with the configured LLM endpoint.
fn cmd_enrich(
    table_path: &Path,
    output: &Path,
    max: Option<usize>,
    config: &Config,
) -> anyhow::Result<()> {
    let table = table_json::load_table(table_path)?;
    let enricher = enrich::build_enricher(&config.enrichment, config.domains.personal.clone())?;

    let ordered: Vec<_> = table_csv::export_order(&table.contacts)
        .into_iter()
        .cloned()
        .collect();
    let count = max.unwrap_or(ordered.len()).min(ordered.len());

    let pb = ProgressBar::new(count as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} Analyzing contacts [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
            .expect("valid template")
            .progress_chars("#>-"),
    );
    let enriched = enrich::enrich_contacts(enricher.as_ref(), &ordered, max, |n| pb.set_position(n as u64));
    pb.finish_and_clear();

    export::ensure_output_dir(output)?;
    let csv_path = output.join(export::ENRICHED_CSV);
    table_csv::export_enriched(&enriched, &csv_path, config.export.csv_separator)?;
    let json_path = output.join(export::ENRICHED_JSON);
    std::fs::write(&json_path, serde_json::to_string_pretty(&enriched)?)?;
    let report_path = output.join(export::ENRICHMENT_REPORT_TXT);
    report::write_enrichment_report(&enriched, &report_path)?;

    let failed = enriched.iter().filter(|e| e.enrichment.is_none()).count();
    println!();
    println!("  {:<20} {}", "Provider:", enricher.name());
    println!("  {:<20} {}", "Contacts analyzed:", enriched.len());
    println!("  {:<20} {}", "Failed:", failed);
    println!("  {:<20} {}", "CSV:", csv_path.display());
    println!("  {:<20} {}", "JSON:", json_path.display());
    println!("  {:<20} {}", "Report:", report_path.display());
    println!();
    Ok(())
}

/// Show statistics for a contact table.
fn cmd_stats(table_path: &Path, json: bool, config: &Config) -> anyhow::Result<()> {
    let table = table_json::load_table(table_path)?;
    let summary = Summary::from_contacts(&table.contacts, &config.domains.personal);
    if json {
        print_summary_json(&table, &summary, None)
    } else {
        print_summary_table(&table, &summary, None);
        Ok(())
    }
}

fn print_summary_table(table: &ContactTable, summary: &Summary, elapsed: Option<std::time::Duration>) {
    println!();
    if let Some(ref source) = table.source {
        println!("  {:<24} {}", "Source:", source);
    }
    println!("  {:<24} {}", "Messages read:", table.stats.messages_seen);
    println!("  {:<24} {}", "Sent messages:", table.stats.sent_messages);
    println!("  {:<24} {}", "Duplicates skipped:", table.stats.duplicates);
    println!("  {:<24} {}", "Contacts:", summary.total_contacts);
    println!("  {:<24} {}", "Target contacts:", summary.target_contacts);
    println!("  {:<24} {}", "High interaction (5+):", summary.high_interaction);
    println!(
        "  {:<24} {} invalid address(es), {} malformed message(s)",
        "Discarded:", table.discards.invalid_addresses, table.discards.malformed_messages
    );
    if table.truncated {
        println!("  {:<24} yes (partial results)", "Truncated:");
    }
    if let Some(elapsed) = elapsed {
        println!("  {:<24} {:.2?}", "Elapsed:", elapsed);
    }

    if !summary.categories.is_empty() {
        println!();
        println!("  Categories:");
        for (category, count) in &summary.categories {
            println!("    {count:>6}  {category}");
        }
    }
    if !summary.top_domains.is_empty() {
        println!();
        println!("  Top domains:");
        for (domain, count) in &summary.top_domains {
            println!("    {count:>6}  {domain}");
        }
    }
    if !summary.top_targets.is_empty() {
        println!();
        println!("  Top target contacts:");
        for (label, email, count) in &summary.top_targets {
            println!("    {count:>6}  {label} <{email}>");
        }
    }
    println!();
}

fn print_summary_json(
    table: &ContactTable,
    summary: &Summary,
    elapsed: Option<std::time::Duration>,
) -> anyhow::Result<()> {
    let stats = serde_json::json!({
        "source": table.source,
        "stats": table.stats,
        "discards": table.discards,
        "truncated": table.truncated,
        "summary": summary,
        "elapsed_ms": elapsed.map(|e| e.as_millis() as u64),
    });
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}
