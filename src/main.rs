mod batch;
mod error;
mod mail;
mod parser;
mod records;
mod resolver;
mod settings;
mod text;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};

use resolver::{HttpHead, UrlResolver};
use settings::Settings;
use text::{format_duration, truncate};

#[derive(Parser)]
#[command(name = "scholar_alerts", about = "Turn Google Scholar citation alert emails into CSV rows")]
struct Cli {
    /// Log at debug level (RUST_LOG still wins)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Move every .eml in DIR into a new batch and convert it
    Run {
        /// Directory holding the alert emails (default: current directory)
        dir: Option<PathBuf>,
        /// Also write each email's HTML body next to it
        #[arg(long)]
        dump_html: bool,
        /// Maximum redirect hops per tracking URL
        #[arg(long)]
        max_hops: Option<usize>,
        /// HEAD request timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Parse one email and print its blocks (no network)
    Inspect {
        file: PathBuf,
    },
    /// Resolve a single tracking URL
    Resolve {
        url: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_level.into()),
        )
        .init();

    let t0 = Instant::now();
    let mut settings = Settings::load()?;

    let result = match cli.command {
        Commands::Run {
            dir,
            dump_html,
            max_hops,
            timeout,
        } => {
            settings.dump_html |= dump_html;
            if let Some(n) = max_hops {
                settings.max_hops = n;
            }
            if let Some(secs) = timeout {
                settings.timeout_secs = secs;
            }
            let dir = match dir {
                Some(d) => d,
                None => std::env::current_dir()?,
            };

            let client = HttpHead::new(&settings).context("Failed to build HTTP client")?;
            let resolver = UrlResolver::new(client, &settings);
            let report = batch::run_batch(&dir, &settings, &resolver).await?;

            println!(
                "Batch {}: {} emails, {} records, {} failed.",
                report.batch,
                report.emails,
                report.records,
                report.failures.len()
            );
            for failure in &report.failures {
                println!("  {}: {}", failure.file, truncate(&failure.error, 100));
            }
            Ok(())
        }
        Commands::Inspect { file } => {
            let raw = mail::read_eml(&file)?;
            let alert = parser::parse_alert(&raw.html)?;
            println!("Date:  {}", raw.date);
            println!("Query: {}", alert.query);
            for (i, c) in alert.citations.iter().enumerate() {
                println!("{:>3}. {}", i + 1, c.title);
                println!("     authors: {}", truncate(c.authors.trim(), 80));
                println!("     blurb:   {}", truncate(&c.blurb, 80));
                println!("     link:    {}", truncate(&c.tracking_url, 80));
            }
            println!("\n{} citations", alert.citations.len());
            Ok(())
        }
        Commands::Resolve { url } => {
            let client = HttpHead::new(&settings).context("Failed to build HTTP client")?;
            let resolver = UrlResolver::new(client, &settings);
            println!("{}", resolver.resolve(&url).await?);
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}
