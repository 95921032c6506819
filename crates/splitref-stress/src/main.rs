use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use splitref_stress::{report, runner, OutputFormat, StressConfig};
use tracing::error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "splitref-stress")]
#[command(about = "Hammer the SplitRef lock-free queue from many threads and verify the result", long_about = None)]
#[command(version)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, env = "SPLITREF_CONFIG")]
    config: Option<PathBuf>,

    /// Number of producer threads
    #[arg(short, long)]
    producers: Option<usize>,

    /// Number of consumer threads
    #[arg(short = 'C', long)]
    consumers: Option<usize>,

    /// Integers pushed by each producer
    #[arg(short, long)]
    items: Option<u64>,

    /// Pause between pushes, in milliseconds
    #[arg(long)]
    producer_pause_ms: Option<u64>,

    /// Consumer sleep after an empty pop, in milliseconds
    #[arg(long)]
    backoff_ms: Option<u64>,

    /// Randomize consumer backoff
    #[arg(long)]
    jitter: bool,

    /// Use half the available CPUs for producers and half for consumers
    #[arg(long, conflicts_with_all = ["producers", "consumers"])]
    auto_threads: bool,

    /// Number of rounds to run
    #[arg(short, long)]
    rounds: Option<u32>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "pretty")]
    output: OutputFormat,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn apply(&self, config: &mut StressConfig) {
        if self.auto_threads {
            let half = (num_cpus::get() / 2).max(1);
            config.producers = half;
            config.consumers = half;
        }
        if let Some(p) = self.producers {
            config.producers = p;
        }
        if let Some(c) = self.consumers {
            config.consumers = c;
        }
        if let Some(i) = self.items {
            config.items_per_producer = i;
        }
        if let Some(ms) = self.producer_pause_ms {
            config.producer_pause_ms = ms;
        }
        if let Some(ms) = self.backoff_ms {
            config.consumer_backoff_ms = ms;
        }
        if self.jitter {
            config.backoff_jitter = true;
        }
        if let Some(r) = self.rounds {
            config.rounds = r;
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "splitref_stress=debug,splitref_queue=debug"
    } else {
        "splitref_stress=info,splitref_queue=warn"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = StressConfig::load(cli.config.as_deref()).context("loading configuration")?;
    cli.apply(&mut config);

    match runner::run(&config) {
        Ok(report) => {
            let text = report::render(&report, cli.output).context("rendering report")?;
            print!("{text}");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "stress run failed");
            eprintln!("{} {}", "✗".red(), e);
            Err(e).context("stress run failed")
        }
    }
}
