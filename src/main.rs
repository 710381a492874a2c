//! Collects document and occurrence counts for a list of lemmas from the
//! Russian National Corpus search service.
//!
//! Results are appended to a tab-separated table one lemma at a time, so an
//! interrupted run can simply be restarted: lemmas which already have
//! complete statistics in the output table are not queried again.

mod config;
mod extract;
mod fetch;
mod lemmas;
mod plan;
mod progress;
mod run;
mod table;

use crate::config::Config;
use clap::Parser;
use log::LevelFilter;
use std::{io::Write, path::PathBuf};

/// Query the corpus for per-lemma frequency statistics
///
/// Statistics are written to the output table as they arrive. Rerunning the
/// program with the same output table resumes where the previous run
/// stopped, and retries lemmas for which no statistics were found.
#[derive(Parser, Debug)]
#[command(version, author)]
struct Args {
    /// Tab-separated input table, with a header row and one lemma per line
    #[arg(short, long, default_value = "input/lemmas.tsv")]
    input: PathBuf,

    /// Tab-separated output table
    ///
    /// Any previous content is read back to decide which lemmas still need
    /// to be queried, then the file is rewritten.
    #[arg(short, long, default_value = "output/rnc_scrape_lemmas.csv")]
    output: PathBuf,

    /// Search URL template, where `{lemma}` stands for the queried lemma
    #[arg(short, long, default_value = DEFAULT_ENDPOINT)]
    endpoint: Box<str>,

    /// Delay between two consecutive requests, in seconds
    ///
    /// The corpus service rate-limits aggressive clients, so this should
    /// not be set too low.
    #[arg(short, long, default_value = "1")]
    delay_secs: u64,

    /// Number of times a request may be retried after a connection failure
    /// or a rate-limiting response
    #[arg(short, long, default_value = "3")]
    retries: u32,

    /// Wait after a connection failure, in seconds
    #[arg(long, default_value = "60")]
    connection_backoff_secs: u64,

    /// Fixed part of the wait after a rate-limiting response, in seconds
    #[arg(long, default_value = "10")]
    rate_limit_base_secs: u64,

    /// Variable part of the wait after a rate-limiting response, in seconds
    ///
    /// This is divided by the number of remaining retries, so that the
    /// first retries come quickly and the last ones are more patient.
    #[arg(long, default_value = "60")]
    rate_limit_scale_secs: u64,

    /// Wait after a rate-limiting response once retries are exhausted, in
    /// seconds
    #[arg(long, default_value = "120")]
    rate_limit_exhausted_secs: u64,

    /// Only carry forward previous records that have complete statistics
    ///
    /// By default every previous record is copied into the new output table,
    /// so a lemma that is retried without success appears twice. With this
    /// flag, stale incomplete records are dropped instead.
    #[arg(long, default_value_t = false)]
    drop_stale: bool,

    /// Send logs to syslog and display a progress bar in the terminal
    ///
    /// By default, logs are printed to stderr and no progress bar is shown.
    #[arg(long, default_value_t = false)]
    syslog: bool,
}
//
impl Args {
    /// Decode and validate CLI arguments
    pub fn parse_and_check() -> Result<Self> {
        // Decode CLI arguments
        let args = Args::parse();

        // Check CLI arguments for basic sanity
        anyhow::ensure!(
            args.endpoint.contains(config::LEMMA_PLACEHOLDER),
            "endpoint template {:?} has no {} placeholder",
            args.endpoint,
            config::LEMMA_PLACEHOLDER
        );
        anyhow::ensure!(
            args.input != args.output,
            "input and output tables must be different files"
        );
        Ok(args)
    }
}
//
#[tokio::main]
async fn main() -> Result<()> {
    // Decode CLI arguments
    let args = Args::parse_and_check()?;

    // Set up logging
    setup_logging(args.syslog)?;

    // Query every lemma that isn't done yet
    let config = Config::new(args);
    let client = reqwest::Client::new();
    let summary = run::run(config, client).await?;
    if summary.failed > 0 {
        log::warn!(
            "{} lemma(s) could not be processed, rerun to retry them",
            summary.failed
        );
    }
    Ok(())
}

/// Use anyhow for Result type erasure
pub use anyhow::Result;

/// Dictionary headword, the unit of work
pub type Lemma = Box<str>;

/// Search query of the Russian National Corpus main subcorpus
const DEFAULT_ENDPOINT: &str = "https://processing.ruscorpora.ru/search.xml?env=alpha&api=1.0&mycorp=&mysent=&mysize=&mysentsize=&dpp=&spp=&spd=&mydocsize=&mode=main&lang=ru&sort=i_grtagging&nodia=1&text=lexgramm&parent1=0&level1=0&lex1={lemma}&gramm1=&sem1=&flags1=&sem-mod1=sem&sem-mod1=sem2&parent2=0&level2=0&min2=1&max2=1&lex2=&gramm2=&sem2=&flags2=&sem-mod2=sem&sem-mod2=sem2";

/// Set up logging
fn setup_logging(use_syslog: bool) -> Result<()> {
    let level = if cfg!(feature = "log-trace") {
        LevelFilter::Trace
    } else if cfg!(debug_assertions) {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    if use_syslog {
        syslog::init(syslog::Facility::LOG_USER, level, None)
            .map_err(|e| anyhow::format_err!("{e}"))
    } else {
        env_logger::Builder::new()
            .format(|buf, record| {
                writeln!(
                    buf,
                    "{} [{}] {}",
                    chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                    record.level(),
                    record.args()
                )
            })
            .filter_level(level)
            .try_init()
            .map_err(anyhow::Error::from)
    }
}
