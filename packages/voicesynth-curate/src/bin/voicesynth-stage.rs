//! VoiceSynth stage tool
//!
//! Implements the Convert and Curate stages. Logs go to stderr; with
//! `--json-stats` the only stdout output is one flat JSON line of counters.
//!
//! # Usage
//!
//! ```bash
//! voicesynth-stage convert emails_raw.json --out emails.jsonl --json-stats
//! voicesynth-stage curate cleaned_emails.json --out style_shortlist.csv --per-topic 200 --json-stats
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use voicesynth_curate::{
    build_shortlist, convert_file, load_cleaned, write_shortlist_file, CurateConfig, DedupConfig,
};

#[derive(Parser)]
#[command(name = "voicesynth-stage")]
#[command(about = "Convert and Curate stages of the voice-synth pipeline", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// JSON array (or JSONL) export → filtered JSONL
    Convert {
        /// Input JSON array or JSONL file
        input: PathBuf,

        /// Output JSONL path
        #[arg(long)]
        out: PathBuf,

        /// Keep every field instead of the mail header/body whitelist
        #[arg(long)]
        no_filter: bool,

        /// Print counters as one JSON line on stdout
        #[arg(long)]
        json_stats: bool,
    },

    /// Cleaned emails → deduplicated, topic-balanced shortlist CSV
    Curate {
        /// Cleaned emails JSON array
        input: PathBuf,

        /// Output CSV path
        #[arg(long)]
        out: PathBuf,

        /// Maximum records kept per topic
        #[arg(long, default_value = "200")]
        per_topic: usize,

        /// Minimum trimmed body length for a style candidate
        #[arg(long, default_value = "200")]
        min_chars: usize,

        /// Skip both deduplication passes
        #[arg(long)]
        no_dedupe: bool,

        /// Near-duplicate similarity threshold in (0, 1]
        #[arg(long, default_value = "0.8")]
        dedupe_threshold: f64,

        /// Print counters as one JSON line on stdout
        #[arg(long)]
        json_stats: bool,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Convert {
            input,
            out,
            no_filter,
            json_stats,
        } => {
            let stats = convert_file(&input, &out, !no_filter)
                .with_context(|| format!("converting {}", input.display()))?;
            if json_stats {
                let mut map = BTreeMap::new();
                map.insert("total", stats.total);
                map.insert("kept", stats.kept);
                println!("{}", serde_json::to_string(&map)?);
            }
        }
        Commands::Curate {
            input,
            out,
            per_topic,
            min_chars,
            no_dedupe,
            dedupe_threshold,
            json_stats,
        } => {
            let config = CurateConfig {
                per_topic,
                min_chars,
                dedupe: !no_dedupe,
                dedup: DedupConfig::default().with_threshold(dedupe_threshold),
            };
            config.validate()?;

            let records = load_cleaned(&input)?;
            let outcome = build_shortlist(records, &config)?;
            write_shortlist_file(&out, &outcome.shortlist)
                .with_context(|| format!("writing {}", out.display()))?;

            if json_stats {
                println!("{}", serde_json::to_string(&outcome.stats.to_map())?);
            }
        }
    }

    Ok(())
}
