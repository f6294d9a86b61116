use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use loam::{run_phase, run_pipeline, Phase, PipelineConfig};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "loam", about = "Single-machine MapReduce pipeline over activity logs")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the full five-phase pipeline
    Run {
        /// Raw activity log directory
        #[arg(long)]
        logs: PathBuf,
        /// User profile directory
        #[arg(long)]
        profiles: PathBuf,
        /// Working directory for phase outputs and the execution report
        #[arg(long)]
        out: PathBuf,
    },
    /// Run a single phase by name for isolated testing
    Phase {
        /// One of: validate, activity, rank, trending, join
        name: String,
        #[arg(long)]
        logs: PathBuf,
        #[arg(long)]
        profiles: PathBuf,
        #[arg(long)]
        out: PathBuf,
    },
}

fn main() -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    let cli = Cli::parse();
    match cli.command {
        Command::Run { logs, profiles, out } => {
            let cfg = PipelineConfig::new(logs, profiles, out);
            let report = run_pipeline(&cfg)?;
            println!("report written to {}", cfg.report_path().display());
            for phase in &report.phases {
                println!(
                    "{}: in={} out={} rejected={} unmatched={} partitions={} {}ms",
                    phase.phase,
                    phase.records_in,
                    phase.records_out,
                    phase.rejected,
                    phase.unmatched,
                    phase.partitions,
                    phase.elapsed_ms
                );
            }
        }
        Command::Phase { name, logs, profiles, out } => {
            let phase = Phase::parse(&name)
                .with_context(|| format!("unknown phase {name:?}; expected one of validate, activity, rank, trending, join"))?;
            let cfg = PipelineConfig::new(logs, profiles, out);
            let result = run_phase(&cfg, phase)?;
            println!(
                "{}: in={} out={} rejected={} unmatched={} partitions={} {}ms",
                result.phase,
                result.records_in,
                result.records_out,
                result.rejected,
                result.unmatched,
                result.partitions,
                result.elapsed_ms
            );
        }
    }
    Ok(())
}
