use std::path::PathBuf;

use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use ctrlscroll_pipeline::{load_candidates, score_posts, PipelineConfig, RankPipeline};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "ctrlscroll")]
#[command(about = "CtrlScroll dedup and ranking")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Dedup a candidate batch against the index, score it and write the ranked report.
    Rank {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
    /// Show the size of the fingerprint index and its newest entries.
    Index {
        #[arg(long)]
        data_dir: Option<PathBuf>,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Score and rank a candidate batch without touching the index.
    Score {
        #[arg(long)]
        input: PathBuf,
    },
}

fn config(data_dir: Option<PathBuf>) -> PipelineConfig {
    let config = PipelineConfig::from_env();
    match data_dir {
        Some(dir) => config.with_data_dir(dir),
        None => config,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("ctrlscroll=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Rank { input, data_dir } => {
            let candidates = load_candidates(&input).await?;
            let run = RankPipeline::new(config(data_dir))
                .run_batch(candidates, Utc::now())
                .await?;
            println!(
                "rank complete: run_id={} ranked={} duplicates={} opted_out={} index_entries={} report={}",
                run.report.run_id,
                run.report.ranked.len(),
                run.report.duplicates.len(),
                run.report.opted_out.len(),
                run.report.index_entries,
                run.report_path.display()
            );
        }
        Commands::Index { data_dir, limit } => {
            let pipeline = RankPipeline::new(config(data_dir));
            let entries = pipeline.index_entries().await;
            println!(
                "index: entries={} data_dir={}",
                entries.len(),
                pipeline.config().data_dir.display()
            );
            for entry in entries.iter().rev().take(limit) {
                println!("{:016x}  {}  {}", entry.fingerprint, entry.id, entry.title);
            }
        }
        Commands::Score { input } => {
            let candidates = load_candidates(&input).await?;
            let ranked = score_posts(candidates, Utc::now(), &PipelineConfig::from_env().metrics);
            println!("{}", serde_json::to_string_pretty(&ranked)?);
        }
    }

    Ok(())
}
