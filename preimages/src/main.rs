use std::path::PathBuf;

use anyhow::Result;
use clap::{command, Parser};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod extractor;
mod index;
mod progress;
mod publish;
mod recognizer;
mod stores;

use index::PreimageIndex;
use progress::BlockProgressBar;
use stores::NodeDatabase;

#[derive(Parser)]
#[command(
    name = "preimages",
    about = "Extract storage-key preimages from a node's unitrie into a reverse index"
)]
struct Cli {
    #[arg(short = 'd', long = "database-path", help = "Node database path")]
    database_path: PathBuf,

    #[arg(
        long = "staging-path",
        help = "Working copy the run accumulates into",
        default_value = "preimages-staging.redb"
    )]
    staging_path: PathBuf,

    #[arg(
        short = 'o',
        long = "output-path",
        help = "Published index path",
        default_value = "preimages.redb"
    )]
    output_path: PathBuf,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let cli = Cli::parse();

    publish::resume_from_published(&cli.output_path, &cli.staging_path)?;

    let node_db = NodeDatabase::open(&cli.database_path)?;
    let mut index = PreimageIndex::open(&cli.staging_path)?;

    let mut pb = BlockProgressBar::new();
    let summary = extractor::run(&node_db, &node_db, &node_db, &mut index, &mut pb)?;
    pb.finish();

    info!(
        total = summary.total_entries,
        collected = summary.keys_collected,
        checkpoint = summary.to,
        "preimage index up to date"
    );

    // the staging file must be closed before it is copied out
    drop(index);
    publish::publish(&cli.staging_path, &cli.output_path)?;
    Ok(())
}
