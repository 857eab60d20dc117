use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use streamgate::database::{RedisStore, init_redis};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// JSON array of shows
    file: PathBuf,

    #[arg(long, env = "REDIS_URL", default_value = "redis://redis:6379")]
    redis_url: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let shows = catalog::read_shows(&args.file)?;
    println!("Loaded Shows: {}\n", shows.len());

    let connection = init_redis(&args.redis_url)
        .await
        .with_context(|| format!("Failed to connect to {}", args.redis_url))?;
    let store = RedisStore::new(connection);

    let pb = catalog::utils::progress_bar(shows.len())?;
    let report = catalog::import_shows(&store, shows, &pb).await?;

    if report.created == 0 && report.updated == 0 {
        println!("No shows imported. Exiting.");
    } else {
        println!("Total New Shows: {}", report.created);
        println!("Total Updated Shows: {}", report.updated);
    }
    if report.skipped > 0 {
        println!("Skipped Shows: {}", report.skipped);
    }

    Ok(())
}
