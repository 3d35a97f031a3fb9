use clap::Parser;
use mr::config::WorkerConfig;
use mr::worker::{connect, Worker};
use std::sync::Arc;

mod apps;

#[derive(Parser, Debug)]
#[command(about = "MapReduce worker")]
struct Cli {
    #[arg(long, value_enum, default_value = "wc")]
    app: apps::AppName,

    #[command(flatten)]
    config: WorkerConfig,

    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    mr::logging::init(cli.verbose);

    let socket = cli.config.socket_path();
    let client = match connect(&socket).await {
        Ok(client) => client,
        Err(e) => {
            // no coordinator means nothing left to do
            tracing::warn!("cannot reach coordinator: {}", e);
            return Ok(());
        }
    };
    let worker = Worker::new(client, Arc::from(apps::load(cli.app)), cli.config);
    tracing::info!("worker started, app {:?}", cli.app);
    worker.run().await?;
    Ok(())
}
