use clap::Parser;
use mr::config::CoordinatorConfig;

#[derive(Parser, Debug)]
#[command(about = "MapReduce coordinator")]
struct Cli {
    /// Input files, one map task each
    #[arg(required = true)]
    files: Vec<String>,

    #[command(flatten)]
    config: CoordinatorConfig,

    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    mr::logging::init(cli.verbose);
    tracing::info!(
        "starting coordinator: {} map tasks, {} reduce tasks",
        cli.files.len(),
        cli.config.n_reduce
    );

    mr::coordinator::run(cli.files, cli.config)
}
