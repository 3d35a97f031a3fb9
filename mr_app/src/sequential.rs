use clap::Parser;
use std::path::PathBuf;

mod apps;

#[derive(Parser, Debug)]
#[command(about = "Run a MapReduce application in a single process")]
struct Cli {
    #[arg(long, value_enum, default_value = "wc")]
    app: apps::AppName,

    #[arg(long, default_value = "mr-out-0")]
    output: PathBuf,

    #[arg(required = true)]
    files: Vec<String>,

    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    mr::logging::init(cli.verbose);

    let app = apps::load(cli.app);
    mr::sequential::run(app.as_ref(), &cli.files, &cli.output)?;
    Ok(())
}
