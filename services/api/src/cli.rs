use crate::demo::{print_document_rules, run_demo, DemoArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use praevon::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Praevon Marketplace",
    about = "Run the Praevon rental marketplace service or walk through a lease from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Run a listing-to-signed-lease walkthrough against in-memory storage
    Demo(DemoArgs),
    /// Print the upload policy for every document type
    Rules,
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Demo(args) => run_demo(args),
        Command::Rules => {
            print_document_rules();
            Ok(())
        }
    }
}
