use crate::demo::{run_demo, run_import, run_matches, DemoArgs, ImportArgs, MatchesArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use vaani::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Vaani Opportunity Alerts",
    about = "Run and demonstrate the vaani voice-alert service from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service and the delivery worker (default command)
    Serve(ServeArgs),
    /// Work with the opportunity catalog
    Opportunities {
        #[command(subcommand)]
        command: OpportunityCommand,
    },
    /// List ranked matches for a caller profile given on the command line
    Matches(MatchesArgs),
    /// Run an end-to-end CLI demo covering matching, fan-out, and delivery
    Demo(DemoArgs),
}

#[derive(Subcommand, Debug)]
enum OpportunityCommand {
    /// Ingest a gazette CSV export and print the acceptance report
    Import(ImportArgs),
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
        Command::Opportunities {
            command: OpportunityCommand::Import(args),
        } => run_import(args),
        Command::Matches(args) => run_matches(args),
        Command::Demo(args) => run_demo(args),
    }
}
