use crate::demo::{run_demo, DemoArgs};
use crate::project::{run_projection, ProjectArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use commence_planner::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Commencing Enrolment Planner",
    about = "Project commencing enrolments and run the scenario approval service",
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
    /// Project a base scenario forward from an actuals CSV and print the result
    Project(ProjectArgs),
    /// Run a seeded end-to-end demo: rules, generation, editing and approval
    Demo(DemoArgs),
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
        Command::Project(args) => run_projection(args),
        Command::Demo(args) => run_demo(args),
    }
}
