mod cli;
mod demo;
mod infra;
mod project;
mod routes;
mod server;

use commence_planner::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
