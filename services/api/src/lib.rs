mod cli;
mod infra;
mod routes;
mod scheduler;
mod server;

use madrid_housing::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
