use crate::infra::build_services;
use crate::server;
use clap::{Args, Parser, Subcommand};
use madrid_housing::config::AppConfig;
use madrid_housing::error::AppError;
use madrid_housing::forecast::ModelKind;
use madrid_housing::pipeline::RefreshScope;
use madrid_housing::telemetry;

#[derive(Parser, Debug)]
#[command(
    name = "Madrid Housing Market Service",
    about = "Ingest, forecast, and analyse Madrid housing market statistics",
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
    /// Run a data refresh across all sources, or one with --source
    Refresh(RefreshArgs),
    /// Regenerate the full calibrated synthetic dataset
    Seed,
    /// Generate forecasts for one district, or every district by default
    Forecast(ForecastArgs),
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

#[derive(Args, Debug)]
struct RefreshArgs {
    /// Restrict the refresh to a single source adapter by name
    #[arg(long)]
    source: Option<String>,
}

#[derive(Args, Debug)]
struct ForecastArgs {
    /// District code (01-21); omit to forecast every district
    #[arg(long)]
    district: Option<String>,
    /// Number of quarters to forecast
    #[arg(long, default_value_t = 8)]
    periods: usize,
    /// Forecast model
    #[arg(long, default_value = "ensemble", value_parser = ["linear", "seasonal", "ensemble"])]
    model: String,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Refresh(args) => run_refresh(args).await,
        Command::Seed => run_seed().await,
        Command::Forecast(args) => run_forecast(args).await,
    }
}

async fn run_refresh(args: RefreshArgs) -> Result<(), AppError> {
    let services = setup().await?;
    let scope = match args.source {
        Some(source) => RefreshScope::Source(source),
        None => RefreshScope::All,
    };
    let report = services.pipeline.refresh(scope).await?;
    print_report(&report);
    Ok(())
}

async fn run_seed() -> Result<(), AppError> {
    let services = setup().await?;
    let report = services.pipeline.seed().await?;
    print_report(&report);
    Ok(())
}

async fn run_forecast(args: ForecastArgs) -> Result<(), AppError> {
    let services = setup().await?;
    let model = ModelKind::parse(&args.model).unwrap_or(ModelKind::Ensemble);
    match args.district {
        Some(district) => {
            let forecast = services
                .forecasts
                .forecast_district(&district, args.periods, model)
                .await?;
            print_report(&forecast);
        }
        None => {
            let report = services.forecasts.run_all(args.periods).await?;
            print_report(&report);
        }
    }
    Ok(())
}

async fn setup() -> Result<std::sync::Arc<crate::infra::Services>, AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;
    build_services(&config).await
}

fn print_report<T: serde::Serialize>(report: &T) {
    match serde_json::to_string_pretty(report) {
        Ok(rendered) => println!("{rendered}"),
        Err(err) => eprintln!("failed to render report: {err}"),
    }
}
