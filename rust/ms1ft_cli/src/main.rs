mod cli;
mod config;
mod errors;
mod processing;

use clap::Parser;
use tracing::info;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use cli::Cli;
use config::Config;
use errors::CliError;

#[cfg(target_os = "windows")]
use mimalloc::MiMalloc;

#[cfg(target_os = "windows")]
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn main() -> std::result::Result<(), CliError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        ) // This uses RUST_LOG environment variable
        .init();

    let args = Cli::parse();
    let config = Config::with_cli_args(args)?;
    info!("Parsed configuration: {:#?}", config);

    let (Some(input), Some(output)) = (config.input.as_ref(), config.output.as_ref()) else {
        return Err(CliError::Config {
            source: "Both an input and an output directory are required".to_string(),
        });
    };

    std::fs::create_dir_all(&output.directory).map_err(|e| CliError::Io {
        source: e.to_string(),
        path: Some(output.directory.to_string_lossy().to_string()),
    })?;

    let run = processing::load_run(input)?;
    let summary = processing::process_run(&run, &config.analysis, output)?;
    println!(
        "Wrote {} features from {} mass bins in {:?}",
        summary.features_written, summary.num_bins, summary.elapsed
    );
    Ok(())
}
