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

#[cfg(target_os = "windows")]
use mimalloc::MiMalloc;

#[cfg(target_os = "windows")]
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn main() -> std::result::Result<(), errors::CliError> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        ) // This uses RUST_LOG environment variable
        .init();

    let args = Cli::parse();
    let config = Config::from_file(&args.config)?.with_cli_args(&args);
    info!("Parsed configuration: {:#?}", config);
    let (input, params, output) = config.validated()?;

    std::fs::create_dir_all(&output.directory).map_err(|e| errors::CliError::Io {
        source: e.to_string(),
        path: Some(output.directory.to_string_lossy().to_string()),
    })?;

    let libraries = processing::load_libraries(&input)?;
    processing::process_raw_files(input.raw_files, &libraries, &params, &output)
}
