use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use motion_safety_runtime::config::SafetyConfig;

/// Motion safety supervisor for the drive-by-wire base
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// JSON file overriding the default safety thresholds
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => match SafetyConfig::load(path) {
            Ok(config) => {
                info!("Loaded safety config from {}", path.display());
                config
            }
            Err(e) => {
                eprintln!("Config error: {}", e);
                std::process::exit(2);
            }
        },
        None => SafetyConfig::default(),
    };

    if let Err(e) = motion_safety_runtime::runtime::run(config).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
