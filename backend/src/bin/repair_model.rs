use cattle_backend::repair::{RepairOutcome, repair_model};
use clap::Parser;
use std::error::Error;
use std::path::PathBuf;

/// Re-saves a cattle model, rebuilding it from weights if libtorch cannot
/// load it as a full module.
#[derive(Parser, Debug)]
#[command(name = "repair-model")]
#[command(version)]
struct Cli {
    #[arg(short, long, default_value = "cattle_model.pt")]
    input: PathBuf,

    #[arg(short, long, default_value = "cattle_model_fixed.ot")]
    output: PathBuf,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));
    let cli = Cli::parse();

    let outcome = repair_model(&cli.input, &cli.output)?;
    match outcome {
        RepairOutcome::LoadedDirectly => {
            log::info!("Model was loadable as-is; copied to {}", cli.output.display())
        }
        RepairOutcome::RebuiltFromWeights => log::info!(
            "Scaffold rebuilt from weights and saved to {}",
            cli.output.display()
        ),
    }
    log::info!(
        "Serve it with MODEL_PATH={} MODEL_FORMAT={}",
        cli.output.display(),
        outcome.model_format()
    );
    Ok(())
}
