use cattle_backend::convert::{convert_to_compact, verify_round_trip};
use cattle_backend::inference::{CompactModel, FullPrecisionModel};
use cattle_backend::preprocess::Preprocessor;
use clap::Parser;
use std::error::Error;
use std::path::PathBuf;

/// Converts the full-precision ONNX model into the compact NNEF archive.
#[derive(Parser, Debug)]
#[command(name = "convert-model")]
#[command(version)]
struct Cli {
    /// Full-precision ONNX model
    #[arg(short, long, default_value = "cattle_model.onnx")]
    input: PathBuf,

    /// Destination archive
    #[arg(short, long, default_value = "cattle_model.nnef.tar")]
    output: PathBuf,

    /// Reference images to run through both models after conversion
    #[arg(long = "verify", num_args = 1..)]
    verify: Vec<PathBuf>,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));
    let cli = Cli::parse();

    let summary = convert_to_compact(&cli.input, &cli.output)?;
    log::info!(
        "Compact model saved: {} ({} nodes, {} bytes)",
        summary.output.display(),
        summary.nodes,
        summary.bytes
    );

    if cli.verify.is_empty() {
        return Ok(());
    }

    let preprocessor = Preprocessor::new();
    let mut inputs = Vec::with_capacity(cli.verify.len());
    for path in &cli.verify {
        inputs.push(preprocessor.process_bytes(&std::fs::read(path)?)?);
    }

    let full = FullPrecisionModel::load(&cli.input)?;
    let compact = CompactModel::load(&cli.output)?;
    let report = verify_round_trip(&full, &compact, &inputs)?;
    log::info!(
        "Compared {} images, max score difference {:.6}",
        report.compared,
        report.max_abs_diff
    );

    if !report.is_consistent() {
        for index in &report.disagreements {
            log::error!("Diagnosis flipped for {}", cli.verify[*index].display());
        }
        return Err(format!(
            "{} of {} reference images changed diagnosis",
            report.disagreements.len(),
            report.compared
        )
        .into());
    }
    Ok(())
}
