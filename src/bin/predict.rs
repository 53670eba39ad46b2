use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use rs_acne_analysis_svc::config::settings::SETTINGS;
use rs_acne_analysis_svc::logger::logger::setup_logger;
use rs_acne_analysis_svc::pipeline::analysis_pipeline::analysis_pipeline::AnalysisPipeline;
use rs_acne_analysis_svc::pipeline::model_config::config::RecommendationTable;

/// Acne analysis prediction CLI: run the inference pipeline once over a
/// local image and print the diagnostic report.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the input image
    #[arg(short, long)]
    image: PathBuf,
}

fn main() -> anyhow::Result<()> {
    setup_logger();
    let args = Args::parse();

    let im_bytes = std::fs::read(&args.image)
        .with_context(|| format!("failed to read {:?}", args.image))?;

    let pipeline = AnalysisPipeline::new(&SETTINGS.models)?;
    let recommendations = RecommendationTable::load(&SETTINGS.models.recommendations)?;

    let report = pipeline.analyze(&im_bytes);
    let report = match &report.primary_diagnosis {
        Some(diagnosis) => {
            let ids = recommendations.for_label(&diagnosis.acne_type);
            report.with_recommendations(ids)
        }
        None => report,
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
