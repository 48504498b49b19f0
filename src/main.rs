//! SegmentForge entrypoint: loads settings and artifacts, then runs one command
//!
//! Results are printed to stdout as JSON; logs go to stderr.

use anyhow::{Context, Result};
use clap::Parser;
use segmentforge::config::LogFormat;
use segmentforge::{
    train_from_csv, Args, Command, FeatureVector, PredictionService, Settings, TrainingParams,
};
use serde::Serialize;
use std::time::Instant;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn main() -> Result<()> {
    let args = Args::parse();

    let settings = Settings::load(args.config.as_deref()).context("Failed to load configuration")?;
    settings
        .validate()
        .context("Configuration validation failed")?;

    init_tracing(&settings, args.verbose);

    let service =
        PredictionService::from_settings(&settings).context("Failed to initialize service")?;

    let command = args.command;

    // Startup load; training replaces the artifacts instead
    if !matches!(command, Command::Train { .. }) && !service.model().load() {
        tracing::warn!("ML models not loaded; run `segmentforge train` to produce artifacts");
    }

    match &command {
        Command::Train {
            input,
            labeled_output,
            ..
        } => {
            let params = TrainingParams {
                tie_break: settings.tie_break,
                ..command.training_params().unwrap_or_default()
            };
            let input = input.as_deref().unwrap_or(&settings.dataset_path);

            let start_time = Instant::now();
            let report =
                train_from_csv(input, &params, service.model(), labeled_output.as_deref())?;
            tracing::info!(
                elapsed_secs = start_time.elapsed().as_secs_f64(),
                "Training complete"
            );
            print_json(&report)
        }
        Command::Predict {
            income,
            spending_score,
        } => {
            let input = FeatureVector::new(*income, *spending_score)?;
            let prediction = service
                .predict_segment(&input)
                .context("Model not available")?;
            print_json(&prediction)
        }
        Command::Clusters => print_json(&service.cluster_statistics()),
        Command::Segments => print_json(&service.all_segment_info()),
        Command::Centroids => print_json(&service.model().centroids()?),
        Command::ModelInfo => print_json(&service.model_info()),
        Command::Health => print_json(&service.health()),
    }
}

fn init_tracing(settings: &Settings, verbose: bool) {
    let default_level = if verbose {
        "debug"
    } else {
        settings.log_level.as_str()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let registry = tracing_subscriber::registry().with(filter);
    match settings.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
