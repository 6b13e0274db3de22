#![doc = include_str!("../README.md")]

mod conf;
mod dataset;

use std::process::ExitCode;
use std::sync::atomic::AtomicBool;

use clap::Parser;
use tracing::{error, info, warn};

use conf::Conf;
use dataset::Dataset;
use snb_core::driver::{TrainingDriver, TrainingOutcome};
use snb_core::io::assemble;
use snb_core::layout::Layout;
use snb_core::report::{PredictorSpec, SelectionReport};

#[derive(serde::Serialize)]
struct Output {
    selection: SelectionReport,
    predictor: PredictorSpec,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();
    let conf = Conf::parse();

    let dataset = match Dataset::load(&conf.input) {
        Ok(d) => d,
        Err(e) => {
            error!("failed to load dataset: {e}");
            return ExitCode::FAILURE;
        }
    };

    let Dataset { input, instance_count, target_prior, source } = dataset;
    let attribute_count = input.attributes.len() as u32;
    let layout = Layout::new(instance_count, 1, attribute_count, 1);

    let (schema, slice_set, calculators) = match assemble(input, &source, layout, None, None, conf.force_dense_mode) {
            Ok(v) => v,
            Err(e) => {
                error!("failed to assemble training input: {e}");
                return ExitCode::FAILURE;
            }
        };

    let mut driver = TrainingDriver::new(
        &schema,
        slice_set,
        calculators,
        conf.scorer_config(attribute_count),
        conf.driver_config(),
    );
    let interrupted = AtomicBool::new(false);
    let result = match driver.train(&interrupted) {
        Ok(r) => r,
        Err(e) => {
            error!("training failed: {e}");
            return ExitCode::FAILURE;
        }
    };

    match &result.outcome {
        TrainingOutcome::Success => info!(score = result.score, "training complete"),
        TrainingOutcome::Warning(message) => warn!("{message}"),
        TrainingOutcome::Interrupted => {
            warn!("training interrupted");
            return ExitCode::FAILURE;
        }
    }

    let selection = SelectionReport::build(&schema, &result.selection);
    let predictor = PredictorSpec::build(&schema, &result.selection, target_prior);
    let output = Output { selection, predictor };
    let json = serde_json::to_string_pretty(&output).expect("report serializes");

    match &conf.output {
        Some(path) => {
            if let Err(e) = std::fs::write(path, json) {
                error!("failed to write report to {path:?}: {e}");
                return ExitCode::FAILURE;
            }
        }
        None => println!("{json}"),
    }

    ExitCode::SUCCESS
}
