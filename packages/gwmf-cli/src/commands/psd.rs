use gwmf_rs::{io, Averaging, Psd};
use serde::Serialize;

use crate::cli::PsdArgs;
use crate::exit_codes;
use crate::output;

#[derive(Serialize)]
struct PsdOutput {
    input: String,
    sample_rate: f64,
    averaging: Averaging,
    frequencies: Vec<f64>,
    #[serde(flatten)]
    psd: Psd,
}

pub fn execute(args: PsdArgs) -> i32 {
    let series = match io::read_series(&args.input) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::INPUT_ERROR;
        }
    };

    let averaging = match args.averaging.as_str() {
        "mean" => Averaging::Mean,
        _ => Averaging::Median,
    };

    if !args.quiet {
        eprintln!(
            "Estimating PSD of {} ({} samples at {} Hz)...",
            args.input,
            series.len(),
            series.sample_rate()
        );
    }

    let psd = match Psd::estimate(&series, args.segment_duration, args.overlap, averaging) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::for_error(&e);
        }
    };

    let result = PsdOutput {
        input: args.input.clone(),
        sample_rate: series.sample_rate(),
        averaging,
        frequencies: psd.frequencies(),
        psd,
    };

    match output::emit(&result, args.compact, args.output.as_deref(), args.quiet) {
        Ok(()) => exit_codes::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            exit_codes::EXECUTION_ERROR
        }
    }
}
