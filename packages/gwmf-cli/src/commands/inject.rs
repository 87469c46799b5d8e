use gwmf_rs::io::{self, SeriesFile};
use gwmf_rs::{
    ChirpParams, GwmfError, Injection, NewtonianChirp, StrainSource, SyntheticStrain,
    WaveformGenerator,
};

use crate::cli::{self, InjectArgs};
use crate::exit_codes;
use crate::output;

/// Injection SNR when neither `--snr` nor `--amplitude` is given.
const DEFAULT_SNR: f64 = 10.0;

pub fn execute(args: InjectArgs) -> i32 {
    if !(args.duration.is_finite() && args.duration > 0.0) {
        eprintln!("Error: --duration must be positive, got {}", args.duration);
        return exit_codes::INPUT_ERROR;
    }
    let masses = match args.masses.as_deref().map(cli::parse_mass_pair).transpose() {
        Ok(m) => m,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::INPUT_ERROR;
        }
    };

    let source = match build_source(&args, masses) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::for_error(&e);
        }
    };

    if !args.quiet {
        eprintln!(
            "Generating {} s of strain at {} Hz for {}...",
            args.duration, args.sample_rate, args.detector
        );
        for injection in source.injections() {
            eprintln!(
                "  Injection at {} s, amplitude {:.4e}",
                injection.time, injection.amplitude
            );
        }
    }

    let strain = match source.strain(&args.detector, args.start, args.start + args.duration) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::for_error(&e);
        }
    };

    if let (Some(path), Some(injection)) = (&args.template_output, source.injections().first()) {
        let scaled = injection.template.scaled(injection.amplitude);
        if let Err(e) = io::write_template(path, "injection", &scaled) {
            eprintln!("Error: {}", e);
            return exit_codes::EXECUTION_ERROR;
        }
    }

    match output::emit(
        &SeriesFile::from_series(&strain),
        args.compact,
        args.output.as_deref(),
        args.quiet,
    ) {
        Ok(()) => exit_codes::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            exit_codes::EXECUTION_ERROR
        }
    }
}

fn build_source(
    args: &InjectArgs,
    masses: Option<(f64, f64)>,
) -> Result<SyntheticStrain, GwmfError> {
    let source = SyntheticStrain::new(args.sample_rate, args.noise_sigma, args.seed)?;
    let Some((mass1, mass2)) = masses else {
        return Ok(source);
    };

    let params = ChirpParams::new(mass1, mass2, args.f_lower, 1.0 / args.sample_rate);
    let template = NewtonianChirp.generate(&params)?.plus_template()?;
    let time = args.time.unwrap_or(args.start + args.duration / 2.0);
    let injection = match (args.snr, args.amplitude) {
        (Some(snr), _) => Injection::with_optimal_snr(template, time, snr, args.noise_sigma)?,
        (None, Some(amplitude)) => Injection::new(template, time, amplitude),
        (None, None) => {
            Injection::with_optimal_snr(template, time, DEFAULT_SNR, args.noise_sigma)?
        }
    };
    source.with_injection(injection)
}
