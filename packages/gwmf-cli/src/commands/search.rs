use gwmf_rs::{
    event_window, io, BankEntry, GwmfError, NewtonianChirp, SearchConfig, SearchReport,
    SearchRunner, StaticCatalog, TimeSeries,
};

use crate::cli::{self, SearchArgs};
use crate::exit_codes;
use crate::output;

pub fn execute(args: SearchArgs) -> i32 {
    let config = match load_config(&args) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::INPUT_ERROR;
        }
    };

    let strain = match io::read_series(&args.input) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::INPUT_ERROR;
        }
    };

    let delta_t = 1.0 / config.sample_rate.unwrap_or_else(|| strain.sample_rate());
    let bank = match build_bank(&args, delta_t) {
        Ok(b) if b.is_empty() => {
            eprintln!("Error: no templates given (use --masses or --templates)");
            return exit_codes::INPUT_ERROR;
        }
        Ok(b) => b,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::INPUT_ERROR;
        }
    };

    let window = match (&args.catalog, &args.event) {
        (Some(catalog), Some(event)) => {
            match StaticCatalog::from_json_file(catalog)
                .and_then(|c| event_window(&c, event, args.window))
            {
                Ok(w) => Some(w),
                Err(e) => {
                    eprintln!("Error: {}", e);
                    return exit_codes::INPUT_ERROR;
                }
            }
        }
        _ => None,
    };

    if !args.quiet {
        eprintln!(
            "Searching {} ({} samples at {} Hz) with {} templates...",
            args.input,
            strain.len(),
            strain.sample_rate(),
            bank.len()
        );
        if let Some((start, end)) = window {
            eprintln!("  Peak window: [{}, {}]", start, end);
        }
    }

    let (report, residual) = match run_search(config, &strain, &bank, window, &args) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::for_error(&e);
        }
    };

    if !args.quiet {
        if let Some(best) = report.best() {
            eprintln!(
                "Best match: {} with SNR {:.2} at {:.4} s",
                best.template, best.snr, best.time
            );
        }
    }

    if let (Some(path), Some(residual)) = (&args.residual, residual) {
        if let Err(e) = io::write_series(path, &residual) {
            eprintln!("Error: {}", e);
            return exit_codes::EXECUTION_ERROR;
        }
        if !args.quiet {
            eprintln!("Residual written to {}", path);
        }
    }

    match output::emit(&report, args.compact, args.output.as_deref(), args.quiet) {
        Ok(()) => exit_codes::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            exit_codes::EXECUTION_ERROR
        }
    }
}

fn load_config(args: &SearchArgs) -> Result<SearchConfig, GwmfError> {
    let mut config = match &args.config {
        Some(path) => io::read_json::<SearchConfig, _>(path)?,
        None => SearchConfig::default(),
    };
    if let Some(low) = args.low_frequency {
        config.low_frequency_cutoff = low;
    }
    if let Some(highpass) = args.highpass {
        config.highpass_frequency = highpass;
    }
    if let Some(rate) = args.resample {
        config.sample_rate = Some(rate);
    }
    Ok(config)
}

fn build_bank(args: &SearchArgs, delta_t: f64) -> Result<Vec<BankEntry>, String> {
    let mut bank = Vec::new();

    for (mass1, mass2) in cli::parse_mass_pairs(&args.masses)? {
        let entry = BankEntry::from_masses(&NewtonianChirp, mass1, mass2, args.f_lower, delta_t)
            .map_err(|e| e.to_string())?;
        bank.push(entry);
    }

    if let Some(pattern) = &args.templates {
        let files = resolve_glob(pattern)?;
        if files.is_empty() {
            return Err(format!("No template files matched '{}'", pattern));
        }
        for file in files {
            let (name, template) = io::read_template(&file)
                .map_err(|e| format!("Failed to read template '{}': {}", file, e))?;
            bank.push(BankEntry::new(name, template));
        }
    }

    match args.template_duration {
        Some(duration) => bank
            .into_iter()
            .map(|entry| entry.trailing(duration).map_err(|e| e.to_string()))
            .collect(),
        None => Ok(bank),
    }
}

fn run_search(
    config: SearchConfig,
    strain: &TimeSeries<f64>,
    bank: &[BankEntry],
    window: Option<(f64, f64)>,
    args: &SearchArgs,
) -> Result<(SearchReport, Option<TimeSeries<f64>>), GwmfError> {
    let conditioned = SearchRunner::new(config)?.condition(strain)?;
    let report = conditioned.run(bank, window)?;

    let residual = match (&args.residual, report.best()) {
        (Some(_), Some(best)) => {
            let entry = bank
                .iter()
                .find(|e| e.name == best.template)
                .ok_or_else(|| GwmfError::Configuration(format!("unknown template {}", best.template)))?;
            Some(conditioned.residual(entry, best)?)
        }
        _ => None,
    };
    Ok((report, residual))
}

fn resolve_glob(pattern: &str) -> Result<Vec<String>, String> {
    let paths =
        glob::glob(pattern).map_err(|e| format!("Invalid glob pattern '{}': {}", pattern, e))?;

    let mut files: Vec<String> = Vec::new();
    for entry in paths {
        match entry {
            Ok(path) => {
                if path.is_file() {
                    if let Some(s) = path.to_str() {
                        files.push(s.to_string());
                    }
                }
            }
            Err(e) => {
                log::warn!("glob error: {}", e);
            }
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_glob_keeps_sorted_files_only() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("b.json"), "{}").unwrap();
        std::fs::write(dir.path().join("a.json"), "{}").unwrap();
        std::fs::create_dir(dir.path().join("c.json")).unwrap();

        let pattern = format!("{}/*.json", dir.path().to_str().unwrap());
        let files = resolve_glob(&pattern).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files[0].ends_with("a.json"));
        assert!(files[1].ends_with("b.json"));
    }

    #[test]
    fn test_resolve_glob_rejects_bad_pattern() {
        let err = resolve_glob("[").unwrap_err();
        assert!(err.contains("Invalid glob pattern"));
    }
}
