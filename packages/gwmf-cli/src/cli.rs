use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "gwmf",
    version,
    about = "Matched-filter search for signals in uniformly sampled strain",
    long_about = "Matched-filter search for signals in uniformly sampled strain.\n\n\
                  Estimate noise spectra, filter strain against template banks and subtract\n\
                  best-fit templates. Series are exchanged as JSON:\n\
                  {\"start_time\": .., \"sample_rate\": .., \"samples\": [..]}"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Command {
    /// Generate synthetic strain (white noise plus an optional chirp injection)
    Inject(InjectArgs),
    /// Estimate a power spectral density with Welch's method
    Psd(PsdArgs),
    /// Condition strain and matched-filter it against a template bank
    Search(SearchArgs),
}

#[derive(Args)]
pub struct InjectArgs {
    /// Sample rate in Hz
    #[arg(long, default_value_t = 4096.0)]
    pub sample_rate: f64,

    /// Duration in seconds
    #[arg(long, default_value_t = 64.0)]
    pub duration: f64,

    /// GPS start time in seconds
    #[arg(long, default_value_t = 0.0)]
    pub start: f64,

    /// Standard deviation of the white noise
    #[arg(long, default_value_t = 1.0)]
    pub noise_sigma: f64,

    /// Noise seed
    #[arg(long, default_value_t = 0)]
    pub seed: u64,

    /// Detector name (mixed into the seed)
    #[arg(long, default_value = "H1")]
    pub detector: String,

    /// Component masses of the injected chirp as "m1,m2" (solar masses)
    #[arg(long)]
    pub masses: Option<String>,

    /// Starting frequency of the injected chirp in Hz
    #[arg(long, default_value_t = 30.0)]
    pub f_lower: f64,

    /// Merger time of the injection (default: middle of the span)
    #[arg(long)]
    pub time: Option<f64>,

    /// Optimal matched-filter SNR of the injection [default: 10]
    #[arg(long, conflicts_with = "amplitude")]
    pub snr: Option<f64>,

    /// Raw amplitude scale of the injection
    #[arg(long)]
    pub amplitude: Option<f64>,

    /// Also write the injected template to this file
    #[arg(long)]
    pub template_output: Option<String>,

    /// Output file (default: stdout)
    #[arg(short, long)]
    pub output: Option<String>,

    /// Compact JSON output (no indentation)
    #[arg(long, default_value_t = false)]
    pub compact: bool,

    /// Suppress progress messages on stderr
    #[arg(long, default_value_t = false)]
    pub quiet: bool,
}

#[derive(Args)]
pub struct PsdArgs {
    /// Input series (JSON)
    #[arg(long)]
    pub input: String,

    /// Welch segment duration in seconds
    #[arg(long, default_value_t = 4.0)]
    pub segment_duration: f64,

    /// Fractional overlap between segments
    #[arg(long, default_value_t = 0.5)]
    pub overlap: f64,

    /// Segment averaging
    #[arg(long, default_value = "median", value_parser = ["mean", "median"])]
    pub averaging: String,

    /// Output file (default: stdout)
    #[arg(short, long)]
    pub output: Option<String>,

    /// Compact JSON output (no indentation)
    #[arg(long, default_value_t = false)]
    pub compact: bool,

    /// Suppress progress messages on stderr
    #[arg(long, default_value_t = false)]
    pub quiet: bool,
}

#[derive(Args)]
pub struct SearchArgs {
    /// Input strain (JSON)
    #[arg(long)]
    pub input: String,

    /// Chirp templates as "m1,m2" pairs (e.g., "10,10" "30,25")
    #[arg(long, num_args = 1..)]
    pub masses: Vec<String>,

    /// Glob of template files (JSON)
    #[arg(long)]
    pub templates: Option<String>,

    /// Starting frequency of generated templates in Hz
    #[arg(long, default_value_t = 30.0)]
    pub f_lower: f64,

    /// Keep only the last N seconds of each template
    #[arg(long)]
    pub template_duration: Option<f64>,

    /// Search configuration (JSON); flags below override it
    #[arg(long, env = "GWMF_CONFIG")]
    pub config: Option<String>,

    /// Matched-filter low-frequency cutoff in Hz
    #[arg(long)]
    pub low_frequency: Option<f64>,

    /// High-pass cutoff in Hz
    #[arg(long)]
    pub highpass: Option<f64>,

    /// Resample to this rate before filtering (Hz)
    #[arg(long)]
    pub resample: Option<f64>,

    /// Event catalog (JSON array of {name, gps_time, mass1, mass2})
    #[arg(long, requires = "event")]
    pub catalog: Option<String>,

    /// Restrict peak search to the window around this catalog event
    #[arg(long, requires = "catalog")]
    pub event: Option<String>,

    /// Half-width of the event window in seconds
    #[arg(long, default_value_t = 0.5)]
    pub window: f64,

    /// Write the data minus the best-fit template to this file
    #[arg(long)]
    pub residual: Option<String>,

    /// Output file (default: stdout)
    #[arg(short, long)]
    pub output: Option<String>,

    /// Compact JSON output (no indentation)
    #[arg(long, default_value_t = false)]
    pub compact: bool,

    /// Suppress progress messages on stderr
    #[arg(long, default_value_t = false)]
    pub quiet: bool,
}

/// Parse a mass pair string "m1,m2" into positive solar masses.
pub fn parse_mass_pair(s: &str) -> Result<(f64, f64), String> {
    let parts: Vec<&str> = s.split(',').collect();
    if parts.len() != 2 {
        return Err(format!(
            "Invalid mass pair '{}': expected 'm1,m2' in solar masses",
            s
        ));
    }
    let parse = |part: &str| {
        part.trim()
            .parse::<f64>()
            .ok()
            .filter(|m| m.is_finite() && *m > 0.0)
            .ok_or_else(|| format!("Invalid mass pair '{}': '{}' is not a positive mass", s, part))
    };
    Ok((parse(parts[0])?, parse(parts[1])?))
}

/// Parse a list of mass pair strings.
pub fn parse_mass_pairs(pairs: &[String]) -> Result<Vec<(f64, f64)>, String> {
    pairs.iter().map(|s| parse_mass_pair(s)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mass_pair_valid() {
        assert_eq!(parse_mass_pair("10,10").unwrap(), (10.0, 10.0));
        assert_eq!(parse_mass_pair("1.4, 1.35").unwrap(), (1.4, 1.35));
    }

    #[test]
    fn test_parse_mass_pair_invalid() {
        assert!(parse_mass_pair("10").is_err());
        assert!(parse_mass_pair("10,10,10").is_err());
        assert!(parse_mass_pair("a,b").is_err());
        assert!(parse_mass_pair("-1,10").is_err());
        assert!(parse_mass_pair("0,10").is_err());
    }

    #[test]
    fn test_parse_mass_pairs() {
        let pairs = vec!["10,10".to_string(), "30,25".to_string()];
        let result = parse_mass_pairs(&pairs).unwrap();
        assert_eq!(result, vec![(10.0, 10.0), (30.0, 25.0)]);
    }

    #[test]
    fn test_cli_parses_search() {
        let cli = Cli::try_parse_from([
            "gwmf", "-vv", "search", "--input", "strain.json", "--masses", "10,10", "30,25",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Command::Search(args) => {
                assert_eq!(args.masses.len(), 2);
                assert_eq!(args.window, 0.5);
                assert!(args.config.is_none() || std::env::var("GWMF_CONFIG").is_ok());
            }
            _ => panic!("expected search"),
        }
    }

    #[test]
    fn test_long_help_leads_with_summary() {
        use clap::CommandFactory;
        let help = Cli::command().render_long_help().to_string();
        assert!(help.trim_start().starts_with("Matched-filter search"), "{}", help);
    }

    #[test]
    fn test_event_requires_catalog() {
        let result = Cli::try_parse_from([
            "gwmf", "search", "--input", "strain.json", "--event", "GW150914",
        ]);
        assert!(result.is_err());
    }
}
