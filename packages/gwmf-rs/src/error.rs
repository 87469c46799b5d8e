use thiserror::Error;

#[derive(Error, Debug)]
pub enum GwmfError {
    #[error("Insufficient data: need at least {needed} samples, got {got}")]
    InsufficientData { needed: usize, got: usize },

    #[error("Sample interval mismatch: expected {expected} s, got {got} s")]
    SampleRateMismatch { expected: f64, got: f64 },

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Frequency {frequency} Hz outside the representable range [0, {nyquist}] Hz")]
    FrequencyRange { frequency: f64, nyquist: f64 },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse input: {0}")]
    ParseError(String),
}

pub type Result<T> = std::result::Result<T, GwmfError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = GwmfError::InsufficientData { needed: 8, got: 3 };
        assert_eq!(
            err.to_string(),
            "Insufficient data: need at least 8 samples, got 3"
        );

        let err = GwmfError::FrequencyRange {
            frequency: 3000.0,
            nyquist: 2048.0,
        };
        assert!(err.to_string().contains("3000"));
        assert!(err.to_string().contains("2048"));
    }
}
