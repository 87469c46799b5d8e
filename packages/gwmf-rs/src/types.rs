use serde::{Deserialize, Serialize};

use crate::psd::{Averaging, Truncation};

/// Conditioning and filtering parameters for a search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// High-pass cutoff applied to raw strain (Hz)
    #[serde(default = "default_highpass_frequency")]
    pub highpass_frequency: f64,

    /// High-pass filter half-length (samples)
    #[serde(default = "default_highpass_half_len")]
    pub highpass_half_len: usize,

    /// Resample to this rate before filtering (Hz); integer ratios only
    #[serde(default)]
    pub sample_rate: Option<f64>,

    /// Extra seconds trimmed from each end after the corrupted span
    #[serde(default)]
    pub edge_padding: f64,

    /// Welch segment duration (seconds)
    #[serde(default = "default_psd_segment_duration")]
    pub psd_segment_duration: f64,

    /// Fractional overlap between Welch segments
    #[serde(default = "default_psd_overlap")]
    pub psd_overlap: f64,

    #[serde(default)]
    pub psd_averaging: Averaging,

    /// Time-domain support of the inverse-PSD filter (seconds)
    #[serde(default = "default_psd_filter_duration")]
    pub psd_filter_duration: f64,

    #[serde(default)]
    pub truncation: Truncation,

    /// Matched-filter band lower edge (Hz)
    #[serde(default = "default_low_frequency_cutoff")]
    pub low_frequency_cutoff: f64,

    /// Matched-filter band upper edge (Hz); Nyquist when absent
    #[serde(default)]
    pub high_frequency_cutoff: Option<f64>,
}

fn default_highpass_frequency() -> f64 {
    15.0
}
fn default_highpass_half_len() -> usize {
    512
}
fn default_psd_segment_duration() -> f64 {
    4.0
}
fn default_psd_overlap() -> f64 {
    0.5
}
fn default_psd_filter_duration() -> f64 {
    4.0
}
fn default_low_frequency_cutoff() -> f64 {
    20.0
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            highpass_frequency: 15.0,
            highpass_half_len: 512,
            sample_rate: None,
            edge_padding: 0.0,
            psd_segment_duration: 4.0,
            psd_overlap: 0.5,
            psd_averaging: Averaging::Median,
            psd_filter_duration: 4.0,
            truncation: Truncation::Hann,
            low_frequency_cutoff: 20.0,
            high_frequency_cutoff: None,
        }
    }
}

/// Strongest matched-filter response of one template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub template: String,
    /// Time of the template's reference feature (seconds)
    pub time: f64,
    pub snr: f64,
    pub phase: f64,
    /// Template norm over the band; `snr / sigma` is the best-fit amplitude
    pub sigma: f64,
    /// Sample index of the peak in the conditioned data
    pub index: usize,
}

/// Outcome of filtering a template bank
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchReport {
    pub id: String,
    pub sample_rate: f64,
    pub start_time: f64,
    /// Duration of the conditioned data (seconds)
    pub duration: f64,
    /// Sorted by descending SNR
    pub detections: Vec<Detection>,
    pub config: SearchConfig,
    pub created_at: String,
}

impl SearchReport {
    pub fn new(
        sample_rate: f64,
        start_time: f64,
        duration: f64,
        mut detections: Vec<Detection>,
        config: SearchConfig,
    ) -> Self {
        detections.sort_by(|a, b| b.snr.total_cmp(&a.snr));
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            sample_rate,
            start_time,
            duration,
            detections,
            config,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn best(&self) -> Option<&Detection> {
        self.detections.first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults_fill_missing_fields() {
        let config: SearchConfig =
            serde_json::from_str(r#"{"low_frequency_cutoff": 30.0, "psd_averaging": "mean"}"#)
                .unwrap();
        assert_eq!(config.low_frequency_cutoff, 30.0);
        assert_eq!(config.psd_averaging, Averaging::Mean);
        assert_eq!(config.highpass_half_len, 512);
        assert_eq!(config.truncation, Truncation::Hann);

        let empty: SearchConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(empty, SearchConfig::default());
    }

    #[test]
    fn test_report_sorts_by_snr() {
        let detection = |name: &str, snr: f64| Detection {
            template: name.to_string(),
            time: 0.0,
            snr,
            phase: 0.0,
            sigma: 1.0,
            index: 0,
        };
        let report = SearchReport::new(
            1024.0,
            0.0,
            16.0,
            vec![detection("a", 5.0), detection("b", 12.0), detection("c", 8.0)],
            SearchConfig::default(),
        );
        let order: Vec<&str> = report
            .detections
            .iter()
            .map(|d| d.template.as_str())
            .collect();
        assert_eq!(order, vec!["b", "c", "a"]);
        assert_eq!(report.best().map(|d| d.snr), Some(12.0));
        assert!(uuid::Uuid::parse_str(&report.id).is_ok());
    }
}
