//! Strain data sources and event catalogs.
//!
//! The pipeline never reaches for a global data service: callers hand it a
//! [`StrainSource`] and, optionally, an [`EventCatalog`].

use std::path::Path;

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::error::{GwmfError, Result};
use crate::io;
use crate::psd::Psd;
use crate::series::{same_delta, TimeSeries};
use crate::waveform::Template;

/// Supplies strain for a detector over a GPS interval.
pub trait StrainSource: Send + Sync {
    fn sample_rate(&self) -> f64;

    /// Samples covering `[start, end)` seconds.
    fn strain(&self, detector: &str, start: f64, end: f64) -> Result<TimeSeries<f64>>;
}

/// A template added to synthetic strain with its reference feature at `time`.
#[derive(Debug, Clone)]
pub struct Injection {
    pub template: Template,
    pub time: f64,
    pub amplitude: f64,
}

impl Injection {
    pub fn new(template: Template, time: f64, amplitude: f64) -> Self {
        Self {
            template,
            time,
            amplitude,
        }
    }

    /// Amplitude giving matched-filter SNR `snr` in white noise of standard deviation `noise_sigma`.
    pub fn with_optimal_snr(
        template: Template,
        time: f64,
        snr: f64,
        noise_sigma: f64,
    ) -> Result<Self> {
        let norm = template.waveform().energy().sqrt();
        if norm == 0.0 {
            return Err(GwmfError::Configuration(
                "cannot inject an all-zero template".to_string(),
            ));
        }
        Ok(Self::new(template, time, snr * noise_sigma / norm))
    }
}

/// Seeded white Gaussian noise plus injected signals.
#[derive(Debug, Clone)]
pub struct SyntheticStrain {
    sample_rate: f64,
    noise_sigma: f64,
    seed: u64,
    injections: Vec<Injection>,
}

impl SyntheticStrain {
    pub fn new(sample_rate: f64, noise_sigma: f64, seed: u64) -> Result<Self> {
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(GwmfError::Configuration(format!(
                "sample rate must be positive, got {}",
                sample_rate
            )));
        }
        if !(noise_sigma.is_finite() && noise_sigma >= 0.0) {
            return Err(GwmfError::Configuration(format!(
                "noise level must be non-negative, got {}",
                noise_sigma
            )));
        }
        Ok(Self {
            sample_rate,
            noise_sigma,
            seed,
            injections: Vec::new(),
        })
    }

    pub fn with_injection(mut self, injection: Injection) -> Result<Self> {
        let dt = 1.0 / self.sample_rate;
        if !same_delta(injection.template.delta_t(), dt) {
            return Err(GwmfError::SampleRateMismatch {
                expected: dt,
                got: injection.template.delta_t(),
            });
        }
        self.injections.push(injection);
        Ok(self)
    }

    pub fn noise_sigma(&self) -> f64 {
        self.noise_sigma
    }

    pub fn injections(&self) -> &[Injection] {
        &self.injections
    }

    /// Analytic one-sided PSD of the noise: `2 sigma^2 dt`, on the grid of a
    /// series of `len` samples.
    pub fn noise_psd(&self, len: usize) -> Result<Psd> {
        let dt = 1.0 / self.sample_rate;
        Psd::flat(
            2.0 * self.noise_sigma * self.noise_sigma * dt,
            1.0 / (len as f64 * dt),
            len / 2 + 1,
        )
    }

    fn detector_seed(&self, detector: &str) -> u64 {
        // FNV-1a over the detector name
        let mut hash: u64 = 0xcbf29ce484222325;
        for b in detector.bytes() {
            hash ^= b as u64;
            hash = hash.wrapping_mul(0x100000001b3);
        }
        self.seed ^ hash
    }
}

impl StrainSource for SyntheticStrain {
    fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    fn strain(&self, detector: &str, start: f64, end: f64) -> Result<TimeSeries<f64>> {
        let dt = 1.0 / self.sample_rate;
        let n = ((end - start) * self.sample_rate).round();
        if !(n >= 1.0) {
            return Err(GwmfError::InsufficientData { needed: 1, got: 0 });
        }
        let n = n as usize;

        let normal = Normal::new(0.0, self.noise_sigma)
            .map_err(|e| GwmfError::Configuration(format!("noise distribution: {}", e)))?;
        let mut rng = StdRng::seed_from_u64(self.detector_seed(detector));
        let mut data: Vec<f64> = (0..n).map(|_| normal.sample(&mut rng)).collect();

        for injection in &self.injections {
            let offset = ((injection.time - start) / dt).round() as i64
                - injection.template.reference_index() as i64;
            let mut added = 0usize;
            for (j, &x) in injection.template.waveform().data().iter().enumerate() {
                let i = offset + j as i64;
                if i >= 0 && (i as usize) < n {
                    data[i as usize] += injection.amplitude * x;
                    added += 1;
                }
            }
            log::debug!(
                "Injected {} of {} template samples at t = {} s into {}",
                added,
                injection.template.len(),
                injection.time,
                detector
            );
        }

        TimeSeries::new(data, dt, start)
    }
}

/// A known merger: name, GPS time and source masses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEvent {
    pub name: String,
    pub gps_time: f64,
    pub mass1: f64,
    pub mass2: f64,
}

/// Read-only lookup of known events.
pub trait EventCatalog {
    fn events(&self) -> &[CatalogEvent];

    fn event(&self, name: &str) -> Result<&CatalogEvent> {
        self.events()
            .iter()
            .find(|e| e.name == name)
            .ok_or_else(|| GwmfError::Configuration(format!("unknown event '{}'", name)))
    }
}

/// Catalog backed by an in-memory list, loadable from a JSON array.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StaticCatalog {
    events: Vec<CatalogEvent>,
}

impl StaticCatalog {
    pub fn new(events: Vec<CatalogEvent>) -> Self {
        Self { events }
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        io::read_json(path)
    }
}

impl EventCatalog for StaticCatalog {
    fn events(&self) -> &[CatalogEvent] {
        &self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spike_template() -> Template {
        let waveform = TimeSeries::new(vec![1.0, 2.0, 3.0], 1.0 / 64.0, 0.0).unwrap();
        Template::new(waveform, 1).unwrap()
    }

    #[test]
    fn test_noise_is_reproducible_per_detector() {
        let source = SyntheticStrain::new(64.0, 1.0, 42).unwrap();
        let a = source.strain("H1", 0.0, 4.0).unwrap();
        let b = source.strain("H1", 0.0, 4.0).unwrap();
        let c = source.strain("L1", 0.0, 4.0).unwrap();
        assert_eq!(a.len(), 256);
        assert_eq!(a, b);
        assert_ne!(a.data(), c.data());
    }

    #[test]
    fn test_injection_placement() {
        let source = SyntheticStrain::new(64.0, 0.0, 1)
            .unwrap()
            .with_injection(Injection::new(spike_template(), 101.0, 2.0))
            .unwrap();
        let strain = source.strain("H1", 100.0, 102.0).unwrap();
        assert_eq!(strain.start_time(), 100.0);
        assert_eq!(strain.data()[63], 2.0);
        assert_eq!(strain.data()[64], 4.0);
        assert_eq!(strain.data()[65], 6.0);
        assert_eq!(strain.energy(), 4.0 + 16.0 + 36.0);
    }

    #[test]
    fn test_injection_sample_rate_checked() {
        let source = SyntheticStrain::new(128.0, 1.0, 1).unwrap();
        let result = source.with_injection(Injection::new(spike_template(), 1.0, 1.0));
        assert!(matches!(
            result,
            Err(GwmfError::SampleRateMismatch { .. })
        ));
    }

    #[test]
    fn test_optimal_snr_amplitude() {
        let injection = Injection::with_optimal_snr(spike_template(), 0.0, 10.0, 2.0).unwrap();
        assert!((injection.amplitude - 20.0 / 14f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_catalog_lookup() {
        let json = r#"[
            {"name": "GW150914", "gps_time": 1126259462.4, "mass1": 36.0, "mass2": 29.0}
        ]"#;
        let catalog: StaticCatalog = serde_json::from_str(json).unwrap();
        let event = catalog.event("GW150914").unwrap();
        assert_eq!(event.mass2, 29.0);
        assert!(catalog.event("GW000000").is_err());
    }
}
