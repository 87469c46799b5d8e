//! Templates and template generators.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::error::{GwmfError, Result};
use crate::series::TimeSeries;
use crate::window;

/// Solar mass in seconds (G M_sun / c^3).
pub const SOLAR_MASS_SECONDS: f64 = 4.925490947641267e-6;
/// Solar mass in metres (G M_sun / c^2).
pub const SOLAR_MASS_METRES: f64 = 1476.6250615;
/// One megaparsec in metres.
pub const MEGAPARSEC_METRES: f64 = 3.085677581491367e22;

/// A candidate signal whose feature of interest sits at `reference_index`.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    waveform: TimeSeries<f64>,
    reference_index: usize,
}

impl Template {
    pub fn new(waveform: TimeSeries<f64>, reference_index: usize) -> Result<Self> {
        if reference_index >= waveform.len() {
            return Err(GwmfError::Configuration(format!(
                "reference index {} outside a template of {} samples",
                reference_index,
                waveform.len()
            )));
        }
        Ok(Self {
            waveform,
            reference_index,
        })
    }

    /// Template whose reference feature is the sample nearest to time zero.
    pub fn at_time_zero(waveform: TimeSeries<f64>) -> Result<Self> {
        let index = waveform.index_at(0.0).ok_or_else(|| {
            GwmfError::Configuration(format!(
                "template spanning [{}, {}) s does not contain t = 0",
                waveform.start_time(),
                waveform.end_time()
            ))
        })?;
        Self::new(waveform, index)
    }

    pub fn waveform(&self) -> &TimeSeries<f64> {
        &self.waveform
    }

    pub fn reference_index(&self) -> usize {
        self.reference_index
    }

    pub fn len(&self) -> usize {
        self.waveform.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waveform.is_empty()
    }

    pub fn delta_t(&self) -> f64 {
        self.waveform.delta_t()
    }

    pub fn duration(&self) -> f64 {
        self.waveform.duration()
    }

    pub fn reference_time(&self) -> f64 {
        self.waveform.sample_time(self.reference_index)
    }

    /// Zero-pad to `len` samples and rotate so the reference feature is sample 0.
    pub fn prepare(&self, len: usize) -> Result<TimeSeries<f64>> {
        let padded = self.waveform.zero_pad(len)?;
        Ok(padded
            .roll(-(self.reference_index as isize))
            .with_start_time(0.0))
    }

    /// Keep only the last `duration` seconds, which must still contain the reference feature.
    pub fn trailing(&self, duration: f64) -> Result<Self> {
        let keep = (duration / self.delta_t()).round() as usize;
        let n = self.len();
        if keep >= n {
            return Ok(self.clone());
        }
        let cut = n - keep;
        if self.reference_index < cut {
            return Err(GwmfError::Configuration(format!(
                "keeping the last {} s would remove the reference feature",
                duration
            )));
        }
        Self::new(
            self.waveform.crop_samples(cut, 0)?,
            self.reference_index - cut,
        )
    }

    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            waveform: self.waveform.scale(factor),
            reference_index: self.reference_index,
        }
    }

    /// Scaled to unit sum of squares.
    pub fn normalized(&self) -> Result<Self> {
        let norm = self.waveform.energy().sqrt();
        if norm == 0.0 {
            return Err(GwmfError::Configuration(
                "cannot normalise an all-zero template".to_string(),
            ));
        }
        Ok(self.scaled(1.0 / norm))
    }
}

/// Physical parameters of a compact binary inspiral.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChirpParams {
    /// Component masses in solar masses.
    pub mass1: f64,
    pub mass2: f64,
    /// Starting gravitational-wave frequency in Hz.
    pub f_lower: f64,
    /// Luminosity distance in Mpc.
    #[serde(default = "default_distance")]
    pub distance: f64,
    pub delta_t: f64,
    #[serde(default)]
    pub coa_phase: f64,
}

fn default_distance() -> f64 {
    1.0
}

impl ChirpParams {
    pub fn new(mass1: f64, mass2: f64, f_lower: f64, delta_t: f64) -> Self {
        Self {
            mass1,
            mass2,
            f_lower,
            distance: default_distance(),
            delta_t,
            coa_phase: 0.0,
        }
    }

    pub fn with_distance(mut self, distance: f64) -> Self {
        self.distance = distance;
        self
    }

    pub fn total_mass(&self) -> f64 {
        self.mass1 + self.mass2
    }

    pub fn chirp_mass(&self) -> f64 {
        let m = self.total_mass();
        (self.mass1 * self.mass2).powf(0.6) / m.powf(0.2)
    }

    /// Gravitational-wave frequency at the innermost stable circular orbit.
    pub fn isco_frequency(&self) -> f64 {
        1.0 / (6f64.powf(1.5) * PI * self.total_mass() * SOLAR_MASS_SECONDS)
    }

    /// Leading-order time to coalescence from frequency `f`.
    pub fn time_to_merger(&self, f: f64) -> f64 {
        let tc = self.chirp_mass() * SOLAR_MASS_SECONDS;
        5.0 / 256.0 * tc.powf(-5.0 / 3.0) * (PI * f).powf(-8.0 / 3.0)
    }

    fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("mass1", self.mass1),
            ("mass2", self.mass2),
            ("distance", self.distance),
            ("delta_t", self.delta_t),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(GwmfError::Configuration(format!(
                    "{} must be positive, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

/// The two polarizations of a generated signal, sharing one time axis.
#[derive(Debug, Clone, PartialEq)]
pub struct Polarizations {
    pub plus: TimeSeries<f64>,
    pub cross: TimeSeries<f64>,
}

impl Polarizations {
    pub fn plus_template(&self) -> Result<Template> {
        Template::at_time_zero(self.plus.clone())
    }

    pub fn cross_template(&self) -> Result<Template> {
        Template::at_time_zero(self.cross.clone())
    }
}

/// Produces time-domain waveforms with the reference feature at t = 0.
pub trait WaveformGenerator: Send + Sync {
    fn name(&self) -> &str;

    fn generate(&self, params: &ChirpParams) -> Result<Polarizations>;
}

/// Leading-order (quadrupole) inspiral chirp, ending at the ISCO frequency.
///
/// The waveform starts at `f_lower` and ends at the lower of the ISCO frequency
/// and 90% of Nyquist. The first few cycles and the last cycle are Hann-tapered.
#[derive(Debug, Clone, Default)]
pub struct NewtonianChirp;

/// Cycles of `f_lower` covered by the start taper.
const START_TAPER_CYCLES: f64 = 4.0;
/// Cycles of the end frequency covered by the end taper.
const END_TAPER_CYCLES: f64 = 1.0;

impl WaveformGenerator for NewtonianChirp {
    fn name(&self) -> &str {
        "newtonian_chirp"
    }

    fn generate(&self, params: &ChirpParams) -> Result<Polarizations> {
        params.validate()?;
        let dt = params.delta_t;
        let nyquist = 0.5 / dt;
        let f_end = params.isco_frequency().min(0.9 * nyquist);
        if !(params.f_lower > 0.0 && params.f_lower < f_end) {
            return Err(GwmfError::FrequencyRange {
                frequency: params.f_lower,
                nyquist: f_end,
            });
        }

        let tc = params.chirp_mass() * SOLAR_MASS_SECONDS;
        let lc = params.chirp_mass() * SOLAR_MASS_METRES;
        let distance = params.distance * MEGAPARSEC_METRES;

        let tau_start = params.time_to_merger(params.f_lower);
        let tau_end = params.time_to_merger(f_end);
        let n = ((tau_start - tau_end) / dt).floor() as usize + 1;

        let mut plus = Vec::with_capacity(n);
        let mut cross = Vec::with_capacity(n);
        for i in 0..n {
            // Final sample lands exactly on tau_end
            let tau = tau_end + (n - 1 - i) as f64 * dt;
            let f = (5.0 / (256.0 * tau)).powf(3.0 / 8.0) * tc.powf(-5.0 / 8.0) / PI;
            let phase = -2.0 * (tau / (5.0 * tc)).powf(5.0 / 8.0) + params.coa_phase;
            let amp = 4.0 * lc / distance * (PI * f * tc).powf(2.0 / 3.0);
            plus.push(amp * phase.cos());
            cross.push(amp * phase.sin());
        }

        let start_taper = ((START_TAPER_CYCLES / (params.f_lower * dt)).round() as usize).min(n / 2);
        let end_taper = ((END_TAPER_CYCLES / (f_end * dt)).round() as usize).min(n / 2);
        taper_ends(&mut plus, start_taper, end_taper);
        taper_ends(&mut cross, start_taper, end_taper);

        log::debug!(
            "Generated {} chirp: masses ({}, {}), {} -> {:.1} Hz, {} samples",
            self.name(),
            params.mass1,
            params.mass2,
            params.f_lower,
            f_end,
            n
        );

        let start_time = -((n - 1) as f64) * dt;
        Ok(Polarizations {
            plus: TimeSeries::new(plus, dt, start_time)?,
            cross: TimeSeries::new(cross, dt, start_time)?,
        })
    }
}

fn taper_ends(data: &mut [f64], start: usize, end: usize) {
    if start > 0 {
        let w = window::hann(2 * start);
        for (x, w) in data[..start].iter_mut().zip(&w[..start]) {
            *x *= w;
        }
    }
    if end > 0 {
        let w = window::hann(2 * end);
        let n = data.len();
        for (x, w) in data[n - end..].iter_mut().zip(&w[end..]) {
            *x *= w;
        }
    }
}
