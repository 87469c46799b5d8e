pub mod error;
mod fft;
pub mod filter;
pub mod io;
pub mod matched_filter;
pub mod profiling;
pub mod psd;
pub mod search;
pub mod series;
pub mod source;
pub mod types;
pub mod waveform;
pub mod whiten;
pub mod window;

pub use error::{GwmfError, Result};
pub use filter::{Corruption, EdgeMode, FirFilter, Pass, TrackedSeries};
pub use matched_filter::{matched_filter, MatchedFilter, Peak, SnrSeries};
pub use psd::{Averaging, Psd, Truncation};
pub use search::{event_window, BankEntry, ConditionedData, SearchRunner};
pub use series::{FrequencySeries, TimeSeries};
pub use source::{CatalogEvent, EventCatalog, Injection, StaticCatalog, StrainSource, SyntheticStrain};
pub use types::*;
pub use waveform::{ChirpParams, NewtonianChirp, Polarizations, Template, WaveformGenerator};

pub use rustfft::num_complex::Complex64;
