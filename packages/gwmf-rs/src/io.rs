//! JSON exchange formats for series, templates and configuration.

use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{GwmfError, Result};
use crate::series::TimeSeries;
use crate::waveform::Template;

/// On-disk form of a real time series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesFile {
    pub start_time: f64,
    pub sample_rate: f64,
    pub samples: Vec<f64>,
}

impl SeriesFile {
    pub fn from_series(series: &TimeSeries<f64>) -> Self {
        Self {
            start_time: series.start_time(),
            sample_rate: series.sample_rate(),
            samples: series.data().to_vec(),
        }
    }

    pub fn into_series(self) -> Result<TimeSeries<f64>> {
        if !(self.sample_rate.is_finite() && self.sample_rate > 0.0) {
            return Err(GwmfError::ParseError(format!(
                "invalid sample rate {}",
                self.sample_rate
            )));
        }
        TimeSeries::new(self.samples, 1.0 / self.sample_rate, self.start_time)
    }
}

/// On-disk form of a named template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateFile {
    pub name: String,
    pub start_time: f64,
    pub sample_rate: f64,
    pub reference_index: usize,
    pub samples: Vec<f64>,
}

impl TemplateFile {
    pub fn from_template(name: impl Into<String>, template: &Template) -> Self {
        let waveform = template.waveform();
        Self {
            name: name.into(),
            start_time: waveform.start_time(),
            sample_rate: waveform.sample_rate(),
            reference_index: template.reference_index(),
            samples: waveform.data().to_vec(),
        }
    }

    pub fn into_template(self) -> Result<(String, Template)> {
        let series = SeriesFile {
            start_time: self.start_time,
            sample_rate: self.sample_rate,
            samples: self.samples,
        }
        .into_series()?;
        Ok((self.name, Template::new(series, self.reference_index)?))
    }
}

pub fn read_json<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> Result<T> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)?;
    serde_json::from_str(&content)
        .map_err(|e| GwmfError::ParseError(format!("{}: {}", path.display(), e)))
}

pub fn write_json<T: Serialize, P: AsRef<Path>>(path: P, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| GwmfError::ParseError(format!("serialization failed: {}", e)))?;
    fs::write(path, json)?;
    Ok(())
}

pub fn read_series<P: AsRef<Path>>(path: P) -> Result<TimeSeries<f64>> {
    read_json::<SeriesFile, _>(path)?.into_series()
}

pub fn write_series<P: AsRef<Path>>(path: P, series: &TimeSeries<f64>) -> Result<()> {
    write_json(path, &SeriesFile::from_series(series))
}

pub fn read_template<P: AsRef<Path>>(path: P) -> Result<(String, Template)> {
    read_json::<TemplateFile, _>(path)?.into_template()
}

pub fn write_template<P: AsRef<Path>>(path: P, name: &str, template: &Template) -> Result<()> {
    write_json(path, &TemplateFile::from_template(name, template))
}
