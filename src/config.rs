use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::debug;

use crate::error::{CqiError, Result};
use crate::process::transform::TransformParams;
use crate::process::writer::OutputFormat;
use crate::throughput::DEFAULT_BANDWIDTH_MHZ;

pub const DEFAULT_REFERENCE_PATH: &str = "CQI_table.csv";
pub const DEFAULT_ACTUAL_COLUMN: &str = "Actual";
pub const DEFAULT_PREDICTED_COLUMN: &str = "Pred";
pub const DEFAULT_OUTPUT_DIR: &str = "processed";
pub const DEFAULT_PREVIEW_ROWS: usize = 10;
pub const MIN_BANDWIDTH_MHZ: f64 = 1.0;

/// Run settings. Every field has a default, so a YAML file only needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub reference_path: PathBuf,
    pub actual_column: String,
    pub predicted_column: String,
    pub bandwidth_mhz: f64,
    pub output_dir: PathBuf,
    pub output_format: OutputFormat,
    pub preview_rows: usize,
    pub summary_path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            reference_path: PathBuf::from(DEFAULT_REFERENCE_PATH),
            actual_column: DEFAULT_ACTUAL_COLUMN.to_string(),
            predicted_column: DEFAULT_PREDICTED_COLUMN.to_string(),
            bandwidth_mhz: DEFAULT_BANDWIDTH_MHZ,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            output_format: OutputFormat::default(),
            preview_rows: DEFAULT_PREVIEW_ROWS,
            summary_path: None,
        }
    }
}

/// Values supplied on the command line; `None` keeps the file/default value.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub reference_path: Option<PathBuf>,
    pub actual_column: Option<String>,
    pub predicted_column: Option<String>,
    pub bandwidth_mhz: Option<f64>,
    pub output_dir: Option<PathBuf>,
    pub output_format: Option<OutputFormat>,
    pub preview_rows: Option<usize>,
    pub summary_path: Option<PathBuf>,
}

impl Settings {
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        // an empty document deserializes as unit, not as a map
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let settings = Self::from_yaml_str(&text)?;
        debug!(path = %path.display(), ?settings, "loaded settings file");
        Ok(settings)
    }

    /// Defaults, then the optional YAML file, then command-line overrides.
    pub fn resolve(config_file: Option<&Path>, overrides: Overrides) -> Result<Self> {
        let mut settings = match config_file {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        settings.apply(overrides);
        settings.validate()?;
        Ok(settings)
    }

    pub fn apply(&mut self, o: Overrides) {
        if let Some(v) = o.reference_path {
            self.reference_path = v;
        }
        if let Some(v) = o.actual_column {
            self.actual_column = v;
        }
        if let Some(v) = o.predicted_column {
            self.predicted_column = v;
        }
        if let Some(v) = o.bandwidth_mhz {
            self.bandwidth_mhz = v;
        }
        if let Some(v) = o.output_dir {
            self.output_dir = v;
        }
        if let Some(v) = o.output_format {
            self.output_format = v;
        }
        if let Some(v) = o.preview_rows {
            self.preview_rows = v;
        }
        if o.summary_path.is_some() {
            self.summary_path = o.summary_path;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.bandwidth_mhz.is_finite() || self.bandwidth_mhz < MIN_BANDWIDTH_MHZ {
            return Err(CqiError::InvalidSettings(format!(
                "bandwidth must be at least {} MHz, got {}",
                MIN_BANDWIDTH_MHZ, self.bandwidth_mhz
            )));
        }
        if self.actual_column.trim().is_empty() || self.predicted_column.trim().is_empty() {
            return Err(CqiError::InvalidSettings(
                "column names must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Column names are matched against trimmed headers, so trim them too.
    pub fn transform_params(&self) -> TransformParams {
        TransformParams {
            actual_column: self.actual_column.trim().to_string(),
            predicted_column: self.predicted_column.trim().to_string(),
            bandwidth: self.bandwidth_mhz,
        }
    }
}
