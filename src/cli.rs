//! Command-line arguments.

use clap::Parser;
use std::path::PathBuf;
use tracing::warn;

use crate::config::Overrides;
use crate::error::{CqiError, Result};
use crate::process::writer::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "cqi-throughput")]
#[command(version)]
#[command(about = "Derive throughput and prediction efficiency from actual vs predicted CQI files")]
pub struct Cli {
    /// Input files or glob patterns (.csv, .xls, .xlsx)
    #[arg(required = true, value_name = "INPUT")]
    pub inputs: Vec<String>,

    /// YAML settings file; command-line flags take precedence over it
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// CQI reference table (default: CQI_table.csv)
    #[arg(short, long, value_name = "FILE")]
    pub reference: Option<PathBuf>,

    /// Name of the actual CQI column (default: Actual)
    #[arg(long = "actual", value_name = "COLUMN")]
    pub actual_column: Option<String>,

    /// Name of the predicted CQI column (default: Pred)
    #[arg(long = "pred", value_name = "COLUMN")]
    pub predicted_column: Option<String>,

    /// Bandwidth in MHz, at least 1 (default: 100)
    #[arg(short, long, value_name = "MHZ")]
    pub bandwidth: Option<f64>,

    /// Directory for processed files (default: processed)
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Output encoding
    #[arg(short, long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Rows to preview per file, 0 to disable (default: 10)
    #[arg(long, value_name = "ROWS")]
    pub preview: Option<usize>,

    /// Write a JSON summary of the run to this file
    #[arg(long, value_name = "FILE")]
    pub summary: Option<PathBuf>,
}

impl Cli {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            reference_path: self.reference.clone(),
            actual_column: self.actual_column.clone(),
            predicted_column: self.predicted_column.clone(),
            bandwidth_mhz: self.bandwidth,
            output_dir: self.output_dir.clone(),
            output_format: self.format,
            preview_rows: self.preview,
            summary_path: self.summary.clone(),
        }
    }

    /// Expand glob patterns; plain paths are kept as given so a missing file
    /// is reported against its own name.
    pub fn expand_inputs(&self) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        for input in &self.inputs {
            if !input.contains(['*', '?', '[']) {
                paths.push(PathBuf::from(input));
                continue;
            }
            let matches = glob::glob(input)
                .map_err(|e| CqiError::InvalidSettings(format!("bad pattern '{}': {}", input, e)))?;
            let before = paths.len();
            for entry in matches {
                match entry {
                    Ok(p) if p.is_file() => paths.push(p),
                    Ok(_) => {}
                    Err(e) => warn!("cannot read glob entry: {}", e),
                }
            }
            if paths.len() == before {
                warn!(pattern = %input, "pattern matched no files");
            }
        }
        Ok(paths)
    }
}
