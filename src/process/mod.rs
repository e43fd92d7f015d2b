pub mod reader;
pub mod transform;
pub mod utils;
pub mod writer;

use arrow::record_batch::RecordBatch;
use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
};
use tracing::{error, info};

use crate::config::Settings;
use crate::error::{CqiError, Result};
use crate::reference::ReferenceTable;
use crate::report::{FailedFile, RunSummary};
use transform::{TransformParams, TransformStats};
use writer::OutputFormat;

/// A file handed to the tool: its name (which selects the decoder) and its bytes.
#[derive(Debug, Clone)]
pub struct Upload {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    /// Read the whole file into memory; the name is the path's file name.
    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self { name, bytes })
    }
}

/// Result of one successfully processed upload.
#[derive(Debug, Clone)]
pub struct ProcessedFile {
    pub input: String,
    pub output: PathBuf,
    pub batch: RecordBatch,
    pub stats: TransformStats,
}

/// Decode, transform and write a single upload.
#[tracing::instrument(level = "info", skip_all, fields(name = %upload.name))]
pub fn process_upload(
    upload: &Upload,
    table: &ReferenceTable,
    params: &TransformParams,
    output_dir: &Path,
    format: OutputFormat,
) -> Result<ProcessedFile> {
    let batch = reader::read_upload(upload)?;
    let transformed = transform::transform(&batch, table, params)?;
    let output = writer::write_output(&transformed.batch, output_dir, &upload.name, format)?;

    info!(
        rows = transformed.stats.rows,
        counted = transformed.stats.counted_predictions,
        output = %output.display(),
        "processed"
    );

    Ok(ProcessedFile {
        input: upload.name.clone(),
        output,
        batch: transformed.batch,
        stats: transformed.stats,
    })
}

/// What happened to one input path during a run.
#[derive(Debug)]
pub struct FileOutcome {
    pub path: PathBuf,
    pub result: Result<ProcessedFile>,
}

/// Outcomes of a multi-file run, in input order.
#[derive(Debug, Default)]
pub struct RunOutcome {
    pub files: Vec<FileOutcome>,
}

impl RunOutcome {
    pub fn processed(&self) -> impl Iterator<Item = &ProcessedFile> {
        self.files.iter().filter_map(|f| f.result.as_ref().ok())
    }

    pub fn failed(&self) -> Vec<FailedFile> {
        self.files
            .iter()
            .filter_map(|f| {
                f.result.as_ref().err().map(|e| FailedFile {
                    input: f.path.display().to_string(),
                    error: e.to_string(),
                })
            })
            .collect()
    }

    pub fn all_failed(&self) -> bool {
        self.processed().next().is_none()
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary::new(self.processed(), self.failed())
    }
}

/// Process every input on its own: a failing file is recorded and the run
/// moves on. A second input mapping to an output already written in this run
/// fails instead of overwriting it.
#[tracing::instrument(level = "info", skip_all, fields(files = inputs.len()))]
pub fn process_all(inputs: &[PathBuf], table: &ReferenceTable, settings: &Settings) -> RunOutcome {
    let params = settings.transform_params();
    let mut written: HashSet<PathBuf> = HashSet::new();
    let mut files = Vec::with_capacity(inputs.len());

    for path in inputs {
        let result = Upload::from_path(path).and_then(|upload| {
            let output =
                writer::output_path(&settings.output_dir, &upload.name, settings.output_format);
            if written.contains(&output) {
                return Err(CqiError::OutputCollision {
                    input: path.display().to_string(),
                    output: output.display().to_string(),
                });
            }
            let done = process_upload(
                &upload,
                table,
                &params,
                &settings.output_dir,
                settings.output_format,
            )?;
            written.insert(done.output.clone());
            Ok(done)
        });

        if let Err(e) = &result {
            error!(file = %path.display(), "{}", e);
        }
        files.push(FileOutcome {
            path: path.clone(),
            result,
        });
    }

    RunOutcome { files }
}
