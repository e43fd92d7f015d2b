//! Per-file and combined efficiency figures, plus a text preview of the output rows.

use arrow::{
    record_batch::RecordBatch,
    util::display::{ArrayFormatter, FormatOptions},
};
use prettytable::{format, Cell, Row, Table};
use serde::Serialize;
use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};
use tracing::info;

use crate::error::Result;
use crate::process::ProcessedFile;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileSummary {
    pub input: String,
    pub output: String,
    pub rows: usize,
    pub counted_predictions: usize,
    /// Rows zeroed because the actual index is not in the reference table.
    pub unknown_actual: usize,
    pub average_efficiency: Option<f64>,
}

impl From<&ProcessedFile> for FileSummary {
    fn from(file: &ProcessedFile) -> Self {
        Self {
            input: file.input.clone(),
            output: file.output.display().to_string(),
            rows: file.stats.rows,
            counted_predictions: file.stats.counted_predictions,
            unknown_actual: file.stats.unknown_actual,
            average_efficiency: file.stats.average_efficiency(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedFile {
    pub input: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub files: Vec<FileSummary>,
    pub failed: Vec<FailedFile>,
    /// Mean efficiency over all rows of all processed files.
    pub combined_average_efficiency: Option<f64>,
}

impl RunSummary {
    pub fn new<'a, I>(processed: I, failed: Vec<FailedFile>) -> Self
    where
        I: IntoIterator<Item = &'a ProcessedFile>,
    {
        let mut files = Vec::new();
        let mut rows = 0usize;
        let mut sum = 0.0;
        for file in processed {
            rows += file.stats.rows;
            sum += file.stats.efficiency_sum;
            files.push(FileSummary::from(file));
        }
        Self {
            files,
            failed,
            combined_average_efficiency: (rows > 0).then(|| sum / rows as f64),
        }
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let mut out = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut out, self)?;
        out.flush()?;
        info!(path = %path.display(), "wrote summary");
        Ok(())
    }
}

pub fn format_percent(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.2}%", v),
        None => "n/a".to_string(),
    }
}

/// First `limit` rows of `batch` as a boxed text table.
pub fn preview_table(batch: &RecordBatch, limit: usize) -> Result<Table> {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BOX_CHARS);

    table.add_row(Row::new(
        batch
            .schema()
            .fields()
            .iter()
            .map(|f| Cell::new(f.name()).style_spec("bFg"))
            .collect(),
    ));

    let options = FormatOptions::default();
    let formatters = batch
        .columns()
        .iter()
        .map(|c| ArrayFormatter::try_new(c.as_ref(), &options))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    for row in 0..batch.num_rows().min(limit) {
        table.add_row(Row::new(
            formatters
                .iter()
                .map(|f| Cell::new(&f.value(row).to_string()))
                .collect(),
        ));
    }
    Ok(table)
}

/// Console report for one processed file: its average, the unknown-index
/// note, a preview of the first `preview_rows` rows and the output path.
pub fn write_file_report<W: Write>(
    file: &ProcessedFile,
    preview_rows: usize,
    out: &mut W,
) -> Result<()> {
    writeln!(
        out,
        "Average Throughput Efficiency: {}",
        format_percent(file.stats.average_efficiency())
    )?;
    if file.stats.unknown_actual > 0 {
        writeln!(
            out,
            "{} rows have an actual CQI missing from the reference table (throughput 0)",
            file.stats.unknown_actual
        )?;
    }
    if preview_rows > 0 {
        writeln!(out, "Data Preview")?;
        preview_table(&file.batch, preview_rows)?.print(out)?;
    }
    writeln!(out, "Processed data written to {}\n", file.output.display())?;
    Ok(())
}
