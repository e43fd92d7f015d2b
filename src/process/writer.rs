use arrow::{csv::WriterBuilder, record_batch::RecordBatch};
use parquet::{
    arrow::ArrowWriter,
    basic::{BrotliLevel, Compression},
    file::properties::WriterProperties,
};
use serde::Deserialize;
use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};
use tracing::info;

use super::utils::output_file_name;
use crate::error::Result;

/// Encoding of the processed output files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Csv,
    Parquet,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Parquet => "parquet",
        }
    }
}

/// CSV with a header row, columns and rows in batch order.
pub fn write_csv<W: Write>(batch: &RecordBatch, writer: W) -> Result<()> {
    let mut csv = WriterBuilder::new().with_header(true).build(writer);
    csv.write(batch)?;
    Ok(())
}

pub fn write_parquet<W: Write + Send>(batch: &RecordBatch, writer: W) -> Result<()> {
    let props = WriterProperties::builder()
        .set_compression(Compression::BROTLI(BrotliLevel::try_new(5)?))
        .build();

    let mut writer = ArrowWriter::try_new(writer, batch.schema(), Some(props))?;
    writer.write(batch)?;
    writer.close()?;
    Ok(())
}

/// Where `write_output` puts the processed form of `input_name`.
pub fn output_path(output_dir: &Path, input_name: &str, format: OutputFormat) -> PathBuf {
    output_dir.join(output_file_name(input_name, format.extension()))
}

/// Write `batch` as `processed_<stem>.<ext>` under `output_dir`, returning the path.
#[tracing::instrument(level = "debug", skip(batch, output_dir), fields(dir = %output_dir.display()))]
pub fn write_output(
    batch: &RecordBatch,
    output_dir: &Path,
    input_name: &str,
    format: OutputFormat,
) -> Result<PathBuf> {
    fs::create_dir_all(output_dir)?;
    let path = output_path(output_dir, input_name, format);

    let file = File::create(&path)?;
    match format {
        OutputFormat::Csv => {
            let mut out = BufWriter::new(file);
            write_csv(batch, &mut out)?;
            out.flush()?;
        }
        OutputFormat::Parquet => write_parquet(batch, file)?,
    }

    let size = fs::metadata(&path)?.len();
    info!(path = %path.display(), rows = batch.num_rows(), size, "wrote output");
    Ok(path)
}
