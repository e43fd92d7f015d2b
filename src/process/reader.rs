use arrow::{
    array::{ArrayRef, StringArray},
    compute::concat_batches,
    csv::ReaderBuilder,
    datatypes::{DataType, Field, Schema},
    error::ArrowError,
    record_batch::RecordBatch,
};
use calamine::{open_workbook_auto_from_rs, Data, Reader};
use std::{io::Cursor, path::Path, sync::Arc};
use tracing::{debug, warn};

use super::utils::clean_str;
use super::Upload;
use crate::error::{CqiError, Result};

const CSV_BATCH_SIZE: usize = 8192;

/// Supported upload encodings, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Csv,
    Spreadsheet,
}

impl InputFormat {
    pub fn from_name(name: &str) -> Result<Self> {
        let ext = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);
        match ext.as_deref() {
            Some("csv") => Ok(Self::Csv),
            Some("xls") | Some("xlsx") => Ok(Self::Spreadsheet),
            _ => Err(CqiError::UnsupportedFormat(name.to_string())),
        }
    }
}

/// Decode an upload into a batch of nullable Utf8 columns with cleaned headers.
#[tracing::instrument(level = "debug", skip(upload), fields(name = %upload.name, bytes = upload.bytes.len()))]
pub fn read_upload(upload: &Upload) -> Result<RecordBatch> {
    let batch = match InputFormat::from_name(&upload.name)? {
        InputFormat::Csv => read_csv(&upload.name, &upload.bytes)?,
        InputFormat::Spreadsheet => read_spreadsheet(&upload.name, &upload.bytes)?,
    };
    debug!(
        rows = batch.num_rows(),
        columns = batch.num_columns(),
        "decoded upload"
    );
    Ok(batch)
}

fn parse_error(name: &str, reason: impl Into<String>) -> CqiError {
    CqiError::Parse {
        name: name.to_string(),
        reason: reason.into(),
    }
}

/// Blank header cells get a positional placeholder so every column is addressable.
fn header_names<I, S>(raw: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    raw.into_iter()
        .enumerate()
        .map(|(i, h)| {
            let name = clean_str(h.as_ref());
            if name.is_empty() {
                format!("Unnamed: {}", i)
            } else {
                name
            }
        })
        .collect()
}

fn utf8_schema(headers: &[String]) -> Arc<Schema> {
    let fields: Vec<Field> = headers
        .iter()
        .map(|n| Field::new(n, DataType::Utf8, true))
        .collect();
    Arc::new(Schema::new(fields))
}

fn read_csv(name: &str, bytes: &[u8]) -> Result<RecordBatch> {
    // The header row is read separately so names can be cleaned before the
    // arrow reader binds its schema.
    let mut header_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_reader(bytes);
    let headers = match header_reader.records().next() {
        Some(record) => header_names(record?.iter()),
        None => return Err(parse_error(name, "file is empty")),
    };
    let schema = utf8_schema(&headers);

    let reader = ReaderBuilder::new(schema.clone())
        .with_header(true)
        .with_batch_size(CSV_BATCH_SIZE)
        .with_quote(b'"')
        .with_delimiter(b',')
        .with_truncated_rows(true)
        .build(Cursor::new(bytes))?;

    let batches = reader
        .collect::<std::result::Result<Vec<_>, ArrowError>>()
        .map_err(|e| {
            warn!(name, error = %e, "CSV parsing failed");
            parse_error(name, e.to_string())
        })?;

    Ok(concat_batches(&schema, &batches)?)
}

fn cell_text(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty => None,
        Data::String(s) => Some(s.clone()),
        Data::Int(i) => Some(i.to_string()),
        // f64 Display drops the fractional part for integral values: 5.0 -> "5"
        Data::Float(f) => Some(f.to_string()),
        Data::Bool(b) => Some(if *b { "True" } else { "False" }.to_string()),
        other => Some(other.to_string()),
    }
}

fn read_spreadsheet(name: &str, bytes: &[u8]) -> Result<RecordBatch> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| parse_error(name, "workbook has no worksheets"))??;

    let mut rows = range.rows();
    let headers = match rows.next() {
        Some(row) => header_names(row.iter().map(|c| cell_text(c).unwrap_or_default())),
        None => return Err(parse_error(name, "worksheet is empty")),
    };

    let mut columns: Vec<Vec<Option<String>>> = vec![Vec::new(); headers.len()];
    for row in rows {
        for (col, values) in columns.iter_mut().enumerate() {
            values.push(row.get(col).and_then(cell_text));
        }
    }

    let arrays: Vec<ArrayRef> = columns
        .into_iter()
        .map(|values| Arc::new(StringArray::from(values)) as ArrayRef)
        .collect();
    Ok(RecordBatch::try_new(utf8_schema(&headers), arrays)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use crate::process::transform::{transform, TransformParams, THROUGHPUT_EFFICIENCY};
    use crate::reference::ReferenceTable;
    use arrow::array::{Array, Float64Array};
    use rust_xlsxwriter::Workbook;

    fn column_values(batch: &RecordBatch, idx: usize) -> Vec<Option<String>> {
        batch
            .column(idx)
            .as_any()
            .downcast_ref::<StringArray>()
            .expect("utf8 column")
            .iter()
            .map(|v| v.map(str::to_string))
            .collect()
    }

    #[test]
    fn format_from_extension() {
        assert_eq!(InputFormat::from_name("a.csv").unwrap(), InputFormat::Csv);
        assert_eq!(InputFormat::from_name("A.CSV").unwrap(), InputFormat::Csv);
        assert_eq!(
            InputFormat::from_name("dir/b.xlsx").unwrap(),
            InputFormat::Spreadsheet
        );
        assert_eq!(
            InputFormat::from_name("b.xls").unwrap(),
            InputFormat::Spreadsheet
        );
        for bad in ["notes.txt", "data", "data.csv.gz"] {
            assert!(matches!(
                InputFormat::from_name(bad),
                Err(CqiError::UnsupportedFormat(_))
            ));
        }
    }

    #[test]
    fn csv_headers_are_trimmed_and_cells_kept_verbatim() -> Result<()> {
        let upload = Upload::new("run.csv", " Actual , Pred ,site\n5,4,a b\n7,,\"x, y\"\n");
        let batch = read_upload(&upload)?;

        let names: Vec<&str> = batch
            .schema_ref()
            .fields()
            .iter()
            .map(|f| f.name().as_str())
            .collect();
        assert_eq!(names, vec!["Actual", "Pred", "site"]);
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(
            column_values(&batch, 0),
            vec![Some("5".into()), Some("7".into())]
        );
        assert_eq!(column_values(&batch, 1)[1], None);
        assert_eq!(column_values(&batch, 2)[1], Some("x, y".into()));
        Ok(())
    }

    #[test]
    fn header_only_csv_is_an_empty_table() -> Result<()> {
        let batch = read_upload(&Upload::new("empty.csv", "Actual,Pred\n"))?;
        assert_eq!(batch.num_rows(), 0);
        assert_eq!(batch.num_columns(), 2);
        Ok(())
    }

    #[test]
    fn blank_headers_get_placeholders() -> Result<()> {
        let batch = read_upload(&Upload::new("x.csv", ",Actual,Pred\n0,5,5\n"))?;
        assert_eq!(batch.schema_ref().field(0).name(), "Unnamed: 0");
        Ok(())
    }

    #[test]
    fn short_csv_rows_are_padded_with_nulls() -> Result<()> {
        let batch = read_upload(&Upload::new("short.csv", "Actual,Pred,note\n7,5\n5,7,late\n"))?;
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(column_values(&batch, 2), vec![None, Some("late".into())]);
        Ok(())
    }

    #[test]
    fn spreadsheet_is_read_like_csv() -> Result<()> {
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.write_string(0, 0, " Actual ")?;
        sheet.write_string(0, 1, "Pred")?;
        sheet.write_string(0, 2, "note")?;
        sheet.write_number(1, 0, 7)?;
        sheet.write_number(1, 1, 5)?;
        sheet.write_number(2, 0, 5)?;
        sheet.write_number(2, 1, 7)?;
        sheet.write_string(2, 2, "late")?;
        let bytes = workbook.save_to_buffer()?;

        let batch = read_upload(&Upload::new("week.xlsx", bytes))?;
        let names: Vec<&str> = batch
            .schema_ref()
            .fields()
            .iter()
            .map(|f| f.name().as_str())
            .collect();
        assert_eq!(names, vec!["Actual", "Pred", "note"]);
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(
            column_values(&batch, 0),
            vec![Some("7".into()), Some("5".into())]
        );
        assert_eq!(column_values(&batch, 2), vec![None, Some("late".into())]);

        let reference = ReferenceTable::from_reader(
            "CQI index,code rate x 1024,efficiency\n5,449,0.877\n7,378,1.4766\n".as_bytes(),
        )?;
        let params = TransformParams {
            actual_column: "Actual".into(),
            predicted_column: "Pred".into(),
            bandwidth: 100.0,
        };
        let out = transform(&batch, &reference, &params)?;
        let efficiency = out
            .batch
            .column(out.batch.schema().index_of(THROUGHPUT_EFFICIENCY)?)
            .as_any()
            .downcast_ref::<Float64Array>()
            .expect("float column")
            .values()
            .to_vec();
        assert_eq!(efficiency, vec![70.55, 0.0]);
        Ok(())
    }

    #[test]
    fn empty_csv_is_a_parse_error() {
        let err = read_upload(&Upload::new("nothing.csv", "")).unwrap_err();
        assert!(matches!(err, CqiError::Parse { .. }), "{err}");
    }

    #[test]
    fn ragged_csv_is_a_parse_error() {
        let err = read_upload(&Upload::new("bad.csv", "Actual,Pred\n1,2,3\n")).unwrap_err();
        assert!(matches!(err, CqiError::Parse { .. }), "{err}");
    }

    #[test]
    fn garbage_spreadsheet_is_reported() {
        let err = read_upload(&Upload::new("bad.xlsx", "not a workbook")).unwrap_err();
        assert!(matches!(err, CqiError::Spreadsheet(_)), "{err}");
    }

    #[test]
    fn spreadsheet_cells_render_like_text() {
        assert_eq!(cell_text(&Data::Float(5.0)), Some("5".into()));
        assert_eq!(cell_text(&Data::Float(2.5)), Some("2.5".into()));
        assert_eq!(cell_text(&Data::Int(12)), Some("12".into()));
        assert_eq!(cell_text(&Data::Empty), None);
        assert_eq!(cell_text(&Data::Bool(true)), Some("True".into()));
    }
}
