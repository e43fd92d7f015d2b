use arrow::{
    array::{Array, ArrayRef, Float64Array, StringArray},
    compute::cast,
    datatypes::{DataType, Field, Schema},
    record_batch::RecordBatch,
};
use std::sync::Arc;
use tracing::{debug, warn};

use super::utils::parse_index_cell;
use crate::error::{CqiError, Result};
use crate::reference::ReferenceTable;
use crate::throughput::{calculate_throughput, round_to, throughput_efficiency};

pub const ACTUAL_THROUGHPUT: &str = "Actual Throughput";
pub const PREDICTED_THROUGHPUT: &str = "Predicted Throughput";
pub const THROUGHPUT_EFFICIENCY: &str = "Throughput Efficiency";

const THROUGHPUT_DECIMALS: i32 = 4;
const EFFICIENCY_DECIMALS: i32 = 2;

/// Which columns hold the CQI indices and the bandwidth to apply.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformParams {
    pub actual_column: String,
    pub predicted_column: String,
    pub bandwidth: f64,
}

/// Per-table counters gathered while deriving the throughput columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransformStats {
    pub rows: usize,
    /// Rows whose prediction passed the `predicted <= actual` gate.
    pub counted_predictions: usize,
    /// Rows whose actual index had no reference entry and was zeroed.
    pub unknown_actual: usize,
    /// Sum of the rounded efficiency values.
    pub efficiency_sum: f64,
}

impl TransformStats {
    pub fn average_efficiency(&self) -> Option<f64> {
        (self.rows > 0).then(|| self.efficiency_sum / self.rows as f64)
    }
}

#[derive(Debug, Clone)]
pub struct Transformed {
    pub batch: RecordBatch,
    pub stats: TransformStats,
}

/// Column values as `f64`, `None` for nulls and empty text cells.
fn index_values(batch: &RecordBatch, column: &str) -> Result<Vec<Option<f64>>> {
    let schema = batch.schema();
    let pos = schema
        .fields()
        .iter()
        .position(|f| f.name() == column)
        .ok_or_else(|| CqiError::MissingColumn {
            column: column.to_string(),
            available: schema.fields().iter().map(|f| f.name().clone()).collect(),
        })?;
    let array = batch.column(pos);

    if let Some(strings) = array.as_any().downcast_ref::<StringArray>() {
        return strings
            .iter()
            .enumerate()
            .map(|(row, cell)| match cell {
                None => Ok(None),
                Some(raw) => parse_index_cell(raw).map_err(|value| CqiError::NonNumericIndex {
                    column: column.to_string(),
                    row: row + 1,
                    value,
                }),
            })
            .collect();
    }

    let floats = cast(array, &DataType::Float64)?;
    let floats = floats
        .as_any()
        .downcast_ref::<Float64Array>()
        .ok_or_else(|| CqiError::Parse {
            name: column.to_string(),
            reason: "column cannot be read as numbers".into(),
        })?;
    Ok(floats.iter().collect())
}

/// Append (or overwrite) the three derived throughput columns.
///
/// Predicted throughput is only counted when the predicted index does not
/// exceed the actual one; missing values on either side fail that gate.
#[tracing::instrument(level = "debug", skip(batch, table), fields(rows = batch.num_rows()))]
pub fn transform(
    batch: &RecordBatch,
    table: &ReferenceTable,
    params: &TransformParams,
) -> Result<Transformed> {
    let actual = index_values(batch, &params.actual_column)?;
    let predicted = index_values(batch, &params.predicted_column)?;

    let mut stats = TransformStats {
        rows: batch.num_rows(),
        ..Default::default()
    };
    let mut actual_tp = Vec::with_capacity(stats.rows);
    let mut predicted_tp = Vec::with_capacity(stats.rows);
    let mut efficiency = Vec::with_capacity(stats.rows);

    for (a, p) in actual.iter().zip(predicted.iter()) {
        let a_value = a.unwrap_or(f64::NAN);
        if table.lookup(a_value).is_none() {
            stats.unknown_actual += 1;
        }
        let a_tp = calculate_throughput(a_value, table, params.bandwidth);

        let p_tp = match (a, p) {
            (Some(a), Some(p)) if p <= a => {
                stats.counted_predictions += 1;
                calculate_throughput(*p, table, params.bandwidth)
            }
            _ => 0.0,
        };

        let eff = round_to(throughput_efficiency(a_tp, p_tp), EFFICIENCY_DECIMALS);
        stats.efficiency_sum += eff;

        actual_tp.push(round_to(a_tp, THROUGHPUT_DECIMALS));
        predicted_tp.push(round_to(p_tp, THROUGHPUT_DECIMALS));
        efficiency.push(eff);
    }

    if stats.unknown_actual > 0 {
        warn!(
            rows = stats.unknown_actual,
            column = %params.actual_column,
            "actual CQI values missing from the reference table were given zero throughput"
        );
    }

    let batch = with_derived_columns(
        batch,
        [
            (ACTUAL_THROUGHPUT, actual_tp),
            (PREDICTED_THROUGHPUT, predicted_tp),
            (THROUGHPUT_EFFICIENCY, efficiency),
        ],
    )?;
    debug!(?stats, "derived throughput columns");

    Ok(Transformed { batch, stats })
}

/// Existing columns with a derived name are replaced where they stand;
/// others are appended in order.
fn with_derived_columns<const N: usize>(
    batch: &RecordBatch,
    derived: [(&str, Vec<f64>); N],
) -> Result<RecordBatch> {
    let schema = batch.schema();
    let mut fields: Vec<Arc<Field>> = schema.fields().iter().cloned().collect();
    let mut columns: Vec<ArrayRef> = batch.columns().to_vec();

    for (name, values) in derived {
        let field = Arc::new(Field::new(name, DataType::Float64, false));
        let array = Arc::new(Float64Array::from(values)) as ArrayRef;
        match fields.iter().position(|f| f.name() == name) {
            Some(pos) => {
                fields[pos] = field;
                columns[pos] = array;
            }
            None => {
                fields.push(field);
                columns.push(array);
            }
        }
    }

    let schema = Arc::new(Schema::new_with_metadata(fields, schema.metadata().clone()));
    Ok(RecordBatch::try_new(schema, columns)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::Upload;
    use crate::process::reader::read_upload;
    use crate::reference::ReferenceTable;
    use arrow::array::Int64Array;

    const TABLE: &str = "CQI index,code rate x 1024,efficiency
0,-,-
5,449,0.877
7,378,1.4766
9,616,2.4063
";

    fn reference() -> ReferenceTable {
        ReferenceTable::from_reader(TABLE.as_bytes()).unwrap()
    }

    fn params() -> TransformParams {
        TransformParams {
            actual_column: "Actual".into(),
            predicted_column: "Pred".into(),
            bandwidth: 100.0,
        }
    }

    fn floats(batch: &RecordBatch, name: &str) -> Vec<f64> {
        let idx = batch.schema().index_of(name).unwrap();
        batch
            .column(idx)
            .as_any()
            .downcast_ref::<Float64Array>()
            .unwrap()
            .values()
            .to_vec()
    }

    fn run(csv: &str) -> Transformed {
        let batch = read_upload(&Upload::new("t.csv", csv)).unwrap();
        transform(&batch, &reference(), &params()).unwrap()
    }

    #[test]
    fn valid_prediction_is_counted() {
        let out = run("Actual,Pred\n7,5\n");
        assert_eq!(floats(&out.batch, ACTUAL_THROUGHPUT), vec![54.5073]);
        assert_eq!(floats(&out.batch, PREDICTED_THROUGHPUT), vec![38.4544]);
        // 38.45439453125 / 54.5073046875 * 100
        assert_eq!(floats(&out.batch, THROUGHPUT_EFFICIENCY), vec![70.55]);
        assert_eq!(out.stats.counted_predictions, 1);
    }

    #[test]
    fn overstated_prediction_is_zeroed() {
        let out = run("Actual,Pred\n5,7\n");
        assert_eq!(floats(&out.batch, ACTUAL_THROUGHPUT), vec![38.4544]);
        assert_eq!(floats(&out.batch, PREDICTED_THROUGHPUT), vec![0.0]);
        assert_eq!(floats(&out.batch, THROUGHPUT_EFFICIENCY), vec![0.0]);
        assert_eq!(out.stats.counted_predictions, 0);
    }

    #[test]
    fn unknown_actual_gives_zero_efficiency() {
        // 3 is not in the reference table; 0 is present with zero coefficients
        let out = run("Actual,Pred\n3,0\n0,0\n");
        assert_eq!(floats(&out.batch, ACTUAL_THROUGHPUT), vec![0.0, 0.0]);
        assert_eq!(floats(&out.batch, THROUGHPUT_EFFICIENCY), vec![0.0, 0.0]);
        assert_eq!(out.stats.unknown_actual, 1);
    }

    #[test]
    fn equal_indices_are_fully_efficient() {
        let out = run("Actual,Pred\n9,9\n");
        assert_eq!(floats(&out.batch, THROUGHPUT_EFFICIENCY), vec![100.0]);
    }

    #[test]
    fn missing_cells_fail_the_gate() {
        let out = run("Actual,Pred\n9,\n,5\n");
        assert_eq!(floats(&out.batch, PREDICTED_THROUGHPUT), vec![0.0, 0.0]);
        assert_eq!(floats(&out.batch, ACTUAL_THROUGHPUT)[1], 0.0);
        assert_eq!(out.stats.unknown_actual, 1);
    }

    #[test]
    fn gate_and_guard_hold_for_every_row() {
        let mut csv = String::from("Actual,Pred\n");
        for a in 0..=10 {
            for p in 0..=10 {
                csv.push_str(&format!("{a},{p}\n"));
            }
        }
        let out = run(&csv);
        let actual = floats(&out.batch, ACTUAL_THROUGHPUT);
        let predicted = floats(&out.batch, PREDICTED_THROUGHPUT);
        let efficiency = floats(&out.batch, THROUGHPUT_EFFICIENCY);

        let mut row = 0;
        for a in 0..=10 {
            for p in 0..=10 {
                if p > a {
                    assert_eq!(predicted[row], 0.0, "row {a},{p}");
                }
                if actual[row] == 0.0 {
                    assert_eq!(efficiency[row], 0.0, "row {a},{p}");
                }
                assert!(efficiency[row] <= 100.0);
                row += 1;
            }
        }
    }

    #[test]
    fn passthrough_columns_keep_order_and_text() {
        let out = run("site,Actual,Pred,note\nA,7,5,first\nB,5,7,\n");
        let names: Vec<String> = out
            .batch
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect();
        assert_eq!(
            names,
            vec![
                "site",
                "Actual",
                "Pred",
                "note",
                ACTUAL_THROUGHPUT,
                PREDICTED_THROUGHPUT,
                THROUGHPUT_EFFICIENCY
            ]
        );
        let site = out
            .batch
            .column(0)
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        assert_eq!(site.value(1), "B");
    }

    #[test]
    fn rerun_overwrites_derived_columns_in_place() {
        let first = run("Actual,Pred\n7,5\n5,7\n");
        let second = transform(&first.batch, &reference(), &params()).unwrap();
        assert_eq!(second.batch.num_columns(), first.batch.num_columns());
        for name in [ACTUAL_THROUGHPUT, PREDICTED_THROUGHPUT, THROUGHPUT_EFFICIENCY] {
            assert_eq!(floats(&second.batch, name), floats(&first.batch, name));
        }
    }

    #[test]
    fn numeric_arrays_are_accepted() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("Actual", DataType::Int64, false),
            Field::new("Pred", DataType::Int64, false),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(vec![9, 7])) as ArrayRef,
                Arc::new(Int64Array::from(vec![9, 9])) as ArrayRef,
            ],
        )
        .unwrap();
        let out = transform(&batch, &reference(), &params()).unwrap();
        assert_eq!(floats(&out.batch, THROUGHPUT_EFFICIENCY), vec![100.0, 0.0]);
    }

    #[test]
    fn missing_column_lists_available_columns() {
        let batch = read_upload(&Upload::new("t.csv", "Actual,Prediction\n5,5\n")).unwrap();
        let err = transform(&batch, &reference(), &params()).unwrap_err();
        match &err {
            CqiError::MissingColumn { column, available } => {
                assert_eq!(column, "Pred");
                assert_eq!(available, &vec!["Actual".to_string(), "Prediction".to_string()]);
            }
            other => panic!("unexpected error {other}"),
        }
        assert_eq!(
            err.to_string(),
            "Column 'Pred' not found in the file. Available columns: Actual, Prediction"
        );
    }

    #[test]
    fn non_numeric_index_is_reported_with_row() {
        let batch = read_upload(&Upload::new("t.csv", "Actual,Pred\n5,5\nhigh,3\n")).unwrap();
        let err = transform(&batch, &reference(), &params()).unwrap_err();
        assert!(
            matches!(&err, CqiError::NonNumericIndex { row: 2, value, .. } if value == "high"),
            "{err}"
        );
    }

    #[test]
    fn bandwidth_scales_throughput() {
        let batch = read_upload(&Upload::new("t.csv", "Actual,Pred\n5,5\n")).unwrap();
        let narrow = TransformParams {
            bandwidth: 20.0,
            ..params()
        };
        let out = transform(&batch, &reference(), &narrow).unwrap();
        assert_eq!(floats(&out.batch, ACTUAL_THROUGHPUT), vec![7.6909]);
        assert_eq!(floats(&out.batch, THROUGHPUT_EFFICIENCY), vec![100.0]);
    }

    #[test]
    fn average_efficiency_uses_rounded_values() {
        let out = run("Actual,Pred\n7,5\n9,9\n5,7\n");
        let avg = out.stats.average_efficiency().unwrap();
        assert!((avg - (70.55 + 100.0 + 0.0) / 3.0).abs() < 1e-9);
        assert_eq!(run("Actual,Pred\n").stats.average_efficiency(), None);
    }
}
