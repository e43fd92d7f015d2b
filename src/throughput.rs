//! Per-index throughput estimate.
//!
//! `throughput = (code_rate_scaled / 1024) * efficiency * bandwidth`
//!
//! An index that is not in the reference table yields `0.0` rather than an
//! error. Gaps in the reference table therefore show up as zero throughput,
//! not as failures; [`crate::report`] counts such rows so they are visible.

use crate::reference::ReferenceTable;

/// Default channel bandwidth in MHz.
pub const DEFAULT_BANDWIDTH_MHZ: f64 = 100.0;

/// Throughput for a single CQI value; `0.0` when the index is unknown.
pub fn calculate_throughput(index: f64, table: &ReferenceTable, bandwidth: f64) -> f64 {
    match table.lookup(index) {
        Some(entry) => entry.code_rate() * entry.efficiency * bandwidth,
        None => 0.0,
    }
}

/// Efficiency of a prediction as a percentage of the actual throughput.
/// Zero when the actual throughput is not positive.
pub fn throughput_efficiency(actual: f64, predicted: f64) -> f64 {
    if actual > 0.0 {
        predicted / actual * 100.0
    } else {
        0.0
    }
}

/// Round half-to-even at `decimals` places.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round_ties_even() / scale
}
