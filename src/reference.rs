use csv::ReaderBuilder;
use std::{
    collections::BTreeMap,
    fs::File,
    io::{BufReader, Read},
    path::Path,
};
use tracing::{debug, info};

use crate::error::{CqiError, Result};
use crate::process::utils::clean_str;

pub const INDEX_COLUMN: &str = "CQI index";
pub const CODE_RATE_COLUMN: &str = "code rate x 1024";
pub const EFFICIENCY_COLUMN: &str = "efficiency";

/// Marker used in the reference file for "no value"; read as zero.
const MISSING_MARKER: &str = "-";

/// One row of the reference table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReferenceEntry {
    pub index: i64,
    /// Code rate multiplied by 1024, as published in the CQI tables.
    pub code_rate_scaled: f64,
    pub efficiency: f64,
}

impl ReferenceEntry {
    /// Code rate as a plain fraction.
    pub fn code_rate(&self) -> f64 {
        self.code_rate_scaled / 1024.0
    }
}

/// Immutable CQI index → coefficients lookup, built once per process.
#[derive(Debug, Clone, Default)]
pub struct ReferenceTable {
    entries: BTreeMap<i64, ReferenceEntry>,
}

impl ReferenceTable {
    /// Build a table from entries, rejecting duplicate indices.
    pub fn from_entries<I>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = ReferenceEntry>,
    {
        let mut map = BTreeMap::new();
        for entry in entries {
            if map.insert(entry.index, entry).is_some() {
                return Err(CqiError::InvalidReference(format!(
                    "duplicate CQI index {}",
                    entry.index
                )));
            }
        }
        Ok(Self { entries: map })
    }

    /// Load the reference CSV at `path`.
    #[tracing::instrument(level = "info", skip(path), fields(path = %path.as_ref().display()))]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(CqiError::ReferenceNotFound(path.display().to_string()));
        }
        let file = File::open(path)?;
        let table = Self::from_reader(BufReader::new(file))?;
        info!(entries = table.len(), "loaded reference table");
        Ok(table)
    }

    /// Parse reference CSV from any reader. Columns other than the three
    /// known ones are ignored.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = ReaderBuilder::new().has_headers(true).from_reader(reader);

        let headers: Vec<String> = rdr.headers()?.iter().map(clean_str).collect();
        let position = |name: &str| {
            headers.iter().position(|h| h == name).ok_or_else(|| {
                CqiError::InvalidReference(format!(
                    "missing column '{}' (found: {})",
                    name,
                    headers.join(", ")
                ))
            })
        };
        let index_pos = position(INDEX_COLUMN)?;
        let rate_pos = position(CODE_RATE_COLUMN)?;
        let eff_pos = position(EFFICIENCY_COLUMN)?;

        let mut entries = Vec::new();
        for (row, record) in rdr.records().enumerate() {
            let record = record?;
            let field = |pos: usize, name: &str| {
                let raw = record.get(pos).unwrap_or_default();
                parse_coefficient(raw).ok_or_else(|| {
                    CqiError::InvalidReference(format!(
                        "row {}: '{}' in column '{}' is not a number",
                        row + 1,
                        raw,
                        name
                    ))
                })
            };

            let index = field(index_pos, INDEX_COLUMN)?;
            if index.fract() != 0.0 || !index.is_finite() {
                return Err(CqiError::InvalidReference(format!(
                    "row {}: CQI index {} is not an integer",
                    row + 1,
                    index
                )));
            }
            let entry = ReferenceEntry {
                index: index as i64,
                code_rate_scaled: field(rate_pos, CODE_RATE_COLUMN)?,
                efficiency: field(eff_pos, EFFICIENCY_COLUMN)?,
            };
            debug!(?entry, "reference entry");
            entries.push(entry);
        }

        Self::from_entries(entries)
    }

    pub fn get(&self, index: i64) -> Option<&ReferenceEntry> {
        self.entries.get(&index)
    }

    /// Look up a numeric cell value. Only finite, integral values can match.
    pub fn lookup(&self, value: f64) -> Option<&ReferenceEntry> {
        if !value.is_finite() || value.fract() != 0.0 {
            return None;
        }
        self.get(value as i64)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ReferenceEntry> {
        self.entries.values()
    }
}

fn parse_coefficient(raw: &str) -> Option<f64> {
    let cleaned = clean_str(raw);
    if cleaned == MISSING_MARKER {
        return Some(0.0);
    }
    cleaned.parse().ok()
}
