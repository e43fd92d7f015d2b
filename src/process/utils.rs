use std::path::Path;

/// Trim whitespace + strip outer quotes if present.
pub fn clean_str(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.starts_with('"') && trimmed.ends_with('"') && trimmed.len() >= 2 {
        trimmed[1..trimmed.len() - 1].trim().to_string()
    } else {
        trimmed.to_string()
    }
}

/// Parse an index cell. Empty cells are `None`; anything else must be a number.
pub fn parse_index_cell(raw: &str) -> Result<Option<f64>, String> {
    let cleaned = clean_str(raw);
    if cleaned.is_empty() {
        return Ok(None);
    }
    cleaned.parse::<f64>().map(Some).map_err(|_| cleaned)
}

/// `data/run.1.csv` → `processed_run.<extension>`: the stem is everything
/// before the first `.` of the file name.
pub fn output_file_name(input_name: &str, extension: &str) -> String {
    let file_name = Path::new(input_name)
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or(input_name);
    let stem = file_name.split('.').next().unwrap_or(file_name);
    format!("processed_{}.{}", stem, extension)
}
