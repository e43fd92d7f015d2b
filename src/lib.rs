pub mod cli;
pub mod config;
pub mod error;
pub mod process;
pub mod reference;
pub mod report;
pub mod throughput;

pub use error::{CqiError, Result};
pub use process::{process_all, process_upload, ProcessedFile, RunOutcome, Upload};
pub use reference::{ReferenceEntry, ReferenceTable};
pub use throughput::calculate_throughput;
