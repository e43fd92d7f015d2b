use anyhow::{bail, Context, Result};
use clap::Parser;
use cqi_throughput::{
    cli::Cli,
    config::Settings,
    process::process_all,
    reference::ReferenceTable,
    report::{format_percent, write_file_report},
};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_writer(std::io::stderr)
        .init();

    // ─── 2) settings ─────────────────────────────────────────────────
    let cli = Cli::parse();
    let settings = Settings::resolve(cli.config.as_deref(), cli.overrides())
        .context("invalid settings")?;
    info!(
        actual = %settings.actual_column,
        pred = %settings.predicted_column,
        bandwidth_mhz = settings.bandwidth_mhz,
        "startup"
    );

    // ─── 3) reference table, once for the whole run ──────────────────
    let reference = ReferenceTable::load(&settings.reference_path).with_context(|| {
        format!(
            "cannot proceed without a valid CQI table ({})",
            settings.reference_path.display()
        )
    })?;

    // ─── 4) inputs ───────────────────────────────────────────────────
    let inputs = cli.expand_inputs()?;
    if inputs.is_empty() {
        bail!("no input files matched");
    }
    info!("{} files to process", inputs.len());

    // ─── 5) process each file independently ──────────────────────────
    let run = process_all(&inputs, &reference, &settings);
    let stdout = std::io::stdout();
    for file in &run.files {
        println!("### Processing: {}", file.path.display());
        match &file.result {
            Ok(done) => {
                if let Err(e) = write_file_report(done, settings.preview_rows, &mut stdout.lock())
                {
                    error!(file = %file.path.display(), "report failed: {}", e);
                }
            }
            Err(e) => println!("Error processing file {}: {}\n", file.path.display(), e),
        }
    }

    // ─── 6) combined summary ─────────────────────────────────────────
    let summary = run.summary();
    if summary.files.len() > 1 {
        println!(
            "Combined Average Throughput Efficiency: {}",
            format_percent(summary.combined_average_efficiency)
        );
    }
    if let Some(path) = &settings.summary_path {
        summary
            .write_json(path)
            .with_context(|| format!("writing summary to {}", path.display()))?;
    }

    info!(
        processed = summary.files.len(),
        failed = summary.failed.len(),
        "all done"
    );
    if run.all_failed() {
        bail!("none of the {} input files could be processed", inputs.len());
    }
    Ok(())
}
