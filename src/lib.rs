use crate::chart::TableRenderer;
use crate::cli::Cli;
use crate::io::TraceLookup;
use anyhow::Result;
use tracing::{info, warn};

/// Algorithm identities and per-algorithm configuration decoding
pub mod algo;
/// Chart registry and the renderer boundary
pub mod chart;
pub mod cli;
/// Manifest lookup, log scanning, and table snapshots
pub mod io;
/// Relative-metric derivation
pub mod metrics;
/// Log-line grammars and size-unit conversion
pub mod parse;
/// Record and table types
pub mod record;

/// Runs the whole pipeline: scan logs, snapshot the raw table, derive the
/// relative-metric table, then render any requested charts.
pub fn run(cli: Cli) -> Result<()> {
    let lookup = TraceLookup::from_manifest(&cli.manifest)?;
    info!(traces = lookup.len(), "loaded trace manifest");

    let table = io::read_data(&cli.data_dir, &lookup)?;
    io::write_csv(&cli.out_dir.join("data.csv"), table.rows())?;
    io::write_csv_zst(&cli.out_dir.join("data.csv.zst"), table.rows())?;

    let (kept, zipf) = metrics::split_zipf(table.into_rows());
    let processed = metrics::process(&kept);
    io::write_csv(&cli.out_dir.join("processed.csv"), &processed)?;
    io::write_csv_zst(&cli.out_dir.join("processed.csv.zst"), &processed)?;

    if zipf.is_empty() {
        warn!("Throughput data is not available");
    } else {
        let summary = metrics::throughput_summary(&zipf);
        io::write_csv(&cli.out_dir.join("throughput.csv"), &summary)?;
        io::write_csv_zst(&cli.out_dir.join("throughput.csv.zst"), &summary)?;
    }

    if let Some(dir) = &cli.scalability_dir {
        let rows = io::read_scalability_data(dir)?;
        io::write_csv(&cli.out_dir.join("scalability.csv"), &rows)?;
        io::write_csv_zst(&cli.out_dir.join("scalability.csv.zst"), &rows)?;
    }

    let renderer = TableRenderer;
    for name in &cli.charts {
        chart::render_chart(name, &processed, &renderer, &cli.figures_dir)?;
    }

    Ok(())
}
