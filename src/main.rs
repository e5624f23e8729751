use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use feed_tabulator::feed::HttpFeedSource;
use feed_tabulator::geocode::{BoundaryResolver, GeoJsonFileResolver, NominatimResolver};
use feed_tabulator::pipeline::{PipelineOptions, PipelineRequest, TracingObserver};
use feed_tabulator::transform::DuplicatePolicy;

/// Fetch a municipal open-data feed and write it out as typed, geo-filtered tables.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Feed URL, e.g. https://api.nanaimo.ca/dataservice/v1/sql/BusinessLicences/
    url: Option<String>,

    /// Primary-key column of the dataset.
    primary_key: Option<String>,

    /// Place whose boundary rows must fall inside.
    #[arg(long)]
    place: Option<String>,

    /// Reference timezone for the `datetime` column.
    #[arg(long)]
    timezone: Option<String>,

    /// Directory to write outputs into.
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// File name of the compacted CSV.
    #[arg(long)]
    compressed_name: Option<String>,

    /// Keep only the first row for each primary key.
    #[arg(long)]
    dedupe: bool,

    /// Read the boundary from a GeoJSON file instead of querying Nominatim.
    #[arg(long)]
    boundary_file: Option<PathBuf>,

    /// HTTP timeout in seconds.
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,
}

fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();

    let (url, primary_key) = match (args.url.clone(), args.primary_key.clone()) {
        (Some(url), Some(key)) => (url, key),
        _ => {
            let mut input = io::stdin().lock();
            let url = prompt(&mut input, "Enter API URL: ")?;
            let key = prompt(&mut input, "Enter primary key of dataset: ")?;
            (url, key)
        }
    };

    let request = PipelineRequest {
        url,
        primary_key,
        options: options_from(&args),
    };

    let timeout = Duration::from_secs(args.timeout_secs);
    let source = HttpFeedSource::new(timeout)?;
    let resolver: Box<dyn BoundaryResolver> = match &args.boundary_file {
        Some(path) => Box::new(GeoJsonFileResolver::new(path)),
        None => Box::new(NominatimResolver::new(timeout)?),
    };

    info!(url = %request.url, "getting data from api");
    let summary = request
        .run(&source, resolver.as_ref())
        .with_context(|| format!("processing feed {}", request.url))?;

    info!(
        dataset = %summary.dataset,
        rows = summary.rows,
        columns = summary.columns,
        "data saved to {} and {}",
        summary.outputs.csv.display(),
        summary.outputs.parquet.display()
    );
    info!(
        "memory usage before reduction: {} KB, after: {} KB",
        kb(summary.bytes_before as u64),
        kb(summary.bytes_after as u64)
    );
    info!(
        "compressed file size: {} KB ({})",
        kb(summary.gzip_bytes),
        summary.outputs.gzip_csv.display()
    );
    Ok(())
}

fn options_from(args: &Args) -> PipelineOptions {
    let mut options = PipelineOptions {
        observer: Some(Arc::new(TracingObserver)),
        ..PipelineOptions::default()
    };
    if let Some(place) = &args.place {
        options.place_name = place.clone();
    }
    if let Some(tz) = &args.timezone {
        options.timezone = tz.clone();
    }
    if let Some(dir) = &args.output_dir {
        options.output_dir = dir.clone();
    }
    if let Some(name) = &args.compressed_name {
        options.compressed_file_name = name.clone();
    }
    if args.dedupe {
        options.duplicate_policy = DuplicatePolicy::KeepFirst;
    }
    options
}

fn prompt(input: &mut impl BufRead, message: &str) -> Result<String> {
    print!("{message}");
    io::stdout().flush()?;
    let mut line = String::new();
    input.read_line(&mut line).context("reading from stdin")?;
    Ok(line.trim().to_string())
}

/// Bytes to whole kilobytes, rounded to nearest.
fn kb(bytes: u64) -> u64 {
    (bytes + 500) / 1000
}
