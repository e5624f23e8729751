//! Run orchestration: feed URL in, persisted tables out.
//!
//! Most callers should use [`run`] (or [`PipelineRequest::run`]), which executes every stage in
//! order and writes all outputs:
//!
//! 1. resolve the reference timezone (before any network access)
//! 2. fetch the feed and flatten it into a table
//! 3. [`transform`]: normalize, local timestamp, geometry, clean
//! 4. persist: CSV, Parquet, compacted CSV, gzip-compressed compacted CSV
//!
//! If a [`PipelineObserver`] is configured in [`PipelineOptions`], it receives one
//! [`PipelineEvent`] per completed stage and written file, plus `on_failure`/`on_alert` when the
//! run fails.

pub mod observability;

pub use observability::{
    CompositeObserver, PipelineContext, PipelineEvent, PipelineObserver, PipelineSeverity, Stage,
    TracingObserver,
};

use std::error::Error as StdError;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono_tz::Tz;

use crate::error::{PipelineError, PipelineResult};
use crate::feed::{self, FeedSource};
use crate::geocode::BoundaryResolver;
use crate::output;
use crate::transform::{self, CleanOptions, DuplicatePolicy};
use crate::types::Table;

/// Options controlling a pipeline run.
///
/// Use [`Default`] for the Nanaimo feeds.
#[derive(Clone)]
pub struct PipelineOptions {
    /// Place whose boundary rows must fall inside.
    pub place_name: String,
    /// Reference timezone for the `datetime` column (IANA name or civic alias).
    pub timezone: String,
    /// Directory all outputs are written to.
    pub output_dir: PathBuf,
    /// File name of the compacted CSV.
    pub compressed_file_name: String,
    pub duplicate_policy: DuplicatePolicy,
    /// Optional observer for logging/alerts.
    pub observer: Option<Arc<dyn PipelineObserver>>,
    /// Severity threshold at which `on_alert` is invoked.
    pub alert_at_or_above: PipelineSeverity,
}

impl fmt::Debug for PipelineOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineOptions")
            .field("place_name", &self.place_name)
            .field("timezone", &self.timezone)
            .field("output_dir", &self.output_dir)
            .field("compressed_file_name", &self.compressed_file_name)
            .field("duplicate_policy", &self.duplicate_policy)
            .field("observer_set", &self.observer.is_some())
            .field("alert_at_or_above", &self.alert_at_or_above)
            .finish()
    }
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            place_name: "Nanaimo, BC, Canada".to_string(),
            timezone: "America/Nanaimo".to_string(),
            output_dir: PathBuf::from("."),
            compressed_file_name: "compressed.csv".to_string(),
            duplicate_policy: DuplicatePolicy::KeepAll,
            observer: None,
            alert_at_or_above: PipelineSeverity::Critical,
        }
    }
}

/// Where a run writes its files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    /// `<dataset>.csv`
    pub csv: PathBuf,
    /// `<dataset>.parquet`
    pub parquet: PathBuf,
    /// The compacted CSV, named by [`PipelineOptions::compressed_file_name`].
    pub compressed_csv: PathBuf,
    /// `<dataset>_compressed.csv`, gzip-compressed.
    pub gzip_csv: PathBuf,
}

impl OutputPaths {
    pub fn new(dir: &Path, dataset: &str, compressed_file_name: &str) -> Self {
        Self {
            csv: dir.join(format!("{dataset}.csv")),
            parquet: dir.join(format!("{dataset}.parquet")),
            compressed_csv: dir.join(compressed_file_name),
            gzip_csv: dir.join(format!("{dataset}_compressed.csv")),
        }
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSummary {
    /// Dataset name taken from the feed URL.
    pub dataset: String,
    /// Rows in the persisted table.
    pub rows: usize,
    /// Columns in the persisted table.
    pub columns: usize,
    pub outputs: OutputPaths,
    /// Estimated footprint before compaction.
    pub bytes_before: usize,
    /// Estimated footprint after compaction.
    pub bytes_after: usize,
    /// On-disk size of the gzip-compressed CSV.
    pub gzip_bytes: u64,
}

/// One invocation bundled as an owned value.
#[derive(Clone)]
pub struct PipelineRequest {
    /// Feed URL.
    pub url: String,
    /// Primary-key column (case and surrounding whitespace are ignored).
    pub primary_key: String,
    /// Options controlling the run.
    pub options: PipelineOptions,
}

impl fmt::Debug for PipelineRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineRequest")
            .field("url", &self.url)
            .field("primary_key", &self.primary_key)
            .field("options", &self.options)
            .finish()
    }
}

impl PipelineRequest {
    /// Execute the request by calling [`run`].
    pub fn run(
        &self,
        source: &dyn FeedSource,
        resolver: &dyn BoundaryResolver,
    ) -> PipelineResult<PipelineSummary> {
        run(&self.url, &self.primary_key, source, resolver, &self.options)
    }
}

/// Run the whole pipeline for one feed.
///
/// When an observer is configured, this function reports:
///
/// - `on_event` after each stage and each written file
/// - `on_failure` on failure, with a computed severity
/// - `on_alert` on failure when the computed severity is >= `options.alert_at_or_above`
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
///
/// use feed_tabulator::feed::HttpFeedSource;
/// use feed_tabulator::geocode::NominatimResolver;
/// use feed_tabulator::pipeline::{run, PipelineOptions};
///
/// # fn main() -> Result<(), feed_tabulator::PipelineError> {
/// let source = HttpFeedSource::new(Duration::from_secs(30))?;
/// let resolver = NominatimResolver::new(Duration::from_secs(30))?;
/// let summary = run(
///     "https://api.nanaimo.ca/dataservice/v1/sql/BusinessLicences/",
///     "licence",
///     &source,
///     &resolver,
///     &PipelineOptions::default(),
/// )?;
/// println!("rows={} gzip={}B", summary.rows, summary.gzip_bytes);
/// # Ok(())
/// # }
/// ```
pub fn run(
    url: &str,
    primary_key: &str,
    source: &dyn FeedSource,
    resolver: &dyn BoundaryResolver,
    options: &PipelineOptions,
) -> PipelineResult<PipelineSummary> {
    let ctx = PipelineContext {
        feed_url: url.to_string(),
        primary_key: primary_key.to_string(),
    };
    let reporter = Reporter {
        ctx: &ctx,
        observer: options.observer.as_deref(),
    };

    let result = run_stages(url, primary_key, source, resolver, options, &reporter);

    if let (Some(obs), Err(e)) = (options.observer.as_ref(), &result) {
        let sev = severity_for_error(e);
        obs.on_failure(&ctx, sev, e);
        if sev >= options.alert_at_or_above {
            obs.on_alert(&ctx, sev, e);
        }
    }

    result
}

fn run_stages(
    url: &str,
    primary_key: &str,
    source: &dyn FeedSource,
    resolver: &dyn BoundaryResolver,
    options: &PipelineOptions,
    reporter: &Reporter<'_>,
) -> PipelineResult<PipelineSummary> {
    let tz = transform::resolve_timezone(&options.timezone)?;
    let dataset = feed::dataset_name_from_url(url)?;

    let bytes = source.fetch(url)?;
    reporter.emit(PipelineEvent::FeedFetched { bytes: bytes.len() });

    let table = feed::extract_table_from_bytes(&bytes)?;
    reporter.stage(Stage::Extract, &table);

    let table = transform_stages(table, primary_key, resolver, tz, options, reporter)?;

    let outputs = OutputPaths::new(&options.output_dir, &dataset, &options.compressed_file_name);
    persist(table, dataset, outputs, reporter)
}

/// Normalize, add the local timestamp and geometry columns, then clean.
///
/// This is the in-memory part of [`run`], without fetching, persisting or observer events.
pub fn transform(
    table: Table,
    primary_key: &str,
    resolver: &dyn BoundaryResolver,
    tz: Tz,
    options: &PipelineOptions,
) -> PipelineResult<Table> {
    let ctx = PipelineContext {
        feed_url: String::new(),
        primary_key: primary_key.to_string(),
    };
    let silent = Reporter {
        ctx: &ctx,
        observer: None,
    };
    transform_stages(table, primary_key, resolver, tz, options, &silent)
}

fn transform_stages(
    table: Table,
    primary_key: &str,
    resolver: &dyn BoundaryResolver,
    tz: Tz,
    options: &PipelineOptions,
    reporter: &Reporter<'_>,
) -> PipelineResult<Table> {
    let table = transform::normalize(table);
    reporter.stage(Stage::Normalize, &table);

    let table = transform::add_local_timestamp(table, tz);
    reporter.stage(Stage::LocalTimestamp, &table);

    let table = transform::add_geometry(table);
    reporter.stage(Stage::Geometry, &table);

    let clean_options = CleanOptions {
        place_name: &options.place_name,
        duplicate_policy: options.duplicate_policy,
    };
    let table = transform::clean(table, primary_key, resolver, &clean_options)?;
    reporter.stage(Stage::Clean, &table);

    Ok(table)
}

fn persist(
    table: Table,
    dataset: String,
    outputs: OutputPaths,
    reporter: &Reporter<'_>,
) -> PipelineResult<PipelineSummary> {
    output::write_csv(&table, &outputs.csv)?;
    reporter.written(&outputs.csv)?;

    output::write_parquet(&output::geometry_to_text(table.clone()), &outputs.parquet)?;
    reporter.written(&outputs.parquet)?;

    let compaction = transform::compact(table);
    reporter.emit(PipelineEvent::MemoryUsage {
        before_bytes: compaction.bytes_before,
        after_bytes: compaction.bytes_after,
    });

    output::write_csv(&compaction.table, &outputs.compressed_csv)?;
    reporter.written(&outputs.compressed_csv)?;

    output::write_csv_gzip(&compaction.table, &outputs.gzip_csv)?;
    let gzip_bytes = reporter.written(&outputs.gzip_csv)?;

    reporter.stage(Stage::Persist, &compaction.table);

    Ok(PipelineSummary {
        dataset,
        rows: compaction.table.row_count(),
        columns: compaction.table.column_count(),
        outputs,
        bytes_before: compaction.bytes_before,
        bytes_after: compaction.bytes_after,
        gzip_bytes,
    })
}

struct Reporter<'a> {
    ctx: &'a PipelineContext,
    observer: Option<&'a dyn PipelineObserver>,
}

impl Reporter<'_> {
    fn emit(&self, event: PipelineEvent) {
        if let Some(obs) = self.observer {
            obs.on_event(self.ctx, &event);
        }
    }

    fn stage(&self, stage: Stage, table: &Table) {
        self.emit(PipelineEvent::StageFinished {
            stage,
            rows: table.row_count(),
            columns: table.column_count(),
        });
    }

    /// Report a written file and return its size.
    fn written(&self, path: &Path) -> PipelineResult<u64> {
        let bytes = fs::metadata(path)?.len();
        self.emit(PipelineEvent::OutputWritten {
            path: path.to_path_buf(),
            bytes,
        });
        Ok(bytes)
    }
}

/// Severity a failed run is reported with.
///
/// Network, geocoding and filesystem failures are `Critical`; everything caused by the feed's
/// content or by configuration is `Error`.
pub fn severity_for_error(e: &PipelineError) -> PipelineSeverity {
    match e {
        PipelineError::Fetch { .. } | PipelineError::Geocode { .. } | PipelineError::Io(_) => {
            PipelineSeverity::Critical
        }
        PipelineError::Parquet(err) => {
            if error_chain_contains_io(err) {
                PipelineSeverity::Critical
            } else {
                PipelineSeverity::Error
            }
        }
        PipelineError::Csv(err) => match err.kind() {
            ::csv::ErrorKind::Io(_) => PipelineSeverity::Critical,
            _ => PipelineSeverity::Error,
        },
        PipelineError::Format { .. }
        | PipelineError::Config { .. }
        | PipelineError::MissingColumn { .. }
        | PipelineError::InvalidValue { .. } => PipelineSeverity::Error,
    }
}

fn error_chain_contains_io(e: &(dyn StdError + 'static)) -> bool {
    let mut cur: Option<&(dyn StdError + 'static)> = Some(e);
    while let Some(err) = cur {
        if err.is::<std::io::Error>() {
            return true;
        }
        cur = err.source();
    }
    false
}
