use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info};

use crate::error::PipelineError;

/// Severity classification used for observer callbacks and alerting thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PipelineSeverity {
    /// Informational event.
    Info,
    /// Warning-level event (non-fatal).
    Warning,
    /// Error-level event (run failed on bad data or configuration).
    Error,
    /// Critical error (network, geocoding or filesystem failure).
    Critical,
}

/// Pipeline stages, in run order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Extract,
    Normalize,
    LocalTimestamp,
    Geometry,
    Clean,
    Persist,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Extract => "extract",
            Self::Normalize => "normalize",
            Self::LocalTimestamp => "local_timestamp",
            Self::Geometry => "geometry",
            Self::Clean => "clean",
            Self::Persist => "persist",
        };
        f.write_str(name)
    }
}

/// Context about a pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    /// Feed URL being processed.
    pub feed_url: String,
    /// Primary-key column as given by the caller.
    pub primary_key: String,
}

/// Progress reported while a run succeeds.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// The feed document was downloaded.
    FeedFetched { bytes: usize },
    /// A table stage completed; `rows`/`columns` describe its output.
    StageFinished {
        stage: Stage,
        rows: usize,
        columns: usize,
    },
    /// An output file was written.
    OutputWritten { path: PathBuf, bytes: u64 },
    /// Estimated table footprint before and after compaction.
    MemoryUsage {
        before_bytes: usize,
        after_bytes: usize,
    },
}

/// Observer interface for pipeline progress and failures.
///
/// Implementors can record metrics, logs, or trigger alerts.
pub trait PipelineObserver: Send + Sync {
    /// Called for each progress event.
    fn on_event(&self, _ctx: &PipelineContext, _event: &PipelineEvent) {}

    /// Called when the run fails.
    fn on_failure(&self, _ctx: &PipelineContext, _severity: PipelineSeverity, _error: &PipelineError) {}

    /// Called when a failure meets the alert threshold.
    ///
    /// Default behavior forwards to [`Self::on_failure`].
    fn on_alert(&self, ctx: &PipelineContext, severity: PipelineSeverity, error: &PipelineError) {
        self.on_failure(ctx, severity, error)
    }
}

/// An observer that fans out callbacks to a list of observers.
#[derive(Default)]
pub struct CompositeObserver {
    observers: Vec<Arc<dyn PipelineObserver>>,
}

impl CompositeObserver {
    /// Create a new composite observer from a list of observers.
    pub fn new(observers: Vec<Arc<dyn PipelineObserver>>) -> Self {
        Self { observers }
    }
}

impl fmt::Debug for CompositeObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeObserver")
            .field("observers_len", &self.observers.len())
            .finish()
    }
}

impl PipelineObserver for CompositeObserver {
    fn on_event(&self, ctx: &PipelineContext, event: &PipelineEvent) {
        for o in &self.observers {
            o.on_event(ctx, event);
        }
    }

    fn on_failure(&self, ctx: &PipelineContext, severity: PipelineSeverity, error: &PipelineError) {
        for o in &self.observers {
            o.on_failure(ctx, severity, error);
        }
    }

    fn on_alert(&self, ctx: &PipelineContext, severity: PipelineSeverity, error: &PipelineError) {
        for o in &self.observers {
            o.on_alert(ctx, severity, error);
        }
    }
}

/// Forwards pipeline events to `tracing`.
#[derive(Debug, Default)]
pub struct TracingObserver;

impl PipelineObserver for TracingObserver {
    fn on_event(&self, ctx: &PipelineContext, event: &PipelineEvent) {
        match event {
            PipelineEvent::FeedFetched { bytes } => {
                info!(url = %ctx.feed_url, bytes, "feed fetched")
            }
            PipelineEvent::StageFinished {
                stage,
                rows,
                columns,
            } => info!(%stage, rows, columns, "stage finished"),
            PipelineEvent::OutputWritten { path, bytes } => {
                info!(path = %path.display(), bytes, "output written")
            }
            PipelineEvent::MemoryUsage {
                before_bytes,
                after_bytes,
            } => info!(before_bytes, after_bytes, "memory usage before and after compaction"),
        }
    }

    fn on_failure(&self, ctx: &PipelineContext, severity: PipelineSeverity, error: &PipelineError) {
        error!(
            ?severity,
            url = %ctx.feed_url,
            primary_key = %ctx.primary_key,
            "pipeline failed: {error}"
        );
    }

    fn on_alert(&self, ctx: &PipelineContext, severity: PipelineSeverity, error: &PipelineError) {
        error!(
            ?severity,
            url = %ctx.feed_url,
            primary_key = %ctx.primary_key,
            "[ALERT] pipeline failed: {error}"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Counting {
        events: Mutex<usize>,
        failures: Mutex<usize>,
    }

    impl PipelineObserver for Counting {
        fn on_event(&self, _ctx: &PipelineContext, _event: &PipelineEvent) {
            *self.events.lock().unwrap() += 1;
        }

        fn on_failure(&self, _ctx: &PipelineContext, _s: PipelineSeverity, _e: &PipelineError) {
            *self.failures.lock().unwrap() += 1;
        }
    }

    fn ctx() -> PipelineContext {
        PipelineContext {
            feed_url: "https://example.org/feeds/licences/".into(),
            primary_key: "licence".into(),
        }
    }

    #[test]
    fn severities_are_ordered() {
        assert!(PipelineSeverity::Critical > PipelineSeverity::Error);
        assert!(PipelineSeverity::Error > PipelineSeverity::Warning);
        assert!(PipelineSeverity::Warning > PipelineSeverity::Info);
    }

    #[test]
    fn composite_fans_out_and_alert_defaults_to_failure() {
        let a = Arc::new(Counting::default());
        let b = Arc::new(Counting::default());
        let observers = vec![
            a.clone() as Arc<dyn PipelineObserver>,
            b.clone() as Arc<dyn PipelineObserver>,
        ];
        let composite = CompositeObserver::new(observers);

        let event = PipelineEvent::StageFinished {
            stage: Stage::Clean,
            rows: 1,
            columns: 2,
        };
        composite.on_event(&ctx(), &event);
        composite.on_alert(&ctx(), PipelineSeverity::Critical, &PipelineError::format("bad"));

        for o in [&a, &b] {
            assert_eq!(*o.events.lock().unwrap(), 1);
            assert_eq!(*o.failures.lock().unwrap(), 1);
        }
    }

    #[test]
    fn stage_names_are_snake_case() {
        let names: Vec<String> = [
            Stage::Extract,
            Stage::Normalize,
            Stage::LocalTimestamp,
            Stage::Geometry,
            Stage::Clean,
            Stage::Persist,
        ]
        .iter()
        .map(ToString::to_string)
        .collect();
        assert_eq!(
            names,
            ["extract", "normalize", "local_timestamp", "geometry", "clean", "persist"]
        );
    }
}
