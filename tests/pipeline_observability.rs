use std::sync::{Arc, Mutex};

use feed_tabulator::feed::FeedSource;
use feed_tabulator::geocode::{Boundary, BoundaryResolver, GeoJsonFileResolver};
use feed_tabulator::pipeline::{
    run, PipelineContext, PipelineEvent, PipelineObserver, PipelineOptions, PipelineSeverity, Stage,
};
use feed_tabulator::{PipelineError, PipelineResult};

const FEED_URL: &str = "https://api.nanaimo.ca/dataservice/v1/sql/BusinessLicences/";

struct FixtureFeed;

impl FeedSource for FixtureFeed {
    fn fetch(&self, _url: &str) -> PipelineResult<Vec<u8>> {
        Ok(std::fs::read("tests/fixtures/business_licences.xml")?)
    }
}

struct NoBoundary;

impl BoundaryResolver for NoBoundary {
    fn resolve(&self, place: &str) -> PipelineResult<Boundary> {
        Err(PipelineError::Geocode {
            place: place.to_string(),
            message: "no results".to_string(),
        })
    }
}

#[derive(Default)]
struct RecordingObserver {
    events: Mutex<Vec<PipelineEvent>>,
    failures: Mutex<Vec<PipelineSeverity>>,
    alerts: Mutex<Vec<PipelineSeverity>>,
}

impl PipelineObserver for RecordingObserver {
    fn on_event(&self, _ctx: &PipelineContext, event: &PipelineEvent) {
        self.events.lock().unwrap().push(event.clone());
    }

    fn on_failure(&self, _ctx: &PipelineContext, severity: PipelineSeverity, _error: &PipelineError) {
        self.failures.lock().unwrap().push(severity);
    }

    fn on_alert(&self, _ctx: &PipelineContext, severity: PipelineSeverity, _error: &PipelineError) {
        self.alerts.lock().unwrap().push(severity);
    }
}

fn options(dir: &tempfile::TempDir, obs: &Arc<RecordingObserver>, alert: PipelineSeverity) -> PipelineOptions {
    PipelineOptions {
        output_dir: dir.path().to_path_buf(),
        observer: Some(obs.clone()),
        alert_at_or_above: alert,
        ..Default::default()
    }
}

#[test]
fn observer_sees_every_stage_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let obs = Arc::new(RecordingObserver::default());
    let resolver = GeoJsonFileResolver::new("tests/fixtures/nanaimo_boundary.geojson");

    run(FEED_URL, "licence", &FixtureFeed, &resolver, &options(&dir, &obs, PipelineSeverity::Critical)).unwrap();

    let events = obs.events.lock().unwrap().clone();
    let stages: Vec<(Stage, usize, usize)> = events
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::StageFinished { stage, rows, columns } => Some((*stage, *rows, *columns)),
            _ => None,
        })
        .collect();
    assert_eq!(
        stages,
        vec![
            (Stage::Extract, 5, 8),
            (Stage::Normalize, 5, 8),
            (Stage::LocalTimestamp, 5, 9),
            (Stage::Geometry, 5, 10),
            (Stage::Clean, 3, 10),
            (Stage::Persist, 3, 10),
        ]
    );

    assert!(matches!(events[0], PipelineEvent::FeedFetched { bytes } if bytes > 0));
    let written = events
        .iter()
        .filter(|e| matches!(e, PipelineEvent::OutputWritten { .. }))
        .count();
    assert_eq!(written, 4);
    assert!(events.iter().any(|e| matches!(
        e,
        PipelineEvent::MemoryUsage { before_bytes, after_bytes } if after_bytes < before_bytes
    )));
    assert!(obs.failures.lock().unwrap().is_empty());
}

#[test]
fn observer_receives_failure_and_alert_on_critical_geocode_error() {
    let dir = tempfile::tempdir().unwrap();
    let obs = Arc::new(RecordingObserver::default());

    let _ = run(FEED_URL, "licence", &FixtureFeed, &NoBoundary, &options(&dir, &obs, PipelineSeverity::Critical))
        .unwrap_err();

    let failures = obs.failures.lock().unwrap().clone();
    let alerts = obs.alerts.lock().unwrap().clone();
    assert_eq!(failures, vec![PipelineSeverity::Critical]);
    assert_eq!(alerts, vec![PipelineSeverity::Critical]);
}

#[test]
fn observer_receives_failure_without_alert_for_non_critical_error() {
    let dir = tempfile::tempdir().unwrap();
    let obs = Arc::new(RecordingObserver::default());

    // Missing primary key -> Error severity (not Critical) -> should not alert
    let _ = run(FEED_URL, "folder", &FixtureFeed, &NoBoundary, &options(&dir, &obs, PipelineSeverity::Critical))
        .unwrap_err();

    let failures = obs.failures.lock().unwrap().clone();
    assert_eq!(failures, vec![PipelineSeverity::Error]);
    assert!(obs.alerts.lock().unwrap().is_empty());
}

#[test]
fn lower_threshold_alerts_on_configuration_errors() {
    let dir = tempfile::tempdir().unwrap();
    let obs = Arc::new(RecordingObserver::default());
    let opts = PipelineOptions {
        timezone: "Nowhere/Special".to_string(),
        ..options(&dir, &obs, PipelineSeverity::Error)
    };

    let _ = run(FEED_URL, "licence", &FixtureFeed, &NoBoundary, &opts).unwrap_err();

    assert_eq!(obs.alerts.lock().unwrap().clone(), vec![PipelineSeverity::Error]);
    assert!(obs.events.lock().unwrap().is_empty());
}
