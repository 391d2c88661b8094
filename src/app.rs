use std::fs::File;
use std::path::Path;
use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::info;

use crate::aggregate::{Aggregates, aggregate};
use crate::api::DatasetApi;
use crate::domain::{Dataset, DatasetId, DatasetSummary};
use crate::error::VizError;
use crate::export;
use crate::ingest::{UploadFile, parse_rows};
use crate::presentation::{ChartSeries, Table, report_filename, to_chart_series, to_table};
use crate::store::DatasetStore;

#[derive(Debug, Clone, Serialize)]
pub struct UploadResult {
    pub dataset: DatasetSummary,
    pub rows: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListResult {
    pub datasets: Vec<DatasetSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ShowResult {
    pub dataset: DatasetSummary,
    pub charts: ChartSeries,
    pub table: Table,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification: Option<Verification>,
}

/// Aggregates recomputed from a dataset's rows, compared with the stored ones.
#[derive(Debug, Clone, Serialize)]
pub struct Verification {
    pub consistent: bool,
    pub recomputed: Aggregates,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportResult {
    pub id: DatasetId,
    pub path: String,
    pub bytes: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct InspectResult {
    pub file: String,
    pub aggregates: Aggregates,
    pub charts: ChartSeries,
    pub table: Table,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

impl ProgressEvent {
    fn phase(phase: &str, detail: impl AsRef<str>) -> Self {
        Self {
            message: format!("phase={phase}; {}", detail.as_ref()),
            elapsed: None,
        }
    }

    fn timed(message: impl Into<String>, started: Instant) -> Self {
        Self {
            message: message.into(),
            elapsed: Some(started.elapsed()),
        }
    }
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

pub struct App<A: DatasetApi> {
    store: DatasetStore<A>,
    download_dir: Utf8PathBuf,
}

impl<A: DatasetApi> App<A> {
    pub fn new(api: A, download_dir: Utf8PathBuf) -> Self {
        Self {
            store: DatasetStore::new(api),
            download_dir,
        }
    }

    pub fn store(&self) -> &DatasetStore<A> {
        &self.store
    }

    pub fn download_dir(&self) -> &Utf8Path {
        &self.download_dir
    }

    /// Validates `path` and submits it once. Nothing is retried.
    pub fn upload(
        &self,
        path: Option<&Path>,
        sink: &dyn ProgressSink,
    ) -> Result<UploadResult, VizError> {
        sink.event(ProgressEvent::phase("Validate", "checking selected file"));
        let file = UploadFile::from_path(path)?;

        sink.event(ProgressEvent::phase(
            "Upload",
            format!("sending {} ({} bytes)", file.name(), file.bytes().len()),
        ));
        let started = Instant::now();
        let dataset = self.store.api().upload(&file)?;
        sink.event(ProgressEvent::timed("upload.response", started));
        info!(id = %dataset.id, name = %dataset.name, "dataset uploaded");

        Ok(UploadResult {
            rows: dataset.aggregates.total_count,
            dataset,
        })
    }

    pub fn list(&self, sink: &dyn ProgressSink) -> Result<ListResult, VizError> {
        sink.event(ProgressEvent::phase("Fetch", "loading upload history"));
        let started = Instant::now();
        let datasets = self.store.list_recent()?;
        sink.event(ProgressEvent::timed("datasets.response", started));
        Ok(ListResult { datasets })
    }

    pub fn dataset(&self, id: DatasetId) -> Result<Dataset, VizError> {
        self.store.get_by_id(id)
    }

    pub fn show(
        &self,
        id: DatasetId,
        verify: bool,
        sink: &dyn ProgressSink,
    ) -> Result<ShowResult, VizError> {
        sink.event(ProgressEvent::phase("Fetch", format!("loading dataset {id}")));
        let started = Instant::now();
        let dataset = self.store.get_by_id(id)?;
        sink.event(ProgressEvent::timed("dataset.response", started));

        let verification = verify.then(|| {
            sink.event(ProgressEvent::phase("Aggregate", "recomputing from rows"));
            verify_dataset(&dataset)
        });

        Ok(ShowResult {
            charts: to_chart_series(&dataset.summary.aggregates),
            table: to_table(&dataset.rows),
            dataset: dataset.summary,
            verification,
        })
    }

    pub fn summary(
        &self,
        id: DatasetId,
        sink: &dyn ProgressSink,
    ) -> Result<DatasetSummary, VizError> {
        sink.event(ProgressEvent::phase("Fetch", format!("loading summary {id}")));
        self.store.get_summary(id)
    }

    /// Downloads the PDF for `id` and saves it. With no explicit `target`
    /// the file is named after `dataset_name` when given, else after the
    /// server's suggestion.
    pub fn report(
        &self,
        id: DatasetId,
        dataset_name: Option<&str>,
        target: Option<&Utf8Path>,
        sink: &dyn ProgressSink,
    ) -> Result<ReportResult, VizError> {
        sink.event(ProgressEvent::phase("Fetch", format!("requesting report {id}")));
        let started = Instant::now();
        let report = self.store.api().generate_report(id)?;
        sink.event(ProgressEvent::timed("report.response", started));

        let suggested = dataset_name.map(report_filename);
        let path = export::resolve_target(
            &self.download_dir,
            target,
            suggested.as_deref(),
            &report,
        );
        sink.event(ProgressEvent::phase("Store", format!("writing {path}")));
        let bytes = export::save_report(&path, &report.bytes)?;
        info!(id = %id, path = %path, "report saved");
        Ok(ReportResult {
            id,
            path: path.to_string(),
            bytes,
        })
    }

    /// Aggregates a local CSV without talking to the backend.
    pub fn inspect(&self, path: &Path, sink: &dyn ProgressSink) -> Result<InspectResult, VizError> {
        inspect_file(path, sink)
    }
}

pub fn inspect_file(path: &Path, sink: &dyn ProgressSink) -> Result<InspectResult, VizError> {
    sink.event(ProgressEvent::phase("Validate", format!("reading {}", path.display())));
    let file = File::open(path)
        .map_err(|err| VizError::Validation(format!("cannot open {}: {err}", path.display())))?;
    let rows = parse_rows(file)?;
    sink.event(ProgressEvent::phase(
        "Aggregate",
        format!("{} rows", rows.len()),
    ));
    let aggregates = aggregate(&rows);
    Ok(InspectResult {
        file: path.display().to_string(),
        charts: to_chart_series(&aggregates),
        table: to_table(&rows),
        aggregates,
    })
}

pub fn verify_dataset(dataset: &Dataset) -> Verification {
    let recomputed = aggregate(&dataset.rows);
    Verification {
        consistent: recomputed.matches(&dataset.summary.aggregates),
        recomputed: recomputed.rounded(),
    }
}
