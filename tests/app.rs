use std::fs;
use std::sync::Mutex;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;
use chrono::{TimeZone, Utc};

use equipment_visualizer::aggregate::aggregate;
use equipment_visualizer::api::{DatasetApi, Report};
use equipment_visualizer::app::{App, ProgressEvent, ProgressSink};
use equipment_visualizer::domain::{Dataset, DatasetId, DatasetSummary, Row};
use equipment_visualizer::error::VizError;
use equipment_visualizer::ingest::UploadFile;
use equipment_visualizer::output::JsonOutput;

const PLANT_CSV: &str = "\
Equipment Name,Type,Flowrate,Pressure,Temperature
Pump-1,Pump,120,5.2,110
Compressor-1,Compressor,95,8.4,95
";

/// Stands in for the backend: uploads are parsed and aggregated in memory.
#[derive(Default)]
struct MockApi {
    datasets: Mutex<Vec<Dataset>>,
    calls: Mutex<usize>,
}

impl MockApi {
    fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }

    fn record(&self) {
        *self.calls.lock().unwrap() += 1;
    }

    fn find(&self, id: DatasetId) -> Result<Dataset, VizError> {
        self.datasets
            .lock()
            .unwrap()
            .iter()
            .find(|dataset| dataset.id() == id)
            .cloned()
            .ok_or_else(|| VizError::NotFound(id.to_string()))
    }
}

impl DatasetApi for MockApi {
    fn upload(&self, file: &UploadFile) -> Result<DatasetSummary, VizError> {
        self.record();
        let rows = file.rows()?;
        let mut datasets = self.datasets.lock().unwrap();
        let id = DatasetId::new(datasets.len() as u64 + 1).unwrap();
        let dataset = Dataset {
            summary: DatasetSummary {
                id,
                name: file.name().to_string(),
                uploaded_at: Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, id.get() as u32).unwrap(),
                aggregates: aggregate(&rows).rounded(),
            },
            rows,
        };
        let summary = dataset.summary.clone();
        datasets.push(dataset);
        Ok(summary)
    }

    fn list_datasets(&self) -> Result<Vec<DatasetSummary>, VizError> {
        self.record();
        Ok(self
            .datasets
            .lock()
            .unwrap()
            .iter()
            .map(|dataset| dataset.summary.clone())
            .collect())
    }

    fn get_dataset(&self, id: DatasetId) -> Result<Dataset, VizError> {
        self.record();
        self.find(id)
    }

    fn get_summary(&self, id: DatasetId) -> Result<DatasetSummary, VizError> {
        self.record();
        self.find(id).map(|dataset| dataset.summary)
    }

    fn generate_report(&self, id: DatasetId) -> Result<Report, VizError> {
        self.record();
        let dataset = self.find(id)?;
        Ok(Report {
            filename: Some(format!("{}_report.pdf", dataset.name())),
            bytes: b"%PDF-1.4 mock".to_vec(),
        })
    }
}

#[derive(Default)]
struct RecordingSink {
    messages: Mutex<Vec<String>>,
}

impl ProgressSink for RecordingSink {
    fn event(&self, event: ProgressEvent) {
        self.messages.lock().unwrap().push(event.message);
    }
}

fn app_in(temp: &tempfile::TempDir) -> App<MockApi> {
    let download_dir = Utf8PathBuf::from_path_buf(temp.path().join("downloads")).unwrap();
    App::new(MockApi::default(), download_dir)
}

fn write_csv(temp: &tempfile::TempDir, name: &str, content: &str) -> std::path::PathBuf {
    let path = temp.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn upload_without_file_never_reaches_backend() {
    let temp = tempfile::tempdir().unwrap();
    let app = app_in(&temp);
    let err = app.upload(None, &JsonOutput).unwrap_err();
    assert_matches!(err, VizError::Validation(_));
    assert_eq!(app.store().api().calls(), 0);
}

#[test]
fn upload_rejects_non_csv() {
    let temp = tempfile::tempdir().unwrap();
    let app = app_in(&temp);
    let path = write_csv(&temp, "plant.txt", PLANT_CSV);
    assert_matches!(
        app.upload(Some(path.as_path()), &JsonOutput),
        Err(VizError::Validation(_))
    );
    assert_eq!(app.store().api().calls(), 0);
}

#[test]
fn upload_then_list() {
    let temp = tempfile::tempdir().unwrap();
    let app = app_in(&temp);
    let path = write_csv(&temp, "plant.csv", PLANT_CSV);
    let sink = RecordingSink::default();

    let uploaded = app.upload(Some(path.as_path()), &sink).unwrap();
    assert_eq!(uploaded.rows, 2);
    assert_eq!(uploaded.dataset.name, "plant.csv");
    assert_eq!(uploaded.dataset.aggregates.total_count, 2);
    assert_eq!(uploaded.dataset.aggregates.avg_flowrate, 107.5);
    assert_eq!(app.store().api().calls(), 1);

    let messages = sink.messages.lock().unwrap();
    assert!(messages.iter().any(|message| message.starts_with("phase=Validate")));
    assert!(messages.iter().any(|message| message.starts_with("phase=Upload")));
    drop(messages);

    let listed = app.list(&JsonOutput).unwrap();
    assert_eq!(listed.datasets.len(), 1);
    assert_eq!(listed.datasets[0].id, uploaded.dataset.id);
}

#[test]
fn header_only_upload_has_zero_aggregates() {
    let temp = tempfile::tempdir().unwrap();
    let app = app_in(&temp);
    let path = write_csv(
        &temp,
        "empty.csv",
        "Equipment Name,Type,Flowrate,Pressure,Temperature\n",
    );
    let uploaded = app.upload(Some(path.as_path()), &JsonOutput).unwrap();
    assert_eq!(uploaded.rows, 0);
    assert_eq!(uploaded.dataset.aggregates.total_count, 0);
    assert_eq!(uploaded.dataset.aggregates.avg_temperature, 0.0);
    assert!(uploaded.dataset.aggregates.type_distribution.is_empty());
}

#[test]
fn report_is_named_after_dataset() {
    let temp = tempfile::tempdir().unwrap();
    let app = app_in(&temp);
    let path = write_csv(&temp, "plant.csv", PLANT_CSV);
    let id = app.upload(Some(path.as_path()), &JsonOutput).unwrap().dataset.id;

    let result = app
        .report(id, Some("plant.csv"), None, &JsonOutput)
        .unwrap();
    let expected = temp.path().join("downloads").join("plant.csv_report.pdf");
    assert_eq!(result.path, expected.to_str().unwrap());
    assert_eq!(fs::read(&expected).unwrap(), b"%PDF-1.4 mock");
    assert_eq!(result.bytes, 13);
}

#[test]
fn report_to_explicit_target() {
    let temp = tempfile::tempdir().unwrap();
    let app = app_in(&temp);
    let path = write_csv(&temp, "plant.csv", PLANT_CSV);
    let id = app.upload(Some(path.as_path()), &JsonOutput).unwrap().dataset.id;

    let target = Utf8PathBuf::from_path_buf(temp.path().join("out").join("custom.pdf")).unwrap();
    let result = app.report(id, None, Some(target.as_path()), &JsonOutput).unwrap();
    assert_eq!(result.path, target.as_str());
    assert!(target.as_std_path().is_file());
}

#[test]
fn report_for_unknown_dataset_writes_nothing() {
    let temp = tempfile::tempdir().unwrap();
    let app = app_in(&temp);
    let err = app
        .report(DatasetId::new(9).unwrap(), None, None, &JsonOutput)
        .unwrap_err();
    assert_matches!(err, VizError::NotFound(_));
    assert!(!temp.path().join("downloads").exists());
}

#[test]
fn show_with_verification() {
    let temp = tempfile::tempdir().unwrap();
    let app = app_in(&temp);
    let path = write_csv(&temp, "plant.csv", PLANT_CSV);
    let id = app.upload(Some(path.as_path()), &JsonOutput).unwrap().dataset.id;

    let shown = app.show(id, true, &JsonOutput).unwrap();
    assert_eq!(shown.table.rows.len(), 2);
    assert_eq!(shown.table.rows[0][0], "Pump-1");
    assert_eq!(shown.charts.averages.values, vec![107.5, 6.8, 102.5]);
    assert_eq!(
        shown.charts.type_distribution.categories,
        vec!["Pump", "Compressor"]
    );
    let verification = shown.verification.unwrap();
    assert!(verification.consistent);
    assert_eq!(verification.recomputed.total_count, 2);

    let plain = app.show(id, false, &JsonOutput).unwrap();
    assert!(plain.verification.is_none());
}

#[test]
fn verification_flags_drift() {
    let rows = vec![Row::new("Pump-1", "Pump", 10.0, 1.0, 20.0).unwrap()];
    let mut stored = aggregate(&rows);
    stored.avg_flowrate = 11.0;
    let dataset = Dataset {
        summary: DatasetSummary {
            id: DatasetId::new(1).unwrap(),
            name: "drift.csv".to_string(),
            uploaded_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            aggregates: stored,
        },
        rows,
    };
    let verification = equipment_visualizer::app::verify_dataset(&dataset);
    assert!(!verification.consistent);
    assert_eq!(verification.recomputed.avg_flowrate, 10.0);
}

#[test]
fn inspect_local_file() {
    let temp = tempfile::tempdir().unwrap();
    let app = app_in(&temp);
    let path = write_csv(&temp, "plant.csv", PLANT_CSV);
    let inspected = app.inspect(&path, &JsonOutput).unwrap();
    assert_eq!(inspected.aggregates.total_count, 2);
    assert_eq!(inspected.table.rows.len(), 2);
    assert_eq!(app.store().api().calls(), 0);
}

#[test]
fn inspect_reports_bad_row() {
    let temp = tempfile::tempdir().unwrap();
    let app = app_in(&temp);
    let path = write_csv(
        &temp,
        "bad.csv",
        "Equipment Name,Type,Flowrate,Pressure,Temperature\nPump-1,Pump,fast,5.2,110\n",
    );
    assert_matches!(
        app.inspect(&path, &JsonOutput),
        Err(VizError::InvalidRow { line: 2, .. })
    );
}
