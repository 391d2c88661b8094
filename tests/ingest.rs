use std::fs;

use assert_matches::assert_matches;

use equipment_visualizer::error::VizError;
use equipment_visualizer::ingest::{UploadFile, parse_rows};

#[test]
fn upload_file_from_disk() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("Plant A.csv");
    fs::write(
        &path,
        "Equipment Name,Type,Flowrate,Pressure,Temperature\nHX-1,Heat Exchanger,80.5,3.1,150\n",
    )
    .unwrap();

    let file = UploadFile::from_path(Some(path.as_path())).unwrap();
    assert_eq!(file.name(), "Plant A.csv");
    let rows = file.rows().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].equipment_type, "Heat Exchanger");
    assert_eq!(rows[0].flowrate, 80.5);
}

#[test]
fn missing_or_directory_paths() {
    let temp = tempfile::tempdir().unwrap();
    assert_matches!(UploadFile::from_path(None), Err(VizError::Validation(_)));
    assert_matches!(
        UploadFile::from_path(Some(temp.path())),
        Err(VizError::Validation(_))
    );
    let absent = temp.path().join("absent.csv");
    assert_matches!(
        UploadFile::from_path(Some(absent.as_path())),
        Err(VizError::Validation(_))
    );
}

#[test]
fn header_with_bom_and_padding() {
    let csv = "\u{feff}Equipment Name , Type,Flowrate,Pressure,Temperature\nV-1,Valve,10,1.5,40\n";
    let rows = parse_rows(csv.as_bytes()).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].name, "V-1");
}

#[test]
fn short_record_is_an_invalid_row() {
    let csv = "Equipment Name,Type,Flowrate,Pressure,Temperature\nV-1,Valve,10\n";
    assert_matches!(
        parse_rows(csv.as_bytes()),
        Err(VizError::InvalidRow { line: 2, .. })
    );
}
