use std::fs;
use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::debug;

use crate::api::Report;
use crate::error::VizError;
use crate::presentation::FALLBACK_REPORT_NAME;

/// Picks where a report lands: an explicit target, else the suggested name,
/// else the server's name, else the fallback. Relative paths resolve under
/// `download_dir`.
pub fn resolve_target(
    download_dir: &Utf8Path,
    target: Option<&Utf8Path>,
    suggested: Option<&str>,
    report: &Report,
) -> Utf8PathBuf {
    let chosen = match target {
        Some(path) => path.to_path_buf(),
        None => {
            let name = suggested
                .or(report.filename.as_deref())
                .map(sanitize_filename)
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| FALLBACK_REPORT_NAME.to_string());
            Utf8PathBuf::from(name)
        }
    };
    if chosen.is_absolute() {
        chosen
    } else {
        download_dir.join(chosen)
    }
}

/// Keeps a server- or dataset-provided name inside the download directory.
fn sanitize_filename(name: &str) -> String {
    name.trim()
        .chars()
        .map(|ch| match ch {
            '/' | '\\' | ':' | '\0' => '_',
            other => other,
        })
        .collect::<String>()
        .trim_start_matches('.')
        .to_string()
}

/// Writes the report through a temp file in the target directory, so a
/// failed write never leaves a partial PDF behind.
pub fn save_report(path: &Utf8Path, bytes: &[u8]) -> Result<u64, VizError> {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_str().is_empty())
        .unwrap_or(Utf8Path::new("."));
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| VizError::Filesystem(format!("create {parent}: {err}")))?;
    let mut temp = tempfile::Builder::new()
        .prefix("eqviz-report")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| VizError::Filesystem(err.to_string()))?;
    temp.write_all(bytes)
        .map_err(|err| VizError::Filesystem(err.to_string()))?;
    temp.persist(path.as_std_path())
        .map_err(|err| VizError::Filesystem(format!("write {path}: {err}")))?;
    debug!(path = %path, size = bytes.len(), "saved report");
    Ok(bytes.len() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(filename: Option<&str>) -> Report {
        Report {
            filename: filename.map(str::to_string),
            bytes: b"%PDF-1.4".to_vec(),
        }
    }

    #[test]
    fn suggested_name_wins_over_header() {
        let dir = Utf8Path::new("/downloads");
        let path = resolve_target(
            dir,
            None,
            Some("plant.csv_report.pdf"),
            &report(Some("other.pdf")),
        );
        assert_eq!(path, Utf8PathBuf::from("/downloads/plant.csv_report.pdf"));
    }

    #[test]
    fn header_then_fallback() {
        let dir = Utf8Path::new("/downloads");
        assert_eq!(
            resolve_target(dir, None, None, &report(Some("x_report.pdf"))),
            Utf8PathBuf::from("/downloads/x_report.pdf")
        );
        assert_eq!(
            resolve_target(dir, None, None, &report(None)),
            Utf8PathBuf::from("/downloads/report.pdf")
        );
    }

    #[test]
    fn names_cannot_escape_download_dir() {
        let dir = Utf8Path::new("/downloads");
        let path = resolve_target(dir, None, Some("../../etc/passwd"), &report(None));
        assert!(path.starts_with("/downloads"));
        assert_eq!(path.parent(), Some(dir));
    }
}
