use std::sync::LazyLock;
use std::thread;
use std::time::Duration;

use regex::Regex;
use reqwest::StatusCode;
use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{CONTENT_DISPOSITION, HeaderMap, HeaderValue, USER_AGENT};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::ApiSettings;
use crate::domain::{Dataset, DatasetId, DatasetSummary};
use crate::error::VizError;
use crate::ingest::UploadFile;

const RETRY_BASE_DELAY_MS: u64 = 200;

static FILENAME_PARAM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)filename\s*=\s*(?:"([^"]+)"|([^;\s]+))"#).expect("filename regex")
});

/// Rendered PDF report bytes plus the file name the server suggested.
#[derive(Debug, Clone)]
pub struct Report {
    pub filename: Option<String>,
    pub bytes: Vec<u8>,
}

/// Backend operations. Implementations must not mutate anything except on
/// `upload`.
pub trait DatasetApi: Send + Sync {
    /// Submits the file once and returns the stored dataset's summary.
    fn upload(&self, file: &UploadFile) -> Result<DatasetSummary, VizError>;
    fn list_datasets(&self) -> Result<Vec<DatasetSummary>, VizError>;
    fn get_dataset(&self, id: DatasetId) -> Result<Dataset, VizError>;
    fn get_summary(&self, id: DatasetId) -> Result<DatasetSummary, VizError>;
    fn generate_report(&self, id: DatasetId) -> Result<Report, VizError>;
}

#[derive(Clone)]
pub struct HttpDatasetApi {
    client: Client,
    base_url: String,
    read_retries: usize,
}

impl HttpDatasetApi {
    pub fn new(settings: &ApiSettings) -> Result<Self, VizError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("eqviz/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| VizError::Transport(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(settings.timeout)
            .build()
            .map_err(|err| VizError::Transport(err.to_string()))?;
        Ok(Self {
            client,
            base_url: settings.base_url.clone(),
            read_retries: settings.read_retries,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn upload_url(&self) -> String {
        format!("{}/upload/", self.base_url)
    }

    pub fn datasets_url(&self) -> String {
        format!("{}/datasets/", self.base_url)
    }

    pub fn dataset_url(&self, id: DatasetId) -> String {
        format!("{}/datasets/{id}/", self.base_url)
    }

    pub fn summary_url(&self, id: DatasetId) -> String {
        format!("{}/datasets/{id}/summary/", self.base_url)
    }

    pub fn report_url(&self, id: DatasetId) -> String {
        format!("{}/datasets/{id}/generate_pdf/", self.base_url)
    }

    fn get_json<T: DeserializeOwned>(&self, url: &str, id: Option<DatasetId>) -> Result<T, VizError> {
        let response = self.send_read(url)?;
        let response = handle_status(response, id)?;
        decode_body(response)
    }

    /// GET with bounded retries. Only reads go through here.
    fn send_read(&self, url: &str) -> Result<Response, VizError> {
        self.send_with_retries(|| self.client.get(url), url)
    }

    fn send_with_retries<F>(&self, mut make_req: F, url: &str) -> Result<Response, VizError>
    where
        F: FnMut() -> RequestBuilder,
    {
        let mut attempt = 0usize;
        loop {
            debug!(method = "GET", url, attempt, "api request");
            match make_req().send() {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < self.read_retries && is_retryable_status(status) {
                        warn!(url, status, attempt, "retrying read request");
                        backoff(attempt);
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < self.read_retries && is_retryable_error(&err) {
                        warn!(url, error = %err, attempt, "retrying read request");
                        backoff(attempt);
                        attempt += 1;
                        continue;
                    }
                    return Err(VizError::Transport(err.to_string()));
                }
            }
        }
    }
}

impl DatasetApi for HttpDatasetApi {
    fn upload(&self, file: &UploadFile) -> Result<DatasetSummary, VizError> {
        let url = self.upload_url();
        let part = Part::bytes(file.bytes().to_vec())
            .file_name(file.name().to_string())
            .mime_str("text/csv")
            .map_err(|err| VizError::Transport(err.to_string()))?;
        let form = Form::new().part("file", part);
        debug!(method = "POST", url = %url, file = file.name(), "api request");
        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .map_err(|err| VizError::Transport(err.to_string()))?;
        let response = handle_status(response, None)?;
        // The dataset is stored at this point; only the summary is needed.
        decode_body(response)
    }

    fn list_datasets(&self) -> Result<Vec<DatasetSummary>, VizError> {
        self.get_json(&self.datasets_url(), None)
    }

    fn get_dataset(&self, id: DatasetId) -> Result<Dataset, VizError> {
        self.get_json(&self.dataset_url(id), Some(id))
    }

    fn get_summary(&self, id: DatasetId) -> Result<DatasetSummary, VizError> {
        self.get_json(&self.summary_url(id), Some(id))
    }

    fn generate_report(&self, id: DatasetId) -> Result<Report, VizError> {
        let url = self.report_url(id);
        let response = self.send_read(&url)?;
        let response = handle_status(response, Some(id))?;
        let filename = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|value| value.to_str().ok())
            .and_then(content_disposition_filename);
        let bytes = response
            .bytes()
            .map_err(|err| VizError::Transport(err.to_string()))?;
        Ok(Report {
            filename,
            bytes: bytes.to_vec(),
        })
    }
}

/// Non-JSON bodies are transport failures. JSON of the wrong shape means the
/// server's data is bad, which is reported as such.
fn decode_body<T: DeserializeOwned>(response: Response) -> Result<T, VizError> {
    let value: Value = response
        .json()
        .map_err(|err| VizError::Transport(format!("invalid response body: {err}")))?;
    serde_json::from_value(value).map_err(|err| VizError::InvalidData(err.to_string()))
}

fn handle_status(response: Response, id: Option<DatasetId>) -> Result<Response, VizError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().unwrap_or_default();
    Err(status_error(status, &body, id))
}

/// Maps a non-2xx response onto the error taxonomy.
pub fn status_error(status: StatusCode, body: &str, id: Option<DatasetId>) -> VizError {
    if status == StatusCode::NOT_FOUND {
        if let Some(id) = id {
            return VizError::NotFound(id.to_string());
        }
    }
    match extract_error_message(body) {
        Some(message) => VizError::Api {
            status: status.as_u16(),
            message,
        },
        None => VizError::Transport(format!("server returned status {}", status.as_u16())),
    }
}

/// Pulls `error`, `message` or `detail` out of a JSON error body.
pub fn extract_error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    ["error", "message", "detail"]
        .iter()
        .find_map(|key| value.get(*key).and_then(|v| v.as_str()))
        .map(|message| message.to_string())
}

pub fn content_disposition_filename(header: &str) -> Option<String> {
    let captures = FILENAME_PARAM.captures(header)?;
    captures
        .get(1)
        .or_else(|| captures.get(2))
        .map(|value| value.as_str().trim().to_string())
        .filter(|value| !value.is_empty())
}

fn backoff(attempt: usize) {
    let delay = RETRY_BASE_DELAY_MS * (attempt as u64 + 1);
    thread::sleep(Duration::from_millis(delay));
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn urls_follow_backend_routes() {
        let api = HttpDatasetApi::new(&ApiSettings {
            base_url: "http://localhost:8000/api".to_string(),
            timeout: Duration::from_secs(5),
            read_retries: 0,
        })
        .unwrap();
        let id = DatasetId::new(3).unwrap();
        assert_eq!(api.upload_url(), "http://localhost:8000/api/upload/");
        assert_eq!(api.datasets_url(), "http://localhost:8000/api/datasets/");
        assert_eq!(api.dataset_url(id), "http://localhost:8000/api/datasets/3/");
        assert_eq!(
            api.summary_url(id),
            "http://localhost:8000/api/datasets/3/summary/"
        );
        assert_eq!(
            api.report_url(id),
            "http://localhost:8000/api/datasets/3/generate_pdf/"
        );
    }

    #[test]
    fn structured_body_becomes_api_error() {
        let err = status_error(
            StatusCode::BAD_REQUEST,
            r#"{"error": "CSV must contain columns: Equipment Name, Type"}"#,
            None,
        );
        assert_matches!(err, VizError::Api { status: 400, message } if message.starts_with("CSV must"));
    }

    #[test]
    fn unstructured_body_becomes_transport_error() {
        let err = status_error(StatusCode::BAD_GATEWAY, "<html>bad gateway</html>", None);
        assert_matches!(err, VizError::Transport(_));
    }

    #[test]
    fn not_found_on_dataset_route() {
        let id = DatasetId::new(99).unwrap();
        let err = status_error(StatusCode::NOT_FOUND, r#"{"detail":"Not found."}"#, Some(id));
        assert_matches!(err, VizError::NotFound(value) if value == "99");
    }

    #[test]
    fn filename_from_content_disposition() {
        assert_eq!(
            content_disposition_filename(r#"attachment; filename="plant.csv_report.pdf""#)
                .as_deref(),
            Some("plant.csv_report.pdf")
        );
        assert_eq!(
            content_disposition_filename("attachment; filename=report.pdf").as_deref(),
            Some("report.pdf")
        );
        assert_eq!(content_disposition_filename("inline"), None);
    }
}
