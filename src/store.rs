use tracing::debug;

use crate::api::DatasetApi;
use crate::domain::{Dataset, DatasetId, DatasetSummary};
use crate::error::VizError;

/// Upper bound of the upload history.
pub const RECENT_LIMIT: usize = 5;

/// Read-only view of the backend's datasets.
#[derive(Clone)]
pub struct DatasetStore<A: DatasetApi> {
    api: A,
}

impl<A: DatasetApi> DatasetStore<A> {
    pub fn new(api: A) -> Self {
        Self { api }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    /// The newest datasets first, never more than [`RECENT_LIMIT`].
    ///
    /// The backend already trims and orders its list; both are enforced here
    /// as well so callers can rely on them.
    pub fn list_recent(&self) -> Result<Vec<DatasetSummary>, VizError> {
        let mut datasets = self.api.list_datasets()?;
        let received = datasets.len();
        datasets.sort_by(|a, b| {
            b.uploaded_at
                .cmp(&a.uploaded_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        datasets.truncate(RECENT_LIMIT);
        debug!(received, kept = datasets.len(), "listed recent datasets");
        Ok(datasets)
    }

    pub fn get_by_id(&self, id: DatasetId) -> Result<Dataset, VizError> {
        let dataset = self.api.get_dataset(id)?;
        if dataset.id() != id {
            return Err(VizError::Transport(format!(
                "requested dataset {id} but server returned {}",
                dataset.id()
            )));
        }
        Ok(dataset)
    }

    pub fn get_summary(&self, id: DatasetId) -> Result<DatasetSummary, VizError> {
        self.api.get_summary(id)
    }
}
