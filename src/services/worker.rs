//! Background worker running visualization preparation off the UI path
//!
//! Requests go in over an unbounded channel and responses come back tagged
//! with the request token, so the caller can discard results that a newer
//! request has superseded.

use crate::core::{RequestToken, Table, TableId, VisualizationData, VisualizationDescriptor, VisualizationError};
use crate::services::visualization_service::VisualizationService;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

/// Which visualization of which table a request or response belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VisualizationKey {
    pub table_id: TableId,
    pub index: usize,
}

#[derive(Debug, Clone)]
pub struct PrepareRequest {
    pub token: RequestToken,
    pub key: VisualizationKey,
    /// Post-redaction, post-search snapshot
    pub table: Arc<Table>,
    pub descriptor: VisualizationDescriptor,
    pub cancel: CancellationToken,
}

#[derive(Debug, Clone, PartialEq)]
pub enum VisualizationStatus {
    Loading,
    /// `None` renders as an empty chart
    Success(Option<VisualizationData>),
    Error(String),
}

impl VisualizationStatus {
    pub fn is_loading(&self) -> bool {
        matches!(self, VisualizationStatus::Loading)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PrepareResponse {
    pub token: RequestToken,
    pub key: VisualizationKey,
    pub status: VisualizationStatus,
}

/// Handle to the worker task
pub struct VisualizationWorker {
    tx: UnboundedSender<PrepareRequest>,
    handle: JoinHandle<()>,
}

impl VisualizationWorker {
    /// Spawn the worker on the current tokio runtime
    pub fn spawn(service: Arc<VisualizationService>) -> (Self, UnboundedReceiver<PrepareResponse>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<PrepareRequest>();
        let (response_tx, response_rx) = mpsc::unbounded_channel::<PrepareResponse>();

        let handle = tokio::spawn(async move {
            while let Some(request) = rx.recv().await {
                let service = Arc::clone(&service);
                let response_tx = response_tx.clone();
                tokio::spawn(async move {
                    if let Some(response) = run_request(service, request).await {
                        // Receiver gone means the container was dropped
                        let _ = response_tx.send(response);
                    }
                });
            }
            debug!("Visualization worker stopped");
        });

        (Self { tx, handle }, response_rx)
    }

    /// Queue a request. Returns false when the worker has stopped.
    pub fn submit(&self, request: PrepareRequest) -> bool {
        trace!(token = %request.token, table = %request.key.table_id, index = request.key.index, "Submitting visualization request");
        self.tx.send(request).is_ok()
    }

    /// Stop accepting requests and wait for the dispatch loop to finish
    pub async fn shutdown(self) {
        drop(self.tx);
        if let Err(e) = self.handle.await {
            error!("Visualization worker panicked: {e}");
        }
    }
}

async fn run_request(service: Arc<VisualizationService>, request: PrepareRequest) -> Option<PrepareResponse> {
    let PrepareRequest {
        token,
        key,
        table,
        descriptor,
        cancel,
    } = request;

    if cancel.is_cancelled() {
        trace!(token = %token, "Skipping cancelled visualization request");
        return None;
    }

    let result = tokio::task::spawn_blocking(move || service.prepare(&table, &descriptor)).await;

    if cancel.is_cancelled() {
        trace!(token = %token, "Dropping result of cancelled visualization request");
        return None;
    }

    Some(PrepareResponse {
        token,
        status: classify(&key, result),
        key,
    })
}

/// Map a preparation result to the status shown for the visualization
pub fn classify(
    key: &VisualizationKey,
    result: Result<Result<Option<VisualizationData>, VisualizationError>, JoinError>,
) -> VisualizationStatus {
    match result {
        Ok(Ok(data)) => VisualizationStatus::Success(data),
        Ok(Err(VisualizationError::InvalidTimeValue(value))) => {
            debug!(table = %key.table_id, index = key.index, value = %value, "Invalid time value, rendering empty chart");
            VisualizationStatus::Success(None)
        }
        Ok(Err(e)) => {
            error!(table = %key.table_id, index = key.index, "Failed to prepare visualization: {e}");
            VisualizationStatus::Error(e.to_string())
        }
        Err(e) => {
            error!(table = %key.table_id, index = key.index, "Visualization task failed: {e}");
            VisualizationStatus::Error(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Row, Translatable};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn key() -> VisualizationKey {
        VisualizationKey {
            table_id: TableId::from("t"),
            index: 0,
        }
    }

    fn request(dates: &[&str], cancel: CancellationToken) -> PrepareRequest {
        let table = Table::new(
            "t",
            Translatable::new(),
            vec!["Date".into()],
            dates
                .iter()
                .enumerate()
                .map(|(i, date)| Row::new(i.to_string(), vec![date.to_string()]))
                .collect(),
        );
        let descriptor = VisualizationDescriptor::from_json(&json!({
            "type": "line",
            "group": {"column": "Date", "dateFormat": "day"},
            "values": [{"column": "Date"}]
        }))
        .unwrap();
        PrepareRequest {
            token: RequestToken::new(),
            key: key(),
            table: Arc::new(table),
            descriptor,
            cancel,
        }
    }

    #[test]
    fn test_invalid_time_value_is_empty_success() {
        let status = classify(&key(), Ok(Err(VisualizationError::InvalidTimeValue("x".into()))));
        assert_eq!(status, VisualizationStatus::Success(None));
    }

    #[test]
    fn test_other_errors_are_reported() {
        let status = classify(&key(), Ok(Err(VisualizationError::MissingColumn("Date".into()))));
        assert!(matches!(status, VisualizationStatus::Error(msg) if msg.contains("Date")));
    }

    #[tokio::test]
    async fn test_worker_round_trip() {
        let (worker, mut responses) = VisualizationWorker::spawn(Arc::new(VisualizationService::default()));
        let request = request(&["2023-01-01"], CancellationToken::new());
        let token = request.token;
        assert!(worker.submit(request));

        let response = responses.recv().await.unwrap();
        assert_eq!(response.token, token);
        assert_eq!(response.key, key());
        assert!(matches!(response.status, VisualizationStatus::Success(Some(_))));

        worker.shutdown().await;
    }

    #[tokio::test]
    async fn test_cancelled_request_produces_no_response() {
        let service = Arc::new(VisualizationService::default());
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert_eq!(run_request(service, request(&["2023-01-01"], cancel)).await, None);
    }

    #[tokio::test]
    async fn test_unfillable_date_range_renders_empty_chart() {
        let service = Arc::new(VisualizationService::default());
        let request = request(&["0001-01-01", "2023-01-01"], CancellationToken::new());
        assert!(matches!(
            service.prepare(&request.table, &request.descriptor),
            Err(VisualizationError::InvalidTimeValue(_))
        ));

        let response = run_request(service, request).await.unwrap();
        assert_eq!(response.status, VisualizationStatus::Success(None));
    }
}
