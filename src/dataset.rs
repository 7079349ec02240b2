//! Active dataset controller
//!
//! Owns the current `Dataset` and the three operations that replace it:
//! schema refresh, demo activation and file upload. They share one busy flag;
//! the app refuses to start a second one while it is set.

use crate::api::{ApiClient, ApiOutcome, ApiRequest, Endpoint, Transport, UploadFile};
use crate::error::ValidationError;
use crate::task::{RequestTicket, TicketCounter};
use explorer_types::Dataset;

/// The operation a dataset request belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetOp {
    RefreshSchema,
    UseDemo,
    Upload,
}

impl DatasetOp {
    /// Whether success switches the active dataset (and so invalidates the
    /// current query result)
    pub fn switches_dataset(self) -> bool {
        !matches!(self, DatasetOp::RefreshSchema)
    }
}

/// Request produced by a `begin_*` call
#[derive(Debug, Clone, PartialEq)]
pub struct PendingDatasetRequest {
    pub ticket: RequestTicket,
    pub op: DatasetOp,
    pub request: ApiRequest,
}

/// What `finish` did with an outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetUpdate {
    /// Ticket was not the latest; nothing changed
    Stale,
    /// Dataset replaced by this operation
    Replaced(DatasetOp),
    /// Operation failed; dataset unchanged, error recorded
    Failed(DatasetOp),
}

#[derive(Debug, Clone, Copy)]
struct InFlight {
    ticket: RequestTicket,
    op: DatasetOp,
}

#[derive(Debug, Default)]
pub struct DatasetController {
    dataset: Option<Dataset>,
    error: Option<String>,
    schema_error: Option<String>,
    selected_file: Option<UploadFile>,
    tickets: TicketCounter,
    in_flight: Option<InFlight>,
}

impl DatasetController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dataset(&self) -> Option<&Dataset> {
        self.dataset.as_ref()
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Error from the last demo/upload attempt
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Error from the last schema refresh
    pub fn schema_error(&self) -> Option<&str> {
        self.schema_error.as_deref()
    }

    pub fn selected_file(&self) -> Option<&UploadFile> {
        self.selected_file.as_ref()
    }

    pub fn select_file(&mut self, file: UploadFile) {
        tracing::debug!(filename = %file.filename, bytes = file.bytes.len(), "file selected");
        self.selected_file = Some(file);
    }

    pub fn clear_selected_file(&mut self) {
        self.selected_file = None;
    }

    pub fn begin_refresh_schema(&mut self) -> PendingDatasetRequest {
        self.schema_error = None;
        self.issue(DatasetOp::RefreshSchema, ApiRequest::bare(Endpoint::Schema))
    }

    pub fn begin_use_demo(&mut self) -> PendingDatasetRequest {
        self.error = None;
        self.schema_error = None;
        self.issue(DatasetOp::UseDemo, ApiRequest::bare(Endpoint::UseDemo))
    }

    /// Start an upload of the selected file. Without one, the error is set
    /// and no request is produced.
    pub fn begin_upload(&mut self) -> Result<PendingDatasetRequest, ValidationError> {
        let Some(file) = self.selected_file.clone() else {
            let err = ValidationError::NoFileSelected;
            self.error = Some(err.to_string());
            return Err(err);
        };
        self.error = None;
        self.schema_error = None;
        Ok(self.issue(DatasetOp::Upload, ApiRequest::upload(file)))
    }

    fn issue(&mut self, op: DatasetOp, request: ApiRequest) -> PendingDatasetRequest {
        let ticket = self.tickets.next();
        self.in_flight = Some(InFlight { ticket, op });
        tracing::info!(ticket = ticket.seq(), ?op, "dataset request issued");
        PendingDatasetRequest {
            ticket,
            op,
            request,
        }
    }

    /// Apply an outcome. The busy flag is cleared whatever happened, unless
    /// the outcome is stale.
    pub fn finish(&mut self, ticket: RequestTicket, outcome: ApiOutcome) -> DatasetUpdate {
        let op = match self.in_flight {
            Some(f) if f.ticket == ticket => f.op,
            _ => {
                tracing::debug!(ticket = ticket.seq(), "dropping stale dataset response");
                return DatasetUpdate::Stale;
            }
        };
        self.in_flight = None;

        let parsed = match outcome {
            Err(e) => Err(e.to_string()),
            Ok(response) if response.signals_failure() => Err(response.detail_message()),
            Ok(response) => response
                .parse::<Dataset>()
                .ok_or_else(|| "Unexpected dataset response".to_string()),
        };

        match parsed {
            Ok(dataset) => {
                tracing::info!(
                    ?op,
                    table = %dataset.table,
                    source = %dataset.source,
                    columns = dataset.columns.len(),
                    "dataset replaced"
                );
                self.dataset = Some(dataset);
                if op == DatasetOp::Upload {
                    self.selected_file = None;
                }
                DatasetUpdate::Replaced(op)
            }
            Err(message) => {
                tracing::warn!(?op, %message, "dataset request failed");
                match op {
                    DatasetOp::RefreshSchema => self.schema_error = Some(message),
                    DatasetOp::UseDemo | DatasetOp::Upload => self.error = Some(message),
                }
                DatasetUpdate::Failed(op)
            }
        }
    }

    pub async fn refresh_schema<T: Transport>(&mut self, api: &ApiClient<T>) -> DatasetUpdate {
        let pending = self.begin_refresh_schema();
        let outcome = api.send(pending.request).await;
        self.finish(pending.ticket, outcome)
    }

    pub async fn use_demo<T: Transport>(&mut self, api: &ApiClient<T>) -> DatasetUpdate {
        let pending = self.begin_use_demo();
        let outcome = api.send(pending.request).await;
        self.finish(pending.ticket, outcome)
    }

    pub async fn upload<T: Transport>(
        &mut self,
        api: &ApiClient<T>,
    ) -> Result<DatasetUpdate, ValidationError> {
        let pending = self.begin_upload()?;
        let outcome = api.send(pending.request).await;
        Ok(self.finish(pending.ticket, outcome))
    }
}
