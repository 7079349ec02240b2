//! NL2SQL explorer client core
//!
//! Turns questions and pointer gestures into requests against a
//! natural-language query service, tracks each request's lifecycle, manages
//! the active dataset, and positions the explorer's floating windows.
//!
//! - `query`: ask / retry and the current result
//! - `dataset`: schema refresh, demo activation, upload
//! - `suggest`: example prompts from the dataset's columns
//! - `window`, `geometry`: draggable floating windows
//! - `api`: transport seam and defensive response reading
//! - `app`: the event loop gluing these together

pub mod api;
pub mod app;
pub mod config;
pub mod dataset;
pub mod error;
pub mod geometry;
pub mod query;
pub mod suggest;
pub mod task;
pub mod window;

pub use api::{
    ApiClient, ApiOutcome, ApiRequest, ApiResponse, Endpoint, HttpTransport, RawResponse,
    RequestBody, ScriptedTransport, Transport, UploadFile,
};
pub use app::{AppEvent, AsyncState, ExplorerApp};
pub use config::ExplorerConfig;
pub use dataset::{DatasetController, DatasetOp, DatasetUpdate, PendingDatasetRequest};
pub use error::{ConfigError, ExplorerError, Result, TransportError, ValidationError};
pub use geometry::{Pos, Rect, Size};
pub use query::{PendingQuery, QueryFailure, QueryKind, QueryResult, QuerySession};
pub use suggest::{suggest, ExamplePrompt};
pub use task::{RequestTicket, TaskStatus};
pub use window::{PointerButton, PointerEvent, PointerEventKind, WindowKind, WindowManager};

pub use explorer_types;
