//! Explorer application state
//!
//! Wires the query session, dataset controller and window manager together
//! and runs their requests.
//!
//! 1. `handle_event` checks the gates, asks a controller to `begin_*`, and
//!    spawns the request on the runtime
//! 2. the spawned task pushes its outcome into `AsyncState`
//! 3. `process_async_results` drains `AsyncState` (lock dropped first) and
//!    hands each outcome to the controller's `finish`
//!
//! Outcomes are applied in arrival order. Controller state is only ever
//! touched from step 1 and step 3.

use crate::api::{ApiClient, ApiOutcome, ApiRequest, Endpoint, HttpTransport, Transport, UploadFile};
use crate::config::ExplorerConfig;
use crate::dataset::{DatasetController, DatasetOp, DatasetUpdate};
use crate::error::ValidationError;
use crate::geometry::{Rect, Size};
use crate::query::QuerySession;
use crate::suggest::{suggest, ExamplePrompt};
use crate::task::{RequestTicket, TaskStatus, TicketCounter};
use crate::window::{PointerEvent, WindowKind, WindowManager};
use explorer_types::{HealthStatus, TablePreview};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::Instrument;
use uuid::Uuid;

// =============================================================================
// EVENTS
// =============================================================================

/// User intent, as delivered by whatever front end drives the app
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    // -------------------------------------------------------------------------
    // Query
    // -------------------------------------------------------------------------
    Ask(String),
    /// Retry the current retryable failure
    Retry,
    DismissNetworkError,

    // -------------------------------------------------------------------------
    // Dataset
    // -------------------------------------------------------------------------
    RefreshSchema,
    UseDemo,
    SelectFile(UploadFile),
    ClearSelectedFile,
    Upload,
    LoadPreview,
    CheckHealth,

    // -------------------------------------------------------------------------
    // Windows
    // -------------------------------------------------------------------------
    OpenWindow(WindowKind),
    CloseWindow(WindowKind),
    /// Open or close the dropdown anchored at the given bounds
    ToggleMenu(Rect),
    TitleBarPressed(WindowKind, PointerEvent),
    /// Pointer event seen anywhere in the viewport
    Pointer(PointerEvent),
    ViewportResized(Size),
}

// =============================================================================
// ASYNC STATE
// =============================================================================

/// An outcome delivered by a spawned request
#[derive(Debug)]
enum Delivered {
    Query(RequestTicket, ApiOutcome),
    Dataset(RequestTicket, ApiOutcome),
    Preview(RequestTicket, Result<TablePreview, String>),
    Health(RequestTicket, Result<HealthStatus, String>),
}

/// Results written by spawned tasks, read by `process_async_results`
#[derive(Debug, Default)]
pub struct AsyncState {
    delivered: Vec<Delivered>,
}

impl AsyncState {
    /// Take everything delivered so far, oldest first
    fn extract_pending(&mut self) -> Vec<Delivered> {
        std::mem::take(&mut self.delivered)
    }

    pub fn is_empty(&self) -> bool {
        self.delivered.is_empty()
    }
}

fn lock(state: &Mutex<AsyncState>) -> MutexGuard<'_, AsyncState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// =============================================================================
// APP
// =============================================================================

pub struct ExplorerApp<T: Transport + 'static = HttpTransport> {
    api: Arc<ApiClient<T>>,
    runtime: Handle,
    query: QuerySession,
    dataset: DatasetController,
    windows: WindowManager,
    preview: TaskStatus<TablePreview, String>,
    health: TaskStatus<HealthStatus, String>,
    /// Tickets for preview and health requests
    tickets: TicketCounter,
    async_state: Arc<Mutex<AsyncState>>,
    tasks: Vec<JoinHandle<()>>,
    session_id: Uuid,
    span: tracing::Span,
}

impl ExplorerApp<HttpTransport> {
    /// App talking to the configured service over HTTP
    pub fn from_config(config: &ExplorerConfig, runtime: Handle) -> Self {
        Self::new(ApiClient::http(&config.api_base_url), config, runtime)
    }
}

impl<T: Transport + 'static> ExplorerApp<T> {
    pub fn new(api: ApiClient<T>, config: &ExplorerConfig, runtime: Handle) -> Self {
        let session_id = Uuid::new_v4();
        let span = tracing::info_span!("explorer", %session_id);
        Self {
            api: Arc::new(api),
            runtime,
            query: QuerySession::new(),
            dataset: DatasetController::new(),
            windows: WindowManager::with_margin(config.viewport, config.window_margin),
            preview: TaskStatus::Idle,
            health: TaskStatus::Idle,
            tickets: TicketCounter::default(),
            async_state: Arc::new(Mutex::new(AsyncState::default())),
            tasks: Vec::new(),
            session_id,
            span,
        }
    }

    /// Show the main window and load the schema of the active dataset
    pub fn mount(&mut self) {
        let span = self.span.clone();
        let _guard = span.enter();
        self.windows.mount();
        if let Err(e) = self.handle_event(AppEvent::RefreshSchema) {
            tracing::warn!(error = %e, "initial schema load skipped");
        }
    }

    /// Close every window and release its listeners. Requests still in
    /// flight finish but their outcomes are never applied unless
    /// `process_async_results` runs again.
    pub fn unmount(&mut self) {
        self.windows.unmount();
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn api(&self) -> &ApiClient<T> {
        &self.api
    }

    pub fn query(&self) -> &QuerySession {
        &self.query
    }

    pub fn dataset(&self) -> &DatasetController {
        &self.dataset
    }

    pub fn windows(&self) -> &WindowManager {
        &self.windows
    }

    pub fn preview(&self) -> &TaskStatus<TablePreview, String> {
        &self.preview
    }

    pub fn health(&self) -> &TaskStatus<HealthStatus, String> {
        &self.health
    }

    /// Spawned requests whose outcome has not been applied yet
    pub fn pending_tasks(&self) -> usize {
        self.tasks.iter().filter(|h| !h.is_finished()).count()
            + usize::from(!lock(&self.async_state).is_empty())
    }

    /// Example prompts for the active dataset
    pub fn example_prompts(&self) -> Vec<ExamplePrompt> {
        suggest(self.dataset.dataset())
    }

    // -------------------------------------------------------------------------
    // Gates
    // -------------------------------------------------------------------------

    pub fn can_ask(&self) -> bool {
        !self.query.is_loading()
    }

    pub fn can_retry(&self) -> bool {
        !self.query.is_loading() && self.query.result().retry_target().is_some()
    }

    pub fn can_switch_dataset(&self) -> bool {
        !self.dataset.is_busy()
    }

    // -------------------------------------------------------------------------
    // Events
    // -------------------------------------------------------------------------

    /// Apply one event. Rejections leave all state as it was, except a
    /// missing upload file, which also sets the dataset error.
    pub fn handle_event(&mut self, event: AppEvent) -> Result<(), ValidationError> {
        let span = self.span.clone();
        let _guard = span.enter();

        match event {
            AppEvent::Ask(question) => {
                if !self.can_ask() {
                    return Err(self.rejected(ValidationError::QueryInFlight));
                }
                let pending = self.query.begin_ask(&question)?;
                self.spawn_query(pending.ticket, pending.request);
            }
            AppEvent::Retry => {
                if self.query.is_loading() {
                    return Err(self.rejected(ValidationError::QueryInFlight));
                }
                let Some(query_id) = self.query.result().retry_target().map(str::to_string) else {
                    return Err(self.rejected(ValidationError::RetryUnavailable));
                };
                let pending = self.query.begin_retry(&query_id)?;
                self.spawn_query(pending.ticket, pending.request);
            }
            AppEvent::DismissNetworkError => self.query.dismiss_network_error(),

            AppEvent::RefreshSchema => {
                if !self.can_switch_dataset() {
                    return Err(self.rejected(ValidationError::DatasetBusy));
                }
                let pending = self.dataset.begin_refresh_schema();
                self.spawn_dataset(pending.ticket, pending.request);
            }
            AppEvent::UseDemo => {
                if !self.can_switch_dataset() {
                    return Err(self.rejected(ValidationError::DatasetBusy));
                }
                let pending = self.dataset.begin_use_demo();
                self.spawn_dataset(pending.ticket, pending.request);
            }
            AppEvent::SelectFile(file) => self.dataset.select_file(file),
            AppEvent::ClearSelectedFile => self.dataset.clear_selected_file(),
            AppEvent::Upload => {
                if !self.can_switch_dataset() {
                    return Err(self.rejected(ValidationError::DatasetBusy));
                }
                let pending = self.dataset.begin_upload()?;
                self.spawn_dataset(pending.ticket, pending.request);
            }
            AppEvent::LoadPreview => {
                let ticket = self.tickets.next();
                self.preview.start(ticket);
                self.spawn(ApiRequest::bare(Endpoint::Preview), move |outcome| {
                    Delivered::Preview(ticket, read_preview(outcome))
                });
            }
            AppEvent::CheckHealth => {
                let ticket = self.tickets.next();
                self.health.start(ticket);
                self.spawn(ApiRequest::bare(Endpoint::Health), move |outcome| {
                    Delivered::Health(ticket, read_health(outcome))
                });
            }

            AppEvent::OpenWindow(kind) => self.windows.open(kind),
            AppEvent::CloseWindow(kind) => self.windows.close(kind),
            AppEvent::ToggleMenu(bounds) => self.windows.menu_mut().toggle(bounds),
            AppEvent::TitleBarPressed(kind, pointer) => {
                self.windows.title_bar_pressed(kind, &pointer);
            }
            AppEvent::Pointer(pointer) => {
                self.windows.handle_global(&pointer);
            }
            AppEvent::ViewportResized(size) => self.windows.set_viewport(size),
        }
        Ok(())
    }

    fn rejected(&self, err: ValidationError) -> ValidationError {
        tracing::warn!(error = %err, "event rejected");
        err
    }

    fn spawn_query(&mut self, ticket: RequestTicket, request: ApiRequest) {
        self.spawn(request, move |outcome| Delivered::Query(ticket, outcome));
    }

    fn spawn_dataset(&mut self, ticket: RequestTicket, request: ApiRequest) {
        self.spawn(request, move |outcome| Delivered::Dataset(ticket, outcome));
    }

    fn spawn<F>(&mut self, request: ApiRequest, deliver: F)
    where
        F: FnOnce(ApiOutcome) -> Delivered + Send + 'static,
    {
        let api = Arc::clone(&self.api);
        let async_state = Arc::clone(&self.async_state);
        let task = async move {
            let outcome = api.send(request).await;
            lock(&async_state).delivered.push(deliver(outcome));
        };
        self.tasks
            .push(self.runtime.spawn(task.instrument(self.span.clone())));
    }

    // -------------------------------------------------------------------------
    // Results
    // -------------------------------------------------------------------------

    /// Apply every outcome delivered since the last call.
    ///
    /// This is the ONLY place where request outcomes reach controller state.
    pub fn process_async_results(&mut self) {
        let delivered = lock(&self.async_state).extract_pending();
        self.tasks.retain(|h| !h.is_finished());
        if delivered.is_empty() {
            return;
        }

        let span = self.span.clone();
        let _guard = span.enter();

        for item in delivered {
            match item {
                Delivered::Query(ticket, outcome) => {
                    self.query.finish(ticket, outcome);
                }
                Delivered::Dataset(ticket, outcome) => {
                    let update = self.dataset.finish(ticket, outcome);
                    self.on_dataset_update(update);
                }
                Delivered::Preview(ticket, result) => {
                    if !self.preview.finish(ticket, result) {
                        tracing::debug!(ticket = ticket.seq(), "dropping stale preview");
                    }
                }
                Delivered::Health(ticket, result) => {
                    if !self.health.finish(ticket, result) {
                        tracing::debug!(ticket = ticket.seq(), "dropping stale health check");
                    }
                }
            }
        }
    }

    fn on_dataset_update(&mut self, update: DatasetUpdate) {
        let DatasetUpdate::Replaced(op) = update else {
            return;
        };
        if op.switches_dataset() {
            self.query.reset();
            // A preview still in flight describes the previous table
            self.preview = TaskStatus::Idle;
        }
        if op == DatasetOp::Upload {
            self.windows.close_active();
        }
    }

    /// Wait for every spawned request, then apply the outcomes
    pub async fn settle(&mut self) {
        let handles = std::mem::take(&mut self.tasks);
        for joined in futures::future::join_all(handles).await {
            if let Err(e) = joined {
                tracing::warn!(error = %e, "request task did not complete");
            }
        }
        self.process_async_results();
    }
}

fn read_preview(outcome: ApiOutcome) -> Result<TablePreview, String> {
    let response = outcome.map_err(|e| e.to_string())?;
    if response.signals_failure() {
        return Err(response.detail_message());
    }
    response
        .parse()
        .ok_or_else(|| "Unexpected preview response".to_string())
}

fn read_health(outcome: ApiOutcome) -> Result<HealthStatus, String> {
    let response = outcome.map_err(|e| e.to_string())?;
    if !response.is_success_status() {
        return Err(response.status_fallback());
    }
    Ok(response.parse().unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ScriptedTransport;
    use crate::query::QueryResult;
    use serde_json::json;
    use std::time::Duration;

    fn app(transport: &ScriptedTransport) -> ExplorerApp<ScriptedTransport> {
        ExplorerApp::new(
            ApiClient::new(transport.clone()),
            &ExplorerConfig::default(),
            Handle::current(),
        )
    }

    #[tokio::test]
    async fn test_ask_gated_while_loading() {
        let transport = ScriptedTransport::new();
        transport.push_json(Endpoint::Query, 200, json!({"sql": "SELECT 1"}));
        let mut app = app(&transport);

        app.handle_event(AppEvent::Ask("one".into())).unwrap();
        assert!(!app.can_ask());
        assert_eq!(
            app.handle_event(AppEvent::Ask("two".into())),
            Err(ValidationError::QueryInFlight)
        );

        app.settle().await;
        assert!(app.can_ask());
        assert_eq!(transport.request_count(Endpoint::Query), 1);
    }

    #[tokio::test]
    async fn test_retry_rejected_without_retryable_failure() {
        let transport = ScriptedTransport::new();
        let mut app = app(&transport);

        assert!(!app.can_retry());
        assert_eq!(
            app.handle_event(AppEvent::Retry),
            Err(ValidationError::RetryUnavailable)
        );
        assert_eq!(transport.request_count(Endpoint::QueryRetry), 0);
    }

    #[tokio::test]
    async fn test_empty_question_sends_nothing() {
        let transport = ScriptedTransport::new();
        let mut app = app(&transport);

        assert_eq!(
            app.handle_event(AppEvent::Ask("   ".into())),
            Err(ValidationError::EmptyQuestion)
        );
        app.settle().await;
        assert_eq!(app.query().result(), &QueryResult::Idle);
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_health_and_preview() {
        let transport = ScriptedTransport::new();
        transport.push_json(Endpoint::Health, 200, json!({"ok": true}));
        transport.push_json(Endpoint::Preview, 404, json!({"detail": "No active table"}));
        let mut app = app(&transport);

        app.handle_event(AppEvent::CheckHealth).unwrap();
        app.handle_event(AppEvent::LoadPreview).unwrap();
        assert!(app.health().is_in_progress());

        app.settle().await;
        assert_eq!(app.health().value(), Some(&HealthStatus { ok: true }));
        assert_eq!(app.preview().error().map(String::as_str), Some("No active table"));
    }

    #[tokio::test]
    async fn test_preview_of_previous_table_dropped_after_switch() {
        let transport = ScriptedTransport::new();
        transport.push_json_delayed(
            Endpoint::Preview,
            Duration::from_millis(50),
            200,
            json!({"table": "old_upload", "columns": ["a"], "rows": [[1]]}),
        );
        transport.push_json(Endpoint::UseDemo, 200, json!({"table": "ds_main"}));
        let mut app = app(&transport);

        app.handle_event(AppEvent::LoadPreview).unwrap();
        app.handle_event(AppEvent::UseDemo).unwrap();
        app.settle().await;

        assert_eq!(app.dataset().dataset().unwrap().table, "ds_main");
        assert!(app.preview().is_idle());
    }

    #[tokio::test]
    async fn test_newer_preview_wins() {
        let transport = ScriptedTransport::new();
        transport.push_json_delayed(
            Endpoint::Preview,
            Duration::from_millis(50),
            200,
            json!({"table": "first"}),
        );
        transport.push_json(Endpoint::Preview, 200, json!({"table": "second"}));
        let mut app = app(&transport);

        app.handle_event(AppEvent::LoadPreview).unwrap();
        app.handle_event(AppEvent::LoadPreview).unwrap();
        app.settle().await;

        assert_eq!(app.preview().value().map(|p| p.table.as_str()), Some("second"));
    }

    #[tokio::test]
    async fn test_busy_dataset_rejects_second_switch() {
        let transport = ScriptedTransport::new();
        transport.push_json(Endpoint::UseDemo, 200, json!({"table": "ds_main"}));
        let mut app = app(&transport);

        app.handle_event(AppEvent::UseDemo).unwrap();
        assert_eq!(
            app.handle_event(AppEvent::UseDemo),
            Err(ValidationError::DatasetBusy)
        );
        app.settle().await;
        assert!(app.can_switch_dataset());
        assert_eq!(transport.request_count(Endpoint::UseDemo), 1);
    }
}
