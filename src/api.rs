//! API client for the query service
//!
//! `Transport` is the only seam between the explorer and the network.
//! `HttpTransport` talks to the real service with reqwest; `ScriptedTransport`
//! answers from canned responses in-process (offline demos, tests).
//!
//! `ApiClient` turns whatever came back into an `ApiResponse` without ever
//! failing on the body: anything that is not a JSON object is read as `{}`.

use crate::error::TransportError;
use async_trait::async_trait;
use explorer_types::{AskRequest, ErrorBody, RetryRequest};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

// =============================================================================
// REQUESTS
// =============================================================================

/// Endpoints of the query service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Query,
    QueryRetry,
    Schema,
    UseDemo,
    Upload,
    Health,
    Preview,
}

impl Endpoint {
    pub fn path(self) -> &'static str {
        match self {
            Endpoint::Query => "/query",
            Endpoint::QueryRetry => "/query/retry",
            Endpoint::Schema => "/schema",
            Endpoint::UseDemo => "/dataset/use-demo",
            Endpoint::Upload => "/dataset/upload",
            Endpoint::Health => "/health",
            Endpoint::Preview => "/preview",
        }
    }

    pub fn is_get(self) -> bool {
        matches!(self, Endpoint::Schema | Endpoint::Health | Endpoint::Preview)
    }
}

/// A file chosen for upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub filename: String,
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

impl UploadFile {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            bytes,
            content_type: None,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Read a file from disk, naming it after its final path component
    pub async fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        let content_type = match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("csv") => Some("text/csv".to_string()),
            Some(ext) if ext.eq_ignore_ascii_case("parquet") => {
                Some("application/octet-stream".to_string())
            }
            _ => None,
        };
        Ok(Self {
            filename,
            bytes,
            content_type,
        })
    }
}

/// Request payload
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Json(Value),
    /// Multipart form with a single file field
    Multipart { field: String, file: UploadFile },
}

/// A request for one endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub endpoint: Endpoint,
    pub body: RequestBody,
}

impl ApiRequest {
    pub fn ask(question: &str) -> Self {
        let body = serde_json::to_value(AskRequest {
            question: question.to_string(),
        })
        .unwrap_or_else(|_| Value::Object(Map::new()));
        Self {
            endpoint: Endpoint::Query,
            body: RequestBody::Json(body),
        }
    }

    pub fn retry(query_id: &str) -> Self {
        let body = serde_json::to_value(RetryRequest {
            query_id: query_id.to_string(),
        })
        .unwrap_or_else(|_| Value::Object(Map::new()));
        Self {
            endpoint: Endpoint::QueryRetry,
            body: RequestBody::Json(body),
        }
    }

    pub fn upload(file: UploadFile) -> Self {
        Self {
            endpoint: Endpoint::Upload,
            body: RequestBody::Multipart {
                field: "file".to_string(),
                file,
            },
        }
    }

    /// Body-less request (GETs and `use-demo`)
    pub fn bare(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            body: RequestBody::Empty,
        }
    }

    /// JSON body, if any
    pub fn json(&self) -> Option<&Value> {
        match &self.body {
            RequestBody::Json(v) => Some(v),
            _ => None,
        }
    }
}

// =============================================================================
// RESPONSES
// =============================================================================

/// Status and raw bytes, before any interpretation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn json(status: u16, body: &Value) -> Self {
        Self::new(status, body.to_string())
    }
}

/// A response with its body read defensively
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    /// Always a JSON object; `{}` when the body was missing or unreadable
    pub body: Value,
}

impl ApiResponse {
    pub fn from_raw(raw: RawResponse) -> Self {
        let body = match serde_json::from_slice::<Value>(&raw.body) {
            Ok(Value::Object(map)) => Value::Object(map),
            Ok(_) | Err(_) => {
                if !raw.body.is_empty() {
                    tracing::debug!(status = raw.status, "response body is not a JSON object, using {{}}");
                }
                Value::Object(Map::new())
            }
        };
        Self {
            status: raw.status,
            body,
        }
    }

    pub fn is_success_status(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Non-2xx, or a body that says `ok: false`
    pub fn signals_failure(&self) -> bool {
        !self.is_success_status() || self.body.get("ok") == Some(&Value::Bool(false))
    }

    /// Failure fields, all optional. Each is read on its own, so a mistyped
    /// field only loses itself.
    pub fn error_body(&self) -> ErrorBody {
        serde_json::from_value(self.body.clone()).unwrap_or_default()
    }

    /// `error.message`, else `detail`, else `HTTP {status}`
    pub fn failure_message(&self) -> String {
        let err = self.error_body();
        err.error_message()
            .or_else(|| err.detail_message())
            .map(str::to_string)
            .unwrap_or_else(|| self.status_fallback())
    }

    /// `detail`, else `HTTP {status}`
    pub fn detail_message(&self) -> String {
        self.error_body()
            .detail_message()
            .map(str::to_string)
            .unwrap_or_else(|| self.status_fallback())
    }

    pub fn status_fallback(&self) -> String {
        format!("HTTP {}", self.status)
    }

    /// Typed view of the body
    pub fn parse<T: DeserializeOwned>(&self) -> Option<T> {
        match serde_json::from_value(self.body.clone()) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!(status = self.status, error = %e, "response body has unexpected shape");
                None
            }
        }
    }
}

/// Result of one request: a response, or nothing at all
pub type ApiOutcome = Result<ApiResponse, TransportError>;

// =============================================================================
// TRANSPORT SEAM
// =============================================================================

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: ApiRequest) -> Result<RawResponse, TransportError>;
}

/// reqwest-backed transport
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> Result<RawResponse, TransportError> {
        let url = format!("{}{}", self.base_url, request.endpoint.path());

        let builder = if request.endpoint.is_get() {
            self.client.get(&url)
        } else {
            self.client.post(&url)
        };

        let builder = match request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(body) => builder.json(&body),
            RequestBody::Multipart { field, file } => {
                let mut part =
                    reqwest::multipart::Part::bytes(file.bytes).file_name(file.filename);
                if let Some(content_type) = file.content_type {
                    part = part
                        .mime_str(&content_type)
                        .map_err(|e| TransportError::from_reqwest(&url, e))?;
                }
                builder.multipart(reqwest::multipart::Form::new().part(field, part))
            }
        };

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(&url, e))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::from_reqwest(&url, e))?;

        Ok(RawResponse {
            status,
            body: body.to_vec(),
        })
    }
}

/// In-process transport answering from per-endpoint queues of canned
/// responses. Clones share the same queues and request log.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    inner: Arc<Mutex<Script>>,
}

#[derive(Default)]
struct Script {
    responses: HashMap<Endpoint, VecDeque<Scripted>>,
    requests: Vec<ApiRequest>,
}

struct Scripted {
    delay: Option<Duration>,
    response: Result<RawResponse, TransportError>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn push(&self, endpoint: Endpoint, response: Result<RawResponse, TransportError>) {
        self.enqueue(endpoint, None, response);
    }

    /// Like `push_json`, but the answer only arrives after `delay`
    pub fn push_json_delayed(&self, endpoint: Endpoint, delay: Duration, status: u16, body: Value) {
        self.enqueue(endpoint, Some(delay), Ok(RawResponse::json(status, &body)));
    }

    fn enqueue(
        &self,
        endpoint: Endpoint,
        delay: Option<Duration>,
        response: Result<RawResponse, TransportError>,
    ) {
        self.lock()
            .responses
            .entry(endpoint)
            .or_default()
            .push_back(Scripted { delay, response });
    }

    pub fn push_json(&self, endpoint: Endpoint, status: u16, body: Value) {
        self.push(endpoint, Ok(RawResponse::json(status, &body)));
    }

    pub fn push_raw(&self, endpoint: Endpoint, status: u16, body: &str) {
        self.push(endpoint, Ok(RawResponse::new(status, body)));
    }

    pub fn push_unreachable(&self, endpoint: Endpoint) {
        self.push(
            endpoint,
            Err(TransportError::Unreachable {
                url: endpoint.path().to_string(),
                message: "connection refused".to_string(),
            }),
        );
    }

    /// Every request sent so far, oldest first
    pub fn requests(&self) -> Vec<ApiRequest> {
        self.lock().requests.clone()
    }

    pub fn request_count(&self, endpoint: Endpoint) -> usize {
        self.lock()
            .requests
            .iter()
            .filter(|r| r.endpoint == endpoint)
            .count()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: ApiRequest) -> Result<RawResponse, TransportError> {
        let endpoint = request.endpoint;
        let scripted = {
            let mut script = self.lock();
            script.requests.push(request);
            script.responses.get_mut(&endpoint).and_then(VecDeque::pop_front)
        };
        let Some(Scripted { delay, response }) = scripted else {
            return Err(TransportError::NotScripted(endpoint.path().to_string()));
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        response
    }
}

// =============================================================================
// CLIENT
// =============================================================================

/// Client over any transport
pub struct ApiClient<T: Transport = HttpTransport> {
    transport: T,
}

impl ApiClient<HttpTransport> {
    pub fn http(base_url: &str) -> Self {
        Self::new(HttpTransport::new(base_url))
    }
}

impl<T: Transport> ApiClient<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Send a request. Only a transport failure is an `Err`; any status code
    /// comes back as a response.
    pub async fn send(&self, request: ApiRequest) -> ApiOutcome {
        let endpoint = request.endpoint;
        tracing::debug!(path = endpoint.path(), "sending request");
        match self.transport.send(request).await {
            Ok(raw) => {
                let response = ApiResponse::from_raw(raw);
                tracing::debug!(path = endpoint.path(), status = response.status, "response received");
                Ok(response)
            }
            Err(e) => {
                tracing::warn!(path = endpoint.path(), error = %e, "request did not complete");
                Err(e)
            }
        }
    }
}
