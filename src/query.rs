//! Query session: ask / retry against the query service
//!
//! ```text
//! Idle ──ask──► Loading ──response──► Success | Failure
//!                  │                        │
//!                  └──transport error──► (previous result) + network banner
//! Failure{retryable, query_id} ──retry──► Loading ──► Success | Failure
//! ```
//!
//! Requests are split into `begin_*` (state transition, returns the request
//! to send) and `finish` (applies the outcome), so the caller decides how the
//! request actually runs. Every request carries a ticket; an outcome whose
//! ticket is not the latest issued is dropped.

use crate::api::{ApiClient, ApiOutcome, ApiRequest, ApiResponse, Transport};
use crate::error::ValidationError;
use crate::task::{RequestTicket, TicketCounter};
use explorer_types::QuerySuccess;

/// The single current query result
#[derive(Debug, Clone, Default, PartialEq)]
pub enum QueryResult {
    #[default]
    Idle,
    /// A request is in flight
    Loading,
    Success(QuerySuccess),
    Failure(QueryFailure),
}

impl QueryResult {
    pub fn is_loading(&self) -> bool {
        matches!(self, QueryResult::Loading)
    }

    pub fn as_success(&self) -> Option<&QuerySuccess> {
        match self {
            QueryResult::Success(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_failure(&self) -> Option<&QueryFailure> {
        match self {
            QueryResult::Failure(f) => Some(f),
            _ => None,
        }
    }

    /// Query id a retry may be sent for: only a retryable failure that
    /// carries a non-empty id qualifies
    pub fn retry_target(&self) -> Option<&str> {
        self.as_failure()
            .filter(|f| f.retryable)
            .and_then(|f| f.query_id.as_deref())
            .filter(|id| !id.trim().is_empty())
    }
}

/// A response that signalled failure
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryFailure {
    pub question: Option<String>,
    pub sql: Option<String>,
    pub message: String,
    pub retryable: bool,
    pub query_id: Option<String>,
    /// Service error category (`unsafe_sql`, `wrong_table`, ...)
    pub error_kind: Option<String>,
}

impl QueryFailure {
    /// Build from a failure response. `question` is what the user asked and
    /// wins over whatever the body echoes back.
    pub fn from_response(response: &ApiResponse, question: Option<&str>) -> Self {
        let body = response.error_body();
        Self {
            question: question.map(str::to_string).or(body.question),
            sql: body.sql.filter(|s| !s.trim().is_empty()),
            message: response.failure_message(),
            retryable: body.retryable.unwrap_or(false),
            query_id: body.query_id.filter(|id| !id.trim().is_empty()),
            error_kind: body.error.and_then(|e| e.kind),
        }
    }
}

/// Which operation a request belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Ask,
    Retry,
}

/// A request produced by `begin_ask` / `begin_retry`, to be sent and then
/// handed back to `finish` with its ticket
#[derive(Debug, Clone, PartialEq)]
pub struct PendingQuery {
    pub ticket: RequestTicket,
    pub kind: QueryKind,
    pub request: ApiRequest,
}

#[derive(Debug)]
struct InFlight {
    ticket: RequestTicket,
    kind: QueryKind,
    question: Option<String>,
    /// Result to fall back to if the request never gets a response
    displaced: QueryResult,
}

/// Owns the current `QueryResult` and the network-error banner
#[derive(Debug, Default)]
pub struct QuerySession {
    result: QueryResult,
    network_error: Option<String>,
    tickets: TicketCounter,
    in_flight: Option<InFlight>,
}

impl QuerySession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn result(&self) -> &QueryResult {
        &self.result
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Transport failure of the last request, shown apart from the result
    pub fn network_error(&self) -> Option<&str> {
        self.network_error.as_deref()
    }

    pub fn dismiss_network_error(&mut self) {
        self.network_error = None;
    }

    /// Forget the current result (dataset switched). Any request still in
    /// flight is abandoned; its response will be dropped as stale.
    pub fn reset(&mut self) {
        if let Some(in_flight) = self.in_flight.take() {
            tracing::debug!(ticket = in_flight.ticket.seq(), "abandoning in-flight query");
        }
        self.result = QueryResult::Idle;
    }

    /// Start an ask. A blank question is rejected without touching state.
    pub fn begin_ask(&mut self, question: &str) -> Result<PendingQuery, ValidationError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(ValidationError::EmptyQuestion);
        }

        let ticket = self.tickets.next();
        self.network_error = None;
        self.result = QueryResult::Loading;
        self.in_flight = Some(InFlight {
            ticket,
            kind: QueryKind::Ask,
            question: Some(question.to_string()),
            displaced: QueryResult::Idle,
        });
        tracing::info!(ticket = ticket.seq(), question, "asking");

        Ok(PendingQuery {
            ticket,
            kind: QueryKind::Ask,
            request: ApiRequest::ask(question),
        })
    }

    /// Start a retry of a failed query. The failure being retried is kept
    /// aside and restored if the retry never gets a response.
    pub fn begin_retry(&mut self, query_id: &str) -> Result<PendingQuery, ValidationError> {
        let query_id = query_id.trim();
        if query_id.is_empty() {
            return Err(ValidationError::RetryUnavailable);
        }

        let ticket = self.tickets.next();
        let displaced = std::mem::replace(&mut self.result, QueryResult::Loading);
        let question = displaced.as_failure().and_then(|f| f.question.clone());
        self.network_error = None;
        self.in_flight = Some(InFlight {
            ticket,
            kind: QueryKind::Retry,
            question,
            displaced,
        });
        tracing::info!(ticket = ticket.seq(), query_id, "retrying");

        Ok(PendingQuery {
            ticket,
            kind: QueryKind::Retry,
            request: ApiRequest::retry(query_id),
        })
    }

    /// Apply the outcome of a request. Returns false if the ticket is stale
    /// and the outcome was dropped.
    pub fn finish(&mut self, ticket: RequestTicket, outcome: ApiOutcome) -> bool {
        let in_flight = match self.in_flight.take() {
            Some(f) if f.ticket == ticket => f,
            other => {
                tracing::debug!(ticket = ticket.seq(), "dropping stale query response");
                self.in_flight = other;
                return false;
            }
        };

        self.result = match outcome {
            Err(e) => {
                tracing::warn!(ticket = ticket.seq(), error = %e, "query did not reach the service");
                self.network_error = Some(e.to_string());
                in_flight.displaced
            }
            Ok(response) if response.signals_failure() => {
                let failure = QueryFailure::from_response(&response, in_flight.question.as_deref());
                tracing::info!(
                    ticket = ticket.seq(),
                    status = response.status,
                    retryable = failure.retryable,
                    message = %failure.message,
                    "query failed"
                );
                QueryResult::Failure(failure)
            }
            Ok(response) => match response.parse::<QuerySuccess>() {
                Some(mut success) => {
                    if success.question.is_empty() {
                        success.question = in_flight.question.clone().unwrap_or_default();
                    }
                    tracing::info!(
                        ticket = ticket.seq(),
                        kind = ?in_flight.kind,
                        rows = success.row_count(),
                        "query succeeded"
                    );
                    QueryResult::Success(success)
                }
                None => QueryResult::Failure(QueryFailure {
                    question: in_flight.question,
                    message: "Unexpected response from the query service".to_string(),
                    ..QueryFailure::default()
                }),
            },
        };
        true
    }

    /// Ask and wait for the answer
    pub async fn ask<T: Transport>(
        &mut self,
        api: &ApiClient<T>,
        question: &str,
    ) -> Result<(), ValidationError> {
        let pending = self.begin_ask(question)?;
        let outcome = api.send(pending.request).await;
        self.finish(pending.ticket, outcome);
        Ok(())
    }

    /// Retry the current failure and wait for the answer
    pub async fn retry<T: Transport>(&mut self, api: &ApiClient<T>) -> Result<(), ValidationError> {
        let query_id = self
            .result
            .retry_target()
            .map(str::to_string)
            .ok_or(ValidationError::RetryUnavailable)?;
        let pending = self.begin_retry(&query_id)?;
        let outcome = api.send(pending.request).await;
        self.finish(pending.ticket, outcome);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{Endpoint, RawResponse, ScriptedTransport};
    use crate::error::TransportError;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn response(status: u16, body: serde_json::Value) -> ApiOutcome {
        Ok(ApiResponse::from_raw(RawResponse::json(status, &body)))
    }

    fn success_body() -> serde_json::Value {
        json!({
            "ok": true,
            "query_id": "q_1",
            "question": "how many rows?",
            "sql": "SELECT COUNT(*) FROM ds_main LIMIT 100;",
            "columns": ["n"],
            "rows": [[120]]
        })
    }

    #[test]
    fn test_blank_ask_is_noop() {
        let mut session = QuerySession::new();
        assert_eq!(session.begin_ask(""), Err(ValidationError::EmptyQuestion));
        assert_eq!(session.begin_ask("   "), Err(ValidationError::EmptyQuestion));
        assert_eq!(session.result(), &QueryResult::Idle);
        assert!(!session.is_loading());
    }

    #[test]
    fn test_ask_sends_trimmed_question_and_loads() {
        let mut session = QuerySession::new();
        let pending = session.begin_ask("  top pitchers  ").unwrap();

        assert_eq!(pending.request.endpoint, Endpoint::Query);
        assert_eq!(pending.request.json(), Some(&json!({"question": "top pitchers"})));
        assert!(session.result().is_loading());
    }

    #[test]
    fn test_success_adopted() {
        let mut session = QuerySession::new();
        let pending = session.begin_ask("how many rows?").unwrap();
        assert!(session.finish(pending.ticket, response(200, success_body())));

        let success = session.result().as_success().unwrap();
        assert_eq!(success.sql, "SELECT COUNT(*) FROM ds_main LIMIT 100;");
        assert_eq!(success.columns, vec!["n".to_string()]);
        assert!(!session.is_loading());
    }

    #[test]
    fn test_404_detail_becomes_failure_message() {
        let mut session = QuerySession::new();
        let pending = session.begin_ask("q").unwrap();
        session.finish(pending.ticket, response(404, json!({"detail": "table not found"})));

        let failure = session.result().as_failure().unwrap();
        assert_eq!(failure.message, "table not found");
        assert_eq!(failure.question.as_deref(), Some("q"));
        assert!(!failure.retryable);
    }

    #[test]
    fn test_success_with_unexpected_meta_is_adopted() {
        for meta in [
            json!({"confidence": "high"}),
            json!({"confidence": "0.9"}),
            json!({"assumptions": {"limit": "added"}}),
            json!([{"note": "x"}]),
        ] {
            let mut session = QuerySession::new();
            let pending = session.begin_ask("how many rows?").unwrap();
            let mut body = success_body();
            body["meta"] = meta.clone();
            session.finish(pending.ticket, response(200, body));

            let success = session
                .result()
                .as_success()
                .unwrap_or_else(|| panic!("meta {} rejected the result", meta));
            assert_eq!(success.rows.len(), 1);
            assert_eq!(success.sql, "SELECT COUNT(*) FROM ds_main LIMIT 100;");
        }
    }

    #[test]
    fn test_mistyped_failure_field_keeps_message() {
        let mut session = QuerySession::new();
        let pending = session.begin_ask("q").unwrap();
        session.finish(
            pending.ticket,
            response(
                200,
                json!({
                    "ok": false,
                    "retryable": "true",
                    "query_id": "q_1",
                    "error": {"type": "sql_execution_error", "message": "column x not found"}
                }),
            ),
        );

        let failure = session.result().as_failure().unwrap();
        assert_eq!(failure.message, "column x not found");
        assert_eq!(failure.error_kind.as_deref(), Some("sql_execution_error"));
        assert_eq!(session.result().retry_target(), Some("q_1"));
    }

    #[test]
    fn test_unparseable_404_falls_back_to_status() {
        let mut session = QuerySession::new();
        let pending = session.begin_ask("q").unwrap();
        session.finish(
            pending.ticket,
            Ok(ApiResponse::from_raw(RawResponse::new(404, "Not Found"))),
        );
        assert_eq!(session.result().as_failure().unwrap().message, "HTTP 404");
    }

    #[test]
    fn test_ok_false_is_retryable_failure() {
        let mut session = QuerySession::new();
        let pending = session.begin_ask("avg pitches").unwrap();
        session.finish(
            pending.ticket,
            response(
                200,
                json!({
                    "ok": false,
                    "query_id": "q_7",
                    "question": "avg pitches",
                    "sql": "SELECT avg(pitchs) FROM ds_main LIMIT 100;",
                    "retryable": true,
                    "error": {"type": "sql_execution_error", "message": "column pitchs not found"}
                }),
            ),
        );

        let failure = session.result().as_failure().unwrap();
        assert_eq!(failure.message, "column pitchs not found");
        assert_eq!(failure.error_kind.as_deref(), Some("sql_execution_error"));
        assert_eq!(session.result().retry_target(), Some("q_7"));
    }

    #[test]
    fn test_transport_error_raises_banner_and_keeps_cleared_result() {
        let mut session = QuerySession::new();
        let first = session.begin_ask("first").unwrap();
        session.finish(first.ticket, response(200, success_body()));

        let second = session.begin_ask("second").unwrap();
        session.finish(
            second.ticket,
            Err(TransportError::Unreachable {
                url: "/query".into(),
                message: "offline".into(),
            }),
        );

        assert_eq!(session.result(), &QueryResult::Idle);
        assert!(session.network_error().unwrap().contains("offline"));
        assert!(!session.is_loading());

        session.begin_ask("third").unwrap();
        assert_eq!(session.network_error(), None);
    }

    #[test]
    fn test_retry_replaces_failure() {
        let mut session = QuerySession::new();
        let ask = session.begin_ask("avg pitches").unwrap();
        session.finish(
            ask.ticket,
            response(200, json!({"ok": false, "query_id": "q_7", "retryable": true, "error": {"message": "boom"}})),
        );

        let retry = session.begin_retry("q_7").unwrap();
        assert_eq!(retry.request.endpoint, Endpoint::QueryRetry);
        assert_eq!(retry.request.json(), Some(&json!({"query_id": "q_7"})));

        session.finish(retry.ticket, response(200, success_body()));
        assert!(session.result().as_success().is_some());
    }

    #[test]
    fn test_retry_transport_error_restores_failure() {
        let mut session = QuerySession::new();
        let ask = session.begin_ask("avg pitches").unwrap();
        session.finish(
            ask.ticket,
            response(200, json!({"ok": false, "query_id": "q_7", "retryable": true, "error": {"message": "boom"}})),
        );
        let before = session.result().clone();

        let retry = session.begin_retry("q_7").unwrap();
        session.finish(
            retry.ticket,
            Err(TransportError::Unreachable {
                url: "/query/retry".into(),
                message: "offline".into(),
            }),
        );

        assert_eq!(session.result(), &before);
        assert_eq!(session.result().retry_target(), Some("q_7"));
    }

    #[test]
    fn test_retry_404_keeps_original_question() {
        let mut session = QuerySession::new();
        let ask = session.begin_ask("avg pitches").unwrap();
        session.finish(
            ask.ticket,
            response(200, json!({"ok": false, "query_id": "q_7", "retryable": true, "error": {"message": "boom"}})),
        );
        let retry = session.begin_retry("q_7").unwrap();
        session.finish(
            retry.ticket,
            response(404, json!({"detail": "Unknown query_id (nothing to retry)."})),
        );

        let failure = session.result().as_failure().unwrap();
        assert_eq!(failure.message, "Unknown query_id (nothing to retry).");
        assert_eq!(failure.question.as_deref(), Some("avg pitches"));
        assert_eq!(session.result().retry_target(), None);
    }

    #[test]
    fn test_stale_response_is_dropped() {
        let mut session = QuerySession::new();
        let slow = session.begin_ask("slow").unwrap();
        let fast = session.begin_ask("fast").unwrap();

        assert!(session.finish(fast.ticket, response(200, json!({"question": "fast", "sql": "SELECT 2"}))));
        assert!(!session.finish(slow.ticket, response(200, json!({"question": "slow", "sql": "SELECT 1"}))));

        assert_eq!(session.result().as_success().unwrap().sql, "SELECT 2");
    }

    #[test]
    fn test_reset_abandons_in_flight() {
        let mut session = QuerySession::new();
        let pending = session.begin_ask("q").unwrap();
        session.reset();
        assert!(!session.finish(pending.ticket, response(200, success_body())));
        assert_eq!(session.result(), &QueryResult::Idle);
    }

    #[test]
    fn test_retry_target_requires_retryable_and_id() {
        let not_retryable = QueryResult::Failure(QueryFailure {
            query_id: Some("q".into()),
            ..QueryFailure::default()
        });
        assert_eq!(not_retryable.retry_target(), None);

        let no_id = QueryResult::Failure(QueryFailure {
            retryable: true,
            ..QueryFailure::default()
        });
        assert_eq!(no_id.retry_target(), None);
        assert_eq!(QueryResult::Idle.retry_target(), None);
    }

    #[tokio::test]
    async fn test_ask_and_retry_over_transport() {
        let transport = ScriptedTransport::new();
        transport.push_json(
            Endpoint::Query,
            200,
            json!({"ok": false, "query_id": "q_3", "retryable": true, "error": {"message": "boom"}}),
        );
        transport.push_json(Endpoint::QueryRetry, 200, success_body());
        let api = ApiClient::new(transport.clone());

        let mut session = QuerySession::new();
        session.ask(&api, "how many rows?").await.unwrap();
        assert!(session.result().as_failure().is_some());

        session.retry(&api).await.unwrap();
        assert!(session.result().as_success().is_some());

        // Nothing left to retry
        assert_eq!(session.retry(&api).await, Err(ValidationError::RetryUnavailable));
        assert_eq!(transport.request_count(Endpoint::QueryRetry), 1);
    }
}
