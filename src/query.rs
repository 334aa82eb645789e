//! Natural-language query over stored captures.
//!
//! The service turns a question into SQL, runs it, and answers with a
//! prose summary plus the raw rows. Rows come in two shapes: full capture
//! records when the query selected whole rows, or loose scalar tuples
//! (counts, grouped columns) otherwise. [`QueryRows`] keeps the two apart
//! so a caller can never display both at once.
//!
//! Queries fail soft. A failed search is logged and the previous outcome
//! stays on screen; the caller still gets the error back to decide whether
//! to mention it.

use crate::captures::{decode_all_records, CaptureRecord};
use crate::config::{ClientConfig, RetryPolicy};
use crate::error::{DwaniError, FetchError};
use crate::pipeline::fetch::{fetch_with_retry, ServiceRequest, Transport};
use crate::pipeline::normalize::normalize_owned;
use crate::progress::SharedObserver;
use crate::tools::is_truthy;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const QUERY_ENDPOINT: &str = "/v1/user-captures/natural-query";

/// A result row that is not a capture record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScalarRow {
    /// `queryText` when the row carries one.
    pub query_text: Option<String>,
    pub fields: Map<String, Value>,
}

impl ScalarRow {
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(fields) => Self {
                query_text: fields
                    .get("queryText")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                fields,
            },
            Value::String(text) => Self {
                query_text: Some(text),
                fields: Map::new(),
            },
            other => {
                let mut fields = Map::new();
                fields.insert("value".to_string(), other);
                Self {
                    query_text: None,
                    fields,
                }
            }
        }
    }
}

/// Rows of a query outcome. At most one kind is ever populated.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub enum QueryRows {
    #[default]
    Empty,
    /// Full records that replace the capture listing.
    Captures(Vec<CaptureRecord>),
    Scalars(Vec<ScalarRow>),
}

impl QueryRows {
    /// Classify normalised rows: a truthy `id` on the first row means the
    /// query returned whole capture records. Rows that claim to be captures
    /// but do not all decode are kept as scalars, so no row is ever lost.
    pub fn classify(rows: Vec<Value>) -> Self {
        let Some(first) = rows.first() else {
            return QueryRows::Empty;
        };
        if first.get("id").is_some_and(is_truthy) {
            match decode_all_records(&rows) {
                Some(records) => return QueryRows::Captures(records),
                None => debug!("Query rows carry ids but are not captures; showing {} as scalars", rows.len()),
            }
        }
        QueryRows::Scalars(rows.into_iter().map(ScalarRow::from_value).collect())
    }

    pub fn captures(&self) -> &[CaptureRecord] {
        match self {
            QueryRows::Captures(c) => c,
            _ => &[],
        }
    }

    pub fn scalars(&self) -> &[ScalarRow] {
        match self {
            QueryRows::Scalars(s) => s,
            _ => &[],
        }
    }
}

/// What the last successful query produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryOutcome {
    /// The service's prose answer.
    pub summary: Option<String>,
    pub rows: QueryRows,
}

impl QueryOutcome {
    pub fn from_response(normalized: Value) -> Result<Self, String> {
        let Value::Object(mut body) = normalized else {
            return Err("expected a JSON object".to_string());
        };
        let summary = match body.remove("naturalResponse") {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s),
            _ => None,
        };
        let rows = match body.remove("results") {
            Some(Value::Array(rows)) => QueryRows::classify(rows),
            _ => QueryRows::Empty,
        };
        Ok(Self { summary, rows })
    }

    pub fn is_empty(&self) -> bool {
        self.summary.is_none() && self.rows == QueryRows::Empty
    }
}

/// What the capture view should show.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CaptureView<'a> {
    /// Capture cards: the filtered records if any, else the full listing.
    Grid(&'a [CaptureRecord]),
    /// Scalar search results replace the cards.
    List(&'a [ScalarRow]),
    Empty,
}

/// Pick what to display from the full listing and the last query.
pub fn display_rows<'a>(all: &'a [CaptureRecord], outcome: &'a QueryOutcome) -> CaptureView<'a> {
    match &outcome.rows {
        QueryRows::Scalars(rows) if !rows.is_empty() => CaptureView::List(rows),
        QueryRows::Captures(rows) if !rows.is_empty() => CaptureView::Grid(rows),
        _ if !all.is_empty() => CaptureView::Grid(all),
        _ => CaptureView::Empty,
    }
}

#[derive(Default)]
struct DispatcherState {
    outcome: QueryOutcome,
    generation: u64,
    cancel: Option<CancellationToken>,
}

/// Sends natural-language queries and keeps the latest outcome.
#[derive(Clone)]
pub struct QueryDispatcher {
    config: Arc<ClientConfig>,
    transport: Arc<dyn Transport>,
    retry: RetryPolicy,
    observer: Option<SharedObserver>,
    state: Arc<Mutex<DispatcherState>>,
}

impl QueryDispatcher {
    /// Queries are single-shot by default.
    pub fn new(config: Arc<ClientConfig>, transport: Arc<dyn Transport>) -> Self {
        Self {
            config,
            transport,
            retry: RetryPolicy::once(),
            observer: None,
            state: Arc::new(Mutex::new(DispatcherState::default())),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_observer(mut self, observer: SharedObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    fn lock(&self) -> MutexGuard<'_, DispatcherState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Query the configured captures table.
    pub async fn search(&self, text: &str) -> Result<QueryOutcome, DwaniError> {
        let table = self.config.captures_table.clone();
        self.run_query(text, &table).await
    }

    /// Run `text` against `table_name` and store the outcome.
    ///
    /// Blank text is a no-op returning the current outcome. On failure the
    /// stored outcome is left untouched. A newer query cancels this one.
    pub async fn run_query(&self, text: &str, table_name: &str) -> Result<QueryOutcome, DwaniError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(self.outcome());
        }

        let (generation, token) = {
            let mut state = self.lock();
            state.generation += 1;
            if let Some(previous) = state.cancel.take() {
                previous.cancel();
            }
            let token = CancellationToken::new();
            state.cancel = Some(token.clone());
            (state.generation, token)
        };

        let request = ServiceRequest::post_json(
            QUERY_ENDPOINT,
            json!({ "user_query": text, "table_name": table_name }),
        );
        debug!("Natural query on '{}': {}", table_name, text);

        let fetched = fetch_with_retry(
            self.transport.as_ref(),
            &request,
            &self.retry,
            &token,
            self.observer.as_deref(),
        )
        .await;

        let parsed = match fetched {
            Err(FetchError::Cancelled) => return Err(FetchError::Cancelled.into()),
            Err(e) => Err(DwaniError::from(e)),
            Ok(response) => response
                .parse_json()
                .map_err(|e| e.to_string())
                .and_then(|body| QueryOutcome::from_response(normalize_owned(body)))
                .map_err(|detail| DwaniError::InvalidResponse {
                    endpoint: QUERY_ENDPOINT.to_string(),
                    detail,
                }),
        };

        let mut state = self.lock();
        if state.generation != generation {
            debug!("Dropping superseded query result (generation {})", generation);
            return Err(FetchError::Cancelled.into());
        }
        state.cancel = None;

        match parsed {
            Ok(outcome) => {
                info!(
                    "Query returned {} capture(s), {} scalar row(s)",
                    outcome.rows.captures().len(),
                    outcome.rows.scalars().len()
                );
                state.outcome = outcome.clone();
                Ok(outcome)
            }
            Err(e) => {
                warn!("Error executing query: {}", e);
                Err(e)
            }
        }
    }

    /// Drop the outcome and any query still in flight.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.generation += 1;
        if let Some(token) = state.cancel.take() {
            token.cancel();
        }
        state.outcome = QueryOutcome::default();
    }

    pub fn outcome(&self) -> QueryOutcome {
        self.lock().outcome.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::captures::{records_from_rows, CaptureId};

    fn outcome(body: Value) -> QueryOutcome {
        QueryOutcome::from_response(normalize_owned(body)).unwrap()
    }

    #[test]
    fn rows_with_ids_are_captures() {
        let o = outcome(json!({
            "natural_response": "Two captures mention saws.",
            "results": [{"id": 3, "query_text": "saw"}, {"id": 4}]
        }));
        assert_eq!(o.summary.as_deref(), Some("Two captures mention saws."));
        assert_eq!(o.rows.captures().len(), 2);
        assert!(o.rows.scalars().is_empty());
    }

    #[test]
    fn rows_without_ids_are_scalars() {
        let o = outcome(json!({
            "natural_response": "42 captures.",
            "results": [{"count": 42}]
        }));
        assert!(o.rows.captures().is_empty());
        assert_eq!(o.rows.scalars()[0].fields["count"], json!(42));
    }

    #[test]
    fn zero_id_counts_as_scalar() {
        let o = outcome(json!({"results": [{"id": 0, "query_text": "x"}]}));
        assert_eq!(o.rows.scalars()[0].query_text.as_deref(), Some("x"));
    }

    #[test]
    fn text_ids_still_classify_as_captures() {
        let o = outcome(json!({
            "natural_response": "One match.",
            "results": [{"id": "c-17", "query_text": "need a trimmer"}]
        }));
        assert_eq!(o.rows.captures().len(), 1);
        assert_eq!(o.rows.captures()[0].id, CaptureId::Text("c-17".into()));
    }

    #[test]
    fn text_coordinates_still_classify_as_captures() {
        let o = outcome(json!({"results": [{"id": 4, "latitude": "12.97", "longitude": "77.59"}]}));
        assert_eq!(o.rows.captures()[0].coordinates(), Some((12.97, 77.59)));
    }

    #[test]
    fn undecodable_id_rows_fall_back_to_scalars() {
        let o = outcome(json!({"results": [
            {"id": 1, "query_text": "saw"},
            {"id": 2, "query_text": ["not", "text"]}
        ]}));
        assert!(o.rows.captures().is_empty());
        assert_eq!(o.rows.scalars().len(), 2);
        assert_eq!(o.rows.scalars()[0].query_text.as_deref(), Some("saw"));
        let view = display_rows(&[], &o);
        assert!(matches!(view, CaptureView::List(rows) if rows.len() == 2));
    }

    #[test]
    fn empty_results() {
        let o = outcome(json!({"natural_response": "", "results": []}));
        assert!(o.is_empty());
    }

    #[test]
    fn display_prefers_scalars_then_filtered_then_all() {
        let all = records_from_rows(vec![json!({"id": 1}), json!({"id": 2})]);

        let none = QueryOutcome::default();
        assert_eq!(display_rows(&all, &none), CaptureView::Grid(&all));

        let filtered = outcome(json!({"results": [{"id": 2}]}));
        match display_rows(&all, &filtered) {
            CaptureView::Grid(rows) => assert_eq!(rows.len(), 1),
            other => panic!("expected grid, got {other:?}"),
        }

        let scalars = outcome(json!({"results": [{"total": 2}]}));
        assert!(matches!(display_rows(&all, &scalars), CaptureView::List(_)));

        assert_eq!(display_rows(&[], &none), CaptureView::Empty);
    }
}
