//! Field captures: records produced by the capture app, and the listing
//! that loads them.
//!
//! The listing is the one place a load is retried aggressively (one attempt
//! plus three retries, 1.5 s apart): it is the first thing a user sees and
//! the service is often cold. A new load cancels the previous one, so only
//! the latest listing ever reaches the state.

use crate::config::{ClientConfig, RetryPolicy};
use crate::error::{DwaniError, FetchError};
use crate::pipeline::fetch::{fetch_with_retry, ServiceRequest, Transport};
use crate::pipeline::normalize::normalize_owned;
use crate::progress::SharedObserver;
use crate::tools::{parse_tool_claims, ToolClaims};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const CAPTURES_ENDPOINT: &str = "/v1/user-captures/";
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Row identifier. Ad-hoc SQL may hand it back as text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CaptureId {
    Number(i64),
    Text(String),
}

impl fmt::Display for CaptureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureId::Number(n) => f.pad(&n.to_string()),
            CaptureId::Text(s) => f.pad(s),
        }
    }
}

impl From<i64> for CaptureId {
    fn from(n: i64) -> Self {
        CaptureId::Number(n)
    }
}

/// One stored capture, keys already camelCased.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureRecord {
    pub id: CaptureId,
    #[serde(default)]
    pub user_id: Option<Value>,
    #[serde(default)]
    pub query_text: Option<String>,
    /// Image URL or inline data.
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default, deserialize_with = "lenient_coordinate")]
    pub latitude: Option<f64>,
    #[serde(default, deserialize_with = "lenient_coordinate")]
    pub longitude: Option<f64>,
    /// The model's answer, kept verbatim.
    #[serde(default)]
    pub ai_response: Value,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl CaptureRecord {
    /// Tool claims parsed from the AI response on every call.
    pub fn tool_claims(&self) -> ToolClaims {
        parse_tool_claims(&self.ai_response)
    }

    pub fn coordinates(&self) -> Option<(f64, f64)> {
        Some((self.latitude?, self.longitude?))
    }
}

/// Numbers, numeric strings, or nothing. Anything else reads as absent.
fn lenient_coordinate<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Decode every row or none: `None` as soon as one row is not capture-shaped.
pub fn decode_all_records(rows: &[Value]) -> Option<Vec<CaptureRecord>> {
    rows.iter()
        .map(|row| CaptureRecord::deserialize(row).ok())
        .collect()
}

/// Decode normalised rows, skipping any that are not capture-shaped.
pub fn records_from_rows(rows: Vec<Value>) -> Vec<CaptureRecord> {
    let total = rows.len();
    let records: Vec<CaptureRecord> = rows
        .into_iter()
        .filter_map(|row| match serde_json::from_value(row) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("Skipping malformed capture row: {}", e);
                None
            }
        })
        .collect();
    if records.len() < total {
        debug!("Decoded {}/{} capture rows", records.len(), total);
    }
    records
}

/// Observable listing state.
#[derive(Debug, Clone, Default)]
pub struct CaptureListing {
    pub captures: Arc<Vec<CaptureRecord>>,
    pub loading: bool,
    /// `"Failed to load captures: …"` after an exhausted load.
    pub error: Option<String>,
}

#[derive(Default)]
struct LibraryState {
    listing: CaptureListing,
    generation: u64,
    cancel: Option<CancellationToken>,
}

/// Loads and holds the capture listing. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct CaptureLibrary {
    config: Arc<ClientConfig>,
    transport: Arc<dyn Transport>,
    retry: RetryPolicy,
    observer: Option<SharedObserver>,
    state: Arc<Mutex<LibraryState>>,
}

impl CaptureLibrary {
    pub fn new(config: Arc<ClientConfig>, transport: Arc<dyn Transport>) -> Self {
        Self {
            retry: RetryPolicy::fixed(4, 1500),
            config,
            transport,
            observer: None,
            state: Arc::new(Mutex::new(LibraryState::default())),
        }
    }

    /// Override the listing's retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_observer(mut self, observer: SharedObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    fn lock(&self) -> MutexGuard<'_, LibraryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Load the first page of captures.
    pub async fn load(&self) -> Result<usize, DwaniError> {
        self.load_page(0, DEFAULT_PAGE_SIZE).await
    }

    /// Load `limit` captures starting at `skip`, replacing the listing.
    ///
    /// Cancels any load still in flight. Returns the number of records, or
    /// `FetchError::Cancelled` if a newer load superseded this one.
    pub async fn load_page(&self, skip: u32, limit: u32) -> Result<usize, DwaniError> {
        let (generation, token) = {
            let mut state = self.lock();
            state.generation += 1;
            if let Some(previous) = state.cancel.take() {
                previous.cancel();
            }
            let token = CancellationToken::new();
            state.cancel = Some(token.clone());
            state.listing.loading = true;
            state.listing.error = None;
            (state.generation, token)
        };

        let request = ServiceRequest::get(CAPTURES_ENDPOINT)
            .with_query("skip", skip)
            .with_query("limit", limit);
        debug!("Loading captures skip={} limit={} from {}", skip, limit, self.config.base_url);

        let fetched = fetch_with_retry(
            self.transport.as_ref(),
            &request,
            &self.retry,
            &token,
            self.observer.as_deref(),
        )
        .await;

        let result = match fetched {
            Err(FetchError::Cancelled) => return Err(FetchError::Cancelled.into()),
            Err(e) => Err(DwaniError::from(e)),
            Ok(response) => response
                .parse_json()
                .map_err(|e| invalid(format!("not JSON: {e}")))
                .and_then(|body| match normalize_owned(body) {
                    Value::Array(rows) => Ok(records_from_rows(rows)),
                    other => Err(invalid(format!("expected an array, got {other}"))),
                }),
        };

        let mut state = self.lock();
        if state.generation != generation {
            debug!("Dropping superseded capture listing (generation {})", generation);
            return Err(FetchError::Cancelled.into());
        }
        state.cancel = None;
        state.listing.loading = false;

        match result {
            Ok(records) => {
                info!("Loaded {} captures", records.len());
                let count = records.len();
                state.listing.captures = Arc::new(records);
                Ok(count)
            }
            Err(e) => {
                warn!("Failed to load captures: {}", e);
                state.listing.error = Some(format!("Failed to load captures: {e}"));
                Err(e)
            }
        }
    }

    pub fn listing(&self) -> CaptureListing {
        self.lock().listing.clone()
    }

    pub fn captures(&self) -> Arc<Vec<CaptureRecord>> {
        Arc::clone(&self.lock().listing.captures)
    }
}

fn invalid(detail: String) -> DwaniError {
    DwaniError::InvalidResponse {
        endpoint: CAPTURES_ENDPOINT.to_string(),
        detail,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ClaimStatus;
    use serde_json::json;

    #[test]
    fn record_from_normalized_row() {
        let row = normalize_owned(json!({
            "id": 7,
            "user_id": "u-1",
            "query_text": "what tools do I need?",
            "latitude": 12.97,
            "longitude": 77.59,
            "ai_response": "{\"required_tools\": [{\"tool_name\": \"Saw\"}]}",
            "created_at": "2025-05-01T10:00:00Z"
        }));
        let records = records_from_rows(vec![row]);
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.id, CaptureId::Number(7));
        assert_eq!(r.query_text.as_deref(), Some("what tools do I need?"));
        assert_eq!(r.coordinates(), Some((12.97, 77.59)));
        assert_eq!(r.tool_claims().summary_label(), "Saw");
    }

    #[test]
    fn missing_ai_response_is_absent() {
        let records = records_from_rows(vec![json!({"id": 1})]);
        assert_eq!(records[0].tool_claims().status, ClaimStatus::Absent);
        assert_eq!(records[0].coordinates(), None);
    }

    #[test]
    fn rows_without_id_are_skipped() {
        let records = records_from_rows(vec![json!({"queryText": "x"}), json!({"id": 2})]);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, CaptureId::from(2));
    }

    #[test]
    fn text_ids_and_coordinates_decode() {
        let records = records_from_rows(vec![normalize_owned(json!({
            "id": "c-17",
            "latitude": "12.97",
            "longitude": " 77.59 ",
            "query_text": "need a trimmer"
        }))]);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, CaptureId::Text("c-17".into()));
        assert_eq!(format!("{:<6}|", records[0].id), "c-17  |");
        assert_eq!(records[0].coordinates(), Some((12.97, 77.59)));
    }

    #[test]
    fn decode_all_is_all_or_nothing() {
        let good = vec![json!({"id": 1}), json!({"id": "b"})];
        assert_eq!(decode_all_records(&good).map(|r| r.len()), Some(2));
        let mixed = vec![json!({"id": 1}), json!({"id": 2, "queryText": 5})];
        assert!(decode_all_records(&mixed).is_none());
    }

    #[test]
    fn unparseable_coordinates_are_absent() {
        let records = records_from_rows(vec![json!({"id": 3, "latitude": "north", "longitude": true})]);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].coordinates(), None);
    }
}
