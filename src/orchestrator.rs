//! Document Processing Orchestrator.
//!
//! One state machine drives every document flow; a [`FlowSpec`] supplies
//! the per-flow differences.
//!
//! ```text
//!   Idle ──select_file(pdf)──▶ FileSelected ──submit()──▶ Submitting
//!    ▲                              ▲                       │    │
//!    │                              │               success │    │ failure
//!    └──────────clear()─────────────┴──── Succeeded ◀───────┘    ▼
//!                                                              Failed ──retry()──▶ Submitting
//! ```
//!
//! Each submission gets a generation number and a [`CancellationToken`].
//! `clear()`, `select_file()` and a fresh `submit()` bump the generation and
//! cancel the token, so a response that arrives afterwards is dropped
//! without touching state. A network answer never overwrites state that a
//! newer user action already replaced.

use crate::config::ClientConfig;
use crate::error::{FetchError, ValidationError};
use crate::flow::{FlowSpec, ProcessingRequest};
use crate::language::Language;
use crate::output::{BinaryProcessingResult, ProcessingOutcome};
use crate::pipeline::fetch::{fetch_with_retry, ServiceResponse, Transport};
use crate::pipeline::input::UploadTarget;
use crate::pipeline::normalize::normalize_owned;
use crate::pipeline::render::{PagePreview, PreviewRenderer};
use crate::progress::SharedObserver;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Where the orchestrator is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    FileSelected,
    Submitting,
    Succeeded,
    Failed,
}

/// Point-in-time copy of the orchestrator's observable state.
#[derive(Debug, Clone)]
pub struct OrchestratorSnapshot {
    pub phase: Phase,
    pub file_name: Option<String>,
    pub prompt: String,
    pub page_number: usize,
    pub source_language: Language,
    pub target_language: Language,
    /// User-visible message, already prefixed per flow.
    pub error: Option<String>,
    /// Page 1 of the selected file, once
    /// [`load_input_preview`](DocumentOrchestrator::load_input_preview) has run.
    pub input_preview: Option<Arc<PagePreview>>,
    pub outcome: Option<Arc<ProcessingOutcome>>,
}

impl OrchestratorSnapshot {
    pub fn is_loading(&self) -> bool {
        self.phase == Phase::Submitting
    }
}

/// Result of asking for a submission.
#[derive(Debug)]
pub enum Submission {
    /// A request is now in flight.
    Started(SubmitHandle),
    /// A request was already in flight; nothing new was sent.
    AlreadyInFlight,
}

impl Submission {
    /// Wait for the started request to settle. No-op for `AlreadyInFlight`.
    pub async fn wait(self) {
        if let Submission::Started(handle) = self {
            handle.wait().await;
        }
    }

    pub fn is_started(&self) -> bool {
        matches!(self, Submission::Started(_))
    }
}

/// Handle on an in-flight submission.
#[derive(Debug)]
pub struct SubmitHandle {
    generation: u64,
    task: JoinHandle<()>,
}

impl SubmitHandle {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Resolves once the response has been committed or discarded.
    pub async fn wait(self) {
        if let Err(e) = self.task.await {
            if !e.is_cancelled() {
                error!("submission task failed: {}", e);
            }
        }
    }
}

struct Inner {
    phase: Phase,
    target: Option<UploadTarget>,
    input_preview: Option<Arc<PagePreview>>,
    /// Bumped whenever the selected file changes.
    selection: u64,
    prompt: String,
    page_number: usize,
    source_language: Language,
    target_language: Language,
    error: Option<String>,
    outcome: Option<Arc<ProcessingOutcome>>,
    last_request: Option<ProcessingRequest>,
    generation: u64,
    cancel: Option<CancellationToken>,
}

impl Inner {
    fn new(flow: &FlowSpec) -> Self {
        Self {
            phase: Phase::Idle,
            target: None,
            input_preview: None,
            selection: 0,
            prompt: flow.default_prompt.to_string(),
            page_number: 1,
            source_language: Language::English,
            target_language: Language::Kannada,
            error: None,
            outcome: None,
            last_request: None,
            generation: 0,
            cancel: None,
        }
    }

    /// Invalidate whatever is in flight.
    fn supersede(&mut self) -> u64 {
        self.generation += 1;
        if let Some(token) = self.cancel.take() {
            token.cancel();
        }
        self.generation
    }
}

/// Drives one document flow from file selection to result.
///
/// Cheap to clone; clones share state. Submitting spawns onto the current
/// tokio runtime, so [`submit`](Self::submit) and [`retry`](Self::retry)
/// must be called from within one.
#[derive(Clone)]
pub struct DocumentOrchestrator {
    flow: Arc<FlowSpec>,
    config: Arc<ClientConfig>,
    transport: Arc<dyn Transport>,
    renderer: Arc<dyn PreviewRenderer>,
    observer: Option<SharedObserver>,
    inner: Arc<Mutex<Inner>>,
}

impl DocumentOrchestrator {
    pub fn new(
        flow: FlowSpec,
        config: Arc<ClientConfig>,
        transport: Arc<dyn Transport>,
        renderer: Arc<dyn PreviewRenderer>,
    ) -> Self {
        let inner = Inner::new(&flow);
        Self {
            flow: Arc::new(flow),
            config,
            transport,
            renderer,
            observer: None,
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    /// Report fetch progress to `observer`.
    pub fn with_observer(mut self, observer: SharedObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn flow(&self) -> &FlowSpec {
        &self.flow
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Inputs ───────────────────────────────────────────────────────────

    /// Stage a file. A non-PDF is rejected: the selection is cleared, the
    /// error is recorded, and the orchestrator returns to `Idle`.
    ///
    /// Selecting a file supersedes any in-flight submission.
    pub fn select_file(&self, candidate: UploadTarget) -> Result<(), ValidationError> {
        let mut inner = self.lock();
        inner.supersede();
        inner.selection += 1;
        inner.input_preview = None;

        match candidate.validate() {
            Ok(()) => {
                info!("[{}] selected {}", self.flow.kind, candidate.file_name());
                inner.target = Some(candidate);
                inner.error = None;
                inner.phase = Phase::FileSelected;
                Ok(())
            }
            Err(e) => {
                warn!(
                    "[{}] rejected {} ({})",
                    self.flow.kind,
                    candidate.file_name(),
                    candidate.mime_type()
                );
                inner.target = None;
                inner.error = Some(e.to_string());
                inner.phase = Phase::Idle;
                Err(e)
            }
        }
    }

    pub fn set_prompt(&self, prompt: impl Into<String>) {
        self.lock().prompt = prompt.into();
    }

    pub fn set_page_number(&self, page_number: usize) {
        self.lock().page_number = page_number;
    }

    pub fn set_source_language(&self, language: Language) {
        self.lock().source_language = language;
    }

    pub fn set_target_language(&self, language: Language) {
        self.lock().target_language = language;
    }

    // ── Transitions ──────────────────────────────────────────────────────

    /// Validate the staged inputs and send them.
    ///
    /// Returns [`Submission::AlreadyInFlight`] while a request is pending.
    /// Validation failures leave the phase unchanged and record the message.
    pub fn submit(&self) -> Result<Submission, ValidationError> {
        let mut inner = self.lock();
        if inner.phase == Phase::Submitting {
            debug!("[{}] submit ignored: request in flight", self.flow.kind);
            return Ok(Submission::AlreadyInFlight);
        }

        let Some(target) = inner.target.clone() else {
            inner.error = Some(ValidationError::NoFile.to_string());
            return Err(ValidationError::NoFile);
        };
        let request = ProcessingRequest {
            target,
            page_number: inner.page_number,
            prompt: inner.prompt.clone(),
            source_language: inner.source_language,
            target_language: inner.target_language,
        };
        if let Err(e) = self.flow.validate(&request) {
            inner.error = Some(e.to_string());
            return Err(e);
        }

        Ok(self.start(&mut inner, request))
    }

    /// Re-send the last request after a failure.
    pub fn retry(&self) -> Result<Submission, ValidationError> {
        let mut inner = self.lock();
        let phase = inner.phase;
        match phase {
            Phase::Submitting => Ok(Submission::AlreadyInFlight),
            Phase::Failed => match inner.last_request.clone() {
                Some(request) => {
                    info!("[{}] retrying last request", self.flow.kind);
                    Ok(self.start(&mut inner, request))
                }
                None => Err(ValidationError::NoFile),
            },
            _ => {
                drop(inner);
                self.submit()
            }
        }
    }

    /// Discard the file, result, and error. Any in-flight response is
    /// dropped when it arrives.
    pub fn clear(&self) {
        let mut inner = self.lock();
        let generation = inner.supersede();
        inner.phase = Phase::Idle;
        inner.target = None;
        inner.selection += 1;
        inner.input_preview = None;
        inner.error = None;
        inner.outcome = None;
        inner.last_request = None;
        debug!("[{}] cleared (generation {})", self.flow.kind, generation);
    }

    // ── Reads ────────────────────────────────────────────────────────────

    pub fn snapshot(&self) -> OrchestratorSnapshot {
        let inner = self.lock();
        OrchestratorSnapshot {
            phase: inner.phase,
            file_name: inner.target.as_ref().map(|t| t.file_name().to_string()),
            prompt: inner.prompt.clone(),
            page_number: inner.page_number,
            source_language: inner.source_language,
            target_language: inner.target_language,
            error: inner.error.clone(),
            input_preview: inner.input_preview.clone(),
            outcome: inner.outcome.clone(),
        }
    }

    /// Render page 1 of the selected file so it can be shown before
    /// submitting. Only flows that return a PDF show one.
    ///
    /// A render failure yields `None`. The preview is dropped if another
    /// file was selected (or the selection cleared) while it rendered.
    pub async fn load_input_preview(&self) -> Option<Arc<PagePreview>> {
        if !self.flow.expects_binary() {
            return None;
        }
        let (selection, bytes) = {
            let inner = self.lock();
            (inner.selection, inner.target.as_ref()?.shared_bytes())
        };

        let preview = soft(self.renderer.render_page(bytes, 1).await, "input preview").map(Arc::new);

        let mut inner = self.lock();
        if inner.selection != selection {
            debug!("[{}] dropping preview of a replaced selection", self.flow.kind);
            return None;
        }
        inner.input_preview = preview.clone();
        preview
    }

    pub fn phase(&self) -> Phase {
        self.lock().phase
    }

    pub fn error(&self) -> Option<String> {
        self.lock().error.clone()
    }

    pub fn outcome(&self) -> Option<Arc<ProcessingOutcome>> {
        self.lock().outcome.clone()
    }

    // ── Submission task ──────────────────────────────────────────────────

    fn start(&self, inner: &mut Inner, request: ProcessingRequest) -> Submission {
        let generation = inner.supersede();
        let token = CancellationToken::new();
        inner.cancel = Some(token.clone());
        inner.phase = Phase::Submitting;
        inner.error = None;
        inner.outcome = None;
        inner.last_request = Some(request.clone());

        info!(
            "[{}] submitting {} to {} (generation {})",
            self.flow.kind,
            request.target.file_name(),
            self.flow.endpoint,
            generation
        );

        let this = self.clone();
        let task = tokio::spawn(async move {
            let run = AssertUnwindSafe(this.run(request, token)).catch_unwind().await;
            match run {
                Ok(Some(result)) => this.commit(generation, result),
                Ok(None) => debug!("[{}] generation {} cancelled", this.flow.kind, generation),
                Err(_) => this.commit(generation, Err("internal error while processing the response".into())),
            }
        });

        Submission::Started(SubmitHandle { generation, task })
    }

    /// `None` when cancelled.
    async fn run(
        &self,
        request: ProcessingRequest,
        token: CancellationToken,
    ) -> Option<Result<ProcessingOutcome, String>> {
        let service_request = self.flow.build_request(&request);
        let fetched = fetch_with_retry(
            self.transport.as_ref(),
            &service_request,
            &self.config.retry,
            &token,
            self.observer.as_deref(),
        )
        .await;

        let response = match fetched {
            Ok(response) => response,
            Err(FetchError::Cancelled) => return None,
            Err(e) => return Some(Err(e.to_string())),
        };

        if self.flow.expects_binary() {
            tokio::select! {
                biased;
                _ = token.cancelled() => None,
                outcome = self.decode_binary(&request, response) => Some(outcome),
            }
        } else {
            Some(self.decode_json(&response))
        }
    }

    fn decode_json(&self, response: &ServiceResponse) -> Result<ProcessingOutcome, String> {
        let body = response
            .parse_json()
            .map_err(|e| format!("response is not valid JSON: {e}"))?;
        let result = self.flow.parse_json(&normalize_owned(body))?;
        Ok(ProcessingOutcome::Text(result))
    }

    async fn decode_binary(
        &self,
        request: &ProcessingRequest,
        response: ServiceResponse,
    ) -> Result<ProcessingOutcome, String> {
        if response.body.is_empty() {
            return Err("service returned an empty document".to_string());
        }
        let output: Arc<[u8]> = Arc::from(response.body);
        let input = request.target.shared_bytes();

        let (input_pages, output_pages, input_preview, output_preview) = futures::join!(
            self.renderer.page_count(Arc::clone(&input)),
            self.renderer.page_count(Arc::clone(&output)),
            self.renderer.render_page(input, 1),
            self.renderer.render_page(Arc::clone(&output), 1),
        );

        Ok(ProcessingOutcome::Binary(BinaryProcessingResult {
            text: Default::default(),
            output_pdf: output,
            download_name: self.flow.download_name.unwrap_or("output.pdf").to_string(),
            input_page_count: soft(input_pages, "input page count"),
            output_page_count: soft(output_pages, "output page count"),
            input_preview: soft(input_preview, "input preview"),
            output_preview: soft(output_preview, "output preview"),
        }))
    }

    fn commit(&self, generation: u64, result: Result<ProcessingOutcome, String>) {
        let mut inner = self.lock();
        if inner.generation != generation || inner.phase != Phase::Submitting {
            debug!(
                "[{}] dropping stale response (generation {}, current {})",
                self.flow.kind, generation, inner.generation
            );
            return;
        }

        inner.cancel = None;
        match result {
            Ok(outcome) => {
                info!("[{}] generation {} succeeded", self.flow.kind, generation);
                inner.outcome = Some(Arc::new(outcome));
                inner.phase = Phase::Succeeded;
            }
            Err(message) => {
                warn!("[{}] generation {} failed: {}", self.flow.kind, generation, message);
                inner.error = Some(format!("{}{}", self.flow.failure_prefix, message));
                inner.phase = Phase::Failed;
            }
        }
    }
}

/// Previews never fail the submission.
fn soft<T>(result: Result<T, crate::error::PreviewError>, what: &str) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("{} unavailable: {}", what, e);
            None
        }
    }
}
