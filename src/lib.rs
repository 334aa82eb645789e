//! # dwani-client
//!
//! Client core for the dwani document-AI service: upload a PDF, get back a
//! summary, a prompt answer, a translation, or a translated PDF; browse and
//! search field captures with natural-language queries.
//!
//! ## Why this crate?
//!
//! Every document flow of the service is the same loop: stage a PDF, send a
//! multipart request, wait through a slow OCR + LLM + translation round
//! trip, show the answer. This crate runs that loop once, as a state
//! machine, and lets the four flows differ only by data ([`FlowSpec`]).
//! Network calls are retried, superseded calls are cancelled, and a late
//! response never overwrites newer state.
//!
//! ## Pipeline Overview
//!
//! ```text
//! UploadTarget
//!  │
//!  ├─ 1. Input      stage bytes, reject non-PDFs before any network call
//!  ├─ 2. Fetch      multipart POST with bounded retry + cancellation
//!  ├─ 3. Normalize  snake_case → camelCase over the whole JSON tree
//!  ├─ 4. Render     page counts + page-1 previews via pdfium (binary flows)
//!  └─ 5. Output     ProcessingOutcome committed if still current
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dwani_client::{
//!     ClientConfig, DocumentOrchestrator, FlowSpec, HttpTransport, PdfiumRenderer, UploadTarget,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Arc::new(ClientConfig::from_env()?);
//!     let transport = Arc::new(HttpTransport::new(Arc::clone(&config))?);
//!     let renderer = Arc::new(PdfiumRenderer::from_config(&config));
//!
//!     let flow = DocumentOrchestrator::new(FlowSpec::custom_prompt(), config, transport, renderer);
//!     flow.select_file(UploadTarget::from_path("report.pdf").await?)?;
//!     flow.set_prompt("list the key points");
//!     flow.submit()?.wait().await;
//!
//!     let state = flow.snapshot();
//!     match (state.outcome, state.error) {
//!         (Some(outcome), _) => println!("{:?}", outcome.text().primary_answer),
//!         (None, Some(error)) => eprintln!("{error}"),
//!         _ => {}
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `dwani` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! dwani-client = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod captures;
pub mod config;
pub mod error;
pub mod flow;
pub mod language;
pub mod orchestrator;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod query;
pub mod tools;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use captures::{CaptureId, CaptureLibrary, CaptureListing, CaptureRecord};
pub use config::{BackoffPolicy, ClientConfig, ClientConfigBuilder, RetryPolicy};
pub use error::{DwaniError, FetchError, FetchFailure, PreviewError, ValidationError};
pub use flow::{FlowKind, FlowSpec, ProcessingRequest};
pub use language::Language;
pub use orchestrator::{DocumentOrchestrator, OrchestratorSnapshot, Phase, Submission};
pub use output::{BinaryProcessingResult, ProcessingOutcome, ProcessingResult};
pub use pipeline::fetch::{fetch_with_retry, HttpTransport, ServiceRequest, ServiceResponse, Transport};
pub use pipeline::input::UploadTarget;
pub use pipeline::normalize::normalize;
pub use pipeline::render::{get_page_count, render_page_to_image, PagePreview, PdfiumRenderer, PreviewRenderer};
pub use progress::{FetchObserver, NoopFetchObserver, SharedObserver};
pub use query::{display_rows, CaptureView, QueryDispatcher, QueryOutcome, QueryRows};
pub use tools::{parse_tool_claims, ToolClaim, ToolClaims};
