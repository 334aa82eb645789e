//! Pipeline stages shared by every flow.
//!
//! Each submodule implements exactly one step, so each is testable on its
//! own and the orchestrator only wires them together.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ fetch ──▶ normalize            (JSON flows)
//!             └─────▶ render ──▶ encode    (binary flows)
//! ```
//!
//! 1. [`input`]    : stage bytes and a MIME type; reject non-PDFs
//! 2. [`fetch`]    : the [`fetch::Transport`] seam and the retry loop; the
//!    only stage with network I/O
//! 3. [`normalize`]: recursive snake_case → camelCase key rewrite
//! 4. [`render`]   : page counts and page previews; runs in `spawn_blocking`
//!    because pdfium is not async-safe
//! 5. [`encode`]   : PNG-encode a rasterised page and wrap it as a data URL

pub mod encode;
pub mod fetch;
pub mod input;
pub mod normalize;
pub mod render;
