//! Stubs shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use dwani_client::error::PreviewError;
use dwani_client::pipeline::fetch::TransportError;
use dwani_client::{
    ClientConfig, PagePreview, PreviewRenderer, RetryPolicy, ServiceRequest, ServiceResponse, Transport,
};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub type Reply = Result<ServiceResponse, TransportError>;

/// Replays scripted replies in order; the last one repeats. Records every
/// request it sees.
pub struct StubTransport {
    script: Mutex<VecDeque<Reply>>,
    delay: Duration,
    requests: Mutex<Vec<ServiceRequest>>,
}

impl StubTransport {
    pub fn new(script: Vec<Reply>) -> Arc<Self> {
        Self::with_delay(script, Duration::ZERO)
    }

    /// Every reply arrives after `delay`.
    pub fn with_delay(script: Vec<Reply>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            delay,
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ServiceRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn last_request(&self) -> ServiceRequest {
        self.requests.lock().unwrap().last().cloned().expect("no request was sent")
    }
}

#[async_trait]
impl Transport for StubTransport {
    async fn send(&self, request: &ServiceRequest) -> Result<ServiceResponse, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        let reply = {
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                script.pop_front().unwrap()
            } else {
                script.front().cloned().expect("empty script")
            }
        };
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        reply
    }
}

pub fn json(value: Value) -> Reply {
    Ok(ServiceResponse::json(200, &value))
}

pub fn pdf(bytes: &[u8]) -> Reply {
    Ok(ServiceResponse::new(200, Some("application/pdf".into()), bytes.to_vec()))
}

pub fn status(code: u16, body: &str) -> Reply {
    Ok(ServiceResponse::new(code, Some("text/plain".into()), body.as_bytes().to_vec()))
}

/// Pretends every document has `pages` pages; optionally fails everything.
pub struct StubRenderer {
    pub pages: usize,
    pub fail: bool,
    /// Time each render takes.
    pub delay: Duration,
}

impl StubRenderer {
    pub fn pages(pages: usize) -> Arc<Self> {
        Arc::new(Self {
            pages,
            fail: false,
            delay: Duration::ZERO,
        })
    }

    pub fn broken() -> Arc<Self> {
        Arc::new(Self {
            pages: 0,
            fail: true,
            delay: Duration::ZERO,
        })
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            pages: 1,
            fail: false,
            delay,
        })
    }
}

#[async_trait]
impl PreviewRenderer for StubRenderer {
    async fn page_count(&self, _bytes: Arc<[u8]>) -> Result<usize, PreviewError> {
        if self.fail {
            return Err(PreviewError::Document("stub decode failure".into()));
        }
        Ok(self.pages)
    }

    async fn render_page(&self, _bytes: Arc<[u8]>, page: usize) -> Result<PagePreview, PreviewError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail {
            return Err(PreviewError::Document("stub decode failure".into()));
        }
        Ok(PagePreview {
            page,
            width: 10,
            height: 14,
            png: b"\x89PNG\r\n\x1a\n".to_vec(),
        })
    }
}

pub fn config(retry: RetryPolicy) -> Arc<ClientConfig> {
    Arc::new(
        ClientConfig::builder()
            .base_url("http://dwani.test")
            .retry(retry)
            .build()
            .unwrap(),
    )
}

/// A minimal, valid PDF with `pages` blank pages of `width`×`height` points.
pub fn minimal_pdf(pages: usize, width: u32, height: u32) -> Vec<u8> {
    let mut objects = vec![
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        format!(
            "<< /Type /Pages /Kids [{}] /Count {} >>",
            (0..pages).map(|i| format!("{} 0 R", i + 3)).collect::<Vec<_>>().join(" "),
            pages
        ),
    ];
    for _ in 0..pages {
        objects.push(format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {width} {height}] /Resources << >> >>"
        ));
    }

    let mut out = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, body).as_bytes());
    }

    let xref_at = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n", objects.len() + 1).as_bytes());
    out.extend_from_slice(b"0000000000 65535 f \n");
    for offset in offsets {
        out.extend_from_slice(format!("{offset:010} 00000 n \n").as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref_at
        )
        .as_bytes(),
    );
    out
}
