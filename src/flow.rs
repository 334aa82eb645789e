//! The four document flows as data.
//!
//! Each flow differs only in endpoint, which multipart fields it sends,
//! whether it needs a prompt, and how the answer comes back. A [`FlowSpec`]
//! captures exactly those differences so one
//! [`crate::orchestrator::DocumentOrchestrator`] can drive all of them.
//!
//! | Flow | Endpoint | Prompt | Response |
//! |------|----------|--------|----------|
//! | [`FlowSpec::summarize`] | `/v1/indic-summarize-pdf-all` | – | JSON |
//! | [`FlowSpec::summarize_translate`] | `/v1/indic-summarize-pdf-all` | – | JSON |
//! | [`FlowSpec::custom_prompt`] | `/v1/indic-custom-prompt-pdf-all` | required | JSON |
//! | [`FlowSpec::kannada_pdf`] | `/v1/indic-custom-prompt-pdf-all` | required | PDF |

use crate::error::ValidationError;
use crate::language::Language;
use crate::output::ProcessingResult;
use crate::pipeline::fetch::{FormField, ResponseKind, ServiceRequest};
use crate::pipeline::input::UploadTarget;
use serde_json::Value;
use std::fmt;

pub const SUMMARIZE_ENDPOINT: &str = "/v1/indic-summarize-pdf-all";
pub const CUSTOM_PROMPT_ENDPOINT: &str = "/v1/indic-custom-prompt-pdf-all";

/// Which flow a [`FlowSpec`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowKind {
    Summarize,
    SummarizeTranslate,
    CustomPrompt,
    KannadaPdf,
}

impl fmt::Display for FlowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FlowKind::Summarize => "summarize",
            FlowKind::SummarizeTranslate => "summarize-translate",
            FlowKind::CustomPrompt => "custom-prompt",
            FlowKind::KannadaPdf => "kannada-pdf",
        })
    }
}

/// How a flow sends the target language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetField {
    None,
    /// Field carries the user's chosen language code.
    Chosen(&'static str),
    /// Field carries a constant, whatever the user picked.
    Fixed {
        name: &'static str,
        value: &'static str,
    },
}

/// Multipart field names for the language pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LanguageFields {
    pub source: Option<&'static str>,
    pub target: TargetField,
}

/// Static description of one flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowSpec {
    pub kind: FlowKind,
    pub endpoint: &'static str,
    /// Prompt is sent and must be non-blank.
    pub requires_prompt: bool,
    pub default_prompt: &'static str,
    pub sends_page_number: bool,
    pub expects: ResponseKind,
    pub languages: LanguageFields,
    /// Constant fields appended to every request.
    pub extra_fields: &'static [(&'static str, &'static str)],
    /// camelCase key of the primary answer in a normalised JSON response.
    pub answer_field: &'static str,
    pub translated_field: Option<&'static str>,
    /// Prepended to the failure message shown to the user.
    pub failure_prefix: &'static str,
    /// File name offered for a returned PDF. Binary flows only.
    pub download_name: Option<&'static str>,
}

impl FlowSpec {
    /// Summarise a PDF.
    pub fn summarize() -> Self {
        Self {
            kind: FlowKind::Summarize,
            endpoint: SUMMARIZE_ENDPOINT,
            requires_prompt: false,
            default_prompt: "",
            sends_page_number: false,
            expects: ResponseKind::Json,
            languages: LanguageFields {
                source: None,
                target: TargetField::None,
            },
            extra_fields: &[],
            answer_field: "summary",
            translated_field: None,
            failure_prefix: "Error fetching summary: ",
            download_name: None,
        }
    }

    /// Summarise a PDF and translate the summary.
    pub fn summarize_translate() -> Self {
        Self {
            kind: FlowKind::SummarizeTranslate,
            endpoint: SUMMARIZE_ENDPOINT,
            requires_prompt: false,
            default_prompt: "",
            sends_page_number: false,
            expects: ResponseKind::Json,
            languages: LanguageFields {
                source: None,
                target: TargetField::Chosen("tgt_lang"),
            },
            extra_fields: &[("model", "gemma3")],
            answer_field: "summary",
            translated_field: Some("translatedSummary"),
            failure_prefix: "Error processing request: ",
            download_name: None,
        }
    }

    /// Answer a free-text prompt about one page and translate the answer.
    pub fn custom_prompt() -> Self {
        Self {
            kind: FlowKind::CustomPrompt,
            endpoint: CUSTOM_PROMPT_ENDPOINT,
            requires_prompt: true,
            default_prompt: "list the key points",
            sends_page_number: true,
            expects: ResponseKind::Json,
            languages: LanguageFields {
                source: Some("source_language"),
                target: TargetField::Chosen("target_language"),
            },
            extra_fields: &[],
            answer_field: "queryAnswer",
            translated_field: Some("translatedQueryAnswer"),
            failure_prefix: "Error processing request: ",
            download_name: None,
        }
    }

    /// Answer a prompt about one page and get back a Kannada PDF.
    pub fn kannada_pdf() -> Self {
        Self {
            kind: FlowKind::KannadaPdf,
            endpoint: CUSTOM_PROMPT_ENDPOINT,
            requires_prompt: true,
            default_prompt: "list the points",
            sends_page_number: true,
            expects: ResponseKind::Binary,
            languages: LanguageFields {
                source: Some("query_language"),
                target: TargetField::Fixed {
                    name: "target_language",
                    value: "kannada",
                },
            },
            extra_fields: &[],
            answer_field: "queryAnswer",
            translated_field: Some("translatedQueryAnswer"),
            failure_prefix: "Error: ",
            download_name: Some("translated_kannada_output.pdf"),
        }
    }

    pub fn expects_binary(&self) -> bool {
        self.expects == ResponseKind::Binary
    }

    /// Check a request against this flow's requirements.
    pub fn validate(&self, request: &ProcessingRequest) -> Result<(), ValidationError> {
        request.target.validate()?;
        if self.requires_prompt && request.prompt.trim().is_empty() {
            return Err(ValidationError::PromptRequired);
        }
        if request.page_number < 1 {
            return Err(ValidationError::InvalidPageNumber {
                page: request.page_number,
            });
        }
        Ok(())
    }

    /// Build the multipart request for `request`.
    pub fn build_request(&self, request: &ProcessingRequest) -> ServiceRequest {
        let target = &request.target;
        let mut fields = vec![FormField::File {
            name: "file".to_string(),
            file_name: target.file_name().to_string(),
            mime_type: target.mime_type().to_string(),
            bytes: target.shared_bytes(),
        }];

        if self.sends_page_number {
            fields.push(FormField::text("page_number", request.page_number.to_string()));
        }
        if self.requires_prompt {
            fields.push(FormField::text("prompt", request.prompt.trim()));
        }
        if let Some(name) = self.languages.source {
            fields.push(FormField::text(name, request.source_language.code()));
        }
        match self.languages.target {
            TargetField::None => {}
            TargetField::Chosen(name) => {
                fields.push(FormField::text(name, request.target_language.code()));
            }
            TargetField::Fixed { name, value } => fields.push(FormField::text(name, value)),
        }
        for (name, value) in self.extra_fields {
            fields.push(FormField::text(*name, *value));
        }

        ServiceRequest::post_multipart(self.endpoint, fields, self.expects)
    }

    /// Map a normalised JSON response onto a [`ProcessingResult`].
    pub fn parse_json(&self, normalized: &Value) -> Result<ProcessingResult, String> {
        let object = normalized
            .as_object()
            .ok_or_else(|| format!("expected a JSON object, got {}", kind_of(normalized)))?;

        Ok(ProcessingResult {
            original_text: object.get("originalText").and_then(text_of),
            primary_answer: object.get(self.answer_field).and_then(text_of),
            translated_answer: self
                .translated_field
                .and_then(|f| object.get(f))
                .and_then(text_of),
            processed_page: object.get("processedPage").and_then(page_of),
        })
    }
}

/// Everything one submission needs.
#[derive(Debug, Clone)]
pub struct ProcessingRequest {
    pub target: UploadTarget,
    /// 1-indexed.
    pub page_number: usize,
    pub prompt: String,
    pub source_language: Language,
    pub target_language: Language,
}

fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn page_of(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|p| u32::try_from(p).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::normalize::normalize;
    use serde_json::json;

    fn request(prompt: &str) -> ProcessingRequest {
        ProcessingRequest {
            target: UploadTarget::new(b"%PDF-1.4".to_vec(), "application/pdf", "doc.pdf"),
            page_number: 2,
            prompt: prompt.to_string(),
            source_language: Language::English,
            target_language: Language::Tamil,
        }
    }

    fn field_names(req: &ServiceRequest) -> Vec<String> {
        match &req.body {
            crate::pipeline::fetch::RequestBody::Multipart(fields) => {
                fields.iter().map(|f| f.name().to_string()).collect()
            }
            other => panic!("expected multipart, got {other:?}"),
        }
    }

    #[test]
    fn summarize_sends_only_the_file() {
        let req = FlowSpec::summarize().build_request(&request(""));
        assert_eq!(req.endpoint, SUMMARIZE_ENDPOINT);
        assert_eq!(field_names(&req), vec!["file"]);
    }

    #[test]
    fn summarize_translate_fields() {
        let req = FlowSpec::summarize_translate().build_request(&request(""));
        assert_eq!(field_names(&req), vec!["file", "tgt_lang", "model"]);
        assert_eq!(req.form_text("tgt_lang"), Some("tam_Taml"));
        assert_eq!(req.form_text("model"), Some("gemma3"));
    }

    #[test]
    fn custom_prompt_fields() {
        let req = FlowSpec::custom_prompt().build_request(&request("  list the key points "));
        assert_eq!(
            field_names(&req),
            vec!["file", "page_number", "prompt", "source_language", "target_language"]
        );
        assert_eq!(req.form_text("page_number"), Some("2"));
        assert_eq!(req.form_text("prompt"), Some("list the key points"));
        assert_eq!(req.form_text("source_language"), Some("eng_Latn"));
        assert_eq!(req.form_text("target_language"), Some("tam_Taml"));
        assert_eq!(req.expect, ResponseKind::Json);
    }

    #[test]
    fn kannada_pdf_fixes_target() {
        let req = FlowSpec::kannada_pdf().build_request(&request("list the points"));
        assert_eq!(req.form_text("query_language"), Some("eng_Latn"));
        assert_eq!(req.form_text("target_language"), Some("kannada"));
        assert_eq!(req.expect, ResponseKind::Binary);
    }

    #[test]
    fn prompt_required_only_where_declared() {
        assert_eq!(
            FlowSpec::custom_prompt().validate(&request("   ")),
            Err(ValidationError::PromptRequired)
        );
        assert!(FlowSpec::summarize().validate(&request("")).is_ok());
    }

    #[test]
    fn page_zero_is_rejected() {
        let mut r = request("x");
        r.page_number = 0;
        assert_eq!(
            FlowSpec::custom_prompt().validate(&r),
            Err(ValidationError::InvalidPageNumber { page: 0 })
        );
    }

    #[test]
    fn parse_custom_prompt_response() {
        let body = normalize(&json!({
            "original_text": "page text",
            "query_answer": "1. point",
            "translated_query_answer": "೧. ಅಂಶ",
            "processed_page": 1
        }));
        let r = FlowSpec::custom_prompt().parse_json(&body).unwrap();
        assert_eq!(r.original_text.as_deref(), Some("page text"));
        assert_eq!(r.primary_answer.as_deref(), Some("1. point"));
        assert_eq!(r.translated_answer.as_deref(), Some("೧. ಅಂಶ"));
        assert_eq!(r.processed_page, Some(1));
    }

    #[test]
    fn parse_summary_without_translation() {
        let body = normalize(&json!({"summary": "short", "processed_page": "3"}));
        let r = FlowSpec::summarize().parse_json(&body).unwrap();
        assert_eq!(r.primary_answer.as_deref(), Some("short"));
        assert_eq!(r.translated_answer, None);
        assert_eq!(r.original_text, None);
        assert_eq!(r.processed_page, Some(3));
    }

    #[test]
    fn parse_rejects_non_object() {
        let err = FlowSpec::summarize().parse_json(&json!([1])).unwrap_err();
        assert!(err.contains("an array"));
    }
}
