use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::error::{PosterError, PosterResult};
use crate::llm::key_gate::ApiKeyCell;
use crate::poster::encoder::{
    mime_type_from_base64, strip_data_url_prefix, to_data_uri, DEFAULT_IMAGE_MIME,
};
use crate::poster::{GenerationRequest, SourceImage};
use crate::utils::timing::log_llm_timing;

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-3-pro-image-preview";
pub const DEFAULT_EDIT_MODEL: &str = "gemini-2.5-flash-image";

/// Artifacts are always surfaced as PNG data URIs.
const RESULT_IMAGE_MIME: &str = "image/png";

#[derive(Debug, Clone)]
pub struct GeminiSettings {
    pub base_url: String,
    pub image_model: String,
    pub edit_model: String,
    /// Declare the sniffed MIME type on uploads instead of `image/png`.
    pub detect_upload_mime: bool,
}

impl Default for GeminiSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            edit_model: DEFAULT_EDIT_MODEL.to_string(),
            detect_upload_mime: false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    parts: Option<Vec<GeminiPart>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GeminiPart {
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: GeminiInlineData,
    },
    Text {
        text: String,
    },
    Other(Value),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiInlineData {
    #[serde(default)]
    mime_type: Option<String>,
    data: String,
}

struct InFlightGuard {
    flag: Arc<AtomicBool>,
}

impl InFlightGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> PosterResult<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| PosterError::RequestInFlight)?;
        Ok(Self { flag: flag.clone() })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

fn redact_api_key(text: &str, key: &str) -> String {
    let key = key.trim();
    if key.is_empty() {
        return text.to_string();
    }
    text.replace(key, "[redacted]")
}

fn truncate_for_log(value: &str, limit: usize) -> String {
    if value.chars().count() <= limit {
        return value.to_string();
    }
    let truncated: String = value.chars().take(limit).collect();
    format!("{truncated}... (truncated)")
}

fn summarize_parts(parts: &[Value]) -> Vec<Value> {
    parts
        .iter()
        .map(|part| {
            if let Some(text) = part.get("text").and_then(|value| value.as_str()) {
                json!({ "text": truncate_for_log(text, 200) })
            } else if let Some(inline_data) = part.get("inlineData") {
                let mime_type = inline_data
                    .get("mimeType")
                    .and_then(|value| value.as_str())
                    .unwrap_or("unknown");
                let data_len = inline_data
                    .get("data")
                    .and_then(|value| value.as_str())
                    .map(|value| value.len())
                    .unwrap_or(0);
                json!({ "inlineData": { "mimeType": mime_type, "dataLen": data_len } })
            } else {
                json!({ "unknownPart": true })
            }
        })
        .collect()
}

fn summarize_payload(payload: &Value) -> Value {
    let mut summary = Map::new();

    if let Some(contents) = payload.get("contents").and_then(|value| value.as_array()) {
        let summarized: Vec<Value> = contents
            .iter()
            .map(|content| {
                let parts = content
                    .get("parts")
                    .and_then(|value| value.as_array())
                    .map(|parts| summarize_parts(parts))
                    .unwrap_or_default();
                json!({ "parts": parts })
            })
            .collect();
        summary.insert("contents".to_string(), Value::Array(summarized));
    }

    if let Some(config) = payload.get("generationConfig") {
        summary.insert("generationConfig".to_string(), config.clone());
    }

    Value::Object(summary)
}

fn summarize_response(response: &GeminiResponse) -> Value {
    let mut text_parts = 0usize;
    let mut image_parts = 0usize;
    let mut text_preview = None;

    for candidate in response.candidates.as_deref().unwrap_or(&[]) {
        let parts = candidate
            .content
            .as_ref()
            .and_then(|content| content.parts.as_deref())
            .unwrap_or(&[]);
        for part in parts {
            match part {
                GeminiPart::Text { text } => {
                    text_parts += 1;
                    if text_preview.is_none() && !text.trim().is_empty() {
                        text_preview = Some(truncate_for_log(text, 200));
                    }
                }
                GeminiPart::InlineData { .. } => image_parts += 1,
                GeminiPart::Other(_) => {}
            }
        }
    }

    json!({
        "candidates": response.candidates.as_ref().map(|candidates| candidates.len()).unwrap_or(0),
        "textParts": text_parts,
        "imageParts": image_parts,
        "textPreview": text_preview
    })
}

fn summarize_error_body(body: &str) -> (Option<String>, String) {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return (None, "empty response body".to_string());
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        let message = value
            .pointer("/error/message")
            .and_then(|v| v.as_str())
            .map(|v| v.to_string())
            .or_else(|| {
                value
                    .get("message")
                    .and_then(|v| v.as_str())
                    .map(|v| v.to_string())
            });
        return (message, truncate_for_log(&value.to_string(), 2000));
    }

    (None, truncate_for_log(trimmed, 2000))
}

fn inline_image_part(data: &str, detect_mime: bool) -> Value {
    let data = strip_data_url_prefix(data);
    let mime_type = if detect_mime {
        mime_type_from_base64(data)
    } else {
        DEFAULT_IMAGE_MIME
    };
    json!({
        "inlineData": {
            "mimeType": mime_type,
            "data": data
        }
    })
}

fn source_image_part(image: &SourceImage, detect_mime: bool) -> Value {
    let mut part = inline_image_part(&image.data, false);
    if detect_mime {
        part["inlineData"]["mimeType"] = json!(image.mime_type);
    }
    part
}

fn build_generation_payload(request: &GenerationRequest, detect_mime: bool) -> Value {
    let mut parts = Vec::new();
    if let Some(image) = &request.image_a {
        parts.push(source_image_part(image, detect_mime));
    }
    if let Some(image) = &request.image_b {
        parts.push(source_image_part(image, detect_mime));
    }
    parts.push(json!({ "text": request.prompt }));

    json!({
        "contents": [{ "role": "user", "parts": parts }],
        "generationConfig": {
            "responseModalities": ["TEXT", "IMAGE"],
            "imageConfig": {
                "aspectRatio": request.output.aspect_ratio.as_str(),
                "imageSize": request.output.resolution.as_str()
            }
        }
    })
}

fn build_edit_payload(source_base64: &str, instruction: &str, detect_mime: bool) -> Value {
    json!({
        "contents": [{
            "role": "user",
            "parts": [
                inline_image_part(source_base64, detect_mime),
                { "text": instruction }
            ]
        }],
        "generationConfig": {
            "responseModalities": ["TEXT", "IMAGE"]
        }
    })
}

fn extract_first_image(response: GeminiResponse) -> Option<String> {
    let candidate = response.candidates?.into_iter().next()?;
    let parts = candidate.content?.parts?;
    parts.into_iter().find_map(|part| match part {
        GeminiPart::InlineData { inline_data } => {
            if let Some(mime_type) = inline_data.mime_type.as_deref() {
                if !mime_type.starts_with("image/") {
                    debug!(target: "llm.gemini", "inline part declared {mime_type}, using it as image");
                }
            }
            Some(inline_data.data)
        }
        _ => None,
    })
}

/// Single-shot client for the image generation and edit models.
///
/// Each instance admits one call at a time; overlapping calls fail with
/// [`PosterError::RequestInFlight`]. Use [`GeminiImageClient::fork`] to get an
/// independent instance that shares the HTTP pool and settings.
#[derive(Clone)]
pub struct GeminiImageClient {
    http: Client,
    settings: Arc<GeminiSettings>,
    api_key: ApiKeyCell,
    in_flight: Arc<AtomicBool>,
}

impl GeminiImageClient {
    pub fn new(settings: GeminiSettings, api_key: ApiKeyCell) -> Self {
        Self {
            http: Client::new(),
            settings: Arc::new(settings),
            api_key,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn fork(&self) -> Self {
        Self {
            http: self.http.clone(),
            settings: self.settings.clone(),
            api_key: self.api_key.clone(),
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub async fn generate(&self, request: &GenerationRequest) -> PosterResult<String> {
        let _guard = InFlightGuard::acquire(&self.in_flight)?;
        let payload = build_generation_payload(request, self.settings.detect_upload_mime);
        let model = self.settings.image_model.as_str();
        let metadata = json!({
            "aspectRatio": request.output.aspect_ratio.as_str(),
            "imageSize": request.output.resolution.as_str(),
            "images": usize::from(request.image_a.is_some()) + usize::from(request.image_b.is_some()),
        });
        log_llm_timing("gemini", model, "generate_vs_cover", Some(metadata), || {
            self.request_image(model, payload)
        })
        .await
    }

    pub async fn edit(&self, source_base64: &str, instruction: &str) -> PosterResult<String> {
        let _guard = InFlightGuard::acquire(&self.in_flight)?;
        let payload = build_edit_payload(source_base64, instruction, self.settings.detect_upload_mime);
        let model = self.settings.edit_model.as_str();
        log_llm_timing("gemini", model, "edit_vs_cover", None, || {
            self.request_image(model, payload)
        })
        .await
    }

    async fn request_image(&self, model: &str, payload: Value) -> PosterResult<String> {
        let response = self.call_generate_content(model, payload).await?;
        match extract_first_image(response) {
            Some(data) => Ok(to_data_uri(&data, RESULT_IMAGE_MIME)),
            None => {
                warn!(model = model, "Gemini returned no inline image");
                Err(PosterError::NoImageInResponse {
                    model: model.to_string(),
                })
            }
        }
    }

    async fn call_generate_content(&self, model: &str, payload: Value) -> PosterResult<GeminiResponse> {
        let api_key = self.api_key.get();
        if api_key.trim().is_empty() {
            return Err(PosterError::MissingCredential);
        }

        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.settings.base_url.trim_end_matches('/'),
            model
        );

        if tracing::enabled!(tracing::Level::DEBUG) {
            let payload_summary = summarize_payload(&payload);
            debug!(target: "llm.gemini", model = model, payload = %payload_summary);
        }

        let response = match self
            .http
            .post(&url)
            .header("x-goog-api-key", api_key.trim())
            .json(&payload)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                let err_text = redact_api_key(&err.to_string(), &api_key);
                warn!(
                    "Gemini request failed to send: {} (timeout={}, connect={}, status={:?})",
                    err_text,
                    err.is_timeout(),
                    err.is_connect(),
                    err.status()
                );
                return Err(PosterError::Transport(err_text));
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let (message, body_summary) = summarize_error_body(&body);
            warn!("Gemini API error: status={}, body={}", status, body_summary);
            return Err(PosterError::Api {
                status: status.as_u16(),
                detail: message.unwrap_or(body_summary),
            });
        }

        let value = response.json::<GeminiResponse>().await.map_err(|err| {
            PosterError::Transport(format!(
                "invalid response body: {}",
                redact_api_key(&err.to_string(), &api_key)
            ))
        })?;
        if tracing::enabled!(tracing::Level::DEBUG) {
            let response_summary = summarize_response(&value);
            debug!(target: "llm.gemini", model = model, response = %response_summary);
        }
        Ok(value)
    }
}
