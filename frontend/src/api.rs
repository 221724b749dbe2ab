use gloo_file::File as GlooFile;
use gloo_net::http::Request;
use js_sys::{Reflect, Uint8Array};
use serde::de::DeserializeOwned;
use shared::{ErrorResponse, JobOptions, ProgressEvent};
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys::{FormData, ReadableStreamDefaultReader};
use yew::Callback;

pub const JOB_ID_HEADER: &str = "X-Job-Id";

/// Appends the API token as a query parameter for plain links.
pub fn with_token(url: &str, token: Option<&str>) -> String {
    match token {
        Some(token) => {
            let separator = if url.contains('?') { '&' } else { '?' };
            format!(
                "{}{}access_token={}",
                url,
                separator,
                urlencoding::encode(token)
            )
        }
        None => url.to_string(),
    }
}

/// Splits a chunked byte stream into JSON lines.
#[derive(Default)]
pub struct NdjsonBuffer {
    pending: Vec<u8>,
}

impl NdjsonBuffer {
    /// Returns every complete line received so far. Lines that fail to
    /// parse are logged and skipped.
    pub fn push<T: DeserializeOwned>(&mut self, chunk: &[u8]) -> Vec<T> {
        self.pending.extend_from_slice(chunk);
        let mut items = Vec::new();

        while let Some(newline) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=newline).collect();
            if let Some(item) = Self::parse_line(&line[..line.len() - 1]) {
                items.push(item);
            }
        }
        items
    }

    /// Parses a trailing line that was not newline terminated.
    pub fn finish<T: DeserializeOwned>(&mut self) -> Option<T> {
        let rest = std::mem::take(&mut self.pending);
        Self::parse_line(&rest)
    }

    fn parse_line<T: DeserializeOwned>(line: &[u8]) -> Option<T> {
        let text = String::from_utf8_lossy(line);
        if text.trim().is_empty() {
            return None;
        }
        match serde_json::from_str(text.trim()) {
            Ok(item) => Some(item),
            Err(e) => {
                log::warn!("Skipping malformed progress line: {}", e);
                None
            }
        }
    }
}

fn js_error(context: &str, value: JsValue) -> String {
    format!("{}: {:?}", context, value)
}

fn build_form(
    source: Option<&GlooFile>,
    target: Option<&GlooFile>,
    options: JobOptions,
) -> Result<FormData, String> {
    let form = FormData::new().map_err(|e| js_error("Failed to create form", e))?;
    if let Some(source) = source {
        form.append_with_blob_and_filename("source", source.as_ref(), &source.name())
            .map_err(|e| js_error("Failed to attach source image", e))?;
    }
    if let Some(target) = target {
        form.append_with_blob_and_filename("target", target.as_ref(), &target.name())
            .map_err(|e| js_error("Failed to attach target image", e))?;
    }
    form.append_with_str("enhance", &options.enhance.to_string())
        .map_err(|e| js_error("Failed to set enhance flag", e))?;
    form.append_with_str("many_faces", &options.many_faces.to_string())
        .map_err(|e| js_error("Failed to set multi-face flag", e))?;
    Ok(form)
}

/// Posts the swap form and forwards each streamed progress event until the
/// server closes the response.
pub async fn stream_swap(
    source: Option<GlooFile>,
    target: Option<GlooFile>,
    options: JobOptions,
    token: Option<String>,
    on_started: Callback<String>,
    on_event: Callback<ProgressEvent>,
) -> Result<(), String> {
    let form = build_form(source.as_ref(), target.as_ref(), options)?;

    let mut request = Request::post("/api/swap");
    if let Some(token) = token.as_deref() {
        request = request.header("Authorization", &format!("Bearer {}", token));
    }
    let response = request
        .body(form)
        .map_err(|e| format!("Failed to build request: {}", e))?
        .send()
        .await
        .map_err(|e| format!("Network error: {}", e))?;

    if !response.ok() {
        let status = response.status();
        let message = match response.json::<ErrorResponse>().await {
            Ok(body) => body.error,
            Err(_) => format!("Server error: {}", status),
        };
        return Err(message);
    }

    if let Some(job_id) = response.headers().get(JOB_ID_HEADER) {
        on_started.emit(job_id);
    }

    let body = response
        .body()
        .ok_or_else(|| "Server returned an empty response".to_string())?;
    let reader: ReadableStreamDefaultReader = body
        .get_reader()
        .dyn_into()
        .map_err(|e| js_error("Unexpected stream reader", e.into()))?;

    let mut buffer = NdjsonBuffer::default();
    loop {
        let chunk = JsFuture::from(reader.read())
            .await
            .map_err(|e| js_error("Stream read failed", e))?;
        let done = Reflect::get(&chunk, &JsValue::from_str("done"))
            .map(|v| v.is_truthy())
            .unwrap_or(true);
        if done {
            break;
        }

        let value = Reflect::get(&chunk, &JsValue::from_str("value"))
            .map_err(|e| js_error("Stream chunk without value", e))?;
        let bytes = Uint8Array::new(&value).to_vec();
        for event in buffer.push::<ProgressEvent>(&bytes) {
            on_event.emit(event);
        }
    }

    if let Some(event) = buffer.finish::<ProgressEvent>() {
        on_event.emit(event);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::JobPhase;

    fn line(sequence: u32, phase: &str) -> String {
        format!(
            "{{\"sequence\":{},\"message\":\"m{}\",\"phase\":\"{}\",\"artifact_visible\":false,\"timestamp\":\"t\"}}\n",
            sequence, sequence, phase
        )
    }

    #[test]
    fn test_lines_split_across_chunks() {
        let mut buffer = NdjsonBuffer::default();
        let text = format!("{}{}", line(0, "running"), line(1, "failed"));
        let (first, second) = text.as_bytes().split_at(30);

        assert!(buffer.push::<ProgressEvent>(first).is_empty());
        let events = buffer.push::<ProgressEvent>(second);
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].phase, JobPhase::Failed);
        assert!(buffer.finish::<ProgressEvent>().is_none());
    }

    #[test]
    fn test_unterminated_last_line() {
        let mut buffer = NdjsonBuffer::default();
        let text = line(3, "succeeded");
        let trimmed = text.trim_end();

        assert!(buffer.push::<ProgressEvent>(trimmed.as_bytes()).is_empty());
        assert_eq!(buffer.finish::<ProgressEvent>().unwrap().sequence, 3);
    }

    #[test]
    fn test_malformed_line_is_skipped() {
        let mut buffer = NdjsonBuffer::default();
        let text = format!("not json\n{}", line(0, "running"));
        assert_eq!(buffer.push::<ProgressEvent>(text.as_bytes()).len(), 1);
    }

    #[test]
    fn test_with_token() {
        assert_eq!(with_token("/api/jobs/1/download", None), "/api/jobs/1/download");
        assert_eq!(
            with_token("/api/jobs/1/download", Some("abc")),
            "/api/jobs/1/download?access_token=abc"
        );
        assert_eq!(with_token("/x?a=1", Some("abc")), "/x?a=1&access_token=abc");
    }

    #[test]
    fn test_with_token_encodes_reserved_characters() {
        assert_eq!(
            with_token("/api/jobs/1/output", Some("ab+cd/ef==")),
            "/api/jobs/1/output?access_token=ab%2Bcd%2Fef%3D%3D"
        );
        assert_eq!(
            with_token("/x", Some("a&b#c%")),
            "/x?access_token=a%26b%23c%25"
        );
    }
}
