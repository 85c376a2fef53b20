//! TTS server client
//!
//! Blocking HTTP client for the synthesis server: synthesize text to audio
//! bytes, list the voices it can clone, upload new reference audio, and
//! check health. Server errors are turned into one readable line.

use crate::{Result, TtsMicError};
use log::{debug, info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use url::Url;

/// Longest response body excerpt quoted in an error message
const ERROR_SNIPPET_LEN: usize = 500;

/// Response headers worth quoting when a request fails (proxies, CDNs)
const DIAGNOSTIC_HEADERS: &[&str] = &["server", "via", "cf-ray", "x-request-id"];

static HAS_SCHEME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z][a-zA-Z0-9+.-]*://").expect("scheme pattern is valid")
});

static WHITESPACE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

/// Body of a synthesis request
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct SynthesisRequest {
    pub text: String,
    pub voice: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emotion: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice_description: Option<String>,
}

/// What the server stored after a reference upload
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct UploadedReference {
    pub filename: String,
    #[serde(default)]
    pub duration: Option<f64>,
}

/// A non-2xx response, kept for error formatting
#[derive(Debug, Clone, Default)]
pub struct HttpFailure {
    pub status: u16,
    pub status_text: String,
    /// Lower-cased header names with values
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpFailure {
    fn from_response(response: ureq::Response) -> Self {
        let status = response.status();
        let status_text = response.status_text().to_string();
        let headers = DIAGNOSTIC_HEADERS
            .iter()
            .filter_map(|name| {
                response
                    .header(name)
                    .map(|v| (name.to_string(), v.to_string()))
            })
            .collect();
        let body = response.into_string().unwrap_or_default();
        Self {
            status,
            status_text,
            headers,
            body,
        }
    }
}

/// Parse a user-supplied server address into a base URL
///
/// Accepts `host:port` (assumes `http://`) or a full URL. Any path, query
/// or fragment is dropped so endpoint paths can be joined onto it.
pub fn normalize_base_url(raw: &str) -> Result<Url> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(TtsMicError::Config(
            "Server address is empty. Set address under [server] in ~/.ttsmic.cfg".to_string(),
        ));
    }

    let with_scheme = if HAS_SCHEME.is_match(trimmed) {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    };

    let mut url = Url::parse(&with_scheme)
        .map_err(|e| TtsMicError::Config(format!("Invalid server address '{}': {}", trimmed, e)))?;
    url.set_path("/");
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

/// One-line description of a failed request
///
/// Prefers the server's JSON `detail`; otherwise quotes a whitespace-
/// collapsed excerpt of the body.
pub fn format_http_error(failure: &HttpFailure, endpoint: &str) -> String {
    let extra = if failure.headers.is_empty() {
        String::new()
    } else {
        let parts: Vec<String> = failure
            .headers
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect();
        format!(" ({})", parts.join(", "))
    };
    let head = format!("HTTP {} {}", failure.status, failure.status_text)
        .trim_end()
        .to_string();

    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&failure.body) {
        match map.get("detail") {
            Some(Value::String(detail)) if !detail.is_empty() => {
                return format!("{}{} - {}", head, extra, detail);
            }
            Some(detail) if !detail.is_null() && !detail.is_string() => {
                return format!("{}{} - {}", head, extra, detail);
            }
            _ => {}
        }
    }

    let snippet: String = WHITESPACE
        .replace_all(failure.body.trim(), " ")
        .chars()
        .take(ERROR_SNIPPET_LEN)
        .collect();
    if snippet.is_empty() {
        format!("{}{} calling {}", head, extra, endpoint)
    } else {
        format!("{}{} calling {} - {}", head, extra, endpoint, snippet)
    }
}

/// Voice filenames to offer, from a `/list-voices` payload
///
/// Voices flagged valid are preferred; if none are, every named voice is
/// returned so an older server without validity flags still works.
pub fn usable_voices(payload: &Value) -> Vec<String> {
    let Some(voices) = payload.get("voices").and_then(Value::as_array) else {
        return Vec::new();
    };

    let named = || {
        voices
            .iter()
            .filter_map(|v| Some((v, v.get("filename")?.as_str()?)))
    };

    let valid: Vec<String> = named()
        .filter(|(v, _)| v.get("valid").and_then(Value::as_bool) == Some(true))
        .map(|(_, name)| name.to_string())
        .collect();
    if !valid.is_empty() {
        return valid;
    }
    named().map(|(_, name)| name.to_string()).collect()
}

/// Write synthesized audio to `dir/tts_<unix millis>.wav`
pub fn save_audio(dir: &Path, audio: &[u8]) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!("tts_{}.wav", unix_millis()));
    std::fs::write(&path, audio)?;
    debug!("Saved {} bytes to {}", audio.len(), path.display());
    Ok(path)
}

fn unix_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}

/// `multipart/form-data` body with a `file` part and an `overwrite` field
fn multipart_body(boundary: &str, filename: &str, audio: &[u8], overwrite: bool) -> Vec<u8> {
    let filename = filename.replace(['"', '\r', '\n'], "_");
    let mut body = Vec::with_capacity(audio.len() + 512);
    body.extend_from_slice(
        format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"overwrite\"\r\n\r\n{o}\r\n\
             --{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{f}\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n",
            b = boundary,
            o = overwrite,
            f = filename
        )
        .as_bytes(),
    );
    body.extend_from_slice(audio);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());
    body
}

/// Client for one TTS server
pub struct TtsClient {
    base: Url,
    agent: ureq::Agent,
}

impl TtsClient {
    pub fn new(address: &str, timeout: Duration) -> Result<Self> {
        let base = normalize_base_url(address)?;
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(10).min(timeout))
            .timeout(timeout)
            .build();
        Ok(Self { base, agent })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Full URL for an endpoint path
    pub fn endpoint(&self, path: &str) -> Result<String> {
        self.base
            .join(path)
            .map(String::from)
            .map_err(|e| TtsMicError::Config(format!("Invalid endpoint {}: {}", path, e)))
    }

    /// Synthesize speech; returns the raw audio bytes
    pub fn synthesize(&self, request: &SynthesisRequest) -> Result<Vec<u8>> {
        let url = self.endpoint("/api/tts")?;
        info!("Synthesizing {} chars with voice '{}'", request.text.len(), request.voice);

        let response = self.check(&url, self.agent.post(&url).send_json(request))?;
        let mut audio = Vec::new();
        response
            .into_reader()
            .read_to_end(&mut audio)
            .map_err(|e| TtsMicError::Http(format!("Failed to read audio from {}: {}", url, e)))?;

        if audio.is_empty() {
            return Err(TtsMicError::Http(format!(
                "{} returned no audio. Check the server log for synthesis errors.",
                url
            )));
        }
        debug!("Received {} bytes of audio", audio.len());
        Ok(audio)
    }

    /// Voice reference filenames the server can use
    pub fn list_voices(&self) -> Result<Vec<String>> {
        let url = self.endpoint("/list-voices")?;
        let response = self.check(&url, self.agent.get(&url).call())?;
        let payload: Value = response
            .into_json()
            .map_err(|e| TtsMicError::Http(format!("Invalid voice list from {}: {}", url, e)))?;
        Ok(usable_voices(&payload))
    }

    /// Upload a reference recording to clone a voice from
    pub fn upload_reference(
        &self,
        filename: &str,
        audio: &[u8],
        overwrite: bool,
    ) -> Result<UploadedReference> {
        let url = self.endpoint("/upload-reference")?;
        let boundary = format!("ttsmic-{}", unix_millis());
        let body = multipart_body(&boundary, filename, audio, overwrite);
        info!("Uploading reference '{}' ({} bytes)", filename, audio.len());

        let response = self.check(
            &url,
            self.agent
                .post(&url)
                .set(
                    "Content-Type",
                    &format!("multipart/form-data; boundary={}", boundary),
                )
                .send_bytes(&body),
        )?;
        response
            .into_json()
            .map_err(|e| TtsMicError::Http(format!("Invalid upload response from {}: {}", url, e)))
    }

    /// Whether the server answers its health endpoint
    pub fn health(&self) -> Result<bool> {
        let url = self.endpoint("/health")?;
        match self.agent.get(&url).call() {
            Ok(_) => Ok(true),
            Err(ureq::Error::Status(code, _)) => {
                warn!("Health check returned HTTP {}", code);
                Ok(false)
            }
            Err(e) => Err(TtsMicError::Http(format!(
                "Cannot reach {}: {}. Is the TTS server running?",
                url, e
            ))),
        }
    }

    fn check(
        &self,
        url: &str,
        result: std::result::Result<ureq::Response, ureq::Error>,
    ) -> Result<ureq::Response> {
        match result {
            Ok(response) => Ok(response),
            Err(ureq::Error::Status(_, response)) => {
                let message = format_http_error(&HttpFailure::from_response(response), url);
                warn!("{}", message);
                Err(TtsMicError::Http(message))
            }
            Err(e) => Err(TtsMicError::Http(format!(
                "Request failed calling {}: {}. Check the server address and that the server is running.",
                url, e
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(normalize_base_url("127.0.0.1:5002").unwrap().as_str(), "http://127.0.0.1:5002/");
        assert_eq!(normalize_base_url(" localhost:5002 ").unwrap().as_str(), "http://localhost:5002/");
        assert_eq!(
            normalize_base_url("https://tts.example.com/some/path?x=1#frag").unwrap().as_str(),
            "https://tts.example.com/"
        );
        assert!(normalize_base_url("   ").is_err());
        assert!(normalize_base_url("http://").is_err());
    }

    #[test]
    fn test_error_prefers_detail() {
        let failure = HttpFailure {
            status: 400,
            status_text: "Bad Request".to_string(),
            headers: vec![("server".to_string(), "uvicorn".to_string())],
            body: r#"{"detail": "Voice file not found: bob.wav"}"#.to_string(),
        };
        assert_eq!(
            format_http_error(&failure, "http://h/api/tts"),
            "HTTP 400 Bad Request (server=uvicorn) - Voice file not found: bob.wav"
        );
    }

    #[test]
    fn test_error_structured_detail() {
        let failure = HttpFailure {
            status: 422,
            status_text: "Unprocessable Entity".to_string(),
            body: r#"{"detail": [{"loc": ["body", "text"], "msg": "field required"}]}"#.to_string(),
            ..HttpFailure::default()
        };
        let message = format_http_error(&failure, "http://h/api/tts");
        assert!(message.starts_with("HTTP 422 Unprocessable Entity - ["));
        assert!(message.contains("field required"));
    }

    #[test]
    fn test_error_snippet() {
        let failure = HttpFailure {
            status: 502,
            status_text: "Bad Gateway".to_string(),
            headers: vec![
                ("via".to_string(), "1.1 proxy".to_string()),
                ("cf-ray".to_string(), "abc".to_string()),
            ],
            body: format!("<html>\n  <body>{}</body>\n</html>", "x".repeat(1000)),
        };
        let message = format_http_error(&failure, "http://h/api/tts");
        assert!(message.starts_with("HTTP 502 Bad Gateway (via=1.1 proxy, cf-ray=abc) calling http://h/api/tts - <html> <body>x"));
        let snippet = message.split(" - ").nth(1).unwrap();
        assert_eq!(snippet.chars().count(), ERROR_SNIPPET_LEN);
    }

    #[test]
    fn test_error_empty_body() {
        let failure = HttpFailure {
            status: 500,
            ..HttpFailure::default()
        };
        assert_eq!(format_http_error(&failure, "http://h/x"), "HTTP 500 calling http://h/x");
    }

    #[test]
    fn test_usable_voices_prefers_valid() {
        let payload = json!({"voices": [
            {"filename": "a.wav", "valid": true},
            {"filename": "b.mp3", "valid": false},
            {"valid": true},
            {"filename": "c.wav", "valid": true}
        ]});
        assert_eq!(usable_voices(&payload), vec!["a.wav", "c.wav"]);
    }

    #[test]
    fn test_usable_voices_fallback() {
        let payload = json!({"voices": [{"filename": "a.wav"}, {"filename": 3}, {"filename": "b.wav", "valid": false}]});
        assert_eq!(usable_voices(&payload), vec!["a.wav", "b.wav"]);
        assert!(usable_voices(&json!({"voices": "nope"})).is_empty());
        assert!(usable_voices(&json!({})).is_empty());
    }

    #[test]
    fn test_synthesis_request_skips_empty_options() {
        let request = SynthesisRequest {
            text: "hello".to_string(),
            voice: "a.wav".to_string(),
            emotion: Some("calm".to_string()),
            ..SynthesisRequest::default()
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"text": "hello", "voice": "a.wav", "emotion": "calm"})
        );
    }

    #[test]
    fn test_multipart_body() {
        let body = multipart_body("BOUND", "my \"voice\".wav", b"RIFF", true);
        let text = String::from_utf8_lossy(&body);
        assert!(text.starts_with("--BOUND\r\nContent-Disposition: form-data; name=\"overwrite\"\r\n\r\ntrue\r\n"));
        assert!(text.contains("filename=\"my _voice_.wav\""));
        assert!(text.contains("\r\n\r\nRIFF\r\n--BOUND--\r\n"));
    }

    #[test]
    fn test_save_audio() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested");
        let path = save_audio(&out, b"RIFFdata").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"RIFFdata");
        let name = path.file_name().unwrap().to_string_lossy();
        assert!(name.starts_with("tts_") && name.ends_with(".wav"));
    }
}
