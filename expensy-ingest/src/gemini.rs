use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use expensy_core::{
    EmptyReason, ExtractionInput, ExtractionOutcome, Extractor, GatewayError,
};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::prompt::{self, DOCUMENT_INSTRUCTIONS};
use crate::response::parse_records;

pub const DEFAULT_MODEL: &str = "gemini-3-flash-preview";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Everything the client needs; built by the caller, never read from globals
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
    response_schema: Value,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

fn build_request(input: &ExtractionInput) -> GenerateRequest {
    let parts = match input {
        ExtractionInput::Text(statement) => vec![Part {
            text: Some(prompt::text_prompt(statement)),
            inline_data: None,
        }],
        ExtractionInput::Document { media_type, bytes } => vec![
            Part {
                text: Some(DOCUMENT_INSTRUCTIONS.to_string()),
                inline_data: None,
            },
            Part {
                text: None,
                inline_data: Some(InlineData {
                    mime_type: media_type.mime().to_string(),
                    data: STANDARD.encode(bytes),
                }),
            },
        ],
    };

    GenerateRequest {
        contents: vec![Content { parts }],
        generation_config: GenerationConfig {
            response_mime_type: "application/json",
            response_schema: prompt::response_schema(),
        },
    }
}

/// Concatenated text parts of the first candidate, or the reason there are none
fn response_text(body: &str) -> Result<String, EmptyReason> {
    let resp: GenerateResponse =
        serde_json::from_str(body).map_err(|e| EmptyReason::Malformed(e.to_string()))?;
    let text: String = resp
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();
    Ok(text)
}

/// Extraction gateway backed by Gemini `generateContent` with structured output
#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    config: GeminiConfig,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Result<Self, GatewayError> {
        if config.api_key.trim().is_empty() {
            return Err(GatewayError::MissingCredential);
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let mut key = HeaderValue::from_str(config.api_key.trim()).map_err(|_| {
            GatewayError::InvalidCredential("contains characters not allowed in a header".to_string())
        })?;
        key.set_sensitive(true);
        headers.insert("x-goog-api-key", key);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        Ok(Self { http, config })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }
}

#[async_trait]
impl Extractor for GeminiClient {
    async fn extract(&self, input: &ExtractionInput) -> Result<ExtractionOutcome, GatewayError> {
        let endpoint = self.config.endpoint();
        let body = build_request(input);
        info!(model = %self.config.model, "requesting expense extraction");

        let resp = self
            .http
            .post(&endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(GatewayError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        match response_text(&text) {
            Ok(answer) => {
                debug!(chars = answer.len(), "extraction answer received");
                Ok(parse_records(&answer))
            }
            Err(reason) => {
                warn!(%reason, "extraction response envelope unreadable");
                Ok(ExtractionOutcome::Empty(reason))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use expensy_core::MediaType;

    #[test]
    fn test_endpoint() {
        let mut cfg = GeminiConfig::new("k");
        cfg.base_url = "http://localhost:8080/".to_string();
        assert_eq!(
            cfg.endpoint(),
            "http://localhost:8080/v1beta/models/gemini-3-flash-preview:generateContent"
        );
    }

    #[test]
    fn test_missing_key_rejected() {
        assert!(matches!(
            GeminiClient::new(GeminiConfig::new("  ")),
            Err(GatewayError::MissingCredential)
        ));
    }

    #[test]
    fn test_text_request_shape() {
        let req = build_request(&ExtractionInput::Text("12/04 PADARIA 9,90".to_string()));
        let v = serde_json::to_value(&req).unwrap();
        let parts = v["contents"][0]["parts"].as_array().unwrap();
        assert_eq!(parts.len(), 1);
        assert!(parts[0]["text"].as_str().unwrap().contains("PADARIA"));
        assert_eq!(v["generationConfig"]["responseMimeType"], "application/json");
        assert_eq!(v["generationConfig"]["responseSchema"]["type"], "ARRAY");
    }

    #[test]
    fn test_document_request_inlines_base64() {
        let req = build_request(&ExtractionInput::Document {
            media_type: MediaType::Pdf,
            bytes: b"%PDF-1.4".to_vec(),
        });
        let v = serde_json::to_value(&req).unwrap();
        let parts = v["contents"][0]["parts"].as_array().unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0]["text"], DOCUMENT_INSTRUCTIONS);
        assert_eq!(parts[1]["inlineData"]["mimeType"], "application/pdf");
        assert_eq!(parts[1]["inlineData"]["data"], "JVBERi0xLjQ=");
        assert!(parts[1].get("text").is_none());
    }

    #[test]
    fn test_response_text_joins_parts() {
        let body = r#"{"candidates":[{"content":{"parts":[{"text":"[{\"date\":"},{"text":"\"1/1\"}]"}],"role":"model"}}]}"#;
        assert_eq!(response_text(body).unwrap(), r#"[{"date":"1/1"}]"#);
    }

    #[test]
    fn test_response_without_candidates_is_empty_text() {
        assert_eq!(response_text(r#"{"promptFeedback":{"blockReason":"OTHER"}}"#).unwrap(), "");
        assert!(matches!(
            response_text("<html>bad gateway</html>"),
            Err(EmptyReason::Malformed(_))
        ));
    }

    #[test]
    fn test_key_with_control_characters_is_invalid_not_missing() {
        assert!(matches!(
            GeminiClient::new(GeminiConfig::new("abc\ndef")),
            Err(GatewayError::InvalidCredential(_))
        ));
    }

    mod http {
        use super::*;
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::{TcpListener, TcpStream};
        use tokio::task::JoinHandle;

        async fn read_request(sock: &mut TcpStream) -> String {
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                let n = sock.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
                if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                    let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
                    let len = head
                        .lines()
                        .find_map(|l| l.strip_prefix("content-length:"))
                        .and_then(|v| v.trim().parse::<usize>().ok())
                        .unwrap_or(0);
                    if buf.len() >= end + 4 + len {
                        break;
                    }
                }
            }
            String::from_utf8_lossy(&buf).into_owned()
        }

        /// Answer one request with a canned reply; the handle yields the raw request
        async fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let handle = tokio::spawn(async move {
                let (mut sock, _) = listener.accept().await.unwrap();
                let request = read_request(&mut sock).await;
                let reply = format!(
                    "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                sock.write_all(reply.as_bytes()).await.unwrap();
                sock.shutdown().await.ok();
                request
            });
            (format!("http://{addr}"), handle)
        }

        fn client(base_url: String) -> GeminiClient {
            let mut cfg = GeminiConfig::new("test-key");
            cfg.base_url = base_url;
            cfg.timeout = Duration::from_secs(10);
            GeminiClient::new(cfg).unwrap()
        }

        #[tokio::test]
        async fn test_records_from_successful_reply() {
            let (url, request) = serve_once(
                "200 OK",
                r#"{"candidates":[{"content":{"parts":[{"text":"[{\"date\":\"12/04\",\"description\":\"Supermercado\",\"amount\":150.0}]"}]}}]}"#,
            )
            .await;
            let out = client(url)
                .extract(&ExtractionInput::Text("12/04 SUPERMERCADO 150,00".to_string()))
                .await
                .unwrap();
            let ExtractionOutcome::Records(records) = out else {
                panic!("expected records, got {out:?}");
            };
            assert_eq!(records[0].description, "Supermercado");

            let request = request.await.unwrap();
            assert!(request.starts_with("POST /v1beta/models/gemini-3-flash-preview:generateContent"));
            assert!(request.to_lowercase().contains("x-goog-api-key: test-key"));
            assert!(request.contains("SUPERMERCADO"));
        }

        #[tokio::test]
        async fn test_error_status_is_gateway_error() {
            let (url, _request) =
                serve_once("503 Service Unavailable", r#"{"error":{"message":"model overloaded"}}"#).await;
            let err = client(url)
                .extract(&ExtractionInput::Text("x".to_string()))
                .await
                .unwrap_err();
            match err {
                GatewayError::Status { status, body } => {
                    assert_eq!(status, 503);
                    assert!(body.contains("model overloaded"));
                }
                other => panic!("expected status error, got {other:?}"),
            }
        }

        #[tokio::test]
        async fn test_unreadable_envelope_is_malformed_not_error() {
            let (url, _request) = serve_once("200 OK", "<html>upstream hiccup</html>").await;
            let out = client(url)
                .extract(&ExtractionInput::Text("x".to_string()))
                .await
                .unwrap();
            assert!(matches!(out, ExtractionOutcome::Empty(EmptyReason::Malformed(_))));
        }

        #[tokio::test]
        async fn test_prose_answer_is_malformed() {
            let (url, _request) = serve_once(
                "200 OK",
                r#"{"candidates":[{"content":{"parts":[{"text":"I could not find any purchases."}]}}]}"#,
            )
            .await;
            let out = client(url)
                .extract(&ExtractionInput::Text("x".to_string()))
                .await
                .unwrap();
            assert!(matches!(out, ExtractionOutcome::Empty(EmptyReason::Malformed(_))));
        }

        #[tokio::test]
        async fn test_unreachable_endpoint_is_transport_error() {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            drop(listener);
            let err = client(format!("http://{addr}"))
                .extract(&ExtractionInput::Text("x".to_string()))
                .await
                .unwrap_err();
            assert!(matches!(err, GatewayError::Transport(_)));
        }
    }
}
