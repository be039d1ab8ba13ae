// src/ocr_client.rs

use crate::error::OcrError;
use async_trait::async_trait;
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

/// Anything that turns an image into raw receipt text.
#[async_trait]
pub trait TextRecognizer: Send + Sync {
    async fn recognize(&self, file_name: &str, image: Vec<u8>) -> Result<String, OcrError>;
}

#[derive(Debug, Deserialize)]
struct OcrResponse {
    text: Option<String>,
    ocr: Option<String>,
    error: Option<String>,
}

/// Connectivity indicator for the OCR backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OcrStatus {
    pub connected: bool,
    pub message: String,
}

/// HTTP client for the OCR service (`POST /api/ocr`, `GET /health`).
pub struct OcrClient {
    client: Client,
    base_url: String,
    health_timeout: Duration,
}

impl OcrClient {
    pub fn new(base_url: &str, timeout: Duration, health_timeout: Duration) -> Result<Self, OcrError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            health_timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Check whether the backend answers. Any failure, including a timeout,
    /// counts as "not connected".
    pub async fn health(&self) -> OcrStatus {
        let url = format!("{}/health", self.base_url);

        match self
            .client
            .get(&url)
            .timeout(self.health_timeout)
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => {
                info!(url = %url, "OCR backend is reachable");
                OcrStatus {
                    connected: true,
                    message: "OCR backend connected".to_string(),
                }
            }
            Ok(resp) => {
                warn!(status = %resp.status(), "OCR backend returned non-OK status");
                OcrStatus {
                    connected: false,
                    message: format!("OCR backend not responding ({})", resp.status()),
                }
            }
            Err(e) => {
                warn!(error = %e, "OCR backend not reachable");
                OcrStatus {
                    connected: false,
                    message: format!("OCR backend unavailable: {e}"),
                }
            }
        }
    }
}

#[async_trait]
impl TextRecognizer for OcrClient {
    async fn recognize(&self, file_name: &str, image: Vec<u8>) -> Result<String, OcrError> {
        let url = format!("{}/api/ocr", self.base_url);
        info!(url = %url, file = %file_name, bytes = image.len(), "Sending image to OCR");

        let part = Part::bytes(image).file_name(file_name.to_string());
        let form = Form::new().part("file", part);

        let response = self.client.post(&url).multipart(form).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        let text = decode_response(status, &body)?;
        info!(chars = text.len(), "OCR text received");
        Ok(text)
    }
}

/// Pull the raw text out of a backend reply: `text` first, then `ocr`.
fn decode_response(status: u16, body: &str) -> Result<String, OcrError> {
    let parsed = serde_json::from_str::<OcrResponse>(body);

    if !(200..300).contains(&status) {
        let message = parsed
            .ok()
            .and_then(|r| r.error)
            .unwrap_or_else(|| body.trim().to_string());
        return Err(OcrError::Backend { status, message });
    }

    let parsed = parsed.map_err(OcrError::Decode)?;
    if let Some(message) = parsed.error {
        return Err(OcrError::Backend { status, message });
    }

    match (parsed.text, parsed.ocr) {
        (Some(text), _) if !text.is_empty() => Ok(text),
        (_, Some(ocr)) => Ok(ocr),
        (Some(text), None) => Ok(text),
        (None, None) => Err(OcrError::MissingText),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header_regex, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(base: &str) -> OcrClient {
        OcrClient::new(base, Duration::from_secs(5), Duration::from_millis(300))
            .expect("failed to build test OcrClient")
    }

    #[test]
    fn test_decode_prefers_text_then_ocr() {
        assert_eq!(
            decode_response(200, r#"{"status":"success","text":"Gula 1kg","filename":"a.jpg"}"#).unwrap(),
            "Gula 1kg"
        );
        assert_eq!(decode_response(200, r#"{"ocr":"Teh 3.000"}"#).unwrap(), "Teh 3.000");
        assert_eq!(
            decode_response(200, r#"{"text":"","ocr":"Teh 3.000"}"#).unwrap(),
            "Teh 3.000"
        );
        assert_eq!(decode_response(200, r#"{"text":""}"#).unwrap(), "");
        assert!(matches!(
            decode_response(200, r#"{"status":"success"}"#),
            Err(OcrError::MissingText)
        ));
        assert!(matches!(
            decode_response(200, "<html>"),
            Err(OcrError::Decode(_))
        ));
    }

    #[test]
    fn test_decode_error_payloads() {
        match decode_response(400, r#"{"error":"No file uploaded"}"#) {
            Err(OcrError::Backend { status, message }) => {
                assert_eq!(status, 400);
                assert_eq!(message, "No file uploaded");
            }
            other => panic!("unexpected: {other:?}"),
        }
        match decode_response(502, "Bad Gateway\n") {
            Err(OcrError::Backend { status, message }) => {
                assert_eq!(status, 502);
                assert_eq!(message, "Bad Gateway");
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(matches!(
            decode_response(200, r#"{"error":"OCR failed"}"#),
            Err(OcrError::Backend { status: 200, .. })
        ));
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let client = test_client("http://ocr.local:5000/");
        assert_eq!(client.base_url(), "http://ocr.local:5000");
    }

    #[tokio::test]
    async fn test_recognize_posts_multipart_file() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/ocr"))
            .and(header_regex("content-type", "^multipart/form-data"))
            .and(body_string_contains(r#"name="file""#))
            .and(body_string_contains(r#"filename="nota.jpg""#))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"status": "success", "text": "Gula 1kg\n2x14000"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let text = client
            .recognize("nota.jpg", b"fake image".to_vec())
            .await
            .unwrap();
        assert_eq!(text, "Gula 1kg\n2x14000");
    }

    #[tokio::test]
    async fn test_recognize_backend_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/ocr"))
            .respond_with(
                ResponseTemplate::new(500)
                    .set_body_json(json!({"error": "Tesseract OCR engine not found on the server."})),
            )
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let err = client.recognize("nota.jpg", vec![1, 2, 3]).await.unwrap_err();
        assert!(matches!(err, OcrError::Backend { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_health_ok() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
            .mount(&server)
            .await;

        let status = test_client(&server.uri()).health().await;
        assert!(status.connected);
    }

    #[tokio::test]
    async fn test_health_non_ok_status() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let status = test_client(&server.uri()).health().await;
        assert!(!status.connected);
    }

    #[tokio::test]
    async fn test_health_timeout() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let status = test_client(&server.uri()).health().await;
        assert!(!status.connected);
    }

    #[tokio::test]
    async fn test_health_unreachable() {
        let status = test_client("http://127.0.0.1:1").health().await;
        assert!(!status.connected);
        assert!(status.message.starts_with("OCR backend unavailable"));
    }
}
