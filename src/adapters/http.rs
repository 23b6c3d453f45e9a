//! HTTP explanation service client.
//!
//! POSTs the explanation payload as JSON and expects
//! `{"explanation": "..."}` back. The API key, when present, is sent as a
//! bearer token.

use std::time::Duration;

use reqwest::blocking::Client;

use crate::ports::{ExplainError, Explainer, ExplanationPayload};

/// Environment variable holding the service API key.
pub const API_KEY_ENV: &str = "VITALRISK_EXPLAIN_API_KEY";

pub struct HttpExplainer {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl HttpExplainer {
    /// Client for `endpoint` with a per-request timeout. The API key is read
    /// from `VITALRISK_EXPLAIN_API_KEY`.
    ///
    /// # Errors
    /// Returns `ExplainError::Unavailable` if the HTTP client cannot be built.
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, ExplainError> {
        let api_key = std::env::var(API_KEY_ENV).ok().filter(|k| !k.trim().is_empty());
        Self::with_api_key(endpoint, timeout, api_key)
    }

    /// # Errors
    /// Returns `ExplainError::Unavailable` if the HTTP client cannot be built.
    pub fn with_api_key(
        endpoint: impl Into<String>,
        timeout: Duration,
        api_key: Option<String>,
    ) -> Result<Self, ExplainError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| ExplainError::Unavailable(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key,
            timeout,
        })
    }
}

/// Pull the explanation text out of a service response.
fn explanation_text(body: &serde_json::Value) -> Result<String, ExplainError> {
    match body["explanation"].as_str().map(str::trim) {
        Some(text) if !text.is_empty() => Ok(text.to_string()),
        _ => Err(ExplainError::Malformed(
            "missing or empty \"explanation\" field".to_string(),
        )),
    }
}

impl Explainer for HttpExplainer {
    fn name(&self) -> &str {
        "http"
    }

    fn explain(&self, payload: &ExplanationPayload) -> Result<String, ExplainError> {
        let mut request = self.client.post(&self.endpoint).json(payload);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().map_err(|e| {
            if e.is_timeout() {
                ExplainError::Timeout(self.timeout)
            } else {
                ExplainError::Unavailable(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExplainError::Unavailable(format!("service returned {status}")));
        }

        let body: serde_json::Value = response
            .json()
            .map_err(|e| ExplainError::Malformed(e.to_string()))?;
        explanation_text(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;

    fn payload() -> ExplanationPayload {
        ExplanationPayload {
            score: 20,
            category: "Low Risk".to_string(),
            confidence: 0.6,
            factors: Vec::new(),
            trajectory: "worsening".to_string(),
            projected_score: 49,
            horizon_days: 30.0,
        }
    }

    /// Serve one canned HTTP response on a local port; returns the URL and
    /// a handle yielding the raw request.
    fn serve_once(status: &'static str, body: &'static str) -> (String, std::thread::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("Bind");
        let url = format!("http://{}/explain", listener.local_addr().expect("Addr"));

        let handle = std::thread::spawn(move || {
            let (stream, _) = listener.accept().expect("Accept");
            let mut reader = BufReader::new(stream.try_clone().expect("Clone"));

            let mut head = String::new();
            let mut content_length = 0usize;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).expect("Read header");
                if let Some(v) = line.to_ascii_lowercase().strip_prefix("content-length:") {
                    content_length = v.trim().parse().expect("Length");
                }
                head.push_str(&line);
                if line == "\r\n" || line.is_empty() {
                    break;
                }
            }
            let mut body_buf = vec![0u8; content_length];
            reader.read_exact(&mut body_buf).expect("Read body");

            let mut stream = stream;
            write!(
                stream,
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            )
            .expect("Write response");

            head + &String::from_utf8_lossy(&body_buf)
        });

        (url, handle)
    }

    #[test]
    fn test_explanation_field_is_required() {
        let ok = serde_json::json!({ "explanation": "  Heart rate is rising. " });
        assert_eq!(explanation_text(&ok).expect("Should parse"), "Heart rate is rising.");

        let missing = serde_json::json!({ "analysis": "wrong field" });
        assert!(matches!(explanation_text(&missing), Err(ExplainError::Malformed(_))));

        let blank = serde_json::json!({ "explanation": "" });
        assert!(explanation_text(&blank).is_err());
    }

    #[test]
    fn test_posts_payload_with_bearer_token() {
        let (url, server) = serve_once("200 OK", r#"{"explanation":"Rising heart rate."}"#);
        let explainer = HttpExplainer::with_api_key(url, Duration::from_secs(5), Some("test-key-123".to_string()))
            .expect("Client");

        let text = explainer.explain(&payload()).expect("Should explain");
        assert_eq!(text, "Rising heart rate.");

        let request = server.join().expect("Server thread");
        assert!(request.starts_with("POST /explain"));
        assert!(request.to_ascii_lowercase().contains("authorization: bearer test-key-123"));
        assert!(request.contains("\"projectedScore\":49"));
    }

    #[test]
    fn test_error_status_is_unavailable() {
        let (url, server) = serve_once("503 Service Unavailable", "{}");
        let explainer = HttpExplainer::with_api_key(url, Duration::from_secs(5), None).expect("Client");

        let err = explainer.explain(&payload()).expect_err("Should fail");
        assert!(matches!(err, ExplainError::Unavailable(_)));
        let _ = server.join();
    }

    #[test]
    fn test_unreachable_service() {
        // Bind then drop to get a port nobody listens on.
        let port = TcpListener::bind("127.0.0.1:0")
            .and_then(|l| l.local_addr())
            .expect("Port")
            .port();
        let explainer = HttpExplainer::with_api_key(
            format!("http://127.0.0.1:{port}/explain"),
            Duration::from_millis(500),
            None,
        )
        .expect("Client");

        assert!(explainer.explain(&payload()).is_err());
    }
}
