//! Chat completion client for Groq's OpenAI-compatible endpoint.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_API_URL: &str = "https://api.groq.com/openai/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "llama3-8b-8192";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Fixed instruction sent ahead of every question.
pub const SYSTEM_PROMPT: &str = "You're an intelligent tutor for grades 6–12. Be clear and friendly.";

/// Something that can turn a question into an answer.
pub trait Answerer: Send + Sync {
    fn ask(&self, question: &str) -> impl Future<Output = Result<String, Error>> + Send;
}

pub struct Client {
    api_key: String,
    api_url: String,
    model: String,
    http: reqwest::Client,
}

#[derive(Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    messages: [ApiMessage<'a>; 2],
}

#[derive(Serialize)]
struct ApiMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ApiResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: String,
}

impl Client {
    pub fn new(api_key: String, api_url: String, model: String, timeout: Duration) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;

        Ok(Self {
            api_key,
            api_url,
            model,
            http,
        })
    }

    /// Ask a single question with the tutor system prompt. No retries.
    pub async fn ask(&self, question: &str) -> Result<String, Error> {
        let request = ApiRequest {
            model: &self.model,
            messages: [
                ApiMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ApiMessage {
                    role: "user",
                    content: question,
                },
            ],
        };

        let response = self
            .http
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(Error::from_reqwest)?;

        let status = response.status();
        let body = response.text().await.map_err(Error::from_reqwest)?;

        debug!("Completion response status: {status}");

        if !status.is_success() {
            return Err(Error::Api {
                status: status.as_u16(),
                body,
            });
        }

        parse_completion(&body)
    }
}

impl Answerer for Client {
    fn ask(&self, question: &str) -> impl Future<Output = Result<String, Error>> + Send {
        Client::ask(self, question)
    }
}

/// Extract `choices[0].message.content`, rejecting any other shape.
fn parse_completion(body: &str) -> Result<String, Error> {
    let parsed: ApiResponse =
        serde_json::from_str(body).map_err(|e| Error::Malformed(e.to_string()))?;

    parsed
        .choices
        .into_iter()
        .next()
        .map(|c| c.message.content)
        .ok_or_else(|| Error::Malformed("no choices in response".to_string()))
}

#[derive(Debug)]
pub enum Error {
    /// The request did not finish within the client timeout.
    Timeout,
    /// Connection or transport failure.
    Http(String),
    /// Non-2xx status from the provider.
    Api { status: u16, body: String },
    /// 2xx response whose body did not match the expected schema.
    Malformed(String),
}

impl Error {
    fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::Timeout
        } else {
            Error::Http(e.to_string())
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Timeout => write!(f, "request timed out"),
            Error::Http(e) => write!(f, "HTTP error: {e}"),
            Error::Api { status, body } => write!(f, "API error {status}: {body}"),
            Error::Malformed(e) => write!(f, "malformed response: {e}"),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::task::JoinHandle;

    /// Read one HTTP request (headers plus content-length body).
    async fn read_request(socket: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
                continue;
            };
            let head = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
            let len = head
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .map(|v| v.trim().parse::<usize>().unwrap())
                .unwrap_or(0);
            if buf.len() >= end + 4 + len {
                break;
            }
        }
        String::from_utf8(buf).unwrap()
    }

    /// Serve a single canned response, returning the URL and the captured request.
    async fn serve_once(status: &str, body: &str, delay: Duration) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let response = format!(
            "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            tokio::time::sleep(delay).await;
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
            request
        });

        (format!("http://{addr}/openai/v1/chat/completions"), handle)
    }

    fn client(url: String, timeout: Duration) -> Client {
        Client::new("gsk_test".to_string(), url, DEFAULT_MODEL.to_string(), timeout).unwrap()
    }

    #[tokio::test]
    async fn test_success_returns_content_and_sends_prompt_pair() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"Plants make food from light."}}]}"#;
        let (url, server) = serve_once("200 OK", body, Duration::ZERO).await;

        let answer = client(url, DEFAULT_TIMEOUT).ask("What is photosynthesis?").await.unwrap();
        assert_eq!(answer, "Plants make food from light.");

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /openai/v1/chat/completions"));
        assert!(request.to_ascii_lowercase().contains("authorization: bearer gsk_test"));

        let json_start = request.find("\r\n\r\n").unwrap() + 4;
        let sent: serde_json::Value = serde_json::from_str(&request[json_start..]).unwrap();
        assert_eq!(sent["model"], DEFAULT_MODEL);
        assert_eq!(sent["messages"][0]["role"], "system");
        assert_eq!(sent["messages"][0]["content"], SYSTEM_PROMPT);
        assert_eq!(sent["messages"][1]["role"], "user");
        assert_eq!(sent["messages"][1]["content"], "What is photosynthesis?");
        assert_eq!(sent["messages"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_non_success_status_is_api_error() {
        let (url, _server) = serve_once("500 Internal Server Error", r#"{"error":"boom"}"#, Duration::ZERO).await;

        let err = client(url, DEFAULT_TIMEOUT).ask("hi").await.unwrap_err();
        match err {
            Error::Api { status, body } => {
                assert_eq!(status, 500);
                assert!(body.contains("boom"));
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unexpected_shape_is_malformed() {
        let (url, _server) = serve_once("200 OK", r#"{"error":{"message":"model not found"}}"#, Duration::ZERO).await;

        let err = client(url, DEFAULT_TIMEOUT).ask("hi").await.unwrap_err();
        assert!(matches!(err, Error::Malformed(_)));
    }

    #[tokio::test]
    async fn test_slow_provider_times_out() {
        let (url, _server) = serve_once("200 OK", "{}", Duration::from_secs(5)).await;

        let err = client(url, Duration::from_millis(200)).ask("hi").await.unwrap_err();
        assert!(matches!(err, Error::Timeout), "got {err:?}");
    }

    #[tokio::test]
    async fn test_connection_refused_is_http_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = client(format!("http://{addr}/"), DEFAULT_TIMEOUT).ask("hi").await.unwrap_err();
        assert!(matches!(err, Error::Http(_)), "got {err:?}");
    }

    #[test]
    fn test_parse_rejects_empty_choices() {
        let err = parse_completion(r#"{"choices":[]}"#).unwrap_err();
        assert!(err.to_string().contains("no choices"));
    }

    #[test]
    fn test_parse_rejects_null_content() {
        let err = parse_completion(r#"{"choices":[{"message":{"content":null}}]}"#).unwrap_err();
        assert!(matches!(err, Error::Malformed(_)));
    }

    #[test]
    fn test_parse_takes_first_choice() {
        let body = r#"{"choices":[{"message":{"content":"first"}},{"message":{"content":"second"}}]}"#;
        assert_eq!(parse_completion(body).unwrap(), "first");
    }
}
