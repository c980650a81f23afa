use crate::generation::{AttemptShape, UpstreamAttempt};
use async_trait::async_trait;
use axum::http::StatusCode;
use bytes::Bytes;
use reqwest::Url;
use reqwest::header::ACCEPT;
use serde_json::{Map, Value};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamErrorKind {
    Network,
    Timeout,
    Http,
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct UpstreamCallError {
    pub kind: UpstreamErrorKind,
    pub status: Option<StatusCode>,
    pub message: String,
}

impl UpstreamCallError {
    pub fn new(kind: UpstreamErrorKind, status: Option<StatusCode>, message: String) -> Self {
        Self {
            kind,
            status,
            message,
        }
    }
}

/// An upstream reply, classified once at the transport boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamReply {
    Object(Map<String, Value>),
    Text(String),
    Audio(Bytes),
}

impl UpstreamReply {
    /// Resolves a textual body that may be a JSON object, a JSON-encoded
    /// string (itself possibly holding an object) or plain text.
    pub fn from_text_body(raw: &[u8]) -> Self {
        match serde_json::from_slice::<Value>(raw) {
            Ok(Value::Object(map)) => Self::Object(map),
            Ok(Value::String(inner)) => match serde_json::from_str::<Value>(&inner) {
                Ok(Value::Object(map)) => Self::Object(map),
                _ => Self::Text(inner),
            },
            _ => Self::Text(String::from_utf8_lossy(raw).into_owned()),
        }
    }
}

#[async_trait]
pub trait UpstreamTransport: Send + Sync {
    async fn fetch(&self, attempt: &UpstreamAttempt) -> Result<UpstreamReply, UpstreamCallError>;

    /// Best-effort existence check for a generated resource URL.
    async fn check_exists(&self, url: &Url, timeout: Duration) -> Result<(), UpstreamCallError>;
}

#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl UpstreamTransport for HttpTransport {
    async fn fetch(&self, attempt: &UpstreamAttempt) -> Result<UpstreamReply, UpstreamCallError> {
        let resp = self
            .client
            .get(attempt.url.clone())
            .timeout(attempt.timeout)
            .header(ACCEPT, attempt.shape.accept())
            .send()
            .await
            .map_err(|err| classify(err, None))?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(UpstreamCallError::new(
                UpstreamErrorKind::Http,
                Some(status),
                format!("upstream status {}: {}", status, text),
            ));
        }
        let body = resp.bytes().await.map_err(|err| classify(err, Some(status)))?;
        Ok(match attempt.shape {
            AttemptShape::TextAudio => UpstreamReply::Audio(body),
            AttemptShape::TextJson | AttemptShape::TextPlainFallback => {
                UpstreamReply::from_text_body(&body)
            }
        })
    }

    async fn check_exists(&self, url: &Url, timeout: Duration) -> Result<(), UpstreamCallError> {
        let resp = self
            .client
            .get(url.clone())
            .timeout(timeout)
            .send()
            .await
            .map_err(|err| classify(err, None))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(UpstreamCallError::new(
                UpstreamErrorKind::Http,
                Some(status),
                format!("existence check status {}", status),
            ));
        }
        Ok(())
    }
}

fn classify(err: reqwest::Error, status: Option<StatusCode>) -> UpstreamCallError {
    let kind = if err.is_timeout() {
        UpstreamErrorKind::Timeout
    } else {
        UpstreamErrorKind::Network
    };
    UpstreamCallError::new(kind, status, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::UpstreamReply;
    use serde_json::json;

    #[test]
    fn object_body_resolves_to_object() {
        let reply = UpstreamReply::from_text_body(br#"{"text":"hi","model":"openai"}"#);
        let UpstreamReply::Object(map) = reply else {
            panic!("expected object");
        };
        assert_eq!(map.get("text"), Some(&json!("hi")));
    }

    #[test]
    fn json_encoded_object_string_is_unwrapped() {
        let body = serde_json::to_vec(&json!(r#"{"response":"inner"}"#)).unwrap();
        let reply = UpstreamReply::from_text_body(&body);
        let UpstreamReply::Object(map) = reply else {
            panic!("expected object");
        };
        assert_eq!(map.get("response"), Some(&json!("inner")));
    }

    #[test]
    fn json_encoded_plain_string_is_text() {
        let reply = UpstreamReply::from_text_body(br#""just words""#);
        assert_eq!(reply, UpstreamReply::Text("just words".to_string()));
    }

    #[test]
    fn non_json_body_is_plain_text() {
        let reply = UpstreamReply::from_text_body(b"Hello there, friend.");
        assert_eq!(reply, UpstreamReply::Text("Hello there, friend.".to_string()));
    }

    #[test]
    fn json_scalars_keep_raw_text() {
        assert_eq!(
            UpstreamReply::from_text_body(b"42"),
            UpstreamReply::Text("42".to_string())
        );
        assert_eq!(
            UpstreamReply::from_text_body(b"[1,2]"),
            UpstreamReply::Text("[1,2]".to_string())
        );
    }
}
