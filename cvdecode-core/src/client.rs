//! HTTP client for the inference service

use crate::config::BatchConfig;
use crate::error::{DecodeError, OutcomeError, Result};
use crate::outcome::Transcription;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Body returned by the inference endpoint on success
#[derive(Debug, Deserialize)]
struct InferenceResponse {
    transcription: String,
    duration: DurationValue,
}

/// The service reports duration as text, but a bare JSON number is accepted too
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DurationValue {
    Text(String),
    Number(serde_json::Number),
}

impl DurationValue {
    fn into_string(self) -> String {
        match self {
            DurationValue::Text(text) => text,
            DurationValue::Number(number) => number.to_string(),
        }
    }
}

/// Shared client for one batch run.
///
/// Wraps a single `reqwest::Client` (and so a single connection pool) together with
/// a connection gate. Every exchange holds a gate permit from send until its body
/// has been read, so no more than `connection_limit` connections are ever in use.
#[derive(Debug, Clone)]
pub struct InferenceClient {
    http: reqwest::Client,
    connections: Arc<Semaphore>,
    connection_limit: usize,
    inference_url: String,
    health_url: String,
    content_type: String,
    file_field: String,
}

impl InferenceClient {
    /// Build the client from a validated configuration
    pub fn new(config: &BatchConfig) -> Result<Self> {
        let connection_limit = config.connection_limit.max(1);
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .pool_max_idle_per_host(connection_limit)
            .build()
            .map_err(|e| {
                DecodeError::Configuration(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            http,
            connections: Arc::new(Semaphore::new(connection_limit)),
            connection_limit,
            inference_url: config.inference_url.clone(),
            health_url: config.health_url.clone(),
            content_type: config.content_type.clone(),
            file_field: config.file_field.clone(),
        })
    }

    pub fn connection_limit(&self) -> usize {
        self.connection_limit
    }

    pub fn health_url(&self) -> &str {
        &self.health_url
    }

    /// Send one audio payload to the inference endpoint
    pub async fn transcribe(
        &self,
        filename: &str,
        audio: Vec<u8>,
    ) -> std::result::Result<Transcription, OutcomeError> {
        let part = Part::bytes(audio)
            .file_name(filename.to_string())
            .mime_str(&self.content_type)
            .map_err(classify)?;
        let form = Form::new().part(self.file_field.clone(), part);

        let _connection = self
            .connections
            .acquire()
            .await
            .map_err(|e| OutcomeError::Transport(e.to_string()))?;

        let response = self
            .http
            .post(&self.inference_url)
            .multipart(form)
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        if status != StatusCode::OK {
            // Drain the body so the connection goes back to the pool instead of
            // being torn down after the permit is released
            let _ = response.bytes().await;
            return Err(OutcomeError::Status(status.as_u16()));
        }

        let parsed: InferenceResponse = response.json().await.map_err(|e| {
            if e.is_decode() {
                OutcomeError::MalformedBody(e.to_string())
            } else {
                classify(e)
            }
        })?;

        Ok(Transcription {
            text: parsed.transcription,
            duration: parsed.duration.into_string(),
        })
    }

    /// Issue a bodiless GET against the liveness endpoint and return its status
    pub async fn ping(&self) -> std::result::Result<StatusCode, OutcomeError> {
        let _connection = self
            .connections
            .acquire()
            .await
            .map_err(|e| OutcomeError::Transport(e.to_string()))?;

        let response = self
            .http
            .get(&self.health_url)
            .send()
            .await
            .map_err(classify)?;
        let status = response.status();
        let _ = response.bytes().await;
        Ok(status)
    }
}

fn classify(err: reqwest::Error) -> OutcomeError {
    if err.is_timeout() {
        OutcomeError::Timeout
    } else {
        OutcomeError::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_accepts_text_and_number() {
        let text: InferenceResponse =
            serde_json::from_str(r#"{"transcription":"hi","duration":"1.2"}"#).unwrap();
        assert_eq!(text.duration.into_string(), "1.2");

        let number: InferenceResponse =
            serde_json::from_str(r#"{"transcription":"hi","duration":4.5}"#).unwrap();
        assert_eq!(number.duration.into_string(), "4.5");
    }

    #[test]
    fn test_missing_field_is_rejected() {
        let result = serde_json::from_str::<InferenceResponse>(r#"{"text":"hi"}"#);
        assert!(result.is_err());
    }
}
