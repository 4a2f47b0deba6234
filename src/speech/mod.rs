//! Remote speech recognition backend
//!
//! Recognition goes through an HTTP service: the WAV is uploaded as
//! multipart form data and the service answers with JSON carrying the
//! recognized text. The backend is a capability: it is available only when
//! an endpoint is configured, and the coordinator checks that once per
//! session to decide whether the voice-stop listener runs at all.

mod listener;

pub use listener::run_voice_stop_task;

use crate::settings::Settings;
use log::{debug, warn};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Recognition failure classes
///
/// "Could not understand" is deliberately distinct from transport problems;
/// callers report them differently.
#[derive(Debug, Error)]
pub enum RecognizeError {
    #[error("could not understand audio")]
    Unintelligible,

    #[error("recognition service unreachable: {0}")]
    Unreachable(String),

    #[error("failed to read audio file: {0}")]
    Io(#[from] std::io::Error),
}

/// Client for the remote recognition service
pub struct RemoteRecognizer {
    endpoint: String,
    api_key: Option<String>,
    client: reqwest::blocking::Client,
}

impl RemoteRecognizer {
    pub fn new(endpoint: String, api_key: Option<String>) -> Result<Self, String> {
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| format!("Failed to build HTTP client: {}", e))?;
        Ok(Self {
            endpoint,
            api_key,
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Upload a WAV file and return the recognized text
    pub fn recognize_wav(&self, path: &Path) -> Result<String, RecognizeError> {
        let bytes = std::fs::read(path)?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio.wav".to_string());

        let part = reqwest::blocking::multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("audio/wav")
            .map_err(|e| RecognizeError::Unreachable(e.to_string()))?;
        let form = reqwest::blocking::multipart::Form::new().part("file", part);

        let mut request = self.client.post(&self.endpoint).multipart(form);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .map_err(|e| RecognizeError::Unreachable(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(RecognizeError::Unreachable(format!("HTTP {}", status)));
        }

        let body: serde_json::Value = response
            .json()
            .map_err(|e| RecognizeError::Unreachable(e.to_string()))?;
        let text = body
            .get("text")
            .and_then(|t| t.as_str())
            .unwrap_or("")
            .trim()
            .to_string();

        if text.is_empty() {
            debug!("Recognizer returned no text for {}", path.display());
            return Err(RecognizeError::Unintelligible);
        }
        Ok(text)
    }
}

/// Capability-gated speech collaborator
///
/// Queried once at session start; when unavailable the voice-stop task is
/// simply not launched, which is not an error.
pub enum SpeechBackend {
    Available(RemoteRecognizer),
    Unavailable,
}

impl SpeechBackend {
    /// Decide availability from the configured settings
    pub fn detect(settings: &Settings) -> Self {
        let Some(endpoint) = settings.recognizer_endpoint.clone() else {
            debug!("No recognizer endpoint configured, speech backend unavailable");
            return SpeechBackend::Unavailable;
        };
        match RemoteRecognizer::new(endpoint, settings.recognizer_api_key.clone()) {
            Ok(recognizer) => SpeechBackend::Available(recognizer),
            Err(e) => {
                warn!("Speech backend unavailable: {}", e);
                SpeechBackend::Unavailable
            }
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, SpeechBackend::Available(_))
    }

    pub fn into_recognizer(self) -> Option<RemoteRecognizer> {
        match self {
            SpeechBackend::Available(recognizer) => Some(recognizer),
            SpeechBackend::Unavailable => None,
        }
    }
}
