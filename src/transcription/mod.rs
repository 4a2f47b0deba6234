//! Post-hoc transcription of recorded audio
//!
//! WAV files go straight to the remote recognizer; merged media first has
//! its audio track extracted through the external tool. The recognized text
//! is written to a sibling `.txt` file. "Could not understand audio" is a
//! distinct outcome from transport and tool failures.

use crate::mux::{Muxer, MuxError};
use crate::settings::Settings;
use crate::speech::{RecognizeError, SpeechBackend};
use log::info;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TranscribeError {
    #[error("could not understand audio")]
    Unintelligible,

    #[error("speech backend not available: {0}")]
    BackendUnavailable(String),

    #[error("recognition failed: {0}")]
    Backend(String),

    #[error("audio extraction failed: {0}")]
    Extract(#[from] MuxError),

    #[error("failed to write transcript: {0}")]
    Io(#[from] std::io::Error),
}

/// Transcribe `source` (a WAV or merged media file) and write `<stem>.txt`
///
/// Returns the transcript path and the text. Extracted intermediate WAVs are
/// left on disk next to the source.
pub fn transcribe_to_text_file(
    settings: &Settings,
    source: &Path,
) -> Result<(PathBuf, String), TranscribeError> {
    let recognizer = SpeechBackend::detect(settings)
        .into_recognizer()
        .ok_or_else(|| {
            TranscribeError::BackendUnavailable(
                "no recognizer endpoint configured".to_string(),
            )
        })?;

    let wav_path = if is_wav(source) {
        source.to_path_buf()
    } else {
        let muxer = Muxer::resolve(settings.tool_path.as_deref())?;
        muxer.extract_audio(source)?
    };

    let text = recognizer.recognize_wav(&wav_path).map_err(|e| match e {
        RecognizeError::Unintelligible => TranscribeError::Unintelligible,
        RecognizeError::Unreachable(msg) => TranscribeError::Backend(msg),
        RecognizeError::Io(io) => TranscribeError::Io(io),
    })?;

    let transcript_path = source.with_extension("txt");
    std::fs::write(&transcript_path, &text)?;
    info!("Transcript written to {}", transcript_path.display());
    Ok((transcript_path, text))
}

fn is_wav(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case("wav"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};

    #[test]
    fn test_wav_detection_is_case_insensitive() {
        assert!(is_wav(Path::new("a.wav")));
        assert!(is_wav(Path::new("a.WAV")));
        assert!(!is_wav(Path::new("a.mp4")));
        assert!(!is_wav(Path::new("a")));
    }

    #[test]
    fn test_unconfigured_backend_is_reported_as_unavailable() {
        let settings = Settings::default();
        match transcribe_to_text_file(&settings, Path::new("x.wav")) {
            Err(TranscribeError::BackendUnavailable(_)) => {}
            other => panic!("expected BackendUnavailable, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_empty_recognition_maps_to_unintelligible() {
        let wav = std::env::temp_dir().join(format!(
            "camrec_transcribe_{}.wav",
            uuid::Uuid::new_v4()
        ));
        std::fs::write(&wav, b"RIFF").unwrap();

        // One-shot recognizer stub that cannot make out any words
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let endpoint = format!("http://{}/stt", listener.local_addr().unwrap());
        let server = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            stream
                .set_read_timeout(Some(std::time::Duration::from_millis(200)))
                .unwrap();
            let mut buf = [0u8; 4096];
            while let Ok(n) = stream.read(&mut buf) {
                if n == 0 {
                    break;
                }
            }
            let body = r#"{"text": ""}"#;
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            let _ = stream.write_all(response.as_bytes());
        });

        let settings = Settings {
            recognizer_endpoint: Some(endpoint),
            ..Settings::default()
        };
        match transcribe_to_text_file(&settings, &wav) {
            Err(TranscribeError::Unintelligible) => {}
            other => panic!("expected Unintelligible, got {:?}", other.map(|_| ())),
        }
        // No transcript is written for an unintelligible take
        assert!(!wav.with_extension("txt").exists());

        server.join().unwrap();
        let _ = std::fs::remove_file(&wav);
    }
}
