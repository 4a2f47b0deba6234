//! Voice-triggered stop listener
//!
//! Runs only when the speech backend is available. The listener records
//! short microphone windows on its own stream, skips windows quieter than
//! the calibrated ambient level, sends the rest to the remote recognizer,
//! and sets the session's cancel token when the stop phrase appears in the
//! recognized text. Every per-attempt failure is swallowed; this task can
//! only ever request a stop, never report one.

use crate::audio::{calculate_rms, AudioCapture, CaptureState, WavRecorder};
use crate::cancel::CancelToken;
use crate::speech::RemoteRecognizer;
use log::{debug, info};
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Ambient noise calibration window at task start
const CALIBRATION_WINDOW: Duration = Duration::from_secs(1);

/// Bounded wait per listen attempt
const LISTEN_WINDOW: Duration = Duration::from_secs(3);

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Windows must exceed ambient RMS by this factor to be sent out
const AMBIENT_MARGIN: f32 = 1.5;

/// Floor so a dead-silent room does not make everything look like speech
const MIN_ENERGY: f32 = 0.01;

/// Voice-stop task: listen until the token is set or capture stops working
pub fn run_voice_stop_task(token: CancelToken, recognizer: RemoteRecognizer, stop_phrase: String) {
    let phrase = stop_phrase.to_lowercase();

    let threshold = match record_window(CALIBRATION_WINDOW, &token) {
        Some((samples, _)) => energy_threshold(calculate_rms(&samples)),
        None => energy_threshold(0.0),
    };
    debug!("Voice-stop listening, energy threshold {:.4}", threshold);

    while !token.is_set() {
        let Some((samples, sample_rate)) = record_window(LISTEN_WINDOW, &token) else {
            // Microphone unavailable right now; retry quietly
            std::thread::sleep(LISTEN_WINDOW);
            continue;
        };

        if calculate_rms(&samples) < threshold {
            continue;
        }

        match recognize_samples(&recognizer, &samples, sample_rate) {
            Ok(text) => {
                debug!("Voice-stop heard: {:?}", text);
                if phrase_heard(&text, &phrase) {
                    info!("Stop phrase recognized, requesting stop");
                    token.set();
                }
            }
            Err(e) => {
                // Timeouts, network errors and unintelligible audio are all
                // non-events for this task
                debug!("Voice-stop attempt ignored: {}", e);
            }
        }
    }
}

/// Case-insensitive substring match of the trigger phrase
fn phrase_heard(text: &str, lowercase_phrase: &str) -> bool {
    !lowercase_phrase.is_empty() && text.to_lowercase().contains(lowercase_phrase)
}

fn energy_threshold(ambient_rms: f32) -> f32 {
    (ambient_rms * AMBIENT_MARGIN).max(MIN_ENERGY)
}

/// Record one bounded window on a dedicated stream
///
/// Returns the concatenated samples, or None when nothing could be captured.
fn record_window(window: Duration, token: &CancelToken) -> Option<(Vec<f32>, u32)> {
    let mut capture = AudioCapture::new();
    let state = capture.shared_state();
    capture.start().ok()?;

    let deadline = Instant::now() + window;
    while Instant::now() < deadline && !token.is_set() {
        if state.state() == CaptureState::Error {
            break;
        }
        std::thread::sleep(POLL_INTERVAL);
    }

    let (blocks, sample_rate) = capture.stop();
    if blocks.is_empty() {
        return None;
    }
    let samples: Vec<f32> = blocks.into_iter().flatten().collect();
    Some((samples, sample_rate))
}

/// Round-trip the window through a temp WAV for the multipart upload
fn recognize_samples(
    recognizer: &RemoteRecognizer,
    samples: &[f32],
    sample_rate: u32,
) -> Result<String, String> {
    let path = listen_temp_path();
    WavRecorder::new(sample_rate).save_blocks(&[samples.to_vec()], &path)?;
    let result = recognizer
        .recognize_wav(&path)
        .map_err(|e| e.to_string());
    let _ = std::fs::remove_file(&path);
    result
}

fn listen_temp_path() -> PathBuf {
    std::env::temp_dir().join(format!("camrec_listen_{}.wav", uuid::Uuid::new_v4()))
}
