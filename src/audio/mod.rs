//! Audio capture and recording module using PipeWire
//!
//! This module provides:
//! - Microphone capture as an ordered list of fixed-size blocks
//! - WAV file flushing via hound
//! - The detached audio capture task driven by the session's cancel token

mod capture;
mod recorder;

pub use capture::{calculate_rms, AudioCapture, CaptureState, SharedCaptureState, BLOCK_SIZE};
pub use recorder::WavRecorder;

use crate::cancel::{CancelToken, FaultSlot};
use log::{debug, error, info, warn};
use std::path::PathBuf;
use std::time::Duration;

/// Interval between cancel-token polls while the stream delivers blocks
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Audio capture task: record microphone blocks until the token is set, then
/// flush them to `output_path`
///
/// Runs detached. Failures set the shared cancel token and land in the fault
/// slot, which the coordinator reads at finalize time. Blocks captured before
/// a mid-stream error are still flushed so a partial take remains
/// salvageable, but the session is then reported as a capture failure rather
/// than a clean recording.
pub fn run_capture_task(token: CancelToken, fault: FaultSlot, output_path: PathBuf) {
    let mut capture = AudioCapture::new();
    let state = capture.shared_state();

    if let Err(e) = capture.start() {
        error!("Audio capture failed to start: {}", e);
        fault.report(format!("audio capture failed to start: {}", e));
        token.set();
        return;
    }

    while !token.is_set() {
        if state.state() == CaptureState::Error {
            let message = state.error().unwrap_or_default();
            error!("Audio capture errored mid-stream: {}", message);
            fault.report(format!("audio capture errored mid-stream: {}", message));
            token.set();
            break;
        }
        std::thread::sleep(POLL_INTERVAL);
    }

    let (blocks, sample_rate) = capture.stop();
    if blocks.is_empty() {
        warn!("Audio capture ended with zero blocks, nothing to flush");
        return;
    }

    debug!(
        "Flushing {} audio blocks at {} Hz to {}",
        blocks.len(),
        sample_rate,
        output_path.display()
    );
    match WavRecorder::new(sample_rate).save_blocks(&blocks, &output_path) {
        Ok(path) => info!("Audio track written to {}", path.display()),
        Err(e) => {
            error!("Failed to write audio track: {}", e);
            fault.report(format!("failed to write audio track: {}", e));
            token.set();
        }
    }
}
