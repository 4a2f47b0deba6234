//! Webcam capture and container writing
//!
//! This module provides:
//! - Frame grabbing from v4l2 cameras (MJPG passthrough, YUYV via JPEG)
//! - A minimal AVI/MJPG container writer
//! - The detached video capture task driven by the session's cancel token

mod capture;
mod writer;

pub use capture::run_capture_task;
pub use writer::VideoWriter;

/// Seam for an optional on-screen preview surface
///
/// The capture loop pushes each encoded frame through this when a preview is
/// installed. Returning `false` means the user closed the preview, which the
/// loop translates into a session-wide stop request. The CLI never installs
/// one; a GUI shell would.
pub trait FramePreview: Send {
    fn show_frame(&mut self, jpeg: &[u8], width: u32, height: u32) -> bool;
}
